use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of an invoice. Immutable once the parent invoice is issued.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LineItem {
    pub id: i32,
    pub invoice_id: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Fractional rate, e.g. 0.18 for 18%.
    pub tax_rate: Decimal,
}

impl LineItem {
    pub fn net_amount(&self) -> Decimal {
        self.quantity * self.unit_price
    }

    pub fn tax_amount(&self) -> Decimal {
        self.net_amount() * self.tax_rate
    }
}
