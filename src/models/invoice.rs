use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice lifecycle. One-way: Draft -> Issued -> (Paid | Void).
///
/// Issuance freezes line items and totals and binds the template version;
/// corrections after that point require a new invoice, never a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "issued" => Some(InvoiceStatus::Issued),
            "paid" => Some(InvoiceStatus::Paid),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }

    /// Issued and later states carry a legally meaningful, frozen record.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, InvoiceStatus::Draft)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i32,
    /// Assigned at issuance, formatted `YYYY-NNNNN`. Unique and strictly
    /// increasing within a fiscal year; voided invoices keep theirs.
    pub number: Option<String>,
    pub client_id: i32,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    /// Template version bound at issuance; immutable afterwards.
    pub template_version: Option<String>,
    /// Stored at issuance from the line items, never recomputed at render
    /// time, so historical artifacts survive later tax-rate changes.
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
}

impl Invoice {
    pub fn fiscal_year(&self) -> i32 {
        use chrono::Datelike;
        self.issue_date.year()
    }
}
