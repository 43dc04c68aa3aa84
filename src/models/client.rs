use serde::{Deserialize, Serialize};

/// Billing party. Referenced by invoices and documents, never embedded.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i32,
    pub name: String,
    pub address: Option<String>,
    pub email: String,
    pub phone: String,
}
