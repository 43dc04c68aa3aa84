use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinds of record the pipeline can turn into a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Letterhead,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Letterhead => "letterhead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(DocumentKind::Invoice),
            "letterhead" => Some(DocumentKind::Letterhead),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Letterhead lifecycle. Finalizing freezes the blocks and binds the
/// template version, same rule as invoice issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Finalized,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Finalized => "finalized",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DocumentStatus::Draft),
            "finalized" => Some(DocumentStatus::Finalized),
            _ => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self, DocumentStatus::Finalized)
    }
}

/// One section of a letterhead document. Plain text only; markup never
/// crosses this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    pub heading: String,
    pub body: String,
}

/// General letterhead document (notices, agreements, cover letters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i32,
    pub client_id: i32,
    pub title: String,
    /// Operator-facing reference, e.g. an agreement number.
    pub reference: String,
    pub created_on: chrono::NaiveDate,
    pub status: DocumentStatus,
    pub template_version: Option<String>,
    pub blocks: Vec<ContentBlock>,
}
