//! Record store: the pipeline's only gateway to persisted state.
//!
//! Two implementations share one contract: `Database` (Postgres via sqlx)
//! for production and `MemoryStore` for tests and offline runs. Snapshot
//! reads are consistent (one transaction / one lock), lifecycle transitions
//! are check-and-set on the current status, and artifact persistence is
//! write-once per (record, template version).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::{
    ArtifactKey, ArtifactReceipt, AuditEntry, Client, Document, DocumentKind, Invoice, LineItem,
    StoredArtifact,
};

/// One coherent view of an invoice and everything rendered with it.
#[derive(Debug, Clone)]
pub struct InvoiceSnapshot {
    pub invoice: Invoice,
    pub client: Client,
    pub line_items: Vec<LineItem>,
}

/// One coherent view of a letterhead document.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub document: Document,
    pub client: Client,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load an invoice with its client and line items in a single
    /// consistent read. A half-updated record must never be observable.
    async fn invoice_snapshot(&self, id: i32) -> Result<InvoiceSnapshot, PipelineError>;

    async fn document_snapshot(&self, id: i32) -> Result<DocumentSnapshot, PipelineError>;

    /// Freeze a draft invoice: assign the next number in its fiscal year,
    /// store totals computed from the line items, and bind the template
    /// version. Serialized by a check-and-set on the draft status; exactly
    /// one of several concurrent calls succeeds, the rest get
    /// `InvalidState`.
    async fn issue_invoice(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Invoice, PipelineError>;

    /// Freeze a draft document and bind the template version. Same
    /// check-and-set rule as issuance.
    async fn finalize_document(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Document, PipelineError>;

    /// Void an issued invoice. The invoice keeps its number; the sequence
    /// never reuses it.
    async fn void_invoice(&self, id: i32) -> Result<Invoice, PipelineError>;

    /// Persist an artifact exactly once per key. A second call for the same
    /// key is a no-op that returns the receipt recorded by the first; it
    /// never overwrites.
    async fn persist_artifact(
        &self,
        key: &ArtifactKey,
        bytes: &[u8],
        receipt: &ArtifactReceipt,
    ) -> Result<ArtifactReceipt, PipelineError>;

    async fn load_artifact(
        &self,
        key: &ArtifactKey,
    ) -> Result<Option<StoredArtifact>, PipelineError>;

    /// Append-only audit trail; written for every outcome, denials included.
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PipelineError>;

    async fn audit_entries(
        &self,
        kind: DocumentKind,
        record_id: i32,
    ) -> Result<Vec<AuditEntry>, PipelineError>;
}
