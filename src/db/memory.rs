use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{DocumentSnapshot, InvoiceSnapshot, RecordStore};
use crate::error::PipelineError;
use crate::models::{
    ArtifactKey, ArtifactReceipt, AuditEntry, Client, Document, DocumentKind, DocumentStatus,
    Invoice, InvoiceStatus, LineItem, StoredArtifact,
};

#[derive(Default)]
struct Inner {
    clients: HashMap<i32, Client>,
    invoices: HashMap<i32, Invoice>,
    line_items: HashMap<i32, Vec<LineItem>>,
    documents: HashMap<i32, Document>,
    /// fiscal year -> last issued sequence value
    sequences: HashMap<i32, u32>,
    artifacts: HashMap<ArtifactKey, (StoredArtifact, Vec<u8>)>,
    audit: Vec<AuditEntry>,
}

/// In-memory store with the same contracts as the Postgres one. Used by the
/// test suite and by offline demo runs; a single lock stands in for
/// transaction isolation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_client(&self, client: Client) {
        self.inner.lock().unwrap().clients.insert(client.id, client);
    }

    pub fn insert_invoice(&self, invoice: Invoice, line_items: Vec<LineItem>) {
        let mut inner = self.inner.lock().unwrap();
        inner.line_items.insert(invoice.id, line_items);
        inner.invoices.insert(invoice.id, invoice);
    }

    pub fn insert_document(&self, document: Document) {
        self.inner
            .lock()
            .unwrap()
            .documents
            .insert(document.id, document);
    }

    /// Number of persisted binaries, for write-once assertions.
    pub fn artifact_count(&self) -> usize {
        self.inner.lock().unwrap().artifacts.len()
    }

    pub fn artifact_bytes(&self, key: &ArtifactKey) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .artifacts
            .get(key)
            .map(|(_, bytes)| bytes.clone())
    }

    fn compute_totals(line_items: &[LineItem]) -> (Decimal, Decimal, Decimal) {
        let subtotal: Decimal = line_items.iter().map(LineItem::net_amount).sum();
        let tax_total: Decimal = line_items.iter().map(LineItem::tax_amount).sum();
        let subtotal = crate::assemble::round_money(subtotal);
        let tax_total = crate::assemble::round_money(tax_total);
        (subtotal, tax_total, subtotal + tax_total)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn invoice_snapshot(&self, id: i32) -> Result<InvoiceSnapshot, PipelineError> {
        let inner = self.inner.lock().unwrap();
        let invoice = inner
            .invoices
            .get(&id)
            .cloned()
            .ok_or(PipelineError::RecordNotFound {
                kind: DocumentKind::Invoice,
                id,
            })?;
        let client = inner.clients.get(&invoice.client_id).cloned().ok_or(
            PipelineError::RecordNotFound {
                kind: DocumentKind::Invoice,
                id: invoice.client_id,
            },
        )?;
        let line_items = inner.line_items.get(&id).cloned().unwrap_or_default();
        Ok(InvoiceSnapshot {
            invoice,
            client,
            line_items,
        })
    }

    async fn document_snapshot(&self, id: i32) -> Result<DocumentSnapshot, PipelineError> {
        let inner = self.inner.lock().unwrap();
        let document = inner
            .documents
            .get(&id)
            .cloned()
            .ok_or(PipelineError::RecordNotFound {
                kind: DocumentKind::Letterhead,
                id,
            })?;
        let client = inner.clients.get(&document.client_id).cloned().ok_or(
            PipelineError::RecordNotFound {
                kind: DocumentKind::Letterhead,
                id: document.client_id,
            },
        )?;
        Ok(DocumentSnapshot { document, client })
    }

    async fn issue_invoice(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Invoice, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        let line_items = inner.line_items.get(&id).cloned().unwrap_or_default();

        // Check-and-set on the draft status; the lock serializes racers.
        let (year, status) = match inner.invoices.get(&id) {
            Some(invoice) => (invoice.fiscal_year(), invoice.status),
            None => {
                return Err(PipelineError::RecordNotFound {
                    kind: DocumentKind::Invoice,
                    id,
                })
            }
        };
        if status != InvoiceStatus::Draft {
            return Err(PipelineError::InvalidState(format!(
                "invoice #{id} is {}, not draft",
                status.as_str()
            )));
        }

        let seq = inner.sequences.entry(year).or_insert(0);
        *seq += 1;
        let number = format!("{year}-{seq:05}", seq = *seq);

        let (subtotal, tax_total, total) = Self::compute_totals(&line_items);
        let Some(invoice) = inner.invoices.get_mut(&id) else {
            return Err(PipelineError::RecordNotFound {
                kind: DocumentKind::Invoice,
                id,
            });
        };
        invoice.status = InvoiceStatus::Issued;
        invoice.number = Some(number);
        invoice.template_version = Some(template_version.to_string());
        invoice.subtotal = subtotal;
        invoice.tax_total = tax_total;
        invoice.total = total;
        Ok(invoice.clone())
    }

    async fn finalize_document(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Document, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        let document = inner
            .documents
            .get_mut(&id)
            .ok_or(PipelineError::RecordNotFound {
                kind: DocumentKind::Letterhead,
                id,
            })?;
        if document.status != DocumentStatus::Draft {
            return Err(PipelineError::InvalidState(format!(
                "document #{id} is {}, not draft",
                document.status.as_str()
            )));
        }
        document.status = DocumentStatus::Finalized;
        document.template_version = Some(template_version.to_string());
        Ok(document.clone())
    }

    async fn void_invoice(&self, id: i32) -> Result<Invoice, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        let invoice = inner
            .invoices
            .get_mut(&id)
            .ok_or(PipelineError::RecordNotFound {
                kind: DocumentKind::Invoice,
                id,
            })?;
        if invoice.status != InvoiceStatus::Issued {
            return Err(PipelineError::InvalidState(format!(
                "invoice #{id} is {}, only issued invoices can be voided",
                invoice.status.as_str()
            )));
        }
        // The number stays with the voided invoice; no reuse.
        invoice.status = InvoiceStatus::Void;
        Ok(invoice.clone())
    }

    async fn persist_artifact(
        &self,
        key: &ArtifactKey,
        bytes: &[u8],
        receipt: &ArtifactReceipt,
    ) -> Result<ArtifactReceipt, PipelineError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((existing, _)) = inner.artifacts.get(key) {
            return Ok(existing.receipt.clone());
        }
        let stored = StoredArtifact {
            key: key.clone(),
            receipt: receipt.clone(),
        };
        inner
            .artifacts
            .insert(key.clone(), (stored, bytes.to_vec()));
        Ok(receipt.clone())
    }

    async fn load_artifact(
        &self,
        key: &ArtifactKey,
    ) -> Result<Option<StoredArtifact>, PipelineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .artifacts
            .get(key)
            .map(|(stored, _)| stored.clone()))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PipelineError> {
        self.inner.lock().unwrap().audit.push(entry.clone());
        Ok(())
    }

    async fn audit_entries(
        &self,
        kind: DocumentKind,
        record_id: i32,
    ) -> Result<Vec<AuditEntry>, PipelineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.kind == kind && e.record_id == record_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn draft_invoice(id: i32) -> Invoice {
        Invoice {
            id,
            number: None,
            client_id: 1,
            currency: "USD".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            status: InvoiceStatus::Draft,
            template_version: None,
            subtotal: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    fn line(id: i32, invoice_id: i32, qty: i64, price: i64) -> LineItem {
        LineItem {
            id,
            invoice_id,
            description: format!("work item {id}"),
            quantity: Decimal::from(qty),
            unit_price: Decimal::from(price),
            tax_rate: Decimal::new(10, 2), // 0.10
        }
    }

    #[tokio::test]
    async fn issuance_assigns_monotonic_numbers() {
        let store = MemoryStore::new();
        store.insert_invoice(draft_invoice(1), vec![line(1, 1, 2, 100)]);
        store.insert_invoice(draft_invoice(2), vec![line(2, 2, 1, 50)]);

        let first = store.issue_invoice(1, "v1").await.unwrap();
        let second = store.issue_invoice(2, "v1").await.unwrap();
        assert_eq!(first.number.as_deref(), Some("2024-00001"));
        assert_eq!(second.number.as_deref(), Some("2024-00002"));
        assert_eq!(first.status, InvoiceStatus::Issued);
    }

    #[tokio::test]
    async fn issuance_freezes_totals() {
        let store = MemoryStore::new();
        store.insert_invoice(draft_invoice(1), vec![line(1, 1, 2, 100), line(2, 1, 1, 50)]);

        let issued = store.issue_invoice(1, "v1").await.unwrap();
        assert_eq!(issued.subtotal, Decimal::from(250));
        assert_eq!(issued.tax_total, Decimal::from(25));
        assert_eq!(issued.total, Decimal::from(275));
    }

    #[tokio::test]
    async fn voided_invoice_keeps_its_number() {
        let store = MemoryStore::new();
        store.insert_invoice(draft_invoice(1), vec![line(1, 1, 1, 100)]);
        store.insert_invoice(draft_invoice(2), vec![line(2, 2, 1, 100)]);

        let issued = store.issue_invoice(1, "v1").await.unwrap();
        let voided = store.void_invoice(1).await.unwrap();
        assert_eq!(voided.number, issued.number);
        assert_eq!(voided.status, InvoiceStatus::Void);

        // The next issuance does not fill the gap.
        let next = store.issue_invoice(2, "v1").await.unwrap();
        assert_eq!(next.number.as_deref(), Some("2024-00002"));
    }

    #[tokio::test]
    async fn double_issue_fails_with_invalid_state() {
        let store = MemoryStore::new();
        store.insert_invoice(draft_invoice(1), vec![line(1, 1, 1, 100)]);
        store.issue_invoice(1, "v1").await.unwrap();
        let err = store.issue_invoice(1, "v1").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));
    }
}
