use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use super::{DocumentSnapshot, InvoiceSnapshot, RecordStore};
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{
    Action, ArtifactKey, ArtifactReceipt, AuditEntry, AuditOutcome, Client, ContentBlock,
    Document, DocumentKind, DocumentStatus, Invoice, InvoiceStatus, LineItem, Role,
    StoredArtifact,
};

/// Postgres-backed record store.
///
/// Queries are runtime-checked so the crate builds without a live database.
/// Status and role columns are plain text mapped through the closed enums;
/// an unrecognized value in a row is treated as a data fault, not defaulted.
pub struct Database {
    pool: PgPool,
    artifact_dir: String,
    op_timeout: Duration,
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i32,
    number: Option<String>,
    client_id: i32,
    currency: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    status: String,
    template_version: Option<String>,
    subtotal: Decimal,
    tax_total: Decimal,
    total: Decimal,
}

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice, PipelineError> {
        let status = InvoiceStatus::parse(&self.status).ok_or_else(|| {
            PipelineError::DataUnavailable(format!(
                "invoice #{} has unrecognized status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Invoice {
            id: self.id,
            number: self.number,
            client_id: self.client_id,
            currency: self.currency,
            issue_date: self.issue_date,
            due_date: self.due_date,
            status,
            template_version: self.template_version,
            subtotal: self.subtotal,
            tax_total: self.tax_total,
            total: self.total,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: i32,
    client_id: i32,
    title: String,
    reference: String,
    created_on: NaiveDate,
    status: String,
    template_version: Option<String>,
}

#[derive(sqlx::FromRow)]
struct BlockRow {
    heading: String,
    body: String,
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    kind: String,
    record_id: i32,
    template_version: String,
    checksum: String,
    byte_length: i64,
    delivered_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    actor: String,
    actor_role: String,
    action: String,
    kind: String,
    record_id: i32,
    template_version: Option<String>,
    checksum: Option<String>,
    at: DateTime<Utc>,
    outcome: String,
    detail: Option<String>,
}

const INVOICE_COLUMNS: &str = "id, number, client_id, currency, issue_date, due_date, status, \
                               template_version, subtotal, tax_total, total";

impl Database {
    /// Create a new store with a connection pool.
    pub async fn new(config: &Config) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(config.db_timeout())
            .connect(config.database_url())
            .await?;

        info!("database connection pool established");

        Ok(Self {
            pool,
            artifact_dir: config.artifact_dir.clone(),
            op_timeout: config.db_timeout(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    pub async fn run_migrations(&self) -> Result<(), PipelineError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PipelineError::DataUnavailable(format!("migration failed: {e}")))?;
        Ok(())
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, PipelineError>> + Send,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| PipelineError::DataUnavailable("database operation timed out".into()))?
    }

    async fn load_invoice_tx(&self, id: i32) -> Result<InvoiceSnapshot, PipelineError> {
        // Repeatable read: invoice, client and line items come from one
        // coherent snapshot, never a half-updated record.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PipelineError::RecordNotFound {
            kind: DocumentKind::Invoice,
            id,
        })?;
        let invoice = row.into_invoice()?;

        let client = sqlx::query_as::<_, Client>(
            "SELECT id, name, address, email, phone FROM clients WHERE id = $1",
        )
        .bind(invoice.client_id)
        .fetch_one(&mut *tx)
        .await?;

        let line_items = sqlx::query_as::<_, LineItem>(
            "SELECT id, invoice_id, description, quantity, unit_price, tax_rate \
             FROM line_items WHERE invoice_id = $1 ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InvoiceSnapshot {
            invoice,
            client,
            line_items,
        })
    }

    async fn load_document_tx(&self, id: i32) -> Result<DocumentSnapshot, PipelineError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, client_id, title, reference, created_on, status, template_version \
             FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PipelineError::RecordNotFound {
            kind: DocumentKind::Letterhead,
            id,
        })?;

        let status = DocumentStatus::parse(&row.status).ok_or_else(|| {
            PipelineError::DataUnavailable(format!(
                "document #{} has unrecognized status '{}'",
                row.id, row.status
            ))
        })?;

        let client = sqlx::query_as::<_, Client>(
            "SELECT id, name, address, email, phone FROM clients WHERE id = $1",
        )
        .bind(row.client_id)
        .fetch_one(&mut *tx)
        .await?;

        let blocks = sqlx::query_as::<_, BlockRow>(
            "SELECT heading, body FROM document_blocks \
             WHERE document_id = $1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DocumentSnapshot {
            document: Document {
                id: row.id,
                client_id: row.client_id,
                title: row.title,
                reference: row.reference,
                created_on: row.created_on,
                status,
                template_version: row.template_version,
                blocks: blocks
                    .into_iter()
                    .map(|b| ContentBlock {
                        heading: b.heading,
                        body: b.body,
                    })
                    .collect(),
            },
            client,
        })
    }

    async fn finalize_document_tx(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Document, PipelineError> {
        // CAS and block read in one transaction, same shape as issuance.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET status = 'finalized', template_version = $2 \
             WHERE id = $1 AND status = 'draft' \
             RETURNING id, client_id, title, reference, created_on, status, template_version",
        )
        .bind(id)
        .bind(template_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            let exists: Option<(i32,)> = sqlx::query_as("SELECT id FROM documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => PipelineError::InvalidState(format!("document #{id} is not a draft")),
                None => PipelineError::RecordNotFound {
                    kind: DocumentKind::Letterhead,
                    id,
                },
            });
        };

        let status = DocumentStatus::parse(&row.status).ok_or_else(|| {
            PipelineError::DataUnavailable(format!(
                "document #{} has unrecognized status '{}'",
                row.id, row.status
            ))
        })?;

        let blocks = sqlx::query_as::<_, BlockRow>(
            "SELECT heading, body FROM document_blocks \
             WHERE document_id = $1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Document {
            id: row.id,
            client_id: row.client_id,
            title: row.title,
            reference: row.reference,
            created_on: row.created_on,
            status,
            template_version: row.template_version,
            blocks: blocks
                .into_iter()
                .map(|b| ContentBlock {
                    heading: b.heading,
                    body: b.body,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl RecordStore for Database {
    #[instrument(skip(self))]
    async fn invoice_snapshot(&self, id: i32) -> Result<InvoiceSnapshot, PipelineError> {
        self.with_timeout(self.load_invoice_tx(id)).await
    }

    #[instrument(skip(self))]
    async fn document_snapshot(&self, id: i32) -> Result<DocumentSnapshot, PipelineError> {
        self.with_timeout(self.load_document_tx(id)).await
    }

    #[instrument(skip(self))]
    async fn issue_invoice(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Invoice, PipelineError> {
        let mut tx = self.pool.begin().await?;

        let (fiscal_year,): (i32,) = sqlx::query_as(
            "SELECT CAST(EXTRACT(YEAR FROM issue_date) AS INTEGER) FROM invoices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PipelineError::RecordNotFound {
            kind: DocumentKind::Invoice,
            id,
        })?;

        // Transactional sequence; rolled back if the issuance CAS loses.
        let (seq,): (i32,) = sqlx::query_as(
            "INSERT INTO invoice_sequences (fiscal_year, last_value) VALUES ($1, 1) \
             ON CONFLICT (fiscal_year) \
             DO UPDATE SET last_value = invoice_sequences.last_value + 1 \
             RETURNING last_value",
        )
        .bind(fiscal_year)
        .fetch_one(&mut *tx)
        .await?;
        let number = format!("{fiscal_year}-{seq:05}");

        let (subtotal, tax_total): (Decimal, Decimal) = sqlx::query_as(
            "SELECT COALESCE(SUM(quantity * unit_price), 0), \
                    COALESCE(SUM(quantity * unit_price * tax_rate), 0) \
             FROM line_items WHERE invoice_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let subtotal = crate::assemble::round_money(subtotal);
        let tax_total = crate::assemble::round_money(tax_total);
        let total = subtotal + tax_total;

        // Check-and-set on the draft status: only one concurrent issuance
        // can match the WHERE clause.
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "UPDATE invoices \
             SET status = 'issued', number = $2, template_version = $3, \
                 subtotal = $4, tax_total = $5, total = $6 \
             WHERE id = $1 AND status = 'draft' \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(id)
        .bind(&number)
        .bind(template_version)
        .bind(subtotal)
        .bind(tax_total)
        .bind(total)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                tx.commit().await?;
                let invoice = row.into_invoice()?;
                info!(invoice_id = id, number = %number, "invoice issued");
                Ok(invoice)
            }
            None => {
                tx.rollback().await?;
                Err(PipelineError::InvalidState(format!(
                    "invoice #{id} is not a draft"
                )))
            }
        }
    }

    #[instrument(skip(self))]
    async fn finalize_document(
        &self,
        id: i32,
        template_version: &str,
    ) -> Result<Document, PipelineError> {
        self.with_timeout(self.finalize_document_tx(id, template_version))
            .await
    }

    #[instrument(skip(self))]
    async fn void_invoice(&self, id: i32) -> Result<Invoice, PipelineError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "UPDATE invoices SET status = 'void' \
             WHERE id = $1 AND status = 'issued' \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            PipelineError::InvalidState(format!(
                "invoice #{id} is not issued; only issued invoices can be voided"
            ))
        })?;
        row.into_invoice()
    }

    #[instrument(skip(self, bytes, receipt), fields(checksum = %receipt.checksum))]
    async fn persist_artifact(
        &self,
        key: &ArtifactKey,
        bytes: &[u8],
        receipt: &ArtifactReceipt,
    ) -> Result<ArtifactReceipt, PipelineError> {
        // Second persist for the same key: return the stored receipt before
        // touching the filesystem.
        if let Some(existing) = self.load_artifact(key).await? {
            return Ok(existing.receipt);
        }

        // Content-addressed binary: identical content collapses to one file.
        let dir = Path::new(&self.artifact_dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::Delivery(format!("artifact dir: {e}")))?;
        let path = dir.join(format!("{}.pdf", receipt.checksum));
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| PipelineError::Delivery(e.to_string()))?
        {
            // Already on disk under the same checksum; nothing to write.
        } else {
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| PipelineError::Delivery(format!("artifact write: {e}")))?;
        }

        // Write-once row: losers of the race read the winner's receipt.
        let inserted = sqlx::query(
            "INSERT INTO artifacts (kind, record_id, template_version, checksum, byte_length, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (kind, record_id, template_version) DO NOTHING",
        )
        .bind(key.kind.as_str())
        .bind(key.record_id)
        .bind(&key.template_version)
        .bind(&receipt.checksum)
        .bind(receipt.byte_length as i64)
        .bind(receipt.delivered_at)
        .execute(&self.pool)
        .await?;

        let stored = self
            .load_artifact(key)
            .await?
            .ok_or_else(|| PipelineError::DataUnavailable("artifact row vanished".into()))?;

        if inserted.rows_affected() == 0 && stored.receipt.checksum != receipt.checksum {
            // Lost the race with different bytes: drop our file unless some
            // other artifact row still references that content.
            let (refs,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM artifacts WHERE checksum = $1")
                    .bind(&receipt.checksum)
                    .fetch_one(&self.pool)
                    .await?;
            if refs == 0 {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(stored.receipt)
    }

    async fn load_artifact(
        &self,
        key: &ArtifactKey,
    ) -> Result<Option<StoredArtifact>, PipelineError> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "SELECT kind, record_id, template_version, checksum, byte_length, delivered_at \
             FROM artifacts WHERE kind = $1 AND record_id = $2 AND template_version = $3",
        )
        .bind(key.kind.as_str())
        .bind(key.record_id)
        .bind(&key.template_version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredArtifact {
            key: ArtifactKey {
                kind: DocumentKind::parse(&r.kind).unwrap_or(key.kind),
                record_id: r.record_id,
                template_version: r.template_version,
            },
            receipt: ArtifactReceipt {
                checksum: r.checksum,
                byte_length: r.byte_length as u64,
                delivered_at: r.delivered_at,
            },
        }))
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO audit_log \
             (actor, actor_role, action, kind, record_id, template_version, checksum, at, outcome, detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&entry.actor)
        .bind(entry.actor_role.as_str())
        .bind(entry.action.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.record_id)
        .bind(&entry.template_version)
        .bind(&entry.checksum)
        .bind(entry.timestamp)
        .bind(entry.outcome.as_str())
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn audit_entries(
        &self,
        kind: DocumentKind,
        record_id: i32,
    ) -> Result<Vec<AuditEntry>, PipelineError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT actor, actor_role, action, kind, record_id, template_version, checksum, \
                    at, outcome, detail \
             FROM audit_log WHERE kind = $1 AND record_id = $2 ORDER BY at ASC, id ASC",
        )
        .bind(kind.as_str())
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let corrupt =
                    |field: &str| PipelineError::DataUnavailable(format!("corrupt audit {field}"));
                Ok(AuditEntry {
                    actor: r.actor,
                    actor_role: Role::parse(&r.actor_role).ok_or_else(|| corrupt("role"))?,
                    action: Action::parse(&r.action).ok_or_else(|| corrupt("action"))?,
                    kind: DocumentKind::parse(&r.kind).ok_or_else(|| corrupt("kind"))?,
                    record_id: r.record_id,
                    template_version: r.template_version,
                    checksum: r.checksum,
                    timestamp: r.at,
                    outcome: AuditOutcome::parse(&r.outcome).ok_or_else(|| corrupt("outcome"))?,
                    detail: r.detail,
                })
            })
            .collect()
    }
}
