//! Pipeline orchestrator: gate, assemble, resolve, render, compile,
//! deliver, in that order, with an audit entry for every outcome.
//!
//! The orchestrator owns ordering and retry; each stage stays pure enough
//! to test on its own. Only faults flagged retryable (engine or store
//! unreachable) are retried, with exponential backoff; denials and data
//! faults surface immediately.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::assemble;
use crate::auth::{authorize, Decision, ResourceScope};
use crate::compile::{DocumentCompiler, PageConfig};
use crate::db::RecordStore;
use crate::deliver;
use crate::error::PipelineError;
use crate::models::{
    Action, Actor, ArtifactKey, ArtifactReceipt, AuditEntry, AuditOutcome, Document, DocumentKind,
    Invoice,
};
use crate::render;
use crate::template;

/// Bounded exponential backoff for transient faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting. Used by tests and previews.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A freshly generated final artifact: the stored receipt plus the bytes,
/// so a caller can hand them straight to the mailer.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub key: ArtifactKey,
    pub receipt: ArtifactReceipt,
    pub pdf: Vec<u8>,
}

pub struct Pipeline<S: RecordStore> {
    store: S,
    compiler: Arc<dyn DocumentCompiler>,
    page: PageConfig,
    retry: RetryPolicy,
}

impl<S: RecordStore> Pipeline<S> {
    pub fn new(store: S, compiler: Arc<dyn DocumentCompiler>) -> Self {
        Self {
            store,
            compiler,
            page: PageConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authorization gate. Denials are audited and returned as
    /// `AuthorizationDenied`; they are the expected answer to an
    /// out-of-policy request, not a fault.
    async fn gate(
        &self,
        actor: &Actor,
        action: Action,
        kind: DocumentKind,
        record_id: i32,
        scope: ResourceScope,
    ) -> Result<(), PipelineError> {
        match authorize(actor.role, action, scope) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                let entry = AuditEntry::new(actor, action, kind, record_id, AuditOutcome::Denied)
                    .with_detail(&reason);
                self.store.append_audit(&entry).await?;
                info!(actor = %actor.name, role = %actor.role, %action, reason, "request denied");
                Err(PipelineError::AuthorizationDenied {
                    role: actor.role,
                    action,
                    reason,
                })
            }
        }
    }

    async fn audit_success(
        &self,
        actor: &Actor,
        action: Action,
        kind: DocumentKind,
        record_id: i32,
        template_version: &str,
        checksum: Option<&str>,
    ) -> Result<(), PipelineError> {
        let mut entry = AuditEntry::new(actor, action, kind, record_id, AuditOutcome::Succeeded)
            .with_template_version(template_version);
        if let Some(checksum) = checksum {
            entry = entry.with_checksum(checksum);
        }
        self.store.append_audit(&entry).await
    }

    async fn audit_failure(
        &self,
        actor: &Actor,
        action: Action,
        kind: DocumentKind,
        record_id: i32,
        error: &PipelineError,
    ) {
        let entry = AuditEntry::new(actor, action, kind, record_id, AuditOutcome::Failed)
            .with_detail(&error.to_string());
        // Failure audit is best effort; the original error wins.
        if let Err(audit_err) = self.store.append_audit(&entry).await {
            warn!(%audit_err, "could not record failure audit entry");
        }
    }

    /// Run one operation with bounded backoff on transient faults. Covers
    /// store reads, artifact persistence and the compiler alike; denials
    /// and integrity faults pass through on the first attempt. Lifecycle
    /// mutations (issue, void, finalize) are deliberately not routed
    /// through here: a lost acknowledgement would make a retry report a
    /// committed transition as `InvalidState`.
    async fn run_with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T, PipelineError>
    where
        Fut: std::future::Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(%err, attempt, ?delay, "transient fault, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn produce(
        &self,
        model: &assemble::RenderingModel,
        record_id: i32,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let kind = model.kind();
        let bundle = template::resolve(kind, model.template_version())?;
        let markup = render::render(bundle, model)?;
        let pdf = self
            .run_with_retry(|| self.compiler.compile(&markup, &self.page))
            .await?;

        let key = ArtifactKey::new(kind, record_id, bundle.version);
        // Write-once, so a retried persist is a no-op returning the
        // original receipt.
        let receipt = self
            .run_with_retry(|| deliver::deliver(&self.store, &key, &pdf))
            .await?;
        Ok(GeneratedArtifact { key, receipt, pdf })
    }

    /// Generate the final artifact for an issued invoice.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn generate_invoice(
        &self,
        actor: &Actor,
        invoice_id: i32,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let kind = DocumentKind::Invoice;
        let snapshot = self
            .run_with_retry(|| self.store.invoice_snapshot(invoice_id))
            .await?;
        let scope = ResourceScope::new(kind, snapshot.invoice.status.is_frozen());
        self.gate(actor, Action::Generate, kind, invoice_id, scope)
            .await?;

        let result = async {
            let model = self
                .run_with_retry(|| assemble::assemble_invoice(&self.store, invoice_id))
                .await?;
            self.produce(&model, invoice_id).await
        }
        .await;

        match result {
            Ok(generated) => {
                self.audit_success(
                    actor,
                    Action::Generate,
                    kind,
                    invoice_id,
                    &generated.key.template_version,
                    Some(&generated.receipt.checksum),
                )
                .await?;
                Ok(generated)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::Generate, kind, invoice_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Watermarked preview for an invoice in any state. Never persisted,
    /// never distributed, never audited as a financial artifact.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn preview_invoice(
        &self,
        actor: &Actor,
        invoice_id: i32,
    ) -> Result<Vec<u8>, PipelineError> {
        let kind = DocumentKind::Invoice;
        let snapshot = self
            .run_with_retry(|| self.store.invoice_snapshot(invoice_id))
            .await?;
        let scope = ResourceScope::new(kind, snapshot.invoice.status.is_frozen());
        self.gate(actor, Action::View, kind, invoice_id, scope)
            .await?;

        let current = template::current_version(kind)?;
        let result = async {
            let model = self
                .run_with_retry(|| {
                    assemble::assemble_invoice_preview(&self.store, invoice_id, current)
                })
                .await?;
            let bundle = template::resolve(kind, model.template_version())?;
            let markup = render::render(bundle, &model)?;
            let pdf = self
                .run_with_retry(|| self.compiler.compile(&markup, &self.page))
                .await?;
            Ok::<_, PipelineError>((model.template_version().to_string(), pdf))
        }
        .await;

        match result {
            Ok((version, pdf)) => {
                // Not persisted, but the allowed access is still audited.
                let checksum = deliver::checksum(&pdf);
                self.audit_success(actor, Action::View, kind, invoice_id, &version, Some(&checksum))
                    .await?;
                Ok(pdf)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::View, kind, invoice_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Issue a draft invoice: assign its number, freeze totals, bind the
    /// newest template version. Concurrency-safe; exactly one of several
    /// simultaneous calls wins.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn issue_invoice(
        &self,
        actor: &Actor,
        invoice_id: i32,
    ) -> Result<Invoice, PipelineError> {
        let kind = DocumentKind::Invoice;
        let scope = ResourceScope::new(kind, false);
        self.gate(actor, Action::Issue, kind, invoice_id, scope)
            .await?;

        let version = template::current_version(kind)?;
        match self.store.issue_invoice(invoice_id, version).await {
            Ok(invoice) => {
                self.audit_success(actor, Action::Issue, kind, invoice_id, version, None)
                    .await?;
                info!(number = invoice.number.as_deref().unwrap_or(""), "invoice issued");
                Ok(invoice)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::Issue, kind, invoice_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Void an issued invoice. The number stays assigned; the fiscal-year
    /// sequence never reuses it.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn void_invoice(
        &self,
        actor: &Actor,
        invoice_id: i32,
        confirmed: bool,
    ) -> Result<Invoice, PipelineError> {
        let kind = DocumentKind::Invoice;
        let scope = ResourceScope::new(kind, true).with_void_confirmation(confirmed);
        self.gate(actor, Action::Void, kind, invoice_id, scope)
            .await?;

        match self.store.void_invoice(invoice_id).await {
            Ok(invoice) => {
                let entry =
                    AuditEntry::new(actor, Action::Void, kind, invoice_id, AuditOutcome::Succeeded);
                self.store.append_audit(&entry).await?;
                Ok(invoice)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::Void, kind, invoice_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Finalize a draft letterhead document, binding the newest template.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn finalize_document(
        &self,
        actor: &Actor,
        document_id: i32,
    ) -> Result<Document, PipelineError> {
        let kind = DocumentKind::Letterhead;
        let scope = ResourceScope::new(kind, false);
        self.gate(actor, Action::Issue, kind, document_id, scope)
            .await?;

        let version = template::current_version(kind)?;
        match self.store.finalize_document(document_id, version).await {
            Ok(document) => {
                self.audit_success(actor, Action::Issue, kind, document_id, version, None)
                    .await?;
                Ok(document)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::Issue, kind, document_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Generate the final artifact for a finalized letterhead document.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn generate_letterhead(
        &self,
        actor: &Actor,
        document_id: i32,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let kind = DocumentKind::Letterhead;
        let snapshot = self
            .run_with_retry(|| self.store.document_snapshot(document_id))
            .await?;
        let scope = ResourceScope::new(kind, snapshot.document.status.is_frozen());
        self.gate(actor, Action::Generate, kind, document_id, scope)
            .await?;

        let result = async {
            let model = self
                .run_with_retry(|| assemble::assemble_document(&self.store, document_id))
                .await?;
            self.produce(&model, document_id).await
        }
        .await;

        match result {
            Ok(generated) => {
                self.audit_success(
                    actor,
                    Action::Generate,
                    kind,
                    document_id,
                    &generated.key.template_version,
                    Some(&generated.receipt.checksum),
                )
                .await?;
                Ok(generated)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::Generate, kind, document_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }

    /// Watermarked preview for a letterhead document in any state.
    #[instrument(skip(self, actor), fields(actor = %actor.name, role = %actor.role))]
    pub async fn preview_letterhead(
        &self,
        actor: &Actor,
        document_id: i32,
    ) -> Result<Vec<u8>, PipelineError> {
        let kind = DocumentKind::Letterhead;
        let snapshot = self
            .run_with_retry(|| self.store.document_snapshot(document_id))
            .await?;
        let scope = ResourceScope::new(kind, snapshot.document.status.is_frozen());
        self.gate(actor, Action::View, kind, document_id, scope)
            .await?;

        let current = template::current_version(kind)?;
        let result = async {
            let model = self
                .run_with_retry(|| {
                    assemble::assemble_document_preview(&self.store, document_id, current)
                })
                .await?;
            let bundle = template::resolve(kind, model.template_version())?;
            let markup = render::render(bundle, &model)?;
            let pdf = self
                .run_with_retry(|| self.compiler.compile(&markup, &self.page))
                .await?;
            Ok::<_, PipelineError>((model.template_version().to_string(), pdf))
        }
        .await;

        match result {
            Ok((version, pdf)) => {
                let checksum = deliver::checksum(&pdf);
                self.audit_success(actor, Action::View, kind, document_id, &version, Some(&checksum))
                    .await?;
                Ok(pdf)
            }
            Err(err) => {
                if !err.is_denial() {
                    self.audit_failure(actor, Action::View, kind, document_id, &err)
                        .await;
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
    }

    #[test]
    fn none_policy_is_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }
}
