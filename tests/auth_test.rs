use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use docpress::compile::FakeCompiler;
use docpress::db::{MemoryStore, RecordStore};
use docpress::error::PipelineError;
use docpress::models::{
    Actor, AuditOutcome, Client, DocumentKind, Invoice, InvoiceStatus, LineItem, Role,
};
use docpress::pipeline::{Pipeline, RetryPolicy};

fn seeded_pipeline() -> Pipeline<MemoryStore> {
    let store = MemoryStore::new();
    store.insert_client(Client {
        id: 1,
        name: "Kale Associates".to_string(),
        address: None,
        email: "billing@kale.example".to_string(),
        phone: "+91 20 5550 0202".to_string(),
    });
    store.insert_invoice(
        Invoice {
            id: 1,
            number: None,
            client_id: 1,
            currency: "INR".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
            status: InvoiceStatus::Draft,
            template_version: None,
            subtotal: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
        },
        vec![LineItem {
            id: 1,
            invoice_id: 1,
            description: "Retainer".to_string(),
            quantity: Decimal::from(1),
            unit_price: Decimal::from(10_000),
            tax_rate: Decimal::new(18, 2),
        }],
    );
    Pipeline::new(store, Arc::new(FakeCompiler)).with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn viewer_generate_is_denied_and_audited() {
    let pipeline = seeded_pipeline();
    let ops = Actor::new("asha", Role::Operations);
    pipeline.issue_invoice(&ops, 1).await.unwrap();

    let viewer = Actor::new("vikram", Role::Viewer);
    let err = pipeline.generate_invoice(&viewer, 1).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AuthorizationDenied { role: Role::Viewer, .. }
    ));

    let entries = pipeline
        .store()
        .audit_entries(DocumentKind::Invoice, 1)
        .await
        .unwrap();
    let denied: Vec<_> = entries
        .iter()
        .filter(|e| e.outcome == AuditOutcome::Denied)
        .collect();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].actor, "vikram");
    // Nothing was generated for the denied request.
    assert_eq!(pipeline.store().artifact_count(), 0);
}

#[tokio::test]
async fn viewer_can_preview_frozen_records_only() {
    let pipeline = seeded_pipeline();
    let viewer = Actor::new("vikram", Role::Viewer);

    let err = pipeline.preview_invoice(&viewer, 1).await.unwrap_err();
    assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));

    let ops = Actor::new("asha", Role::Operations);
    pipeline.issue_invoice(&ops, 1).await.unwrap();
    let preview = pipeline.preview_invoice(&viewer, 1).await.unwrap();
    assert!(!preview.is_empty());
}

#[tokio::test]
async fn allowed_preview_is_audited() {
    let pipeline = seeded_pipeline();
    let ops = Actor::new("asha", Role::Operations);
    pipeline.issue_invoice(&ops, 1).await.unwrap();

    let viewer = Actor::new("vikram", Role::Viewer);
    let before = pipeline
        .store()
        .audit_entries(DocumentKind::Invoice, 1)
        .await
        .unwrap()
        .len();
    pipeline.preview_invoice(&viewer, 1).await.unwrap();

    let entries = pipeline
        .store()
        .audit_entries(DocumentKind::Invoice, 1)
        .await
        .unwrap();
    assert_eq!(entries.len(), before + 1);
    let view = entries.last().unwrap();
    assert_eq!(view.actor, "vikram");
    assert_eq!(view.outcome, AuditOutcome::Succeeded);
    assert!(view.checksum.is_some());
}

#[tokio::test]
async fn viewer_cannot_issue_or_void() {
    let pipeline = seeded_pipeline();
    let viewer = Actor::new("vikram", Role::Viewer);

    let err = pipeline.issue_invoice(&viewer, 1).await.unwrap_err();
    assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));
    let err = pipeline.void_invoice(&viewer, 1, true).await.unwrap_err();
    assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));
}

#[tokio::test]
async fn operations_void_needs_confirmation_super_admin_does_not() {
    let pipeline = seeded_pipeline();
    let ops = Actor::new("asha", Role::Operations);
    pipeline.issue_invoice(&ops, 1).await.unwrap();

    let err = pipeline.void_invoice(&ops, 1, false).await.unwrap_err();
    assert!(matches!(err, PipelineError::AuthorizationDenied { .. }));

    let admin = Actor::new("root", Role::SuperAdmin);
    let voided = pipeline.void_invoice(&admin, 1, false).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Void);
}

#[tokio::test]
async fn successful_generation_is_audited_with_checksum() {
    let pipeline = seeded_pipeline();
    let ops = Actor::new("asha", Role::Operations);
    pipeline.issue_invoice(&ops, 1).await.unwrap();
    let generated = pipeline.generate_invoice(&ops, 1).await.unwrap();

    let entries = pipeline
        .store()
        .audit_entries(DocumentKind::Invoice, 1)
        .await
        .unwrap();
    let generation = entries
        .iter()
        .find(|e| e.checksum.is_some())
        .expect("generation audit entry");
    assert_eq!(generation.outcome, AuditOutcome::Succeeded);
    assert_eq!(generation.checksum.as_deref(), Some(generated.receipt.checksum.as_str()));
    assert_eq!(generation.template_version.as_deref(), Some("v3"));
}
