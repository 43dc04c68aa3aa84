use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use docpress::compile::FakeCompiler;
use docpress::db::MemoryStore;
use docpress::error::PipelineError;
use docpress::models::{
    Actor, Client, ContentBlock, Document, DocumentStatus, Invoice, InvoiceStatus, LineItem, Role,
};
use docpress::pipeline::{Pipeline, RetryPolicy};

fn client() -> Client {
    Client {
        id: 1,
        name: "Joshi Textiles".to_string(),
        address: Some("7 Mill Lane, Mumbai".to_string()),
        email: "office@joshi.example".to_string(),
        phone: "+91 22 5550 0303".to_string(),
    }
}

fn draft_invoice(id: i32) -> Invoice {
    Invoice {
        id,
        number: None,
        client_id: 1,
        currency: "INR".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        status: InvoiceStatus::Draft,
        template_version: None,
        subtotal: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        total: Decimal::ZERO,
    }
}

fn line(invoice_id: i32) -> LineItem {
    LineItem {
        id: 1,
        invoice_id,
        description: "Quarterly review".to_string(),
        quantity: Decimal::from(1),
        unit_price: Decimal::from(15_000),
        tax_rate: Decimal::new(18, 2),
    }
}

fn draft_document(id: i32) -> Document {
    Document {
        id,
        client_id: 1,
        title: "Engagement Letter".to_string(),
        reference: "ENG/2024/011".to_string(),
        created_on: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        status: DocumentStatus::Draft,
        template_version: None,
        blocks: vec![ContentBlock {
            heading: "Scope".to_string(),
            body: "Audit of FY 2023-24 accounts.".to_string(),
        }],
    }
}

fn pipeline_with(store: MemoryStore) -> Pipeline<MemoryStore> {
    Pipeline::new(store, Arc::new(FakeCompiler)).with_retry(RetryPolicy::none())
}

fn operations() -> Actor {
    Actor::new("asha", Role::Operations)
}

#[tokio::test]
async fn concurrent_issuance_has_a_single_winner() {
    let store = MemoryStore::new();
    store.insert_client(client());
    store.insert_invoice(draft_invoice(1), vec![line(1)]);
    let pipeline = pipeline_with(store);
    let actor = operations();

    let (a, b) = tokio::join!(
        pipeline.issue_invoice(&actor, 1),
        pipeline.issue_invoice(&actor, 1),
    );

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        PipelineError::InvalidState(_)
    ));

    // Exactly one number was consumed.
    let winner = outcomes.iter().find_map(|r| r.as_ref().ok()).unwrap();
    assert_eq!(winner.number.as_deref(), Some("2024-00001"));
}

#[tokio::test]
async fn voided_invoice_keeps_number_and_artifact() {
    let store = MemoryStore::new();
    store.insert_client(client());
    store.insert_invoice(draft_invoice(1), vec![line(1)]);
    store.insert_invoice(draft_invoice(2), vec![line(2)]);
    let pipeline = pipeline_with(store);
    let actor = operations();

    let issued = pipeline.issue_invoice(&actor, 1).await.unwrap();
    let first = pipeline.generate_invoice(&actor, 1).await.unwrap();

    let voided = pipeline.void_invoice(&actor, 1, true).await.unwrap();
    assert_eq!(voided.number, issued.number);

    // Regeneration after voiding returns the original receipt untouched.
    let second = pipeline.generate_invoice(&actor, 1).await.unwrap();
    assert_eq!(first.receipt.checksum, second.receipt.checksum);
    assert_eq!(pipeline.store().artifact_count(), 1);

    // The consumed number is never reissued.
    let next = pipeline.issue_invoice(&actor, 2).await.unwrap();
    assert_eq!(next.number.as_deref(), Some("2024-00002"));
}

#[tokio::test]
async fn void_requires_an_issued_invoice() {
    let store = MemoryStore::new();
    store.insert_client(client());
    store.insert_invoice(draft_invoice(1), vec![line(1)]);
    let pipeline = pipeline_with(store);

    let err = pipeline
        .void_invoice(&operations(), 1, true)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));
}

#[tokio::test]
async fn letterhead_follows_the_same_lifecycle() {
    let store = MemoryStore::new();
    store.insert_client(client());
    store.insert_document(draft_document(1));
    let pipeline = pipeline_with(store);
    let actor = operations();

    // Draft: final generation refused, preview allowed.
    let err = pipeline.generate_letterhead(&actor, 1).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));
    let preview = pipeline.preview_letterhead(&actor, 1).await.unwrap();
    assert!(!preview.is_empty());

    let finalized = pipeline.finalize_document(&actor, 1).await.unwrap();
    assert_eq!(finalized.status, DocumentStatus::Finalized);
    assert_eq!(finalized.template_version.as_deref(), Some("v1"));

    let generated = pipeline.generate_letterhead(&actor, 1).await.unwrap();
    assert_ne!(generated.pdf, preview);

    // Double finalization is refused.
    let err = pipeline.finalize_document(&actor, 1).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));
}
