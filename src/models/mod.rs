mod artifact;
mod audit;
mod client;
mod document;
mod invoice;
mod line_item;
mod role;

pub use artifact::{ArtifactKey, ArtifactReceipt, StoredArtifact};
pub use audit::{AuditEntry, AuditOutcome};
pub use client::Client;
pub use document::{ContentBlock, Document, DocumentKind, DocumentStatus};
pub use invoice::{Invoice, InvoiceStatus};
pub use line_item::LineItem;
pub use role::{Action, Actor, Role};
