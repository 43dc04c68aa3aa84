//! Distribution Broker: checksums, write-once persistence, receipts.
//!
//! Every outbound artifact is hashed before it leaves the pipeline. The
//! store enforces write-once per (kind, record, template version): a second
//! delivery for the same key returns the original receipt untouched.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::RecordStore;
use crate::error::PipelineError;
use crate::models::{ArtifactKey, ArtifactReceipt};

/// SHA-256 of the artifact bytes, lowercase hex.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Persist a final artifact and return its receipt.
///
/// Idempotent: if an artifact already exists under this key, the stored
/// receipt is returned and the new bytes are discarded.
pub async fn deliver<S: RecordStore>(
    store: &S,
    key: &ArtifactKey,
    bytes: &[u8],
) -> Result<ArtifactReceipt, PipelineError> {
    let receipt = ArtifactReceipt {
        checksum: checksum(bytes),
        byte_length: bytes.len() as u64,
        delivered_at: Utc::now(),
    };
    let stored = store.persist_artifact(key, bytes, &receipt).await?;
    info!(
        kind = %key.kind,
        record_id = key.record_id,
        template_version = %key.template_version,
        checksum = %stored.short_checksum(),
        bytes = stored.byte_length,
        "artifact delivered"
    );
    Ok(stored)
}
