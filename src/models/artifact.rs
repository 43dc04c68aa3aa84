use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DocumentKind;

/// Storage key for a persisted artifact: one binary per record and bound
/// template version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub kind: DocumentKind,
    pub record_id: i32,
    pub template_version: String,
}

impl ArtifactKey {
    pub fn new(kind: DocumentKind, record_id: i32, template_version: impl Into<String>) -> Self {
        Self {
            kind,
            record_id,
            template_version: template_version.into(),
        }
    }
}

/// Receipt returned by the distribution broker. The checksum is a pure
/// function of (record snapshot, template version, compiler configuration);
/// auditors compare receipts across regenerations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReceipt {
    /// sha-256 over the binary content, lowercase hex.
    pub checksum: String,
    pub byte_length: u64,
    pub delivered_at: DateTime<Utc>,
}

impl ArtifactReceipt {
    /// Short form used in operator-facing output, like the original
    /// document hashes stamped on letterheads.
    pub fn short_checksum(&self) -> &str {
        &self.checksum[..self.checksum.len().min(16)]
    }
}

/// A persisted, write-once artifact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub key: ArtifactKey,
    pub receipt: ArtifactReceipt,
}
