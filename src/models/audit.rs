use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, DocumentKind, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Denied,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Succeeded => "succeeded",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(AuditOutcome::Succeeded),
            "denied" => Some(AuditOutcome::Denied),
            "failed" => Some(AuditOutcome::Failed),
            _ => None,
        }
    }
}

/// Append-only audit record. Written for every pipeline outcome, denials
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub actor_role: Role,
    pub action: Action,
    pub kind: DocumentKind,
    pub record_id: i32,
    pub template_version: Option<String>,
    pub checksum: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub outcome: AuditOutcome,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor: &super::Actor,
        action: Action,
        kind: DocumentKind,
        record_id: i32,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            actor: actor.name.clone(),
            actor_role: actor.role,
            action,
            kind,
            record_id,
            template_version: None,
            checksum: None,
            timestamp: Utc::now(),
            outcome,
            detail: None,
        }
    }

    pub fn with_template_version(mut self, version: impl Into<String>) -> Self {
        self.template_version = Some(version.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
