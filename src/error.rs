use crate::models::{Action, DocumentKind, Role};

/// Failure taxonomy for the generation pipeline.
///
/// `AuthorizationDenied` and `InvalidState` are expected control flow and are
/// surfaced to the caller as typed denials. `CompilerUnavailable` and
/// `DataUnavailable` are infrastructure faults and the only retryable
/// variants. The remaining variants indicate a data-integrity or template
/// defect and must never be silently retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{role} may not {action}: {reason}")]
    AuthorizationDenied {
        role: Role,
        action: Action,
        reason: String,
    },

    #[error("record {kind} #{id} not found")]
    RecordNotFound { kind: DocumentKind, id: i32 },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("template bundle {kind}/{version} not found")]
    TemplateNotFound {
        kind: DocumentKind,
        version: String,
    },

    #[error("unresolved template placeholder '{placeholder}'")]
    IncompleteModel { placeholder: String },

    #[error("document compiler unavailable: {0}")]
    CompilerUnavailable(String),

    #[error("compilation failed: {0}")]
    CompilationError(String),

    #[error("data store unavailable: {0}")]
    DataUnavailable(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl PipelineError {
    /// Whether the orchestrator may retry the failed operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::CompilerUnavailable(_) | PipelineError::DataUnavailable(_)
        )
    }

    /// Expected denials are logged at info; everything else is an error.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            PipelineError::AuthorizationDenied { .. } | PipelineError::InvalidState(_)
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                PipelineError::DataUnavailable("row not found".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                PipelineError::DataUnavailable("connection pool timed out".to_string())
            }
            other => PipelineError::DataUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_split() {
        assert!(PipelineError::CompilerUnavailable("down".into()).is_retryable());
        assert!(PipelineError::DataUnavailable("timeout".into()).is_retryable());
        assert!(!PipelineError::CompilationError("bad markup".into()).is_retryable());
        assert!(!PipelineError::InvalidState("draft".into()).is_retryable());
        assert!(!PipelineError::TemplateNotFound {
            kind: DocumentKind::Invoice,
            version: "v9".into(),
        }
        .is_retryable());
    }

    #[test]
    fn denials_are_control_flow() {
        assert!(PipelineError::InvalidState("draft".into()).is_denial());
        assert!(!PipelineError::CompilationError("x".into()).is_denial());
    }
}
