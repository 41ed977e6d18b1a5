//! Shared error taxonomy.
//!
//! Validation and invariant errors are surfaced to the caller and never
//! retried; conflicts and transient storage failures are retried by the
//! orchestrators with bounded backoff.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("duplicate identifier {id_type}:{value}")]
    DuplicateIdentifier { id_type: String, value: String },

    #[error("concurrency conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("contract breach: {0}")]
    Contract(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// Whether an orchestrator may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Storage(_))
    }

    /// Stable machine-readable kind for API error envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::Invariant(_) => "INVARIANT_VIOLATION",
            Self::DuplicateIdentifier { .. } => "DUPLICATE_IDENTIFIER",
            Self::Conflict(_) => "CONCURRENCY_CONFLICT",
            Self::Storage(_) => "STORAGE",
            Self::Contract(_) => "CONTRACT",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(CoreError::Conflict("cas".into()).is_retryable());
        assert!(CoreError::Storage("io".into()).is_retryable());
        assert!(!CoreError::Validation("bad".into()).is_retryable());
        assert!(!CoreError::DuplicateIdentifier {
            id_type: "PERSONNUMMER".into(),
            value: "x".into()
        }
        .is_retryable());
    }
}
