use thiserror::Error;

use crate::models::validation::ValidationReport;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed input caught before any I/O; carries field-level detail.
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    #[error("permission denied")]
    PermissionDenied,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Transaction retry budget exhausted under concurrent writes.
    #[error("conflict: transaction retries exhausted after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// Underlying transport/event bus unreachable or closed.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may safely retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Conflict { .. } | AppError::TransportUnavailable(_)
        )
    }

    pub fn validation(report: ValidationReport) -> Self {
        AppError::Validation(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validation::ValidationReport;

    #[test]
    fn conflict_and_transport_are_retryable() {
        assert!(AppError::Conflict { attempts: 5 }.is_retryable());
        assert!(AppError::TransportUnavailable("bus closed".into()).is_retryable());
        assert!(!AppError::PermissionDenied.is_retryable());
        assert!(!AppError::NotFound("conversation").is_retryable());
        assert!(!AppError::Validation(ValidationReport::default()).is_retryable());
    }
}
