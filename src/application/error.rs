use thiserror::Error;

use crate::infra::error::InfraError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("identifier `{identifier}` could not be resolved: {reason}")]
    Unresolved { identifier: String, reason: String },
    #[error("purge of `{path}` failed on {failed} of {total} targets")]
    PurgeIncomplete {
        path: String,
        failed: usize,
        total: usize,
    },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn unresolved(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unresolved {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}
