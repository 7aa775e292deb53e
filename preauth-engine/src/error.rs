use error_common::{codes, Categorized, ErrorCategory};
use thiserror::Error;

use crate::models::PreauthStatus;

#[derive(Error, Debug)]
pub enum PreauthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: PreauthStatus,
        to: PreauthStatus,
    },

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("No adapter registered: {0}")]
    AdapterMissing(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit error: {0}")]
    Audit(#[from] audit_engine::AuditError),
}

impl Categorized for PreauthError {
    fn category(&self) -> ErrorCategory {
        match self {
            PreauthError::Validation(_)
            | PreauthError::NotFound(_)
            | PreauthError::InvalidTransition { .. } => ErrorCategory::Validation,
            PreauthError::Conflict(_) => ErrorCategory::DataIntegrity,
            PreauthError::Integration(_)
            | PreauthError::AdapterMissing(_)
            | PreauthError::Timeout(_)
            | PreauthError::MalformedResponse(_)
            | PreauthError::Network(_) => ErrorCategory::Integration,
            PreauthError::Configuration(_) => ErrorCategory::Configuration,
            PreauthError::Database(_) | PreauthError::Corrupt(_) | PreauthError::Audit(_) => {
                ErrorCategory::Storage
            }
            PreauthError::Serialization(_) => ErrorCategory::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            PreauthError::Validation(_) => codes::validation::MISSING_REQUIRED_FIELD,
            PreauthError::NotFound(_) => codes::validation::NOT_FOUND,
            PreauthError::InvalidTransition { .. } => codes::validation::INVALID_TRANSITION,
            PreauthError::Conflict(_) => codes::integrity::VERSION_CONFLICT,
            PreauthError::Integration(_) => codes::integration::CHANNEL_FAILED,
            PreauthError::AdapterMissing(_) => codes::integration::ADAPTER_MISSING,
            PreauthError::Timeout(_) => codes::integration::TIMEOUT,
            PreauthError::MalformedResponse(_) => codes::integration::MALFORMED_RESPONSE,
            PreauthError::Network(_) => codes::integration::NETWORK,
            PreauthError::Configuration(_) => codes::configuration::MISSING_SETTING,
            PreauthError::Corrupt(_) => codes::storage::CORRUPT_ROW,
            PreauthError::Database(_) | PreauthError::Audit(_) => codes::storage::QUERY_FAILED,
            PreauthError::Serialization(_) => codes::internal::SERIALIZATION,
        }
    }
}

pub type PreauthResult<T> = Result<T, PreauthError>;
