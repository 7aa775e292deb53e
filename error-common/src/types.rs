use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a failure
///
/// Every error raised by the engine falls into exactly one category. The
/// category decides whether a request is retried, escalated to staff, or
/// left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or malformed identifiers. Fails fast, never retried.
    Validation,
    /// Carrier, clearinghouse, fax gateway or text-generation failures.
    Integration,
    /// Terminal business outcomes such as "not eligible".
    Policy,
    /// Optimistic-check mismatch; the caller skips the record.
    DataIntegrity,
    /// Missing credentials, endpoints or invalid settings.
    Configuration,
    /// Persistence layer failures.
    Storage,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Integration => "integration",
            ErrorCategory::Policy => "policy",
            ErrorCategory::DataIntegrity => "data_integrity",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Whether another attempt later could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Integration | ErrorCategory::Storage)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by crate-level error enums so callers can classify an error
/// without matching on its variants.
pub trait Categorized: std::error::Error {
    fn category(&self) -> ErrorCategory;

    /// Stable code from [`crate::codes`]
    fn code(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_categories_are_retryable() {
        assert!(ErrorCategory::Integration.is_retryable());
        assert!(ErrorCategory::Storage.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Policy.is_retryable());
        assert!(!ErrorCategory::DataIntegrity.is_retryable());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::DataIntegrity).unwrap();
        assert_eq!(json, "\"data_integrity\"");
        assert_eq!(ErrorCategory::DataIntegrity.to_string(), "data_integrity");
    }
}
