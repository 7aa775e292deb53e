//! Logging with PHI redaction for the preauthorization engine
//!
//! Preauth requests carry member identifiers, dates of birth and diagnosis
//! codes. None of that may appear in clear text in operational logs. This
//! crate provides:
//!
//! - **Subscriber setup**: [`init_tracing`] installs an `EnvFilter` plus a
//!   human-readable or JSON formatter.
//! - **Free-text redaction**: [`PiiRedactor`] scrubs dates, phone and fax
//!   numbers, SSNs and emails from carrier messages before they are logged.
//! - **Identifier masking**: [`mask_identifier`] keeps only the last four
//!   characters of a member id.
//! - **Metadata redaction**: [`redact_metadata`] blanks sensitive keys in JSON
//!   headed for the audit log.
//!
//! # Example
//!
//! ```ignore
//! use logger_redacted::{mask_identifier, PiiRedactor};
//!
//! tracing::warn!(
//!     member = %mask_identifier(&request.member_id),
//!     error = %PiiRedactor::default().redact(&message),
//!     "Carrier rejected submission"
//! );
//! ```

pub mod config;
pub mod redactor;
pub mod subscriber;

pub use config::*;
pub use redactor::*;
pub use subscriber::*;
