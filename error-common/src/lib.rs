//! Common error handling utilities for the preauthorization engine
//!
//! Every crate in the workspace owns its own `thiserror` enum. This crate
//! holds what they share: the failure taxonomy, stable error codes, and a
//! context builder that turns an error into audit metadata.
//!
//! # Error Categories
//!
//! - **Validation**: missing identifiers, unknown orders. Fail fast, no retry.
//! - **Integration**: carrier, clearinghouse, fax or text-generation failures.
//!   Retried up to the configured maximum, then escalated to staff.
//! - **Policy**: not required, not eligible. Terminal by design.
//! - **DataIntegrity**: optimistic-check mismatch during a sweep. Skipped.
//!
//! # Example
//!
//! ```ignore
//! use error_common::{Categorized, ErrorContext};
//!
//! let metadata = ErrorContext::from_error(&err)
//!     .with_request_id(request.id)
//!     .with_carrier(&request.carrier_name)
//!     .to_metadata();
//! ```

pub mod types;
pub mod context;
pub mod codes;

pub use types::*;
pub use context::*;
