//! Append-only audit ledger for preauthorization requests
//!
//! The ledger is the sole source of truth for what happened to a request
//! and why. Every status transition the engine applies produces exactly one
//! entry; observations that do not change status (a failed carrier poll, a
//! failed notification) are recorded too, under their own actions.
//!
//! # Entry anatomy
//!
//! - **Key**: `preauth_request_id`, ordered by a monotonically increasing
//!   `sequence`
//! - **Action**: one of [`AuditAction`]
//! - **Actor**: `agent` (scheduled sweeps), `system` (synchronous calls) or
//!   `staff`
//! - **Outcome**: `success`, optional `error_message`, structured `metadata`
//!
//! # Example
//!
//! ```ignore
//! use audit_engine::{Actor, AuditAction, AuditEntry, AuditLog, InMemoryAuditLog};
//!
//! let ledger = InMemoryAuditLog::new();
//! ledger.append(
//!     AuditEntry::new(request_id, AuditAction::Submitted, Actor::agent("retry-sweep"))
//!         .with_transition("pending", "submitted"),
//! ).await?;
//! let trail = ledger.trail(request_id).await?;
//! ```

pub mod entry;
pub mod ledger;
pub mod error;

pub use entry::*;
pub use ledger::*;
pub use error::*;
