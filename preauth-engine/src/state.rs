//! Preauth lifecycle state machine
//!
//! ```text
//!            ┌──────────────► not_required
//!            │
//! created ───┼──────────────► eligibility_failed ──(staff re-verify)──┐
//!            │                                                        │
//!            └──► pending ◄───────────────────────────────────────────┘
//!                  │  ▲ (retry_count < max)
//!                  │  └──┘
//!                  ├──► manual_required   (retry_count >= max)
//!                  └──► submitted ──► approved | denied
//!                          │  ▲
//!                          ▼  │
//!                       need_info
//!              submitted | need_info ──► expired
//! ```
//!
//! Every allowed edge maps to exactly one audit action. Nothing outside this
//! table can be persisted.

use audit_engine::AuditAction;

use crate::error::{PreauthError, PreauthResult};
use crate::models::PreauthStatus;

/// Audit action recorded for a transition, or an error if the edge is not allowed
pub fn transition_action(from: PreauthStatus, to: PreauthStatus) -> PreauthResult<AuditAction> {
    use PreauthStatus::*;

    let action = match (from, to) {
        (Created, NotRequired) => AuditAction::PreauthNotRequired,
        (Created, EligibilityFailed) => AuditAction::EligibilityFailed,
        (Created, Pending) => AuditAction::RequestQueued,
        (EligibilityFailed, Pending) => AuditAction::EligibilityReverified,
        (Pending, Submitted) => AuditAction::Submitted,
        (Pending, Pending) => AuditAction::RetryScheduled,
        (Pending, ManualRequired) => AuditAction::EscalatedToManual,
        (Submitted, Approved) => AuditAction::Approved,
        (Submitted, Denied) => AuditAction::Denied,
        (Submitted, NeedInfo) => AuditAction::NeedInfo,
        (NeedInfo, Submitted) => AuditAction::SupplementalInfoSubmitted,
        (Submitted, Expired) | (NeedInfo, Expired) => AuditAction::Expired,
        (from, to) => return Err(PreauthError::InvalidTransition { from, to }),
    };

    Ok(action)
}

impl PreauthStatus {
    pub fn can_transition_to(self, next: PreauthStatus) -> bool {
        transition_action(self, next).is_ok()
    }
}
