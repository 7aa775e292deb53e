// Audit entry types and structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AuditError;

/// Who performed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    /// Automated engine component acting on its own schedule
    Agent,
    /// Engine acting synchronously on behalf of an inbound call
    System,
    /// Human staff member
    Staff,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Agent => "agent",
            ActorType::System => "system",
            ActorType::Staff => "staff",
        }
    }
}

impl FromStr for ActorType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(ActorType::Agent),
            "system" => Ok(ActorType::System),
            "staff" => Ok(ActorType::Staff),
            other => Err(AuditError::UnknownActorType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
}

impl Actor {
    pub fn system() -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: None,
            actor_name: Some("preauth-engine".to_string()),
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Agent,
            actor_id: None,
            actor_name: Some(name.into()),
        }
    }

    pub fn staff(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            actor_type: ActorType::Staff,
            actor_id: Some(id.into()),
            actor_name: name,
        }
    }
}

/// Every action the engine records against a preauth request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PreauthNotRequired,
    EligibilityFailed,
    RequestQueued,
    Submitted,
    RetryScheduled,
    EscalatedToManual,
    Approved,
    Denied,
    NeedInfo,
    SupplementalInfoSubmitted,
    Expired,
    EligibilityReverified,
    StatusCheckFailed,
    NotificationFailed,
    /// A channel answered after the submission lease had passed to another
    /// invocation; the result is kept here instead of on the request
    SubmissionSuperseded,
}

impl AuditAction {
    pub const ALL: [AuditAction; 15] = [
        AuditAction::PreauthNotRequired,
        AuditAction::EligibilityFailed,
        AuditAction::RequestQueued,
        AuditAction::Submitted,
        AuditAction::RetryScheduled,
        AuditAction::EscalatedToManual,
        AuditAction::Approved,
        AuditAction::Denied,
        AuditAction::NeedInfo,
        AuditAction::SupplementalInfoSubmitted,
        AuditAction::Expired,
        AuditAction::EligibilityReverified,
        AuditAction::StatusCheckFailed,
        AuditAction::NotificationFailed,
        AuditAction::SubmissionSuperseded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PreauthNotRequired => "preauth_not_required",
            AuditAction::EligibilityFailed => "eligibility_failed",
            AuditAction::RequestQueued => "request_queued",
            AuditAction::Submitted => "submitted",
            AuditAction::RetryScheduled => "retry_scheduled",
            AuditAction::EscalatedToManual => "escalated_to_manual",
            AuditAction::Approved => "approved",
            AuditAction::Denied => "denied",
            AuditAction::NeedInfo => "need_info",
            AuditAction::SupplementalInfoSubmitted => "supplemental_info_submitted",
            AuditAction::Expired => "expired",
            AuditAction::EligibilityReverified => "eligibility_reverified",
            AuditAction::StatusCheckFailed => "status_check_failed",
            AuditAction::NotificationFailed => "notification_failed",
            AuditAction::SubmissionSuperseded => "submission_superseded",
        }
    }

    /// Whether this action records a status transition (as opposed to an
    /// observation such as a failed poll or a failed notification)
    pub fn is_transition(&self) -> bool {
        !matches!(
            self,
            AuditAction::StatusCheckFailed | AuditAction::NotificationFailed | AuditAction::SubmissionSuperseded
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AuditError::UnknownAction(s.to_string()))
    }
}

/// One immutable ledger line
///
/// `sequence` is assigned by the ledger on append and is the ordering key;
/// entries built in memory carry `0` until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: i64,
    pub id: Uuid,
    pub preauth_request_id: Uuid,
    pub action: AuditAction,
    pub actor: Actor,
    pub success: bool,
    pub error_message: Option<String>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(preauth_request_id: Uuid, action: AuditAction, actor: Actor) -> Self {
        Self {
            sequence: 0,
            id: Uuid::new_v4(),
            preauth_request_id,
            action,
            actor,
            success: true,
            error_message: None,
            from_status: None,
            to_status: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_status = Some(from.into());
        self.to_status = Some(to.into());
        self
    }

    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("bogus".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_observations_are_not_transitions() {
        assert!(AuditAction::Submitted.is_transition());
        assert!(!AuditAction::NotificationFailed.is_transition());
        assert!(!AuditAction::StatusCheckFailed.is_transition());
        assert!(!AuditAction::SubmissionSuperseded.is_transition());
    }

    #[test]
    fn test_builder_marks_failure() {
        let entry = AuditEntry::new(Uuid::new_v4(), AuditAction::RetryScheduled, Actor::agent("retry-sweep"))
            .with_transition("pending", "pending")
            .failed("clearinghouse unreachable");

        assert!(!entry.success);
        assert_eq!(entry.error_message.as_deref(), Some("clearinghouse unreachable"));
        assert_eq!(entry.to_status.as_deref(), Some("pending"));
        assert_eq!(entry.actor.actor_type, ActorType::Agent);
    }
}
