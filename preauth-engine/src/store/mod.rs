// Persistence seams
//
// The orchestrator only talks to these traits. `memory` backs tests and
// single-process runs; `postgres` is the production store.
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PreauthResult;
use crate::models::{EligibilityRecord, Order, Patient, PreauthRequest, PreauthStatus};

pub use memory::{InMemoryEligibilityCache, InMemoryOrderSource, InMemoryPreauthStore};
pub use postgres::{PgEligibilityCache, PgOrderSource, PgPreauthStore, PgRuleRepository, MIGRATOR};

/// One guarded state change plus its ledger line
///
/// The store persists `request` and `audit` together only if the stored row
/// still has `expected_status` and `expected_version`; otherwise nothing is
/// written and the call fails with `PreauthError::Conflict`. A successful
/// commit bumps the version and releases any submission claim.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub expected_status: PreauthStatus,
    pub expected_version: i64,
    pub request: PreauthRequest,
    pub audit: AuditEntry,
}

#[async_trait]
pub trait PreauthStore: Send + Sync {
    /// Insert a freshly evaluated request with its first audit entry.
    /// Fails with `Conflict` if the order already has a request.
    async fn create_request(&self, request: PreauthRequest, audit: AuditEntry) -> PreauthResult<PreauthRequest>;

    async fn get(&self, id: Uuid) -> PreauthResult<Option<PreauthRequest>>;

    async fn find_by_order(&self, order_id: Uuid) -> PreauthResult<Option<PreauthRequest>>;

    /// Atomically take the submission lease on a request that is in
    /// `expected` status and not already claimed. `None` means another
    /// invocation owns it or it moved on.
    async fn claim_for_submission(
        &self,
        id: Uuid,
        expected: PreauthStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> PreauthResult<Option<PreauthRequest>>;

    async fn apply_transition(&self, commit: TransitionCommit) -> PreauthResult<PreauthRequest>;

    /// Drop a submission claim without changing status; no-op on version mismatch
    async fn release_claim(&self, id: Uuid, expected_version: i64) -> PreauthResult<()>;

    /// Stamp a carrier poll; leaves status, version and the ledger alone
    async fn mark_status_checked(&self, id: Uuid, at: DateTime<Utc>) -> PreauthResult<()>;

    /// Ledger lines that do not change status
    async fn append_audit(&self, entry: AuditEntry) -> PreauthResult<AuditEntry>;

    async fn audit_trail(&self, id: Uuid) -> PreauthResult<Vec<AuditEntry>>;

    /// Pending, due, under the attempt cap and unclaimed; oldest due first
    async fn list_due_for_retry(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: u32,
    ) -> PreauthResult<Vec<PreauthRequest>>;

    /// Submitted or need_info, submitted at or after `since`; least
    /// recently polled first so a full page of unchanging requests cannot
    /// starve the rest
    async fn list_for_status_check(&self, since: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>>;

    /// Submitted or need_info, submitted before `before`
    async fn list_stale(&self, before: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>>;
}

/// Eligibility verdicts keyed by (member_id, carrier_name)
#[async_trait]
pub trait EligibilityCache: Send + Sync {
    async fn find(&self, member_id: &str, carrier_name: &str) -> PreauthResult<Option<EligibilityRecord>>;

    /// Insert or replace the verdict for the record's key
    async fn upsert(&self, record: EligibilityRecord) -> PreauthResult<EligibilityRecord>;
}

/// Read access to the order/patient system of record
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn get_order(&self, order_id: Uuid) -> PreauthResult<Option<Order>>;

    async fn get_patient(&self, patient_id: Uuid) -> PreauthResult<Option<Patient>>;
}
