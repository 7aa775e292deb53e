// In-process stores
use async_trait::async_trait;
use audit_engine::{AuditEntry, InMemoryAuditLog};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{EligibilityCache, OrderSource, PreauthStore, TransitionCommit};
use crate::error::{PreauthError, PreauthResult};
use crate::models::{EligibilityRecord, Order, Patient, PreauthRequest, PreauthStatus};

/// Request table and ledger behind one lock
///
/// Every mutation and the audit entry that describes it happen inside the
/// same critical section, so readers never see one without the other.
#[derive(Clone, Default)]
pub struct InMemoryPreauthStore {
    requests: Arc<Mutex<HashMap<Uuid, PreauthRequest>>>,
    audit: InMemoryAuditLog,
}

impl InMemoryPreauthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle on the ledger, for assertions
    pub fn audit_log(&self) -> InMemoryAuditLog {
        self.audit.clone()
    }

    pub fn all_requests(&self) -> Vec<PreauthRequest> {
        self.requests.lock().values().cloned().collect()
    }

    /// Overwrite a row without any checks; test setup only
    pub fn put(&self, request: PreauthRequest) {
        self.requests.lock().insert(request.id, request);
    }

    fn page<K: Ord>(
        &self,
        limit: u32,
        filter: impl Fn(&PreauthRequest) -> bool,
        sort_key: impl Fn(&PreauthRequest) -> K,
    ) -> Vec<PreauthRequest> {
        let requests = self.requests.lock();
        let mut rows: Vec<PreauthRequest> = requests.values().filter(|row| filter(row)).cloned().collect();
        rows.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)).then(a.created_at.cmp(&b.created_at)));
        rows.truncate(limit as usize);
        rows
    }
}

#[async_trait]
impl PreauthStore for InMemoryPreauthStore {
    async fn create_request(&self, mut request: PreauthRequest, audit: AuditEntry) -> PreauthResult<PreauthRequest> {
        let mut requests = self.requests.lock();
        if requests.values().any(|row| row.order_id == request.order_id) {
            return Err(PreauthError::Conflict(format!(
                "order {} already has a preauth request",
                request.order_id
            )));
        }
        request.version = 1;
        requests.insert(request.id, request.clone());
        self.audit.record(audit);
        Ok(request)
    }

    async fn get(&self, id: Uuid) -> PreauthResult<Option<PreauthRequest>> {
        Ok(self.requests.lock().get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: Uuid) -> PreauthResult<Option<PreauthRequest>> {
        Ok(self
            .requests
            .lock()
            .values()
            .find(|row| row.order_id == order_id)
            .cloned())
    }

    async fn claim_for_submission(
        &self,
        id: Uuid,
        expected: PreauthStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> PreauthResult<Option<PreauthRequest>> {
        let mut requests = self.requests.lock();
        let Some(row) = requests.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != expected || row.is_claimed(now) {
            return Ok(None);
        }
        row.claimed_until = Some(lease_until);
        row.version += 1;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn apply_transition(&self, commit: TransitionCommit) -> PreauthResult<PreauthRequest> {
        let mut requests = self.requests.lock();
        let id = commit.request.id;
        let row = requests
            .get_mut(&id)
            .ok_or_else(|| PreauthError::NotFound(format!("preauth request {}", id)))?;

        if row.status != commit.expected_status || row.version != commit.expected_version {
            return Err(PreauthError::Conflict(format!(
                "request {} is {} v{}, expected {} v{}",
                id, row.status, row.version, commit.expected_status, commit.expected_version
            )));
        }

        let mut next = commit.request;
        next.version = commit.expected_version + 1;
        next.claimed_until = None;
        next.last_status_check_at = next.last_status_check_at.max(row.last_status_check_at);
        *row = next.clone();
        self.audit.record(commit.audit);
        Ok(next)
    }

    async fn release_claim(&self, id: Uuid, expected_version: i64) -> PreauthResult<()> {
        let mut requests = self.requests.lock();
        if let Some(row) = requests.get_mut(&id) {
            if row.version == expected_version {
                row.claimed_until = None;
                row.version += 1;
            }
        }
        Ok(())
    }

    async fn mark_status_checked(&self, id: Uuid, at: DateTime<Utc>) -> PreauthResult<()> {
        if let Some(row) = self.requests.lock().get_mut(&id) {
            row.last_status_check_at = Some(at);
        }
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> PreauthResult<AuditEntry> {
        Ok(self.audit.record(entry))
    }

    async fn audit_trail(&self, id: Uuid) -> PreauthResult<Vec<AuditEntry>> {
        Ok(self.audit.entries_for(id))
    }

    async fn list_due_for_retry(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: u32,
    ) -> PreauthResult<Vec<PreauthRequest>> {
        Ok(self.page(
            limit,
            |row| {
                row.status == PreauthStatus::Pending
                    && row.next_retry_at.map(|at| at <= now).unwrap_or(true)
                    && row.retry_count < max_attempts
                    && !row.is_claimed(now)
            },
            |row| row.next_retry_at,
        ))
    }

    async fn list_for_status_check(&self, since: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>> {
        Ok(self.page(
            limit,
            |row| {
                matches!(row.status, PreauthStatus::Submitted | PreauthStatus::NeedInfo)
                    && row.submitted_at.map(|at| at >= since).unwrap_or(false)
            },
            // `None` sorts first: never-polled requests lead the page
            |row| (row.last_status_check_at, row.submitted_at),
        ))
    }

    async fn list_stale(&self, before: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>> {
        Ok(self.page(
            limit,
            |row| {
                matches!(row.status, PreauthStatus::Submitted | PreauthStatus::NeedInfo)
                    && row.submitted_at.map(|at| at < before).unwrap_or(false)
            },
            |row| row.submitted_at,
        ))
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEligibilityCache {
    records: Arc<RwLock<HashMap<(String, String), EligibilityRecord>>>,
}

impl InMemoryEligibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl EligibilityCache for InMemoryEligibilityCache {
    async fn find(&self, member_id: &str, carrier_name: &str) -> PreauthResult<Option<EligibilityRecord>> {
        Ok(self
            .records
            .read()
            .get(&(member_id.to_string(), carrier_name.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: EligibilityRecord) -> PreauthResult<EligibilityRecord> {
        self.records.write().insert(
            (record.member_id.clone(), record.carrier_name.clone()),
            record.clone(),
        );
        Ok(record)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOrderSource {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    patients: Arc<RwLock<HashMap<Uuid, Patient>>>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.write().insert(order.id, order);
    }

    pub fn insert_patient(&self, patient: Patient) {
        self.patients.write().insert(patient.id, patient);
    }
}

#[async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn get_order(&self, order_id: Uuid) -> PreauthResult<Option<Order>> {
        Ok(self.orders.read().get(&order_id).cloned())
    }

    async fn get_patient(&self, patient_id: Uuid) -> PreauthResult<Option<Patient>> {
        Ok(self.patients.read().get(&patient_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_engine::{Actor, AuditAction};
    use chrono::Duration;

    fn request(order_id: Uuid, status: PreauthStatus) -> PreauthRequest {
        let now = Utc::now();
        PreauthRequest {
            id: Uuid::new_v4(),
            order_id,
            patient_id: Uuid::new_v4(),
            carrier_name: "Acme".to_string(),
            member_id: Some("M100".to_string()),
            group_id: None,
            hcpcs_code: "A6021".to_string(),
            product_name: "Collagen dressing".to_string(),
            quantity: 5,
            primary_diagnosis: Some("L97.412".to_string()),
            secondary_diagnoses: vec![],
            physician_notes: None,
            medical_necessity_letter: "letter".to_string(),
            submission_method: None,
            external_tracking_id: None,
            carrier_response: None,
            retry_count: 0,
            last_retry_at: None,
            next_retry_at: Some(now),
            submitted_at: None,
            last_status_check_at: None,
            status,
            requires_manual_verification: false,
            claimed_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn queued(request: &PreauthRequest) -> AuditEntry {
        AuditEntry::new(request.id, AuditAction::RequestQueued, Actor::system())
    }

    #[tokio::test]
    async fn test_one_request_per_order() {
        let store = InMemoryPreauthStore::new();
        let order_id = Uuid::new_v4();
        let first = request(order_id, PreauthStatus::Pending);
        store.create_request(first.clone(), queued(&first)).await.unwrap();

        let second = request(order_id, PreauthStatus::Pending);
        let err = store.create_request(second.clone(), queued(&second)).await.unwrap_err();
        assert!(matches!(err, PreauthError::Conflict(_)));
        assert_eq!(store.audit_log().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_lease_expires() {
        let store = InMemoryPreauthStore::new();
        let row = request(Uuid::new_v4(), PreauthStatus::Pending);
        let row = store.create_request(row.clone(), queued(&row)).await.unwrap();
        let now = Utc::now();

        let claimed = store
            .claim_for_submission(row.id, PreauthStatus::Pending, now, now + Duration::minutes(10))
            .await
            .unwrap();
        assert!(claimed.is_some());

        let again = store
            .claim_for_submission(row.id, PreauthStatus::Pending, now, now + Duration::minutes(10))
            .await
            .unwrap();
        assert!(again.is_none());

        let later = now + Duration::minutes(11);
        let reclaimed = store
            .claim_for_submission(row.id, PreauthStatus::Pending, later, later + Duration::minutes(10))
            .await
            .unwrap();
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_audit() {
        let store = InMemoryPreauthStore::new();
        let row = request(Uuid::new_v4(), PreauthStatus::Pending);
        let row = store.create_request(row.clone(), queued(&row)).await.unwrap();

        let mut next = row.clone();
        next.status = PreauthStatus::Submitted;
        let commit = TransitionCommit {
            expected_status: PreauthStatus::Pending,
            expected_version: row.version,
            request: next.clone(),
            audit: AuditEntry::new(row.id, AuditAction::Submitted, Actor::system()),
        };
        let stored = store.apply_transition(commit.clone()).await.unwrap();
        assert_eq!(stored.version, row.version + 1);

        let err = store.apply_transition(commit).await.unwrap_err();
        assert!(matches!(err, PreauthError::Conflict(_)));
        assert_eq!(store.audit_log().entries_for(row.id).len(), 2);
    }
}
