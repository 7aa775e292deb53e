// PostgreSQL stores
use async_trait::async_trait;
use audit_engine::{log_entry, Actor, AuditEntry};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::{EligibilityCache, OrderSource, PreauthStore, TransitionCommit};
use crate::error::{PreauthError, PreauthResult};
use crate::models::{
    EligibilityRecord, Order, Patient, PreauthRequest, PreauthRule, PreauthStatus, SubmissionMethod,
    WoundMeasurements, RULE_WILDCARD,
};
use crate::rules::RuleRepository;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const REQUEST_COLUMNS: &str = "id, order_id, patient_id, carrier_name, member_id, group_id, hcpcs_code, \
    product_name, quantity, primary_diagnosis, secondary_diagnoses, physician_notes, \
    medical_necessity_letter, submission_method, external_tracking_id, carrier_response, retry_count, \
    last_retry_at, next_retry_at, submitted_at, last_status_check_at, status, requires_manual_verification, \
    claimed_until, version, created_at, updated_at";

// ============================================================================
// ROW MAPPING
// ============================================================================

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    order_id: Uuid,
    patient_id: Uuid,
    carrier_name: String,
    member_id: Option<String>,
    group_id: Option<String>,
    hcpcs_code: String,
    product_name: String,
    quantity: i32,
    primary_diagnosis: Option<String>,
    secondary_diagnoses: Vec<String>,
    physician_notes: Option<String>,
    medical_necessity_letter: String,
    submission_method: Option<String>,
    external_tracking_id: Option<String>,
    carrier_response: Option<serde_json::Value>,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    last_status_check_at: Option<DateTime<Utc>>,
    status: String,
    requires_manual_verification: bool,
    claimed_until: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for PreauthRequest {
    type Error = PreauthError;

    fn try_from(row: RequestRow) -> PreauthResult<Self> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            patient_id: row.patient_id,
            carrier_name: row.carrier_name,
            member_id: row.member_id,
            group_id: row.group_id,
            hcpcs_code: row.hcpcs_code,
            product_name: row.product_name,
            quantity: to_u32(row.quantity, "quantity")?,
            primary_diagnosis: row.primary_diagnosis,
            secondary_diagnoses: row.secondary_diagnoses,
            physician_notes: row.physician_notes,
            medical_necessity_letter: row.medical_necessity_letter,
            submission_method: row
                .submission_method
                .as_deref()
                .map(str::parse::<SubmissionMethod>)
                .transpose()?,
            external_tracking_id: row.external_tracking_id,
            carrier_response: row.carrier_response,
            retry_count: to_u32(row.retry_count, "retry_count")?,
            last_retry_at: row.last_retry_at,
            next_retry_at: row.next_retry_at,
            submitted_at: row.submitted_at,
            last_status_check_at: row.last_status_check_at,
            status: row.status.parse()?,
            requires_manual_verification: row.requires_manual_verification,
            claimed_until: row.claimed_until,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    sequence: i64,
    id: Uuid,
    preauth_request_id: Uuid,
    action: String,
    actor_type: String,
    actor_id: Option<String>,
    actor_name: Option<String>,
    success: bool,
    error_message: Option<String>,
    from_status: Option<String>,
    to_status: Option<String>,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = PreauthError;

    fn try_from(row: AuditRow) -> PreauthResult<Self> {
        Ok(Self {
            sequence: row.sequence,
            id: row.id,
            preauth_request_id: row.preauth_request_id,
            action: row.action.parse()?,
            actor: Actor {
                actor_type: row.actor_type.parse()?,
                actor_id: row.actor_id,
                actor_name: row.actor_name,
            },
            success: row.success,
            error_message: row.error_message,
            from_status: row.from_status,
            to_status: row.to_status,
            metadata: row.metadata,
            timestamp: row.timestamp,
        })
    }
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    carrier_name: String,
    hcpcs_code: String,
    requires_preauth: bool,
    quantity_threshold: Option<i32>,
    submission_method: String,
    api_endpoint: Option<String>,
    edi_enabled: bool,
    portal_url: Option<String>,
    fax_number: Option<String>,
    phone_number: Option<String>,
    special_instructions: Option<String>,
    priority: i32,
    active: bool,
}

impl TryFrom<RuleRow> for PreauthRule {
    type Error = PreauthError;

    fn try_from(row: RuleRow) -> PreauthResult<Self> {
        Ok(Self {
            id: row.id,
            carrier_name: row.carrier_name,
            hcpcs_code: row.hcpcs_code,
            requires_preauth: row.requires_preauth,
            quantity_threshold: row
                .quantity_threshold
                .map(|value| to_u32(value, "quantity_threshold"))
                .transpose()?,
            submission_method: row.submission_method.parse()?,
            api_endpoint: row.api_endpoint,
            edi_enabled: row.edi_enabled,
            portal_url: row.portal_url,
            fax_number: row.fax_number,
            phone_number: row.phone_number,
            special_instructions: row.special_instructions,
            priority: row.priority,
            active: row.active,
        })
    }
}

#[derive(Debug, FromRow)]
struct EligibilityRow {
    member_id: String,
    carrier_name: String,
    eligible: bool,
    verification_method: String,
    notes: Option<String>,
    verified_by: Option<String>,
    details: serde_json::Value,
    verified_at: DateTime<Utc>,
}

impl TryFrom<EligibilityRow> for EligibilityRecord {
    type Error = PreauthError;

    fn try_from(row: EligibilityRow) -> PreauthResult<Self> {
        Ok(Self {
            member_id: row.member_id,
            carrier_name: row.carrier_name,
            eligible: row.eligible,
            verification_method: row.verification_method.parse()?,
            notes: row.notes,
            verified_by: row.verified_by,
            details: row.details,
            verified_at: row.verified_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    patient_id: Uuid,
    hcpcs_code: String,
    product_name: String,
    quantity: i32,
    primary_diagnosis: Option<String>,
    secondary_diagnoses: Vec<String>,
    wound_location: Option<String>,
    wound_type: Option<String>,
    wound_length_cm: Option<f64>,
    wound_width_cm: Option<f64>,
    wound_depth_cm: Option<f64>,
    wound_drainage: Option<String>,
    physician_name: Option<String>,
    physician_notes: Option<String>,
    service_date: Option<NaiveDate>,
}

impl TryFrom<OrderRow> for Order {
    type Error = PreauthError;

    fn try_from(row: OrderRow) -> PreauthResult<Self> {
        let wound = WoundMeasurements {
            location: row.wound_location,
            wound_type: row.wound_type,
            length_cm: row.wound_length_cm,
            width_cm: row.wound_width_cm,
            depth_cm: row.wound_depth_cm,
            drainage: row.wound_drainage,
        };
        Ok(Self {
            id: row.id,
            patient_id: row.patient_id,
            hcpcs_code: row.hcpcs_code,
            product_name: row.product_name,
            quantity: to_u32(row.quantity, "quantity")?,
            primary_diagnosis: row.primary_diagnosis,
            secondary_diagnoses: row.secondary_diagnoses,
            wound: (wound != WoundMeasurements::default()).then_some(wound),
            physician_name: row.physician_name,
            physician_notes: row.physician_notes,
            service_date: row.service_date,
        })
    }
}

#[derive(Debug, FromRow)]
struct PatientRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    date_of_birth: Option<NaiveDate>,
    insurance_provider: Option<String>,
    member_id: Option<String>,
    group_id: Option<String>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            insurance_provider: row.insurance_provider,
            member_id: row.member_id,
            group_id: row.group_id,
        }
    }
}

fn to_u32(value: i32, column: &str) -> PreauthResult<u32> {
    u32::try_from(value).map_err(|_| PreauthError::Corrupt(format!("negative {}: {}", column, value)))
}

fn to_i32(value: u32, column: &str) -> PreauthResult<i32> {
    i32::try_from(value).map_err(|_| PreauthError::Validation(format!("{} out of range: {}", column, value)))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_audit(tx: &mut Transaction<'_, Postgres>, entry: &AuditEntry) -> PreauthResult<i64> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO preauth_audit_log (
            id, preauth_request_id, action, actor_type, actor_id, actor_name,
            success, error_message, from_status, to_status, metadata, timestamp
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING sequence
        "#,
    )
    .bind(entry.id)
    .bind(entry.preauth_request_id)
    .bind(entry.action.as_str())
    .bind(entry.actor.actor_type.as_str())
    .bind(&entry.actor.actor_id)
    .bind(&entry.actor.actor_name)
    .bind(entry.success)
    .bind(&entry.error_message)
    .bind(&entry.from_status)
    .bind(&entry.to_status)
    .bind(&entry.metadata)
    .bind(entry.timestamp)
    .fetch_one(&mut **tx)
    .await?;

    Ok(sequence)
}

// ============================================================================
// PREAUTH REQUESTS
// ============================================================================

#[derive(Clone)]
pub struct PgPreauthStore {
    pool: PgPool,
}

impl PgPreauthStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_page(
        &self,
        filter: &str,
        order_by: &str,
        cutoff: DateTime<Utc>,
        extra: Option<i32>,
        limit: u32,
    ) -> PreauthResult<Vec<PreauthRequest>> {
        let sql = format!(
            "SELECT {} FROM preauth_requests WHERE {} ORDER BY {} LIMIT {}",
            REQUEST_COLUMNS,
            filter,
            order_by,
            limit
        );
        let mut query = sqlx::query_as::<_, RequestRow>(&sql).bind(cutoff);
        if let Some(value) = extra {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(PreauthRequest::try_from)
            .collect()
    }
}

#[async_trait]
impl PreauthStore for PgPreauthStore {
    async fn create_request(&self, mut request: PreauthRequest, audit: AuditEntry) -> PreauthResult<PreauthRequest> {
        request.version = 1;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO preauth_requests (
                id, order_id, patient_id, carrier_name, member_id, group_id, hcpcs_code,
                product_name, quantity, primary_diagnosis, secondary_diagnoses, physician_notes,
                medical_necessity_letter, submission_method, external_tracking_id, carrier_response,
                retry_count, last_retry_at, next_retry_at, submitted_at, last_status_check_at, status,
                requires_manual_verification, claimed_until, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#,
        )
        .bind(request.id)
        .bind(request.order_id)
        .bind(request.patient_id)
        .bind(&request.carrier_name)
        .bind(&request.member_id)
        .bind(&request.group_id)
        .bind(&request.hcpcs_code)
        .bind(&request.product_name)
        .bind(to_i32(request.quantity, "quantity")?)
        .bind(&request.primary_diagnosis)
        .bind(&request.secondary_diagnoses)
        .bind(&request.physician_notes)
        .bind(&request.medical_necessity_letter)
        .bind(request.submission_method.map(|method| method.as_str()))
        .bind(&request.external_tracking_id)
        .bind(&request.carrier_response)
        .bind(to_i32(request.retry_count, "retry_count")?)
        .bind(request.last_retry_at)
        .bind(request.next_retry_at)
        .bind(request.submitted_at)
        .bind(request.last_status_check_at)
        .bind(request.status.as_str())
        .bind(request.requires_manual_verification)
        .bind(request.claimed_until)
        .bind(request.version)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            if is_unique_violation(&error) {
                return Err(PreauthError::Conflict(format!(
                    "order {} already has a preauth request",
                    request.order_id
                )));
            }
            return Err(error.into());
        }

        let mut audit = audit;
        audit.sequence = insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        log_entry(&audit);

        Ok(request)
    }

    async fn get(&self, id: Uuid) -> PreauthResult<Option<PreauthRequest>> {
        let sql = format!("SELECT {} FROM preauth_requests WHERE id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(PreauthRequest::try_from)
            .transpose()
    }

    async fn find_by_order(&self, order_id: Uuid) -> PreauthResult<Option<PreauthRequest>> {
        let sql = format!("SELECT {} FROM preauth_requests WHERE order_id = $1", REQUEST_COLUMNS);
        sqlx::query_as::<_, RequestRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(PreauthRequest::try_from)
            .transpose()
    }

    async fn claim_for_submission(
        &self,
        id: Uuid,
        expected: PreauthStatus,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> PreauthResult<Option<PreauthRequest>> {
        let sql = format!(
            r#"
            UPDATE preauth_requests
            SET claimed_until = $3, version = version + 1, updated_at = $4
            WHERE id = $1
              AND status = $2
              AND (claimed_until IS NULL OR claimed_until <= $4)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let claimed = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(lease_until)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .map(PreauthRequest::try_from)
            .transpose()?;

        debug!(request_id = %id, claimed = claimed.is_some(), "Submission claim attempted");
        Ok(claimed)
    }

    async fn apply_transition(&self, commit: TransitionCommit) -> PreauthResult<PreauthRequest> {
        let TransitionCommit {
            expected_status,
            expected_version,
            request,
            mut audit,
        } = commit;

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE preauth_requests
            SET status = $4,
                medical_necessity_letter = $5,
                submission_method = $6,
                external_tracking_id = $7,
                carrier_response = $8,
                retry_count = $9,
                last_retry_at = $10,
                next_retry_at = $11,
                submitted_at = $12,
                requires_manual_verification = $13,
                physician_notes = $14,
                updated_at = $15,
                claimed_until = NULL,
                version = version + 1
            WHERE id = $1 AND status = $2 AND version = $3
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );

        let updated = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(request.id)
            .bind(expected_status.as_str())
            .bind(expected_version)
            .bind(request.status.as_str())
            .bind(&request.medical_necessity_letter)
            .bind(request.submission_method.map(|method| method.as_str()))
            .bind(&request.external_tracking_id)
            .bind(&request.carrier_response)
            .bind(to_i32(request.retry_count, "retry_count")?)
            .bind(request.last_retry_at)
            .bind(request.next_retry_at)
            .bind(request.submitted_at)
            .bind(request.requires_manual_verification)
            .bind(&request.physician_notes)
            .bind(request.updated_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            return Err(PreauthError::Conflict(format!(
                "request {} is no longer {} v{}",
                request.id, expected_status, expected_version
            )));
        };

        audit.sequence = insert_audit(&mut tx, &audit).await?;
        tx.commit().await?;
        log_entry(&audit);

        PreauthRequest::try_from(row)
    }

    async fn release_claim(&self, id: Uuid, expected_version: i64) -> PreauthResult<()> {
        sqlx::query(
            r#"
            UPDATE preauth_requests
            SET claimed_until = NULL, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_status_checked(&self, id: Uuid, at: DateTime<Utc>) -> PreauthResult<()> {
        sqlx::query("UPDATE preauth_requests SET last_status_check_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_audit(&self, mut entry: AuditEntry) -> PreauthResult<AuditEntry> {
        let mut tx = self.pool.begin().await?;
        entry.sequence = insert_audit(&mut tx, &entry).await?;
        tx.commit().await?;
        log_entry(&entry);
        Ok(entry)
    }

    async fn audit_trail(&self, id: Uuid) -> PreauthResult<Vec<AuditEntry>> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT sequence, id, preauth_request_id, action, actor_type, actor_id, actor_name,
                   success, error_message, from_status, to_status, metadata, timestamp
            FROM preauth_audit_log
            WHERE preauth_request_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AuditEntry::try_from)
        .collect()
    }

    async fn list_due_for_retry(
        &self,
        now: DateTime<Utc>,
        max_attempts: u32,
        limit: u32,
    ) -> PreauthResult<Vec<PreauthRequest>> {
        self.fetch_page(
            "status = 'pending' \
             AND (next_retry_at IS NULL OR next_retry_at <= $1) \
             AND retry_count < $2 \
             AND (claimed_until IS NULL OR claimed_until <= $1)",
            "next_retry_at NULLS FIRST, created_at",
            now,
            Some(to_i32(max_attempts, "max_attempts")?),
            limit,
        )
        .await
    }

    async fn list_for_status_check(&self, since: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>> {
        self.fetch_page(
            "status IN ('submitted', 'need_info') AND submitted_at >= $1",
            "last_status_check_at NULLS FIRST, submitted_at, created_at",
            since,
            None,
            limit,
        )
        .await
    }

    async fn list_stale(&self, before: DateTime<Utc>, limit: u32) -> PreauthResult<Vec<PreauthRequest>> {
        self.fetch_page(
            "status IN ('submitted', 'need_info') AND submitted_at < $1",
            "submitted_at, created_at",
            before,
            None,
            limit,
        )
        .await
    }
}

// ============================================================================
// ELIGIBILITY CACHE
// ============================================================================

#[derive(Clone)]
pub struct PgEligibilityCache {
    pool: PgPool,
}

impl PgEligibilityCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EligibilityCache for PgEligibilityCache {
    async fn find(&self, member_id: &str, carrier_name: &str) -> PreauthResult<Option<EligibilityRecord>> {
        sqlx::query_as::<_, EligibilityRow>(
            r#"
            SELECT member_id, carrier_name, eligible, verification_method, notes,
                   verified_by, details, verified_at
            FROM eligibility_records
            WHERE member_id = $1 AND carrier_name = $2
            "#,
        )
        .bind(member_id)
        .bind(carrier_name)
        .fetch_optional(&self.pool)
        .await?
        .map(EligibilityRecord::try_from)
        .transpose()
    }

    async fn upsert(&self, record: EligibilityRecord) -> PreauthResult<EligibilityRecord> {
        let row = sqlx::query_as::<_, EligibilityRow>(
            r#"
            INSERT INTO eligibility_records (
                member_id, carrier_name, eligible, verification_method, notes,
                verified_by, details, verified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (member_id, carrier_name) DO UPDATE
            SET eligible = EXCLUDED.eligible,
                verification_method = EXCLUDED.verification_method,
                notes = EXCLUDED.notes,
                verified_by = EXCLUDED.verified_by,
                details = EXCLUDED.details,
                verified_at = EXCLUDED.verified_at
            RETURNING member_id, carrier_name, eligible, verification_method, notes,
                      verified_by, details, verified_at
            "#,
        )
        .bind(&record.member_id)
        .bind(&record.carrier_name)
        .bind(record.eligible)
        .bind(record.verification_method.as_str())
        .bind(&record.notes)
        .bind(&record.verified_by)
        .bind(&record.details)
        .bind(record.verified_at)
        .fetch_one(&self.pool)
        .await?;

        EligibilityRecord::try_from(row)
    }
}

// ============================================================================
// RULES
// ============================================================================

#[derive(Clone)]
pub struct PgRuleRepository {
    pool: PgPool,
}

impl PgRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    async fn rules_for_carrier(&self, carrier_name: &str) -> PreauthResult<Vec<PreauthRule>> {
        sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT id, carrier_name, hcpcs_code, requires_preauth, quantity_threshold,
                   submission_method, api_endpoint, edi_enabled, portal_url, fax_number,
                   phone_number, special_instructions, priority, active
            FROM preauth_rules
            WHERE active AND (lower(carrier_name) = lower($1) OR carrier_name = $2)
            "#,
        )
        .bind(carrier_name.trim())
        .bind(RULE_WILDCARD)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PreauthRule::try_from)
        .collect()
    }
}

// ============================================================================
// ORDERS / PATIENTS
// ============================================================================

#[derive(Clone)]
pub struct PgOrderSource {
    pool: PgPool,
}

impl PgOrderSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderSource for PgOrderSource {
    async fn get_order(&self, order_id: Uuid) -> PreauthResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, patient_id, hcpcs_code, product_name, quantity, primary_diagnosis,
                   secondary_diagnoses, wound_location, wound_type, wound_length_cm,
                   wound_width_cm, wound_depth_cm, wound_drainage, physician_name,
                   physician_notes, service_date
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    async fn get_patient(&self, patient_id: Uuid) -> PreauthResult<Option<Patient>> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"
            SELECT id, first_name, last_name, date_of_birth, insurance_provider, member_id, group_id
            FROM patients
            WHERE id = $1
            "#,
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Patient::from))
    }
}
