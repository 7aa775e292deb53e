use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PreauthError;

// ============================================================================
// ORDER / PATIENT (read-only inputs from the order store)
// ============================================================================

/// Wound assessment attached to a dressing order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WoundMeasurements {
    pub location: Option<String>,
    pub wound_type: Option<String>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub depth_cm: Option<f64>,
    pub drainage: Option<String>,
}

impl WoundMeasurements {
    /// "4.0 x 3.5 x 0.5 cm", or whichever dimensions are known
    pub fn dimensions(&self) -> Option<String> {
        let parts: Vec<String> = [self.length_cm, self.width_cm, self.depth_cm]
            .iter()
            .flatten()
            .map(|value| format!("{:.1}", value))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(format!("{} cm", parts.join(" x ")))
        }
    }
}

/// Physician order for durable medical equipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub hcpcs_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub primary_diagnosis: Option<String>,
    pub secondary_diagnoses: Vec<String>,
    pub wound: Option<WoundMeasurements>,
    pub physician_name: Option<String>,
    pub physician_notes: Option<String>,
    pub service_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub insurance_provider: Option<String>,
    pub member_id: Option<String>,
    pub group_id: Option<String>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Age in whole years on the given date
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = on.year() - dob.year();
        if (on.month(), on.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

// ============================================================================
// STATUS & METHOD
// ============================================================================

/// Lifecycle status of a preauth request
///
/// See [`crate::state`] for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreauthStatus {
    Created,
    NotRequired,
    EligibilityFailed,
    Pending,
    Submitted,
    Approved,
    Denied,
    NeedInfo,
    ManualRequired,
    Expired,
}

impl PreauthStatus {
    pub const ALL: [PreauthStatus; 10] = [
        PreauthStatus::Created,
        PreauthStatus::NotRequired,
        PreauthStatus::EligibilityFailed,
        PreauthStatus::Pending,
        PreauthStatus::Submitted,
        PreauthStatus::Approved,
        PreauthStatus::Denied,
        PreauthStatus::NeedInfo,
        PreauthStatus::ManualRequired,
        PreauthStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreauthStatus::Created => "created",
            PreauthStatus::NotRequired => "not_required",
            PreauthStatus::EligibilityFailed => "eligibility_failed",
            PreauthStatus::Pending => "pending",
            PreauthStatus::Submitted => "submitted",
            PreauthStatus::Approved => "approved",
            PreauthStatus::Denied => "denied",
            PreauthStatus::NeedInfo => "need_info",
            PreauthStatus::ManualRequired => "manual_required",
            PreauthStatus::Expired => "expired",
        }
    }

    /// Terminal from the engine's perspective; staff may still act
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PreauthStatus::NotRequired
                | PreauthStatus::EligibilityFailed
                | PreauthStatus::Approved
                | PreauthStatus::Denied
                | PreauthStatus::ManualRequired
                | PreauthStatus::Expired
        )
    }
}

impl fmt::Display for PreauthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreauthStatus {
    type Err = PreauthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreauthStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PreauthError::Corrupt(format!("unknown preauth status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMethod {
    Api,
    Edi,
    Portal,
    Fax,
    Manual,
}

impl SubmissionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionMethod::Api => "api",
            SubmissionMethod::Edi => "edi",
            SubmissionMethod::Portal => "portal",
            SubmissionMethod::Fax => "fax",
            SubmissionMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for SubmissionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionMethod {
    type Err = PreauthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(SubmissionMethod::Api),
            "edi" => Ok(SubmissionMethod::Edi),
            "portal" => Ok(SubmissionMethod::Portal),
            "fax" => Ok(SubmissionMethod::Fax),
            "manual" => Ok(SubmissionMethod::Manual),
            other => Err(PreauthError::Configuration(format!(
                "unknown submission method '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// Wildcard accepted in `carrier_name` or `hcpcs_code`
pub const RULE_WILDCARD: &str = "*";

/// Carrier + HCPCS requirement rule with channel routing data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreauthRule {
    pub id: Uuid,
    pub carrier_name: String,
    pub hcpcs_code: String,
    pub requires_preauth: bool,
    /// Quantities above this escalate a not-required product to required
    pub quantity_threshold: Option<u32>,
    pub submission_method: SubmissionMethod,
    pub api_endpoint: Option<String>,
    pub edi_enabled: bool,
    pub portal_url: Option<String>,
    pub fax_number: Option<String>,
    pub phone_number: Option<String>,
    pub special_instructions: Option<String>,
    /// Higher wins
    pub priority: i32,
    pub active: bool,
}

impl PreauthRule {
    pub fn new(
        carrier_name: impl Into<String>,
        hcpcs_code: impl Into<String>,
        requires_preauth: bool,
        submission_method: SubmissionMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            carrier_name: carrier_name.into(),
            hcpcs_code: hcpcs_code.into(),
            requires_preauth,
            quantity_threshold: None,
            submission_method,
            api_endpoint: None,
            edi_enabled: false,
            portal_url: None,
            fax_number: None,
            phone_number: None,
            special_instructions: None,
            priority: 0,
            active: true,
        }
    }

    /// Stand-in routing rule for a carrier/code pair nothing matched
    pub fn fallback(carrier_name: &str, hcpcs_code: &str, method: SubmissionMethod) -> Self {
        Self {
            priority: i32::MIN,
            special_instructions: Some(
                "No carrier rule on file; confirm requirements with the carrier before submitting."
                    .to_string(),
            ),
            ..Self::new(carrier_name, hcpcs_code, true, method)
        }
    }

    pub fn matches(&self, carrier_name: &str, hcpcs_code: &str) -> bool {
        let carrier_ok = self.carrier_name == RULE_WILDCARD
            || self.carrier_name.trim().eq_ignore_ascii_case(carrier_name.trim());
        let code_ok = self.hcpcs_code == RULE_WILDCARD
            || self.hcpcs_code.trim().eq_ignore_ascii_case(hcpcs_code.trim());
        carrier_ok && code_ok
    }

    /// 2 = exact carrier and code, 0 = both wildcards
    pub fn specificity(&self) -> u8 {
        u8::from(self.carrier_name != RULE_WILDCARD) + u8::from(self.hcpcs_code != RULE_WILDCARD)
    }
}

// ============================================================================
// ELIGIBILITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Cache,
    RealTime,
    Manual,
    Assumed,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Cache => "cache",
            VerificationMethod::RealTime => "real_time",
            VerificationMethod::Manual => "manual",
            VerificationMethod::Assumed => "assumed",
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = PreauthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(VerificationMethod::Cache),
            "real_time" => Ok(VerificationMethod::RealTime),
            "manual" => Ok(VerificationMethod::Manual),
            "assumed" => Ok(VerificationMethod::Assumed),
            other => Err(PreauthError::Corrupt(format!(
                "unknown verification method '{}'",
                other
            ))),
        }
    }
}

/// Cached eligibility verdict for one (member_id, carrier_name) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityRecord {
    pub member_id: String,
    pub carrier_name: String,
    pub eligible: bool,
    pub verification_method: VerificationMethod,
    pub notes: Option<String>,
    pub verified_by: Option<String>,
    pub details: serde_json::Value,
    pub verified_at: DateTime<Utc>,
}

// ============================================================================
// PREAUTH REQUEST
// ============================================================================

/// The central entity; never physically deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreauthRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub patient_id: Uuid,
    pub carrier_name: String,
    pub member_id: Option<String>,
    pub group_id: Option<String>,
    pub hcpcs_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub primary_diagnosis: Option<String>,
    pub secondary_diagnoses: Vec<String>,
    pub physician_notes: Option<String>,
    pub medical_necessity_letter: String,
    pub submission_method: Option<SubmissionMethod>,
    pub external_tracking_id: Option<String>,
    pub carrier_response: Option<serde_json::Value>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Last carrier poll by the status sweep, whatever it found
    pub last_status_check_at: Option<DateTime<Utc>>,
    pub status: PreauthStatus,
    /// Eligibility was assumed rather than proven; staff should confirm
    pub requires_manual_verification: bool,
    /// Submission lease; see `PreauthStore::claim_for_submission`
    pub claimed_until: Option<DateTime<Utc>>,
    /// Bumped on every persisted mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreauthRequest {
    /// Fresh request in the transient `created` state
    pub fn from_order(order: &Order, patient: &Patient, carrier_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            patient_id: patient.id,
            carrier_name: carrier_name.to_string(),
            member_id: patient.member_id.clone(),
            group_id: patient.group_id.clone(),
            hcpcs_code: order.hcpcs_code.clone(),
            product_name: order.product_name.clone(),
            quantity: order.quantity,
            primary_diagnosis: order.primary_diagnosis.clone(),
            secondary_diagnoses: order.secondary_diagnoses.clone(),
            physician_notes: order.physician_notes.clone(),
            medical_necessity_letter: String::new(),
            submission_method: None,
            external_tracking_id: None,
            carrier_response: None,
            retry_count: 0,
            last_retry_at: None,
            next_retry_at: None,
            submitted_at: None,
            last_status_check_at: None,
            status: PreauthStatus::Created,
            requires_manual_verification: false,
            claimed_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.map(|until| until > now).unwrap_or(false)
    }

    /// All diagnosis codes, primary first
    pub fn diagnosis_codes(&self) -> Vec<String> {
        self.primary_diagnosis
            .iter()
            .chain(self.secondary_diagnoses.iter())
            .cloned()
            .collect()
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of `process_order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOrderOutcome {
    pub required: bool,
    pub request_id: Option<Uuid>,
    pub status: Option<PreauthStatus>,
    pub tracking_number: Option<String>,
    pub reason: String,
}

impl ProcessOrderOutcome {
    pub fn from_request(request: &PreauthRequest, reason: impl Into<String>) -> Self {
        Self {
            required: request.status != PreauthStatus::NotRequired,
            request_id: Some(request.id),
            status: Some(request.status),
            tracking_number: request.external_tracking_id.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    Retry,
    Status,
    Expiry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepItemOutcome {
    Submitted {
        tracking_number: Option<String>,
    },
    RetryScheduled {
        attempt: u32,
        next_retry_at: DateTime<Utc>,
    },
    ManualRequired {
        attempts: u32,
    },
    StatusChanged {
        from: PreauthStatus,
        to: PreauthStatus,
    },
    Unchanged,
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepItem {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub outcome: SweepItemOutcome,
}

/// Result of one sweep invocation
///
/// `processed` counts requests the sweep picked up (for the status sweep,
/// requests checked).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub processed: usize,
    pub results: Vec<SweepItem>,
    /// The time budget ran out before the page was exhausted
    pub budget_exhausted: bool,
}

impl SweepReport {
    pub fn new(kind: SweepKind) -> Self {
        Self {
            kind,
            processed: 0,
            results: Vec::new(),
            budget_exhausted: false,
        }
    }

    pub fn push(&mut self, request_id: Uuid, outcome: SweepItemOutcome) {
        self.processed += 1;
        self.results.push(SweepItem { request_id, outcome });
    }

    pub fn count(&self, predicate: impl Fn(&SweepItemOutcome) -> bool) -> usize {
        self.results.iter().filter(|item| predicate(&item.outcome)).count()
    }
}
