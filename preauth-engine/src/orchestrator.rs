//! Preauth Orchestrator
//!
//! Drives an order from intake to a terminal status:
//!
//! 1. Rule resolution decides whether preauth is needed at all
//! 2. Eligibility is resolved (cache, real-time, or assumed)
//! 3. A medical necessity letter is generated (never empty)
//! 4. The request is persisted as `pending` and submitted immediately
//! 5. Failed attempts are rescheduled until `retry.max_attempts`, then
//!    handed to staff as `manual_required`; a channel that can only hand
//!    off to a human goes there on its first attempt
//!
//! Every state change goes through [`PreauthStore::apply_transition`] with
//! the audit entry that describes it, and only edges allowed by
//! [`crate::state`] are ever committed. Submission attempts take a lease via
//! [`PreauthStore::claim_for_submission`] first, so two overlapping
//! invocations never submit the same request twice.

use audit_engine::{Actor, AuditAction, AuditEntry};
use chrono::{DateTime, Utc};
use config_engine::{BackoffStrategy, EngineConfig, RetryConfig};
use error_common::{Categorized, ErrorContext};
use logger_redacted::{redact_metadata, PiiRedactor};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::eligibility::{EligibilityQuery, EligibilityResolver, RealTimeEligibilityChecker};
use crate::error::{PreauthError, PreauthResult};
use crate::models::{
    EligibilityRecord, Order, Patient, PreauthRequest, PreauthRule, PreauthStatus, ProcessOrderOutcome,
    SubmissionMethod,
};
use crate::necessity::{NecessityGenerator, TextGenerator};
use crate::notify::{is_notifiable, NotificationEvent, Notifier};
use crate::rules::{RuleRepository, RuleResolver};
use crate::state::transition_action;
use crate::store::{EligibilityCache, OrderSource, PreauthStore, TransitionCommit};
use crate::submission::{InstructionSheet, SubmissionOutcome, SubmissionRouter};

/// Longest delay a single setting can produce (ten years)
const MAX_DELAY_SECS: u64 = 10 * 365 * 86_400;

/// Collaborators wired into the orchestrator
pub struct EngineDeps {
    pub store: Arc<dyn PreauthStore>,
    pub orders: Arc<dyn OrderSource>,
    pub rules: Arc<dyn RuleRepository>,
    pub eligibility_cache: Arc<dyn EligibilityCache>,
    pub real_time_eligibility: Option<Arc<dyn RealTimeEligibilityChecker>>,
    pub text_generator: Option<Arc<dyn TextGenerator>>,
    pub router: SubmissionRouter,
    pub notifiers: Vec<Arc<dyn Notifier>>,
    pub clock: Arc<dyn Clock>,
}

/// What happened to one submission attempt
#[derive(Debug, Clone)]
pub enum SubmissionAttempt {
    Submitted(PreauthRequest),
    RetryScheduled(PreauthRequest),
    ManualRequired(PreauthRequest),
    /// Another invocation holds the request, or it already moved on
    Skipped(String),
}

impl SubmissionAttempt {
    pub fn request(&self) -> Option<&PreauthRequest> {
        match self {
            SubmissionAttempt::Submitted(request)
            | SubmissionAttempt::RetryScheduled(request)
            | SubmissionAttempt::ManualRequired(request) => Some(request),
            SubmissionAttempt::Skipped(_) => None,
        }
    }
}

/// Delay before the next attempt after `attempt` failures
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> chrono::Duration {
    let base = config.interval_secs;
    let secs = match config.backoff {
        BackoffStrategy::Fixed => base,
        BackoffStrategy::Exponential => {
            let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
            base.saturating_mul(factor).min(config.max_interval_secs.max(base))
        }
    };
    seconds(secs)
}

pub(crate) fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DELAY_SECS) as i64)
}

pub struct PreauthOrchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn PreauthStore>,
    orders: Arc<dyn OrderSource>,
    rules: RuleResolver,
    eligibility: EligibilityResolver,
    necessity: NecessityGenerator,
    pub(crate) router: SubmissionRouter,
    notifiers: Vec<Arc<dyn Notifier>>,
    pub(crate) clock: Arc<dyn Clock>,
    default_method: SubmissionMethod,
    pub(crate) redactor: PiiRedactor,
}

impl PreauthOrchestrator {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> PreauthResult<Self> {
        let default_method: SubmissionMethod = config.channels.default_method.parse()?;
        let eligibility = EligibilityResolver::new(
            config.eligibility.clone(),
            deps.eligibility_cache,
            deps.real_time_eligibility,
            deps.clock.clone(),
        );
        let necessity = NecessityGenerator::new(
            deps.text_generator,
            Duration::from_secs(config.necessity.timeout_secs),
        );

        Ok(Self {
            store: deps.store,
            orders: deps.orders,
            rules: RuleResolver::new(deps.rules),
            eligibility,
            necessity,
            router: deps.router,
            notifiers: deps.notifiers,
            clock: deps.clock,
            default_method,
            redactor: PiiRedactor::default(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // INTAKE
    // ========================================================================

    /// Evaluate an order and, when preauth is needed, submit it
    ///
    /// Idempotent per order: a second call returns the existing request
    /// without re-evaluating, re-submitting or writing audit entries.
    pub async fn process_order(&self, order_id: Uuid) -> PreauthResult<ProcessOrderOutcome> {
        if let Some(existing) = self.store.find_by_order(order_id).await? {
            debug!(order_id = %order_id, request_id = %existing.id, "Order already has a preauth request");
            return Ok(ProcessOrderOutcome::from_request(
                &existing,
                "Preauth request already exists for this order",
            ));
        }

        let (order, patient) = self.load_order(order_id).await?;
        let carrier = patient
            .insurance_provider
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let decision = self.rules.resolve(&carrier, &order.hcpcs_code, order.quantity).await?;
        let now = self.clock.now();
        let mut request = PreauthRequest::from_order(&order, &patient, &carrier, now);
        let actor = Actor::system();

        if !decision.required {
            request.status = PreauthStatus::NotRequired;
            let audit = self.transition_entry(
                &request,
                PreauthStatus::Created,
                PreauthStatus::NotRequired,
                &actor,
                json!({
                    "reason": decision.reason,
                    "rule_id": decision.rule.as_ref().map(|rule| rule.id),
                    "quantity": order.quantity,
                }),
            )?;
            let stored = match self.create(request, audit).await? {
                Intake::New(stored) => stored,
                Intake::Existing(existing) => {
                    return Ok(ProcessOrderOutcome::from_request(
                        &existing,
                        "Preauth request already exists for this order",
                    ))
                }
            };
            info!(order_id = %order_id, request_id = %stored.id, "Preauth not required");
            return Ok(ProcessOrderOutcome::from_request(&stored, decision.reason));
        }

        let eligibility = self
            .eligibility
            .resolve(&EligibilityQuery {
                carrier_name: Some(carrier.clone()).filter(|c| !c.is_empty()),
                member_id: patient.member_id.clone(),
                date_of_birth: patient.date_of_birth,
                service_date: order.service_date.unwrap_or_else(|| now.date_naive()),
            })
            .await?;

        if !eligibility.eligible {
            request.status = PreauthStatus::EligibilityFailed;
            let audit = self
                .transition_entry(
                    &request,
                    PreauthStatus::Created,
                    PreauthStatus::EligibilityFailed,
                    &actor,
                    json!({
                        "source": eligibility.source.as_str(),
                        "details": eligibility.details,
                    }),
                )?
                .failed(eligibility.reason.clone());
            let stored = match self.create(request, audit).await? {
                Intake::New(stored) => stored,
                Intake::Existing(existing) => {
                    return Ok(ProcessOrderOutcome::from_request(
                        &existing,
                        "Preauth request already exists for this order",
                    ))
                }
            };
            warn!(order_id = %order_id, request_id = %stored.id, "Eligibility check failed");
            return Ok(ProcessOrderOutcome::from_request(&stored, eligibility.reason));
        }

        let rule = self.routing_rule_from(decision.rule.clone(), &carrier, &order.hcpcs_code);
        request.medical_necessity_letter = self.necessity.generate(&order, &patient, now.date_naive()).await;
        request.requires_manual_verification = eligibility.requires_manual_verification;
        request.submission_method = Some(rule.submission_method);
        request.next_retry_at = Some(now);
        request.status = PreauthStatus::Pending;

        let audit = self.transition_entry(
            &request,
            PreauthStatus::Created,
            PreauthStatus::Pending,
            &actor,
            json!({
                "reason": decision.reason,
                "rule_id": decision.rule.as_ref().map(|rule| rule.id),
                "submission_method": rule.submission_method.as_str(),
                "eligibility_source": eligibility.source.as_str(),
                "requires_manual_verification": eligibility.requires_manual_verification,
            }),
        )?;
        let stored = match self.create(request, audit).await? {
            Intake::New(stored) => stored,
            Intake::Existing(existing) => {
                return Ok(ProcessOrderOutcome::from_request(
                    &existing,
                    "Preauth request already exists for this order",
                ))
            }
        };
        info!(
            order_id = %order_id,
            request_id = %stored.id,
            method = %rule.submission_method,
            manual_verification = stored.requires_manual_verification,
            "Preauth request queued"
        );

        let attempt = self.submit_pending(stored.id, actor).await?;
        let latest = match attempt.request() {
            Some(request) => request.clone(),
            None => self.get_request(stored.id).await?,
        };
        Ok(ProcessOrderOutcome::from_request(&latest, describe(&attempt)))
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    /// Claim a pending request and run one submission attempt
    pub async fn submit_pending(&self, request_id: Uuid, actor: Actor) -> PreauthResult<SubmissionAttempt> {
        let now = self.clock.now();
        let lease_until = now + seconds(self.config.sweeps.submission_lease_secs);
        let Some(claimed) = self
            .store
            .claim_for_submission(request_id, PreauthStatus::Pending, now, lease_until)
            .await?
        else {
            return Ok(SubmissionAttempt::Skipped(
                "request is claimed elsewhere or no longer pending".to_string(),
            ));
        };

        let rule = self.routing_rule(&claimed).await?;
        let max_attempts = self.config.retry.max_attempts;

        if claimed.retry_count >= max_attempts {
            let message = format!("attempt limit of {} reached", max_attempts);
            return self
                .escalate(claimed, &rule, &actor, message, json!({}), None)
                .await;
        }

        let outcome = self.router.submit(&claimed, &rule).await;
        if outcome.success {
            return self.record_submitted(claimed, outcome, &actor).await;
        }

        let attempts = claimed.retry_count + 1;
        let message = outcome
            .error_message
            .clone()
            .unwrap_or_else(|| "submission failed".to_string());
        // Retrying a channel that can only hand off to a human changes nothing
        if attempts >= max_attempts || outcome.requires_manual_submission {
            return self
                .escalate(claimed, &rule, &actor, message, outcome.response_data.clone(), Some(&outcome))
                .await;
        }
        self.schedule_retry(claimed, attempts, &actor, message, &outcome).await
    }

    async fn record_submitted(
        &self,
        claimed: PreauthRequest,
        outcome: SubmissionOutcome,
        actor: &Actor,
    ) -> PreauthResult<SubmissionAttempt> {
        let now = self.clock.now();
        let mut next = claimed.clone();
        next.status = PreauthStatus::Submitted;
        next.submission_method = Some(outcome.submission_method);
        next.external_tracking_id = outcome.external_tracking_id.clone();
        next.carrier_response = Some(json!({
            "external_system": outcome.external_system,
            "response": outcome.response_data,
            "requires_manual_submission": outcome.requires_manual_submission,
        }));
        next.submitted_at = Some(now);
        next.next_retry_at = None;
        next.updated_at = now;

        let audit = self.transition_entry(
            &next,
            PreauthStatus::Pending,
            PreauthStatus::Submitted,
            actor,
            json!({
                "submission_method": outcome.submission_method.as_str(),
                "external_system": outcome.external_system,
                "tracking_number": outcome.external_tracking_id,
                "requires_manual_submission": outcome.requires_manual_submission,
                "attempt": claimed.retry_count + 1,
            }),
        )?;

        let Some(stored) = self.commit(&claimed, next, audit).await? else {
            self.record_superseded(&claimed, &outcome, actor).await?;
            return Ok(SubmissionAttempt::Skipped("request was modified concurrently".to_string()));
        };
        info!(
            request_id = %stored.id,
            method = %outcome.submission_method,
            tracking = ?stored.external_tracking_id,
            manual = outcome.requires_manual_submission,
            "Preauth submitted"
        );
        self.notify(&stored, outcome.requires_manual_submission).await;
        Ok(SubmissionAttempt::Submitted(stored))
    }

    async fn schedule_retry(
        &self,
        claimed: PreauthRequest,
        attempts: u32,
        actor: &Actor,
        message: String,
        outcome: &SubmissionOutcome,
    ) -> PreauthResult<SubmissionAttempt> {
        let now = self.clock.now();
        let next_retry_at = now + retry_delay(&self.config.retry, attempts);
        let mut next = claimed.clone();
        next.retry_count = attempts;
        next.last_retry_at = Some(now);
        next.next_retry_at = Some(next_retry_at);
        next.submission_method = Some(outcome.submission_method);
        next.carrier_response = Some(json!({
            "last_error": message,
            "external_system": outcome.external_system,
            "response": outcome.response_data,
        }));
        next.updated_at = now;

        let audit = self
            .transition_entry(
                &next,
                PreauthStatus::Pending,
                PreauthStatus::Pending,
                actor,
                json!({
                    "attempt": attempts,
                    "max_attempts": self.config.retry.max_attempts,
                    "next_retry_at": next_retry_at,
                    "submission_method": outcome.submission_method.as_str(),
                    "error_code": outcome.response_data.get("error_code"),
                }),
            )?
            .failed(message.clone());

        let Some(stored) = self.commit(&claimed, next, audit).await? else {
            self.record_superseded(&claimed, outcome, actor).await?;
            return Ok(SubmissionAttempt::Skipped("request was modified concurrently".to_string()));
        };
        warn!(
            request_id = %stored.id,
            attempt = attempts,
            next_retry_at = %next_retry_at,
            error = %message,
            "Submission failed; retry scheduled"
        );
        Ok(SubmissionAttempt::RetryScheduled(stored))
    }

    async fn escalate(
        &self,
        claimed: PreauthRequest,
        rule: &PreauthRule,
        actor: &Actor,
        message: String,
        response: Value,
        outcome: Option<&SubmissionOutcome>,
    ) -> PreauthResult<SubmissionAttempt> {
        let now = self.clock.now();
        let attempts = (claimed.retry_count + u32::from(outcome.is_some())).min(self.config.retry.max_attempts);
        let sheet = InstructionSheet::build(&claimed, rule, &self.config.channels.manual.staff_queue);

        let mut next = claimed.clone();
        next.status = PreauthStatus::ManualRequired;
        next.retry_count = attempts;
        next.last_retry_at = Some(now);
        next.next_retry_at = None;
        next.carrier_response = Some(json!({
            "last_error": message,
            "external_system": outcome.map(|o| o.external_system.clone()),
            "response": response,
            "instruction_sheet": sheet,
        }));
        next.updated_at = now;

        let audit = self
            .transition_entry(
                &next,
                PreauthStatus::Pending,
                PreauthStatus::ManualRequired,
                actor,
                json!({
                    "attempts": attempts,
                    "max_attempts": self.config.retry.max_attempts,
                    "staff_queue": self.config.channels.manual.staff_queue,
                    "submission_method": rule.submission_method.as_str(),
                    "requires_manual_submission": outcome.map(|o| o.requires_manual_submission),
                }),
            )?
            .failed(message.clone());

        let Some(stored) = self.commit(&claimed, next, audit).await? else {
            if let Some(outcome) = outcome {
                self.record_superseded(&claimed, outcome, actor).await?;
            }
            return Ok(SubmissionAttempt::Skipped("request was modified concurrently".to_string()));
        };
        warn!(
            request_id = %stored.id,
            attempts,
            error = %message,
            "Escalated to staff"
        );
        self.notify(&stored, true).await;
        Ok(SubmissionAttempt::ManualRequired(stored))
    }

    // ========================================================================
    // STAFF ACTIONS
    // ========================================================================

    /// Resubmit a `need_info` request with the notes staff collected
    ///
    /// The notes are appended to the request and sent through its routing
    /// channel. On success the request returns to `submitted` and its
    /// lookback window restarts; on failure nothing changes status.
    pub async fn submit_supplemental_info(
        &self,
        request_id: Uuid,
        notes: &str,
        actor: Actor,
    ) -> PreauthResult<PreauthRequest> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(PreauthError::Validation("supplemental notes are required".to_string()));
        }

        let current = self.get_request(request_id).await?;
        if current.status != PreauthStatus::NeedInfo {
            return Err(PreauthError::InvalidTransition {
                from: current.status,
                to: PreauthStatus::Submitted,
            });
        }

        let now = self.clock.now();
        let lease_until = now + seconds(self.config.sweeps.submission_lease_secs);
        let claimed = self
            .store
            .claim_for_submission(request_id, PreauthStatus::NeedInfo, now, lease_until)
            .await?
            .ok_or_else(|| PreauthError::Conflict(format!("request {} is being processed", request_id)))?;

        let mut next = claimed.clone();
        let addendum = format!("Supplemental information ({}): {}", now.date_naive(), notes);
        next.physician_notes = Some(match claimed.physician_notes.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{}\n\n{}", existing, addendum),
            _ => addendum,
        });

        let rule = self.routing_rule(&claimed).await?;
        let outcome = self.router.submit(&next, &rule).await;

        if !outcome.success {
            let message = outcome
                .error_message
                .clone()
                .unwrap_or_else(|| "supplemental submission failed".to_string());
            self.store.release_claim(claimed.id, claimed.version).await?;
            let entry = self
                .observation_entry(
                    &claimed,
                    AuditAction::SupplementalInfoSubmitted,
                    &actor,
                    json!({
                        "submission_method": outcome.submission_method.as_str(),
                        "error_code": outcome.response_data.get("error_code"),
                    }),
                )
                .failed(message.clone());
            self.store.append_audit(entry).await?;
            return Err(PreauthError::Integration(message));
        }

        let now = self.clock.now();
        next.status = PreauthStatus::Submitted;
        next.submitted_at = Some(now);
        next.submission_method = Some(outcome.submission_method);
        if outcome.external_tracking_id.is_some() {
            next.external_tracking_id = outcome.external_tracking_id.clone();
        }
        next.carrier_response = Some(json!({
            "external_system": outcome.external_system,
            "response": outcome.response_data,
            "requires_manual_submission": outcome.requires_manual_submission,
            "previous": claimed.carrier_response,
        }));
        next.updated_at = now;

        let audit = self.transition_entry(
            &next,
            PreauthStatus::NeedInfo,
            PreauthStatus::Submitted,
            &actor,
            json!({
                "submission_method": outcome.submission_method.as_str(),
                "tracking_number": next.external_tracking_id,
                "notes_length": notes.len(),
            }),
        )?;
        let Some(stored) = self.commit(&claimed, next, audit).await? else {
            self.record_superseded(&claimed, &outcome, &actor).await?;
            return Err(PreauthError::Conflict(format!(
                "request {} was modified concurrently",
                request_id
            )));
        };

        info!(request_id = %stored.id, "Supplemental information submitted");
        self.notify(&stored, outcome.requires_manual_submission).await;
        Ok(stored)
    }

    /// Re-run eligibility for an `eligibility_failed` request
    ///
    /// A passing check moves the request to `pending` and submits it right
    /// away. A failing check leaves the status alone and records the
    /// attempt.
    pub async fn reverify_eligibility(&self, request_id: Uuid, actor: Actor) -> PreauthResult<ProcessOrderOutcome> {
        let current = self.get_request(request_id).await?;
        if current.status != PreauthStatus::EligibilityFailed {
            return Err(PreauthError::InvalidTransition {
                from: current.status,
                to: PreauthStatus::Pending,
            });
        }

        let (order, patient) = self.load_order(current.order_id).await?;
        let now = self.clock.now();
        let eligibility = self
            .eligibility
            .resolve(&EligibilityQuery {
                carrier_name: Some(current.carrier_name.clone()).filter(|c| !c.trim().is_empty()),
                member_id: patient.member_id.clone().or_else(|| current.member_id.clone()),
                date_of_birth: patient.date_of_birth,
                service_date: order.service_date.unwrap_or_else(|| now.date_naive()),
            })
            .await?;

        if !eligibility.eligible {
            let entry = self
                .observation_entry(
                    &current,
                    AuditAction::EligibilityFailed,
                    &actor,
                    json!({
                        "reverification": true,
                        "source": eligibility.source.as_str(),
                        "details": eligibility.details,
                    }),
                )
                .failed(eligibility.reason.clone());
            self.store.append_audit(entry).await?;
            return Ok(ProcessOrderOutcome::from_request(&current, eligibility.reason));
        }

        let rule = self.routing_rule(&current).await?;
        let mut next = current.clone();
        next.member_id = patient.member_id.clone().or(current.member_id.clone());
        next.medical_necessity_letter = self.necessity.generate(&order, &patient, now.date_naive()).await;
        next.requires_manual_verification = eligibility.requires_manual_verification;
        next.submission_method = Some(rule.submission_method);
        next.next_retry_at = Some(now);
        next.status = PreauthStatus::Pending;
        next.updated_at = now;

        let audit = self.transition_entry(
            &next,
            PreauthStatus::EligibilityFailed,
            PreauthStatus::Pending,
            &actor,
            json!({
                "eligibility_source": eligibility.source.as_str(),
                "requires_manual_verification": eligibility.requires_manual_verification,
            }),
        )?;
        let stored = self
            .commit(&current, next, audit)
            .await?
            .ok_or_else(|| PreauthError::Conflict(format!("request {} was modified concurrently", request_id)))?;
        info!(request_id = %stored.id, "Eligibility re-verified; request queued");

        let attempt = self.submit_pending(stored.id, actor).await?;
        let latest = match attempt.request() {
            Some(request) => request.clone(),
            None => self.get_request(stored.id).await?,
        };
        Ok(ProcessOrderOutcome::from_request(&latest, describe(&attempt)))
    }

    pub async fn record_manual_eligibility(
        &self,
        member_id: &str,
        carrier_name: &str,
        eligible: bool,
        notes: Option<String>,
        verified_by: &str,
    ) -> PreauthResult<EligibilityRecord> {
        self.eligibility
            .record_manual_eligibility(member_id, carrier_name, eligible, notes, verified_by)
            .await
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub async fn get_request(&self, request_id: Uuid) -> PreauthResult<PreauthRequest> {
        self.store
            .get(request_id)
            .await?
            .ok_or_else(|| PreauthError::NotFound(format!("preauth request {}", request_id)))
    }

    /// Full ledger for a request in sequence order
    pub async fn audit_trail(&self, request_id: Uuid) -> PreauthResult<Vec<AuditEntry>> {
        self.get_request(request_id).await?;
        self.store.audit_trail(request_id).await
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn load_order(&self, order_id: Uuid) -> PreauthResult<(Order, Patient)> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| PreauthError::NotFound(format!("order {}", order_id)))?;
        let patient = self
            .orders
            .get_patient(order.patient_id)
            .await?
            .ok_or_else(|| PreauthError::NotFound(format!("patient {}", order.patient_id)))?;
        Ok((order, patient))
    }

    /// Current routing rule for a stored request
    pub(crate) async fn routing_rule(&self, request: &PreauthRequest) -> PreauthResult<PreauthRule> {
        let decision = self
            .rules
            .resolve(&request.carrier_name, &request.hcpcs_code, request.quantity)
            .await?;
        Ok(self.routing_rule_from(decision.rule, &request.carrier_name, &request.hcpcs_code))
    }

    fn routing_rule_from(&self, rule: Option<PreauthRule>, carrier: &str, hcpcs_code: &str) -> PreauthRule {
        rule.unwrap_or_else(|| PreauthRule::fallback(carrier, hcpcs_code, self.default_method))
    }

    async fn create(&self, request: PreauthRequest, audit: AuditEntry) -> PreauthResult<Intake> {
        let order_id = request.order_id;
        match self.store.create_request(request, audit).await {
            Ok(stored) => Ok(Intake::New(stored)),
            Err(PreauthError::Conflict(_)) => {
                let existing = self
                    .store
                    .find_by_order(order_id)
                    .await?
                    .ok_or_else(|| PreauthError::Conflict(format!("order {} lost its preauth request", order_id)))?;
                debug!(order_id = %order_id, "Concurrent intake won; returning existing request");
                Ok(Intake::Existing(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Guarded commit; `None` when the row moved underneath us
    pub(crate) async fn commit(
        &self,
        current: &PreauthRequest,
        next: PreauthRequest,
        audit: AuditEntry,
    ) -> PreauthResult<Option<PreauthRequest>> {
        let request_id = current.id;
        let commit = TransitionCommit {
            expected_status: current.status,
            expected_version: current.version,
            request: next,
            audit,
        };
        match self.store.apply_transition(commit).await {
            Ok(stored) => Ok(Some(stored)),
            Err(PreauthError::Conflict(reason)) => {
                warn!(request_id = %request_id, reason = %reason, "Transition lost to a concurrent update");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Ledger line for a channel result that lost its lease before commit
    ///
    /// The carrier may have accepted the submission, so the outcome is kept
    /// even though the request row now belongs to another invocation.
    async fn record_superseded(
        &self,
        claimed: &PreauthRequest,
        outcome: &SubmissionOutcome,
        actor: &Actor,
    ) -> PreauthResult<()> {
        warn!(
            request_id = %claimed.id,
            method = %outcome.submission_method,
            success = outcome.success,
            tracking = ?outcome.external_tracking_id,
            "Submission result arrived after the lease was lost"
        );
        let mut entry = self.observation_entry(
            claimed,
            AuditAction::SubmissionSuperseded,
            actor,
            json!({
                "status": claimed.status.as_str(),
                "claimed_version": claimed.version,
                "attempt": claimed.retry_count + 1,
                "submission_method": outcome.submission_method.as_str(),
                "external_system": outcome.external_system,
                "tracking_number": outcome.external_tracking_id,
                "carrier_accepted": outcome.success,
                "requires_manual_submission": outcome.requires_manual_submission,
                "error_code": outcome.response_data.get("error_code"),
            }),
        );
        if let Some(error) = &outcome.error_message {
            entry = entry.failed(self.redactor.redact(error));
        }
        self.store.append_audit(entry).await?;
        Ok(())
    }

    /// Audit entry for an allowed edge; rejects anything outside the table
    pub(crate) fn transition_entry(
        &self,
        request: &PreauthRequest,
        from: PreauthStatus,
        to: PreauthStatus,
        actor: &Actor,
        metadata: Value,
    ) -> PreauthResult<AuditEntry> {
        let action = transition_action(from, to)?;
        Ok(AuditEntry::new(request.id, action, actor.clone())
            .with_transition(from.as_str(), to.as_str())
            .with_metadata(redact_metadata(metadata))
            .at(self.clock.now()))
    }

    /// Audit entry that does not change status
    pub(crate) fn observation_entry(
        &self,
        request: &PreauthRequest,
        action: AuditAction,
        actor: &Actor,
        metadata: Value,
    ) -> AuditEntry {
        AuditEntry::new(request.id, action, actor.clone())
            .with_metadata(redact_metadata(metadata))
            .at(self.clock.now())
    }

    /// Audit entry for a failure, with its category and code attached
    pub(crate) fn failure_entry(
        &self,
        request: &PreauthRequest,
        action: AuditAction,
        actor: &Actor,
        error: &PreauthError,
        extra: &[(&str, &str)],
    ) -> AuditEntry {
        let context = extra.iter().fold(
            ErrorContext::from_error(error)
                .with_request_id(request.id)
                .with_order_id(request.order_id)
                .with_carrier(request.carrier_name.clone()),
            |context, (key, value)| context.add_context(*key, *value),
        );
        self.observation_entry(request, action, actor, context.to_metadata())
            .failed(self.redactor.redact(&error.to_string()))
    }

    /// Fan out to every notifier; failures are audited and never undo the transition
    pub(crate) async fn notify(&self, request: &PreauthRequest, requires_manual_submission: bool) {
        if !is_notifiable(request.status) {
            return;
        }
        let event = NotificationEvent::for_request(request, requires_manual_submission);
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&event).await {
                warn!(
                    request_id = %request.id,
                    notifier = notifier.name(),
                    code = e.code(),
                    "Notification failed"
                );
                let entry = self.failure_entry(
                    request,
                    AuditAction::NotificationFailed,
                    &Actor::system(),
                    &e,
                    &[("notifier", notifier.name()), ("status", request.status.as_str())],
                );
                if let Err(audit_err) = self.store.append_audit(entry).await {
                    warn!(request_id = %request.id, error = %audit_err, "Could not record notification failure");
                }
            }
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

enum Intake {
    New(PreauthRequest),
    Existing(PreauthRequest),
}

fn describe(attempt: &SubmissionAttempt) -> String {
    match attempt {
        SubmissionAttempt::Submitted(request) => match request.submission_method {
            Some(method) => format!("Submitted via {}", method),
            None => "Submitted".to_string(),
        },
        SubmissionAttempt::RetryScheduled(request) => format!(
            "Submission attempt {} failed; retry scheduled",
            request.retry_count
        ),
        SubmissionAttempt::ManualRequired(_) => "Submission attempts exhausted; staff follow-up required".to_string(),
        SubmissionAttempt::Skipped(reason) => format!("Queued for submission ({})", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry(backoff: BackoffStrategy) -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            interval_secs: 600,
            backoff,
            max_interval_secs: 3000,
        }
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let config = retry(BackoffStrategy::Fixed);
        assert_eq!(retry_delay(&config, 1), chrono::Duration::seconds(600));
        assert_eq!(retry_delay(&config, 5), chrono::Duration::seconds(600));
    }

    #[test]
    fn test_exponential_backoff_doubles_until_cap() {
        let config = retry(BackoffStrategy::Exponential);
        assert_eq!(retry_delay(&config, 1), chrono::Duration::seconds(600));
        assert_eq!(retry_delay(&config, 2), chrono::Duration::seconds(1200));
        assert_eq!(retry_delay(&config, 3), chrono::Duration::seconds(2400));
        assert_eq!(retry_delay(&config, 4), chrono::Duration::seconds(3000));
        assert_eq!(retry_delay(&config, 80), chrono::Duration::seconds(3000));
    }

    #[test]
    fn test_describe_mentions_method() {
        let order = Order {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            hcpcs_code: "A6021".to_string(),
            product_name: "Collagen dressing".to_string(),
            quantity: 5,
            primary_diagnosis: None,
            secondary_diagnoses: vec![],
            wound: None,
            physician_name: None,
            physician_notes: None,
            service_date: None,
        };
        let patient = Patient {
            id: order.patient_id,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            date_of_birth: None,
            insurance_provider: Some("Acme".to_string()),
            member_id: None,
            group_id: None,
        };
        let mut request = PreauthRequest::from_order(&order, &patient, "Acme", Utc::now());
        request.submission_method = Some(SubmissionMethod::Fax);
        assert_eq!(describe(&SubmissionAttempt::Submitted(request)), "Submitted via fax");
    }
}
