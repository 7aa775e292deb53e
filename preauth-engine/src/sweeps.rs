// Scheduled sweeps
//
// Each sweep reads one bounded page, works through it until the page or the
// time budget runs out, and reports per-request outcomes. Sweeps are safe to
// overlap: submissions go through the claim lease and every status change is
// a version-guarded commit, so the loser of a race just records a skip.
use audit_engine::{Actor, AuditAction};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::PreauthResult;
use crate::models::{PreauthRequest, PreauthStatus, SweepItemOutcome, SweepKind, SweepReport};
use crate::orchestrator::{seconds, PreauthOrchestrator, SubmissionAttempt};
use crate::submission::CarrierDecision;

impl PreauthOrchestrator {
    /// Resubmit pending requests whose retry time has come
    pub async fn run_retry_sweep(&self) -> PreauthResult<SweepReport> {
        let started = Instant::now();
        let budget = self.time_budget();
        let now = self.now();
        let due = self
            .store
            .list_due_for_retry(now, self.config.retry.max_attempts, self.config.sweeps.retry_page_size)
            .await?;

        let mut report = SweepReport::new(SweepKind::Retry);
        let actor = Actor::agent("retry-sweep");
        for request in due {
            if started.elapsed() >= budget {
                report.budget_exhausted = true;
                break;
            }
            let outcome = match self.submit_pending(request.id, actor.clone()).await {
                Ok(attempt) => attempt_outcome(attempt),
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Retry attempt errored");
                    SweepItemOutcome::Failed {
                        error: self.redactor.redact(&e.to_string()),
                    }
                }
            };
            report.push(request.id, outcome);
        }

        log_report(&report);
        Ok(report)
    }

    /// Poll carriers for decisions on submitted and need_info requests
    ///
    /// Only detected changes are committed and audited, so polling twice
    /// with nothing new on the carrier side writes no ledger lines. Each
    /// poll stamps `last_status_check_at`, which rotates the page.
    pub async fn run_status_sweep(&self) -> PreauthResult<SweepReport> {
        let started = Instant::now();
        let budget = self.time_budget();
        let since = self.now() - self.lookback();
        let candidates = self
            .store
            .list_for_status_check(since, self.config.sweeps.status_page_size)
            .await?;

        let mut report = SweepReport::new(SweepKind::Status);
        let actor = Actor::agent("status-sweep");
        for request in candidates {
            if started.elapsed() >= budget {
                report.budget_exhausted = true;
                break;
            }
            let outcome = self.check_one(&request, &actor).await;
            report.push(request.id, outcome);
        }

        log_report(&report);
        Ok(report)
    }

    /// Expire submitted and need_info requests older than the lookback window
    pub async fn run_expiry_sweep(&self) -> PreauthResult<SweepReport> {
        let started = Instant::now();
        let budget = self.time_budget();
        let lookback_days = self.config.sweeps.status_lookback_days;
        let before = self.now() - self.lookback();
        let stale = self
            .store
            .list_stale(before, self.config.sweeps.status_page_size)
            .await?;

        let mut report = SweepReport::new(SweepKind::Expiry);
        let actor = Actor::agent("expiry-sweep");
        for request in stale {
            if started.elapsed() >= budget {
                report.budget_exhausted = true;
                break;
            }
            let from = request.status;
            let outcome = match self.expire(&request, &actor, lookback_days).await {
                Ok(true) => SweepItemOutcome::StatusChanged {
                    from,
                    to: PreauthStatus::Expired,
                },
                Ok(false) => SweepItemOutcome::Skipped {
                    reason: "request was modified concurrently".to_string(),
                },
                Err(e) => SweepItemOutcome::Failed {
                    error: self.redactor.redact(&e.to_string()),
                },
            };
            report.push(request.id, outcome);
        }

        log_report(&report);
        Ok(report)
    }

    async fn check_one(&self, request: &PreauthRequest, actor: &Actor) -> SweepItemOutcome {
        let polled_at = self.now();
        // Stamped before the call so a poll that hangs or fails still rotates
        if let Err(e) = self.store.mark_status_checked(request.id, polled_at).await {
            warn!(request_id = %request.id, error = %e, "Could not stamp status check");
        }

        let check = match self.router.check_status(request).await {
            Ok(check) => check,
            Err(e) => {
                warn!(request_id = %request.id, code = %error_common::Categorized::code(&e), "Status check failed");
                let method = request.submission_method.map(|m| m.as_str()).unwrap_or("unknown");
                let entry = self.failure_entry(
                    request,
                    AuditAction::StatusCheckFailed,
                    actor,
                    &e,
                    &[("status", request.status.as_str()), ("submission_method", method)],
                );
                if let Err(audit_err) = self.store.append_audit(entry).await {
                    warn!(request_id = %request.id, error = %audit_err, "Could not record status check failure");
                }
                return SweepItemOutcome::Failed {
                    error: self.redactor.redact(&e.to_string()),
                };
            }
        };

        let target = match (request.status, check.decision) {
            (PreauthStatus::Submitted, CarrierDecision::Approved) => PreauthStatus::Approved,
            (PreauthStatus::Submitted, CarrierDecision::Denied) => PreauthStatus::Denied,
            (PreauthStatus::Submitted, CarrierDecision::NeedInfo) => PreauthStatus::NeedInfo,
            // Back in review means the carrier has the supplemental information
            (PreauthStatus::NeedInfo, CarrierDecision::Pending) => PreauthStatus::Submitted,
            (PreauthStatus::NeedInfo, CarrierDecision::Approved | CarrierDecision::Denied) => {
                warn!(
                    request_id = %request.id,
                    decision = ?check.decision,
                    "Carrier decided a need_info request; record the resubmission first"
                );
                return SweepItemOutcome::Skipped {
                    reason: format!("carrier reports {:?} while awaiting supplemental information", check.decision),
                };
            }
            _ => return SweepItemOutcome::Unchanged,
        };

        let now = self.now();
        let mut next = request.clone();
        next.status = target;
        next.last_status_check_at = Some(polled_at);
        next.carrier_response = Some(json!({
            "decision": check.decision,
            "authorization_number": check.authorization_number,
            "response": check.response_data,
            "previous": request.carrier_response,
        }));
        if next.external_tracking_id.is_none() {
            next.external_tracking_id = check.authorization_number.clone();
        }
        if target == PreauthStatus::Submitted {
            next.submitted_at = Some(now);
        }
        next.updated_at = now;

        let audit = match self.transition_entry(
            &next,
            request.status,
            target,
            actor,
            json!({
                "decision": check.decision,
                "authorization_number": check.authorization_number,
            }),
        ) {
            Ok(audit) => audit,
            Err(e) => {
                return SweepItemOutcome::Failed { error: e.to_string() };
            }
        };

        match self.commit(request, next, audit).await {
            Ok(Some(stored)) => {
                info!(request_id = %stored.id, from = %request.status, to = %target, "Carrier decision applied");
                self.notify(&stored, false).await;
                SweepItemOutcome::StatusChanged {
                    from: request.status,
                    to: target,
                }
            }
            Ok(None) => SweepItemOutcome::Skipped {
                reason: "request was modified concurrently".to_string(),
            },
            Err(e) => SweepItemOutcome::Failed {
                error: self.redactor.redact(&e.to_string()),
            },
        }
    }

    async fn expire(&self, request: &PreauthRequest, actor: &Actor, lookback_days: u32) -> PreauthResult<bool> {
        let now = self.now();
        let mut next = request.clone();
        next.status = PreauthStatus::Expired;
        next.updated_at = now;

        let audit = self.transition_entry(
            &next,
            request.status,
            PreauthStatus::Expired,
            actor,
            json!({
                "submitted_at": request.submitted_at,
                "lookback_days": lookback_days,
            }),
        )?;
        Ok(self.commit(request, next, audit).await?.is_some())
    }

    fn time_budget(&self) -> Duration {
        Duration::from_secs(self.config.sweeps.time_budget_secs)
    }

    fn lookback(&self) -> chrono::Duration {
        seconds(u64::from(self.config.sweeps.status_lookback_days) * 86_400)
    }
}

fn attempt_outcome(attempt: SubmissionAttempt) -> SweepItemOutcome {
    match attempt {
        SubmissionAttempt::Submitted(request) => SweepItemOutcome::Submitted {
            tracking_number: request.external_tracking_id,
        },
        SubmissionAttempt::RetryScheduled(request) => match request.next_retry_at {
            Some(next_retry_at) => SweepItemOutcome::RetryScheduled {
                attempt: request.retry_count,
                next_retry_at,
            },
            None => SweepItemOutcome::Failed {
                error: "retry scheduled without a retry time".to_string(),
            },
        },
        SubmissionAttempt::ManualRequired(request) => SweepItemOutcome::ManualRequired {
            attempts: request.retry_count,
        },
        SubmissionAttempt::Skipped(reason) => SweepItemOutcome::Skipped { reason },
    }
}

fn log_report(report: &SweepReport) {
    let failed = report.count(|o| matches!(o, SweepItemOutcome::Failed { .. }));
    let skipped = report.count(|o| matches!(o, SweepItemOutcome::Skipped { .. }));
    info!(
        sweep = ?report.kind,
        processed = report.processed,
        failed,
        skipped,
        budget_exhausted = report.budget_exhausted,
        "Sweep finished"
    );
}
