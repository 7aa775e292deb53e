//! Intake and submission workflow tests
//!
//! These drive the orchestrator end to end against the in-memory stores:
//! 1. Unknown carrier/code pair retried to manual_required (Acme A6021)
//! 2. Repeated intake of the same order
//! 3. Rule outcomes: not required, quantity escalation, staff channel,
//!    portal hand-off
//! 4. Eligibility failure, staff override and re-verification
//! 5. Supplemental information after need_info
//! 6. Notification failures and audit completeness

mod common;

use audit_engine::{Actor, ActorType, AuditAction};
use chrono::Duration;
use common::*;
use preauth_engine::*;
use std::sync::Arc;

// ============================================================================
// TEST 1: Fail-safe default with bounded retries
// ============================================================================

#[tokio::test]
async fn test_acme_a6021_without_rule_escalates_after_three_failures() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);

    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert!(outcome.required);
    assert_eq!(outcome.status, Some(PreauthStatus::Pending));
    let request_id = outcome.request_id.unwrap();
    assert_eq!(h.request(request_id).await.retry_count, 1);

    h.advance(Duration::seconds(3601));
    let report = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(matches!(
        report.results[0].outcome,
        SweepItemOutcome::RetryScheduled { attempt: 2, .. }
    ));

    h.advance(Duration::seconds(3601));
    let report = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(
        report.results[0].outcome,
        SweepItemOutcome::ManualRequired { attempts: 3 }
    );

    let request = h.request(request_id).await;
    assert_eq!(request.status, PreauthStatus::ManualRequired);
    assert_eq!(request.retry_count, 3);
    assert!(request.next_retry_at.is_none());
    let response = request.carrier_response.unwrap();
    assert_eq!(response["instruction_sheet"]["hcpcs_code"], "A6021");
    assert_eq!(response["instruction_sheet"]["staff_queue"], "preauth-intake");

    // Never back to pending, never submitted again
    h.advance(Duration::days(2));
    let report = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(h.channel.submit_calls(), 3);
    assert_eq!(h.request(request_id).await.status, PreauthStatus::ManualRequired);
}

#[tokio::test]
async fn test_retry_is_not_attempted_before_its_time() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);
    h.orchestrator.process_order(order_id).await.unwrap();

    h.advance(Duration::minutes(30));
    let report = h.orchestrator.run_retry_sweep().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(h.channel.submit_calls(), 1);
}

// ============================================================================
// TEST 2: Idempotent intake
// ============================================================================

#[tokio::test]
async fn test_process_order_twice_returns_existing_request() {
    let h = harness().await;
    h.channel.succeed_next(1);
    let order_id = h.seed_order("Acme", "A6021", 5);

    let first = h.orchestrator.process_order(order_id).await.unwrap();
    let entries = h.store.audit_log().len();

    let second = h.orchestrator.process_order(order_id).await.unwrap();
    assert_eq!(second.request_id, first.request_id);
    assert_eq!(second.status, Some(PreauthStatus::Submitted));
    assert_eq!(second.tracking_number, first.tracking_number);
    assert_eq!(h.store.audit_log().len(), entries);
    assert_eq!(h.channel.submit_calls(), 1);
    assert_eq!(h.store.all_requests().len(), 1);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let h = harness().await;
    let err = h.orchestrator.process_order(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PreauthError::NotFound(_)));
    assert!(h.store.all_requests().is_empty());
}

// ============================================================================
// TEST 3: Rule outcomes
// ============================================================================

#[tokio::test]
async fn test_not_required_rule_records_terminal_row() {
    let h = harness().await;
    h.rules
        .insert(PreauthRule::new("Acme", "E0277", false, SubmissionMethod::Edi));
    let order_id = h.seed_order("Acme", "E0277", 1);

    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert!(!outcome.required);
    assert_eq!(outcome.status, Some(PreauthStatus::NotRequired));

    let trail = h.orchestrator.audit_trail(outcome.request_id.unwrap()).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::PreauthNotRequired);
    assert_eq!(trail[0].from_status.as_deref(), Some("created"));
    assert_eq!(trail[0].to_status.as_deref(), Some("not_required"));
    assert_eq!(h.channel.submit_calls(), 0);
}

#[tokio::test]
async fn test_quantity_over_threshold_requires_preauth() {
    let h = harness().await;
    let mut rule = PreauthRule::new("Acme", "A6021", false, SubmissionMethod::Edi);
    rule.quantity_threshold = Some(10);
    h.rules.insert(rule);
    h.channel.succeed_next(1);

    let small = h.orchestrator.process_order(h.seed_order("Acme", "A6021", 10)).await.unwrap();
    assert!(!small.required);

    let large = h.orchestrator.process_order(h.seed_order("Acme", "A6021", 12)).await.unwrap();
    assert!(large.required);
    assert_eq!(large.status, Some(PreauthStatus::Submitted));
    assert!(large.tracking_number.is_some());
}

#[tokio::test]
async fn test_manual_channel_counts_as_submitted() {
    let h = harness().await;
    let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Manual);
    rule.phone_number = Some("800-555-0100".to_string());
    h.rules.insert(rule);
    let order_id = h.seed_order("Acme", "A6021", 5);

    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert_eq!(outcome.status, Some(PreauthStatus::Submitted));

    let request = h.request(outcome.request_id.unwrap()).await;
    assert_eq!(request.submission_method, Some(SubmissionMethod::Manual));
    let response = request.carrier_response.unwrap();
    assert_eq!(response["requires_manual_submission"], true);
    assert_eq!(response["external_system"], "staff_queue");

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, PreauthStatus::Submitted);
    assert!(events[0].requires_manual_submission);
    assert!(events[0].requires_manual_verification);
}

#[tokio::test]
async fn test_portal_hand_off_goes_to_staff_without_retrying() {
    let h = harness().await;
    let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Portal);
    rule.portal_url = Some("https://providers.acme.example".to_string());
    h.rules.insert(rule);
    let order_id = h.seed_order("Acme", "A6021", 5);

    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert_eq!(outcome.status, Some(PreauthStatus::ManualRequired));
    assert_eq!(h.channel.submit_calls(), 0);

    let request = h.request(outcome.request_id.unwrap()).await;
    assert_eq!(request.retry_count, 1);
    assert!(request.next_retry_at.is_none());
    let response = request.carrier_response.unwrap();
    assert_eq!(response["instruction_sheet"]["staff_queue"], "preauth-intake");
    assert_eq!(response["external_system"], "carrier_portal");

    let last = transition_entries(&h.store, request.id).pop().unwrap();
    assert_eq!(last.action, AuditAction::EscalatedToManual);
    assert_eq!(last.metadata["requires_manual_submission"], true);
    assert_eq!(last.metadata["attempts"], 1);

    // Nothing left for the retry sweep
    h.advance(Duration::seconds(3601));
    assert_eq!(h.orchestrator.run_retry_sweep().await.unwrap().processed, 0);

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, PreauthStatus::ManualRequired);
    assert!(events[0].requires_manual_submission);
}

#[tokio::test]
async fn test_letter_is_generated_from_template_without_text_service() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);
    let outcome = h.orchestrator.process_order(order_id).await.unwrap();

    let request = h.request(outcome.request_id.unwrap()).await;
    assert!(!request.medical_necessity_letter.trim().is_empty());
    assert!(request.medical_necessity_letter.contains("A6021"));
    assert!(request.medical_necessity_letter.contains("Margaret Hale"));
}

// ============================================================================
// TEST 4: Eligibility
// ============================================================================

#[tokio::test]
async fn test_missing_member_id_fails_eligibility() {
    let h = harness().await;
    let order_id = h.seed_order_with("Acme", "A6021", 5, |patient| patient.member_id = None);

    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert!(outcome.required);
    assert_eq!(outcome.status, Some(PreauthStatus::EligibilityFailed));
    assert!(outcome.reason.contains("member_id"));

    let trail = h.orchestrator.audit_trail(outcome.request_id.unwrap()).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, AuditAction::EligibilityFailed);
    assert!(!trail[0].success);
    assert!(trail[0].error_message.as_deref().unwrap().contains("member_id"));
    assert_eq!(h.channel.submit_calls(), 0);
}

#[tokio::test]
async fn test_assumed_eligibility_is_flagged_for_staff() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);
    let outcome = h.orchestrator.process_order(order_id).await.unwrap();

    let request = h.request(outcome.request_id.unwrap()).await;
    assert!(request.requires_manual_verification);

    let trail = h.orchestrator.audit_trail(request.id).await.unwrap();
    assert_eq!(trail[0].action, AuditAction::RequestQueued);
    assert_eq!(trail[0].metadata["eligibility_source"], "assumed");
    assert_eq!(trail[0].metadata["requires_manual_verification"], true);
}

#[tokio::test]
async fn test_staff_override_then_reverify_submits() {
    let h = harness().await;
    h.orchestrator
        .record_manual_eligibility("W123456789", "Acme", false, Some("Coverage terminated".to_string()), "staff-7")
        .await
        .unwrap();

    let order_id = h.seed_order("Acme", "A6021", 5);
    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    assert_eq!(outcome.status, Some(PreauthStatus::EligibilityFailed));
    assert_eq!(outcome.reason, "Coverage terminated");
    let request_id = outcome.request_id.unwrap();

    // Still ineligible: no transition, one more failed ledger line
    let still = h
        .orchestrator
        .reverify_eligibility(request_id, Actor::staff("staff-7", None))
        .await
        .unwrap();
    assert_eq!(still.status, Some(PreauthStatus::EligibilityFailed));
    assert_eq!(h.orchestrator.audit_trail(request_id).await.unwrap().len(), 2);

    h.orchestrator
        .record_manual_eligibility("W123456789", "Acme", true, Some("Reinstated".to_string()), "staff-7")
        .await
        .unwrap();
    h.channel.succeed_next(1);

    let outcome = h
        .orchestrator
        .reverify_eligibility(request_id, Actor::staff("staff-7", Some("Jo Reyes".to_string())))
        .await
        .unwrap();
    assert_eq!(outcome.status, Some(PreauthStatus::Submitted));

    let request = h.request(request_id).await;
    assert!(!request.requires_manual_verification);

    let actions: Vec<AuditAction> = transition_entries(&h.store, request_id)
        .iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::EligibilityFailed,
            AuditAction::EligibilityReverified,
            AuditAction::Submitted
        ]
    );
    let reverified = transition_entries(&h.store, request_id)[1].clone();
    assert_eq!(reverified.actor.actor_type, ActorType::Staff);
    assert_eq!(reverified.actor.actor_id.as_deref(), Some("staff-7"));
}

#[tokio::test]
async fn test_reverify_rejects_other_statuses() {
    let h = harness().await;
    let request = h.submitted_request().await;

    let err = h
        .orchestrator
        .reverify_eligibility(request.id, Actor::staff("staff-7", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PreauthError::InvalidTransition {
            from: PreauthStatus::Submitted,
            to: PreauthStatus::Pending
        }
    ));
}

#[tokio::test]
async fn test_manual_eligibility_requires_verifier() {
    let h = harness().await;
    let err = h
        .orchestrator
        .record_manual_eligibility("W123456789", "Acme", true, None, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, PreauthError::Validation(_)));
    assert!(h.cache.is_empty());
}

// ============================================================================
// TEST 5: Supplemental information
// ============================================================================

#[tokio::test]
async fn test_supplemental_info_returns_request_to_submitted() {
    let h = harness().await;
    let request = h.submitted_request().await;

    h.channel.decide(CarrierDecision::NeedInfo);
    h.orchestrator.run_status_sweep().await.unwrap();
    assert_eq!(h.request(request.id).await.status, PreauthStatus::NeedInfo);

    h.advance(Duration::days(3));
    h.channel.succeed_next(1);
    let updated = h
        .orchestrator
        .submit_supplemental_info(request.id, "Updated wound measurements attached", Actor::staff("staff-7", None))
        .await
        .unwrap();

    assert_eq!(updated.status, PreauthStatus::Submitted);
    assert_eq!(updated.submitted_at, Some(h.clock.now()));
    let notes = updated.physician_notes.unwrap();
    assert!(notes.starts_with("Failed conservative care"));
    assert!(notes.contains("Updated wound measurements attached"));

    let last = transition_entries(&h.store, request.id).pop().unwrap();
    assert_eq!(last.action, AuditAction::SupplementalInfoSubmitted);
    assert_eq!(last.from_status.as_deref(), Some("need_info"));
}

#[tokio::test]
async fn test_supplemental_info_failure_keeps_need_info() {
    let h = harness().await;
    let request = h.submitted_request().await;
    h.channel.decide(CarrierDecision::NeedInfo);
    h.orchestrator.run_status_sweep().await.unwrap();

    let err = h
        .orchestrator
        .submit_supplemental_info(request.id, "Chart notes", Actor::staff("staff-7", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PreauthError::Integration(_)));

    let current = h.request(request.id).await;
    assert_eq!(current.status, PreauthStatus::NeedInfo);
    assert!(current.claimed_until.is_none());

    let last = h.store.audit_log().entries_for(request.id).pop().unwrap();
    assert_eq!(last.action, AuditAction::SupplementalInfoSubmitted);
    assert!(!last.success);
    assert!(last.to_status.is_none());

    // The claim was released, so a second try goes through
    h.channel.succeed_next(1);
    let updated = h
        .orchestrator
        .submit_supplemental_info(request.id, "Chart notes", Actor::staff("staff-7", None))
        .await
        .unwrap();
    assert_eq!(updated.status, PreauthStatus::Submitted);
}

#[tokio::test]
async fn test_supplemental_info_requires_need_info() {
    let h = harness().await;
    let request = h.submitted_request().await;

    let err = h
        .orchestrator
        .submit_supplemental_info(request.id, "notes", Actor::staff("staff-7", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PreauthError::InvalidTransition { .. }));

    let err = h
        .orchestrator
        .submit_supplemental_info(request.id, "   ", Actor::staff("staff-7", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PreauthError::Validation(_)));
}

// ============================================================================
// TEST 6: Notifications and audit
// ============================================================================

#[tokio::test]
async fn test_notification_failure_does_not_roll_back() {
    let h = harness_with(
        test_config(),
        ScriptedChannel::new(SubmissionMethod::Edi),
        vec![Arc::new(FailingNotifier)],
    )
    .await;
    let request = h.submitted_request().await;

    assert_eq!(request.status, PreauthStatus::Submitted);
    assert_eq!(h.notifier.events().len(), 1);

    let entries = h.store.audit_log().entries_for(request.id);
    let failure = entries
        .iter()
        .find(|entry| entry.action == AuditAction::NotificationFailed)
        .unwrap();
    assert!(!failure.success);
    assert_eq!(failure.metadata["notifier"], "failing");
    assert_eq!(failure.metadata["error_code"], "INTEGRATION_2001");
    assert!(failure.to_status.is_none());
}

#[tokio::test]
async fn test_every_transition_has_exactly_one_matching_entry() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);
    let outcome = h.orchestrator.process_order(order_id).await.unwrap();
    let request_id = outcome.request_id.unwrap();

    h.advance(Duration::seconds(3601));
    h.channel.succeed_next(1);
    h.orchestrator.run_retry_sweep().await.unwrap();
    h.channel.decide(CarrierDecision::Approved);
    h.orchestrator.run_status_sweep().await.unwrap();

    let entries = transition_entries(&h.store, request_id);
    let actions: Vec<AuditAction> = entries.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::RequestQueued,
            AuditAction::RetryScheduled,
            AuditAction::Submitted,
            AuditAction::Approved
        ]
    );

    for entry in &entries {
        assert_eq!(entry.preauth_request_id, request_id);
        let from: PreauthStatus = entry.from_status.as_deref().unwrap().parse().unwrap();
        let to: PreauthStatus = entry.to_status.as_deref().unwrap().parse().unwrap();
        assert_eq!(transition_action(from, to).unwrap(), entry.action);
    }

    let sequences: Vec<i64> = entries.iter().map(|entry| entry.sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[0] < pair[1]));

    let request = h.request(request_id).await;
    assert_eq!(request.status, PreauthStatus::Approved);
    assert_eq!(request.carrier_response.unwrap()["authorization_number"], "AUTH-77");
}

#[tokio::test]
async fn test_audit_metadata_is_redacted() {
    let h = harness().await;
    let order_id = h.seed_order("Acme", "A6021", 5);
    let outcome = h.orchestrator.process_order(order_id).await.unwrap();

    let entries = h.store.audit_log().entries_for(outcome.request_id.unwrap());
    let serialized = serde_json::to_string(&entries).unwrap();
    assert!(!serialized.contains("W123456789"));
    assert!(!serialized.contains("1948-03-14"));
}

#[tokio::test]
async fn test_audit_trail_for_unknown_request() {
    let h = harness().await;
    let err = h.orchestrator.audit_trail(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PreauthError::NotFound(_)));
}
