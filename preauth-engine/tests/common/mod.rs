// Shared fixtures for the orchestration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use config_engine::EngineConfig;
use parking_lot::Mutex;
use preauth_engine::*;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// SCRIPTED CHANNEL
// ============================================================================

/// Channel whose submit results and status answers are queued up front
///
/// When a queue runs dry the channel keeps returning its default: a failed
/// submission and an `Unknown` status.
pub struct ScriptedChannel {
    method: SubmissionMethod,
    submissions: Mutex<VecDeque<bool>>,
    decisions: Mutex<VecDeque<CarrierDecision>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    delay: Option<std::time::Duration>,
}

impl ScriptedChannel {
    pub fn new(method: SubmissionMethod) -> Self {
        Self {
            method,
            submissions: Mutex::new(VecDeque::new()),
            decisions: Mutex::new(VecDeque::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn succeed_next(&self, times: usize) {
        self.submissions.lock().extend(std::iter::repeat(true).take(times));
    }

    pub fn decide(&self, decision: CarrierDecision) {
        self.decisions.lock().push_back(decision);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionChannel for ScriptedChannel {
    fn method(&self) -> SubmissionMethod {
        self.method
    }

    async fn submit(&self, request: &PreauthRequest, _rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let succeed = self.submissions.lock().pop_front().unwrap_or(false);
        if succeed {
            Ok(SubmissionOutcome::accepted(
                self.method,
                "scripted",
                Some(format!("TRK-{}", &request.id.simple().to_string()[..8])),
                json!({ "accepted": true }),
            ))
        } else {
            Err(PreauthError::Integration("carrier endpoint unreachable".to_string()))
        }
    }

    async fn check_status(&self, _request: &PreauthRequest) -> PreauthResult<StatusCheck> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let decision = self.decisions.lock().pop_front();
        Ok(match decision {
            Some(decision) => StatusCheck {
                decision,
                authorization_number: (decision == CarrierDecision::Approved).then(|| "AUTH-77".to_string()),
                response_data: json!({ "decision": decision }),
            },
            None => StatusCheck::unknown(),
        })
    }
}

// ============================================================================
// NOTIFIERS
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &NotificationEvent) -> PreauthResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _event: &NotificationEvent) -> PreauthResult<()> {
        Err(PreauthError::Integration("notification service returned 503".to_string()))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub orchestrator: Arc<PreauthOrchestrator>,
    pub store: InMemoryPreauthStore,
    pub orders: InMemoryOrderSource,
    pub rules: InMemoryRuleRepository,
    pub cache: InMemoryEligibilityCache,
    pub clock: ManualClock,
    pub channel: Arc<ScriptedChannel>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// Config with three attempts, an hourly fixed backoff and `edi` as the
/// fallback channel (the scripted channel)
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.max_attempts = 3;
    config.retry.interval_secs = 3600;
    config.channels.default_method = "edi".to_string();
    config
}

pub async fn harness() -> Harness {
    harness_with(test_config(), ScriptedChannel::new(SubmissionMethod::Edi), vec![]).await
}

pub async fn harness_with(
    config: EngineConfig,
    channel: ScriptedChannel,
    extra_notifiers: Vec<Arc<dyn Notifier>>,
) -> Harness {
    let store = InMemoryPreauthStore::new();
    let orders = InMemoryOrderSource::new();
    let rules = InMemoryRuleRepository::default();
    let cache = InMemoryEligibilityCache::new();
    let clock = ManualClock::new(start_time());
    let channel = Arc::new(channel);
    let notifier = Arc::new(RecordingNotifier::default());

    let router = SubmissionRouter::new();
    router.register(Arc::new(PortalChannel::new("preauth-intake"))).await;
    router.register(Arc::new(ManualChannel::new("preauth-intake"))).await;
    // Registered last so a scripted channel replaces the stock one for its method
    router.register(channel.clone()).await;

    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![notifier.clone()];
    notifiers.extend(extra_notifiers);

    let orchestrator = PreauthOrchestrator::new(
        config,
        EngineDeps {
            store: Arc::new(store.clone()),
            orders: Arc::new(orders.clone()),
            rules: Arc::new(rules.clone()),
            eligibility_cache: Arc::new(cache.clone()),
            real_time_eligibility: None,
            text_generator: None,
            router,
            notifiers,
            clock: Arc::new(clock.clone()),
        },
    )
    .unwrap();

    Harness {
        orchestrator: Arc::new(orchestrator),
        store,
        orders,
        rules,
        cache,
        clock,
        channel,
        notifier,
    }
}

impl Harness {
    /// Seed an order for a patient on `carrier`; returns the order id
    pub fn seed_order(&self, carrier: &str, hcpcs_code: &str, quantity: u32) -> Uuid {
        self.seed_order_with(carrier, hcpcs_code, quantity, |_| {})
    }

    pub fn seed_order_with(
        &self,
        carrier: &str,
        hcpcs_code: &str,
        quantity: u32,
        adjust_patient: impl FnOnce(&mut Patient),
    ) -> Uuid {
        let mut patient = Patient {
            id: Uuid::new_v4(),
            first_name: "Margaret".to_string(),
            last_name: "Hale".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1948, 3, 14),
            insurance_provider: Some(carrier.to_string()),
            member_id: Some("W123456789".to_string()),
            group_id: Some("G-42".to_string()),
        };
        adjust_patient(&mut patient);
        let order = Order {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            hcpcs_code: hcpcs_code.to_string(),
            product_name: "Collagen wound dressing".to_string(),
            quantity,
            primary_diagnosis: Some("L97.412".to_string()),
            secondary_diagnoses: vec!["E11.621".to_string()],
            wound: Some(WoundMeasurements {
                location: Some("left heel".to_string()),
                wound_type: Some("diabetic ulcer".to_string()),
                length_cm: Some(4.0),
                width_cm: Some(3.5),
                depth_cm: Some(0.5),
                drainage: Some("moderate".to_string()),
            }),
            physician_name: Some("Dr. Okafor".to_string()),
            physician_notes: Some("Failed conservative care for 4 weeks".to_string()),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 4),
        };
        let order_id = order.id;
        self.orders.insert_patient(patient);
        self.orders.insert_order(order);
        order_id
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn request(&self, id: Uuid) -> PreauthRequest {
        self.orchestrator.get_request(id).await.unwrap()
    }

    /// Put a request straight into `submitted`, as if a channel accepted it
    pub async fn submitted_request(&self) -> PreauthRequest {
        self.channel.succeed_next(1);
        let order_id = self.seed_order("Acme", "A6021", 5);
        let outcome = self.orchestrator.process_order(order_id).await.unwrap();
        assert_eq!(outcome.status, Some(PreauthStatus::Submitted));
        self.request(outcome.request_id.unwrap()).await
    }
}

/// Every entry that records a transition, in ledger order
pub fn transition_entries(store: &InMemoryPreauthStore, request_id: Uuid) -> Vec<audit_engine::AuditEntry> {
    store
        .audit_log()
        .entries_for(request_id)
        .into_iter()
        .filter(|entry| entry.to_status.is_some())
        .collect()
}
