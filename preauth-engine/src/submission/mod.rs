//! Submission Router and channel strategies
//!
//! Dispatch is keyed purely by `PreauthRule::submission_method`. Each channel
//! implements [`SubmissionChannel`]; the router turns whatever a channel
//! returns, including errors, into one [`SubmissionOutcome`] shape so the
//! orchestrator never sees a raw integration error.
//!
//! | method | external system | notes |
//! |---|---|---|
//! | `api` | `carrier_api:<carrier>` | needs a registered [`api::CarrierApiAdapter`] |
//! | `edi` | `clearinghouse` | X12 278 through a [`edi::ClearinghouseClient`] |
//! | `portal` | `carrier_portal` | no automation; always hands off to staff as a failure |
//! | `fax` | `fax_gateway` | PDF form through a [`fax::FaxGateway`] |
//! | `manual` | `staff_queue` | always succeeds, flags staff with an instruction sheet |

pub mod api;
pub mod edi;
pub mod fax;
pub mod manual;
pub mod portal;

use async_trait::async_trait;
use logger_redacted::PiiRedactor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{PreauthError, PreauthResult};
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

pub use api::{ApiChannel, CarrierApiAdapter, CarrierReceipt};
pub use edi::{build_278, ClearinghouseClient, ClearinghouseReceipt, EdiChannel, HttpClearinghouseClient};
pub use fax::{render_fax_form, FaxChannel, FaxDocument, FaxGateway, FaxReceipt, HttpFaxGateway};
pub use manual::{InstructionSheet, ManualChannel};
pub use portal::PortalChannel;

/// Normalized result of one submission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub submission_method: SubmissionMethod,
    pub external_system: String,
    pub external_tracking_id: Option<String>,
    pub response_data: Value,
    pub error_message: Option<String>,
    /// A human has to finish this submission
    pub requires_manual_submission: bool,
}

impl SubmissionOutcome {
    pub fn accepted(
        method: SubmissionMethod,
        external_system: impl Into<String>,
        tracking_id: Option<String>,
        response_data: Value,
    ) -> Self {
        Self {
            success: true,
            submission_method: method,
            external_system: external_system.into(),
            external_tracking_id: tracking_id,
            response_data,
            error_message: None,
            requires_manual_submission: false,
        }
    }

    pub fn failed(method: SubmissionMethod, external_system: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            submission_method: method,
            external_system: external_system.into(),
            external_tracking_id: None,
            response_data: json!({}),
            error_message: Some(error.into()),
            requires_manual_submission: false,
        }
    }
}

/// Carrier decision as reported by a status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierDecision {
    Pending,
    Approved,
    Denied,
    NeedInfo,
    /// The channel cannot tell
    Unknown,
}

impl CarrierDecision {
    /// Lenient mapping of carrier/clearinghouse status words
    pub fn from_carrier_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "approved" | "certified" | "a1" => CarrierDecision::Approved,
            "denied" | "not_certified" | "rejected" | "a3" => CarrierDecision::Denied,
            "need_info" | "pended" | "additional_information" | "a4" => CarrierDecision::NeedInfo,
            "pending" | "in_review" | "received" | "submitted" => CarrierDecision::Pending,
            _ => CarrierDecision::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCheck {
    pub decision: CarrierDecision,
    pub authorization_number: Option<String>,
    pub response_data: Value,
}

impl StatusCheck {
    pub fn unknown() -> Self {
        Self {
            decision: CarrierDecision::Unknown,
            authorization_number: None,
            response_data: json!({}),
        }
    }
}

/// One submission channel strategy
#[async_trait]
pub trait SubmissionChannel: Send + Sync {
    fn method(&self) -> SubmissionMethod;

    /// Attempt a submission. Errors are treated as failed attempts.
    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome>;

    /// Poll for a carrier decision on a submitted request
    async fn check_status(&self, _request: &PreauthRequest) -> PreauthResult<StatusCheck> {
        Ok(StatusCheck::unknown())
    }
}

fn external_system_for(method: SubmissionMethod, rule: &PreauthRule) -> String {
    match method {
        SubmissionMethod::Api => format!("carrier_api:{}", rule.carrier_name.trim().to_ascii_lowercase()),
        SubmissionMethod::Edi => "clearinghouse".to_string(),
        SubmissionMethod::Portal => "carrier_portal".to_string(),
        SubmissionMethod::Fax => "fax_gateway".to_string(),
        SubmissionMethod::Manual => "staff_queue".to_string(),
    }
}

/// Method-keyed channel registry
#[derive(Clone, Default)]
pub struct SubmissionRouter {
    channels: Arc<RwLock<HashMap<SubmissionMethod, Arc<dyn SubmissionChannel>>>>,
    redactor: PiiRedactor,
}

impl SubmissionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any channel already registered for the same method
    pub async fn register(&self, channel: Arc<dyn SubmissionChannel>) {
        let mut channels = self.channels.write().await;
        channels.insert(channel.method(), channel);
    }

    pub async fn registered_methods(&self) -> Vec<SubmissionMethod> {
        self.channels.read().await.keys().copied().collect()
    }

    async fn channel(&self, method: SubmissionMethod) -> PreauthResult<Arc<dyn SubmissionChannel>> {
        self.channels
            .read()
            .await
            .get(&method)
            .cloned()
            .ok_or_else(|| PreauthError::AdapterMissing(format!("no {} channel registered", method)))
    }

    /// Never fails; every problem comes back as an unsuccessful outcome
    pub async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> SubmissionOutcome {
        let method = rule.submission_method;
        let external_system = external_system_for(method, rule);

        let result = match self.channel(method).await {
            Ok(channel) => channel.submit(request, rule).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                info!(
                    request_id = %request.id,
                    method = %method,
                    success = outcome.success,
                    manual = outcome.requires_manual_submission,
                    tracking = ?outcome.external_tracking_id,
                    "Submission attempt finished"
                );
                outcome
            }
            Err(e) => {
                let message = self.redactor.redact(&e.to_string());
                warn!(
                    request_id = %request.id,
                    method = %method,
                    carrier = %request.carrier_name,
                    error = %message,
                    "Submission attempt failed"
                );
                let mut outcome = SubmissionOutcome::failed(method, external_system, message);
                outcome.response_data = json!({ "error_code": error_common::Categorized::code(&e) });
                outcome
            }
        }
    }

    /// Poll through the channel the request was submitted with
    pub async fn check_status(&self, request: &PreauthRequest) -> PreauthResult<StatusCheck> {
        let method = request.submission_method.ok_or_else(|| {
            PreauthError::Validation(format!("request {} has no submission method", request.id))
        })?;
        self.channel(method).await?.check_status(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    #[async_trait]
    impl SubmissionChannel for Exploding {
        fn method(&self) -> SubmissionMethod {
            SubmissionMethod::Fax
        }

        async fn submit(&self, _: &PreauthRequest, _: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
            Err(PreauthError::Timeout("gateway did not answer 555-123-4567".to_string()))
        }
    }

    fn request() -> PreauthRequest {
        serde_json::from_value(json!({
            "id": uuid::Uuid::new_v4(),
            "order_id": uuid::Uuid::new_v4(),
            "patient_id": uuid::Uuid::new_v4(),
            "carrier_name": "Acme",
            "member_id": "M1",
            "group_id": null,
            "hcpcs_code": "A6021",
            "product_name": "Dressing",
            "quantity": 5,
            "primary_diagnosis": null,
            "secondary_diagnoses": [],
            "physician_notes": null,
            "medical_necessity_letter": "letter",
            "submission_method": null,
            "external_tracking_id": null,
            "carrier_response": null,
            "retry_count": 0,
            "last_retry_at": null,
            "next_retry_at": null,
            "submitted_at": null,
            "status": "pending",
            "requires_manual_verification": false,
            "claimed_until": null,
            "version": 1,
            "created_at": "2024-05-01T00:00:00Z",
            "updated_at": "2024-05-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_channel_is_a_failed_outcome() {
        let router = SubmissionRouter::new();
        let rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Api);
        let outcome = router.submit(&request(), &rule).await;
        assert!(!outcome.success);
        assert_eq!(outcome.external_system, "carrier_api:acme");
        assert!(outcome.error_message.unwrap().contains("no api channel"));
    }

    #[tokio::test]
    async fn test_channel_error_is_normalized_and_redacted() {
        let router = SubmissionRouter::new();
        router.register(Arc::new(Exploding)).await;
        let rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Fax);

        let outcome = router.submit(&request(), &rule).await;
        assert!(!outcome.success);
        assert_eq!(outcome.submission_method, SubmissionMethod::Fax);
        assert!(!outcome.error_message.unwrap().contains("555-123-4567"));
        assert_eq!(outcome.response_data["error_code"], "INTEGRATION_2003");
    }

    #[test]
    fn test_carrier_status_words() {
        assert_eq!(CarrierDecision::from_carrier_status("Certified"), CarrierDecision::Approved);
        assert_eq!(CarrierDecision::from_carrier_status("A3"), CarrierDecision::Denied);
        assert_eq!(CarrierDecision::from_carrier_status("pended"), CarrierDecision::NeedInfo);
        assert_eq!(CarrierDecision::from_carrier_status("in_review"), CarrierDecision::Pending);
        assert_eq!(CarrierDecision::from_carrier_status("??"), CarrierDecision::Unknown);
    }
}
