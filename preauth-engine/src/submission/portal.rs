// Carrier portal channel
//
// Browser automation is carrier-specific and not implemented. The channel
// reports an unsuccessful attempt that needs manual submission; the
// orchestrator escalates such outcomes to staff without retrying.
use async_trait::async_trait;
use serde_json::json;

use super::{InstructionSheet, SubmissionChannel, SubmissionOutcome};
use crate::error::PreauthResult;
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

pub struct PortalChannel {
    staff_queue: String,
}

impl PortalChannel {
    pub fn new(staff_queue: impl Into<String>) -> Self {
        Self {
            staff_queue: staff_queue.into(),
        }
    }
}

#[async_trait]
impl SubmissionChannel for PortalChannel {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Portal
    }

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        let portal = rule.portal_url.as_deref().unwrap_or("the carrier portal");
        let mut outcome = SubmissionOutcome::failed(
            SubmissionMethod::Portal,
            "carrier_portal",
            format!("Portal automation unavailable; submit manually via {}", portal),
        );
        outcome.requires_manual_submission = true;
        outcome.response_data = json!({
            "portal_url": rule.portal_url,
            "instruction_sheet": InstructionSheet::build(request, rule, &self.staff_queue),
        });
        Ok(outcome)
    }
}
