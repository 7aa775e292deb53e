// Manual (staff) channel
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{SubmissionChannel, SubmissionOutcome};
use crate::error::PreauthResult;
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

/// Everything staff need to submit by hand without re-deriving context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionSheet {
    pub carrier_name: String,
    pub member_id: Option<String>,
    pub group_id: Option<String>,
    pub hcpcs_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub diagnosis_codes: Vec<String>,
    pub carrier_phone: Option<String>,
    pub carrier_fax: Option<String>,
    pub portal_url: Option<String>,
    pub special_instructions: Option<String>,
    pub document_checklist: Vec<String>,
    pub staff_queue: String,
}

impl InstructionSheet {
    pub fn build(request: &PreauthRequest, rule: &PreauthRule, staff_queue: &str) -> Self {
        let mut checklist = vec![
            "Signed physician order (detailed written order)".to_string(),
            "Letter of medical necessity (stored on this request)".to_string(),
        ];
        let diagnoses = request.diagnosis_codes();
        if diagnoses.is_empty() {
            checklist.push("Clinical notes establishing the diagnosis (no ICD-10 code on file)".to_string());
        } else {
            checklist.push(format!("Clinical notes supporting ICD-10 {}", diagnoses.join(", ")));
        }
        // A6xxx are wound dressings
        if request.hcpcs_code.to_ascii_uppercase().starts_with("A6") {
            checklist.push("Wound assessment with current measurements".to_string());
        }
        checklist.push("Copy of the patient's insurance card".to_string());

        Self {
            carrier_name: request.carrier_name.clone(),
            member_id: request.member_id.clone(),
            group_id: request.group_id.clone(),
            hcpcs_code: request.hcpcs_code.clone(),
            product_name: request.product_name.clone(),
            quantity: request.quantity,
            diagnosis_codes: diagnoses,
            carrier_phone: rule.phone_number.clone(),
            carrier_fax: rule.fax_number.clone(),
            portal_url: rule.portal_url.clone(),
            special_instructions: rule.special_instructions.clone(),
            document_checklist: checklist,
            staff_queue: staff_queue.to_string(),
        }
    }
}

/// Flags the request for staff; always an orchestration success
pub struct ManualChannel {
    staff_queue: String,
}

impl ManualChannel {
    pub fn new(staff_queue: impl Into<String>) -> Self {
        Self {
            staff_queue: staff_queue.into(),
        }
    }
}

#[async_trait]
impl SubmissionChannel for ManualChannel {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Manual
    }

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        let sheet = InstructionSheet::build(request, rule, &self.staff_queue);
        let mut outcome = SubmissionOutcome::accepted(
            SubmissionMethod::Manual,
            "staff_queue",
            None,
            json!({ "instruction_sheet": sheet }),
        );
        outcome.requires_manual_submission = true;
        Ok(outcome)
    }
}
