// Necessity Document Generator
use async_trait::async_trait;
use chrono::NaiveDate;
use config_engine::NecessityConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PreauthError, PreauthResult};
use crate::models::{Order, Patient};

/// External text-generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> PreauthResult<String>;
}

/// Completion endpoint speaking a minimal JSON protocol
///
/// Accepts `{"text": ..}`, `{"completion": ..}`, OpenAI-style `choices` and
/// Anthropic-style `content` blocks in the response.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl HttpTextGenerator {
    pub fn new(config: &NecessityConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> PreauthResult<String> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "prompt": prompt,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(PreauthError::Integration(format!("text generator returned {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PreauthError::MalformedResponse(format!("text generator: {}", e)))?;

        extract_text(&body)
            .ok_or_else(|| PreauthError::MalformedResponse("text generator response had no text".to_string()))
    }
}

fn extract_text(body: &Value) -> Option<String> {
    let candidates = [
        body.get("text"),
        body.get("completion"),
        body.pointer("/choices/0/message/content"),
        body.pointer("/choices/0/text"),
        body.pointer("/content/0/text"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Facts pulled from the order and patient; the letter says nothing else
#[derive(Debug, Clone)]
pub struct NecessityFacts {
    pub patient_name: String,
    pub age: Option<u32>,
    pub diagnoses: Vec<String>,
    pub hcpcs_code: String,
    pub product_name: String,
    pub quantity: u32,
    pub wound_summary: Option<String>,
    pub physician_name: Option<String>,
    pub physician_notes: Option<String>,
}

impl NecessityFacts {
    pub fn gather(order: &Order, patient: &Patient, today: NaiveDate) -> Self {
        let wound_summary = order.wound.as_ref().and_then(|wound| {
            let parts: Vec<String> = [
                wound.wound_type.clone(),
                wound.location.as_ref().map(|loc| format!("located at {}", loc)),
                wound.dimensions().map(|dims| format!("measuring {}", dims)),
                wound.drainage.as_ref().map(|d| format!("with {} drainage", d)),
            ]
            .into_iter()
            .flatten()
            .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        });

        Self {
            patient_name: patient.full_name(),
            age: patient.age_on(today),
            diagnoses: order
                .primary_diagnosis
                .iter()
                .chain(order.secondary_diagnoses.iter())
                .cloned()
                .collect(),
            hcpcs_code: order.hcpcs_code.clone(),
            product_name: order.product_name.clone(),
            quantity: order.quantity,
            wound_summary,
            physician_name: order.physician_name.clone(),
            physician_notes: order.physician_notes.clone().filter(|notes| !notes.trim().is_empty()),
        }
    }

    fn age_phrase(&self) -> String {
        self.age
            .map(|age| format!("a {}-year-old patient", age))
            .unwrap_or_else(|| "the patient".to_string())
    }

    fn diagnosis_phrase(&self) -> String {
        if self.diagnoses.is_empty() {
            "the documented condition".to_string()
        } else {
            format!("ICD-10 {}", self.diagnoses.join(", "))
        }
    }

    pub fn prompt(&self) -> String {
        let mut prompt = String::from(
            "Write a concise, persuasive letter of medical necessity for an insurance prior \
             authorization. Use only the facts below and do not invent clinical details.\n\n",
        );
        prompt.push_str(&format!("Patient: {}\n", self.age_phrase()));
        prompt.push_str(&format!("Diagnoses: {}\n", self.diagnosis_phrase()));
        prompt.push_str(&format!(
            "Requested item: {} (HCPCS {}), quantity {}\n",
            self.product_name, self.hcpcs_code, self.quantity
        ));
        if let Some(wound) = &self.wound_summary {
            prompt.push_str(&format!("Wound: {}\n", wound));
        }
        if let Some(notes) = &self.physician_notes {
            prompt.push_str(&format!("Physician notes: {}\n", notes));
        }
        prompt
    }

    /// Deterministic letter from the same facts
    pub fn template_letter(&self) -> String {
        let mut letter = format!(
            "To the Utilization Review Department:\n\n\
             I am writing to request prior authorization of {} x {} (HCPCS {}) for {}, {}.\n\n",
            self.quantity,
            self.product_name,
            self.hcpcs_code,
            self.patient_name,
            self.age_phrase()
        );
        letter.push_str(&format!(
            "The patient is under treatment for {}. ",
            self.diagnosis_phrase()
        ));
        if let Some(wound) = &self.wound_summary {
            letter.push_str(&format!("Current wound assessment: {}. ", wound));
        }
        letter.push_str(&format!(
            "The requested {} is medically necessary to manage this condition and to prevent \
             deterioration, infection and avoidable hospitalization.\n\n",
            self.product_name
        ));
        if let Some(notes) = &self.physician_notes {
            letter.push_str(&format!("Physician notes: {}\n\n", notes));
        }
        letter.push_str("Please contact the ordering physician with any questions.\n\nSincerely,\n");
        letter.push_str(self.physician_name.as_deref().unwrap_or("Ordering Physician"));
        letter
    }
}

/// Produces the letter; never fails and never returns an empty string
pub struct NecessityGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl NecessityGenerator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn template_only() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    pub async fn generate(&self, order: &Order, patient: &Patient, today: NaiveDate) -> String {
        let facts = NecessityFacts::gather(order, patient, today);

        let Some(generator) = &self.generator else {
            return facts.template_letter();
        };

        match tokio::time::timeout(self.timeout, generator.generate(&facts.prompt())).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!(order_id = %order.id, "Necessity letter generated");
                text.trim().to_string()
            }
            Ok(Ok(_)) => {
                warn!(order_id = %order.id, "Text generator returned an empty letter; using template");
                facts.template_letter()
            }
            Ok(Err(e)) => {
                warn!(order_id = %order.id, error = %e, "Text generator failed; using template");
                facts.template_letter()
            }
            Err(_) => {
                warn!(order_id = %order.id, timeout_secs = self.timeout.as_secs(), "Text generator timed out; using template");
                facts.template_letter()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WoundMeasurements;
    use proptest::prelude::*;
    use uuid::Uuid;

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> PreauthResult<String> {
            Err(PreauthError::Integration("503".to_string()))
        }
    }

    struct Blank;

    #[async_trait]
    impl TextGenerator for Blank {
        async fn generate(&self, _prompt: &str) -> PreauthResult<String> {
            Ok("  \n".to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl TextGenerator for Slow {
        async fn generate(&self, _prompt: &str) -> PreauthResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn order() -> Order {
        Order {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            hcpcs_code: "A6021".to_string(),
            product_name: "Collagen dressing 2x2".to_string(),
            quantity: 5,
            primary_diagnosis: Some("L97.412".to_string()),
            secondary_diagnoses: vec!["E11.621".to_string()],
            wound: Some(WoundMeasurements {
                location: Some("right heel".to_string()),
                wound_type: Some("diabetic foot ulcer".to_string()),
                length_cm: Some(4.0),
                width_cm: Some(3.5),
                depth_cm: None,
                drainage: Some("moderate".to_string()),
            }),
            physician_name: Some("Dr. Rivera".to_string()),
            physician_notes: Some("Failed 4 weeks of standard dressings".to_string()),
            service_date: None,
        }
    }

    fn patient() -> Patient {
        Patient {
            id: Uuid::new_v4(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1950, 1, 10),
            insurance_provider: Some("Acme".to_string()),
            member_id: Some("M1".to_string()),
            group_id: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_prompt_carries_facts() {
        let prompt = NecessityFacts::gather(&order(), &patient(), today()).prompt();
        assert!(prompt.contains("74-year-old"));
        assert!(prompt.contains("L97.412, E11.621"));
        assert!(prompt.contains("4.0 x 3.5 cm"));
        assert!(prompt.contains("Failed 4 weeks"));
    }

    #[test]
    fn test_extract_text_shapes() {
        assert_eq!(extract_text(&json!({"text": " hi "})).as_deref(), Some("hi"));
        assert_eq!(
            extract_text(&json!({"choices": [{"message": {"content": "letter"}}]})).as_deref(),
            Some("letter")
        );
        assert_eq!(extract_text(&json!({"content": [{"text": "body"}]})).as_deref(), Some("body"));
        assert_eq!(extract_text(&json!({"text": ""})), None);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_template() {
        let generator = NecessityGenerator::new(Some(Arc::new(Failing)), Duration::from_secs(1));
        let letter = generator.generate(&order(), &patient(), today()).await;
        assert!(letter.contains("Collagen dressing 2x2"));
        assert!(letter.contains("Dr. Rivera"));
    }

    #[tokio::test]
    async fn test_blank_response_falls_back() {
        let generator = NecessityGenerator::new(Some(Arc::new(Blank)), Duration::from_secs(1));
        assert!(!generator.generate(&order(), &patient(), today()).await.trim().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let generator = NecessityGenerator::new(Some(Arc::new(Slow)), Duration::from_millis(50));
        let letter = generator.generate(&order(), &patient(), today()).await;
        assert!(letter.starts_with("To the Utilization Review Department"));
    }

    proptest! {
        #[test]
        fn prop_letter_never_empty(
            product in ".{0,30}",
            quantity in 0u32..500,
            diagnoses in proptest::collection::vec("[A-Z][0-9]{2}\\.[0-9]{1,3}", 0..4),
            notes in proptest::option::of(".{0,40}"),
        ) {
            let mut o = order();
            o.product_name = product;
            o.quantity = quantity;
            o.primary_diagnosis = diagnoses.first().cloned();
            o.secondary_diagnoses = diagnoses.iter().skip(1).cloned().collect();
            o.physician_notes = notes;
            o.wound = None;

            let generator = NecessityGenerator::new(Some(Arc::new(Failing)), Duration::from_secs(1));
            let letter = tokio_test::block_on(generator.generate(&o, &patient(), today()));
            prop_assert!(!letter.trim().is_empty());
        }
    }
}
