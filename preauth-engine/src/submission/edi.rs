// EDI 278 channel
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config_engine::EdiConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{CarrierDecision, StatusCheck, SubmissionChannel, SubmissionOutcome};
use crate::clock::Clock;
use crate::error::{PreauthError, PreauthResult};
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

// ============================================================================
// X12 278 PAYLOAD
// ============================================================================

/// Interchange parties for the envelope
#[derive(Debug, Clone)]
pub struct Edi278Parties {
    pub submitter_id: String,
    pub receiver_id: String,
}

/// Strip X12 delimiters and normalise case
fn element(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '*' | '~' | ':' | '^'))
        .collect::<String>()
        .trim()
        .to_ascii_uppercase()
}

fn padded(value: &str, width: usize) -> String {
    let mut value = element(value);
    value.truncate(width);
    format!("{:<width$}", value, width = width)
}

/// Nine-digit interchange control number derived from the request id
pub fn control_number(request: &PreauthRequest) -> u32 {
    // Always below 10^9, so the narrowing is lossless
    (request.id.as_u128() % 1_000_000_000) as u32
}

/// Services review request (005010X217) for one DME line
///
/// Carries the envelope, requester, subscriber, diagnoses and a single
/// service line. Carrier-specific loops are left to the clearinghouse.
pub fn build_278(request: &PreauthRequest, parties: &Edi278Parties, at: DateTime<Utc>) -> String {
    let control = control_number(request);
    let date_short = at.format("%y%m%d").to_string();
    let date_long = at.format("%Y%m%d").to_string();
    let time = at.format("%H%M").to_string();
    let submitter = element(&parties.submitter_id);
    let receiver = element(&parties.receiver_id);

    let mut transaction: Vec<String> = vec![
        "ST*278*0001*005010X217".to_string(),
        format!("BHT*0007*13*{}*{}*{}", request.id.simple(), date_long, time),
        "HL*1**20*1".to_string(),
        format!("NM1*X3*2*{}*****PI*{}", element(&request.carrier_name), receiver),
        "HL*2*1*21*1".to_string(),
        format!("NM1*1P*2*{}*****46*{}", submitter, submitter),
        "HL*3*2*22*1".to_string(),
        format!(
            "NM1*IL*1******MI*{}",
            element(request.member_id.as_deref().unwrap_or_default())
        ),
    ];
    if let Some(group) = &request.group_id {
        transaction.push(format!("REF*6P*{}", element(group)));
    }
    transaction.push("HL*4*3*EV*1".to_string());
    transaction.push(format!("TRN*1*{}*{}", control, submitter));
    transaction.push("UM*HS*I*12".to_string());

    let diagnoses: Vec<String> = request
        .diagnosis_codes()
        .iter()
        .enumerate()
        .map(|(idx, code)| {
            let qualifier = if idx == 0 { "ABK" } else { "ABF" };
            format!("{}:{}", qualifier, element(code).replace('.', ""))
        })
        .collect();
    if !diagnoses.is_empty() {
        transaction.push(format!("HI*{}", diagnoses.join("*")));
    }

    transaction.push("HL*5*4*SS*0".to_string());
    transaction.push(format!("SV1*HC:{}**UN*{}", element(&request.hcpcs_code), request.quantity));
    let segment_count = transaction.len() + 1;
    transaction.push(format!("SE*{}*0001", segment_count));

    let mut segments = vec![
        format!(
            "ISA*00*{}*00*{}*ZZ*{}*ZZ*{}*{}*{}*^*00501*{:09}*0*P*:",
            " ".repeat(10),
            " ".repeat(10),
            padded(&submitter, 15),
            padded(&receiver, 15),
            date_short,
            time,
            control
        ),
        format!("GS*HI*{}*{}*{}*{}*{}*X*005010X217", submitter, receiver, date_long, time, control),
    ];
    segments.extend(transaction);
    segments.push(format!("GE*1*{}", control));
    segments.push(format!("IEA*1*{:09}", control));

    segments.iter().map(|segment| format!("{}~", segment)).collect::<Vec<_>>().join("\n")
}

// ============================================================================
// CLEARINGHOUSE CLIENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearinghouseReceipt {
    pub tracking_id: String,
    #[serde(default)]
    pub response: Value,
}

#[async_trait]
pub trait ClearinghouseClient: Send + Sync {
    async fn submit_278(&self, payload: &str) -> PreauthResult<ClearinghouseReceipt>;

    async fn inquire(&self, tracking_id: &str) -> PreauthResult<StatusCheck>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "trace_number", alias = "transaction_id")]
    tracking_id: String,
}

#[derive(Debug, Deserialize)]
struct InquiryResponse {
    status: String,
    #[serde(default)]
    authorization_number: Option<String>,
}

pub struct HttpClearinghouseClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClearinghouseClient {
    pub fn new(base_url: &str, username: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ClearinghouseClient for HttpClearinghouseClient {
    async fn submit_278(&self, payload: &str) -> PreauthResult<ClearinghouseReceipt> {
        let response = self
            .client
            .post(self.url("x12/278"))
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_TYPE, "application/edi-x12")
            .body(payload.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PreauthError::Integration(format!("clearinghouse returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PreauthError::MalformedResponse(format!("clearinghouse: {}", e)))?;
        let parsed: SubmitResponse = serde_json::from_value(body.clone())
            .map_err(|e| PreauthError::MalformedResponse(format!("clearinghouse receipt: {}", e)))?;

        Ok(ClearinghouseReceipt {
            tracking_id: parsed.tracking_id,
            response: body,
        })
    }

    async fn inquire(&self, tracking_id: &str) -> PreauthResult<StatusCheck> {
        let response = self
            .client
            .get(self.url(&format!("x12/278/{}", tracking_id)))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PreauthError::Integration(format!(
                "clearinghouse inquiry returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PreauthError::MalformedResponse(format!("clearinghouse inquiry: {}", e)))?;
        let parsed: InquiryResponse = serde_json::from_value(body.clone())
            .map_err(|e| PreauthError::MalformedResponse(format!("clearinghouse inquiry: {}", e)))?;

        Ok(StatusCheck {
            decision: CarrierDecision::from_carrier_status(&parsed.status),
            authorization_number: parsed.authorization_number,
            response_data: body,
        })
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

pub struct EdiChannel {
    config: EdiConfig,
    client: Option<Arc<dyn ClearinghouseClient>>,
    clock: Arc<dyn Clock>,
}

impl EdiChannel {
    pub fn new(config: EdiConfig, client: Option<Arc<dyn ClearinghouseClient>>, clock: Arc<dyn Clock>) -> Self {
        Self { config, client, clock }
    }

    /// Wires an HTTP client when the clearinghouse is fully configured
    pub fn from_config(config: EdiConfig, clock: Arc<dyn Clock>) -> Self {
        let client = match (&config.clearinghouse_url, &config.username, &config.password) {
            (Some(url), Some(user), Some(password)) => Some(Arc::new(HttpClearinghouseClient::new(
                url,
                user.clone(),
                password.clone(),
                Duration::from_secs(config.timeout_secs),
            )) as Arc<dyn ClearinghouseClient>),
            _ => None,
        };
        Self::new(config, client, clock)
    }

    fn parties(&self, rule: &PreauthRule) -> PreauthResult<Edi278Parties> {
        let missing: Vec<&str> = [
            (self.config.clearinghouse_url.is_none(), "clearinghouse_url"),
            (self.config.username.is_none(), "username"),
            (self.config.password.is_none(), "password"),
            (self.config.submitter_id.is_none(), "submitter_id"),
        ]
        .iter()
        .filter(|(absent, _)| *absent)
        .map(|(_, name)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(PreauthError::Configuration(format!(
                "clearinghouse credentials missing: {}",
                missing.join(", ")
            )));
        }

        Ok(Edi278Parties {
            submitter_id: self.config.submitter_id.clone().unwrap_or_default(),
            receiver_id: self
                .config
                .receiver_id
                .clone()
                .unwrap_or_else(|| rule.carrier_name.clone()),
        })
    }
}

#[async_trait]
impl SubmissionChannel for EdiChannel {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Edi
    }

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        if !self.config.enabled {
            return Err(PreauthError::Configuration("EDI submission is disabled".to_string()));
        }
        if !rule.edi_enabled {
            return Err(PreauthError::Configuration(format!(
                "carrier '{}' is not enrolled for EDI",
                rule.carrier_name
            )));
        }
        let parties = self.parties(rule)?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PreauthError::Configuration("no clearinghouse client configured".to_string()))?;

        let payload = build_278(request, &parties, self.clock.now());
        let receipt = client.submit_278(&payload).await?;

        Ok(SubmissionOutcome::accepted(
            SubmissionMethod::Edi,
            "clearinghouse",
            Some(receipt.tracking_id),
            json!({
                "transaction": "278",
                "control_number": control_number(request),
                "clearinghouse_response": receipt.response,
            }),
        ))
    }

    async fn check_status(&self, request: &PreauthRequest) -> PreauthResult<StatusCheck> {
        let tracking = request.external_tracking_id.as_deref().ok_or_else(|| {
            PreauthError::Validation(format!("request {} has no clearinghouse tracking id", request.id))
        })?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| PreauthError::Configuration("no clearinghouse client configured".to_string()))?;
        client.inquire(tracking).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Order, Patient};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingClearinghouse {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClearinghouseClient for RecordingClearinghouse {
        async fn submit_278(&self, payload: &str) -> PreauthResult<ClearinghouseReceipt> {
            self.payloads.lock().push(payload.to_string());
            Ok(ClearinghouseReceipt {
                tracking_id: "TRK-1".to_string(),
                response: json!({"accepted": true}),
            })
        }

        async fn inquire(&self, _tracking_id: &str) -> PreauthResult<StatusCheck> {
            Ok(StatusCheck {
                decision: CarrierDecision::Approved,
                authorization_number: Some("AUTH9".to_string()),
                response_data: json!({}),
            })
        }
    }

    fn request() -> PreauthRequest {
        let order = Order {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            hcpcs_code: "a6021".to_string(),
            product_name: "Collagen dressing".to_string(),
            quantity: 5,
            primary_diagnosis: Some("L97.412".to_string()),
            secondary_diagnoses: vec!["E11.621".to_string()],
            wound: None,
            physician_name: None,
            physician_notes: None,
            service_date: None,
        };
        let patient = Patient {
            id: order.patient_id,
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            date_of_birth: None,
            insurance_provider: Some("Acme".to_string()),
            member_id: Some("W123*456".to_string()),
            group_id: None,
        };
        PreauthRequest::from_order(&order, &patient, "Acme", Utc::now())
    }

    fn full_config() -> EdiConfig {
        EdiConfig {
            enabled: true,
            clearinghouse_url: Some("https://ch.example".to_string()),
            username: Some("user".to_string()),
            password: Some("pw".to_string()),
            submitter_id: Some("SUB01".to_string()),
            receiver_id: Some("ACME01".to_string()),
            ..EdiConfig::default()
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()))
    }

    #[test]
    fn test_278_envelope_and_segment_count() {
        let parties = Edi278Parties {
            submitter_id: "SUB01".to_string(),
            receiver_id: "ACME01".to_string(),
        };
        let payload = build_278(&request(), &parties, Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap());
        let segments: Vec<&str> = payload.lines().collect();

        assert!(segments[0].starts_with("ISA*00*"));
        assert!(segments[0].contains("*240501*0930*"));
        assert!(payload.contains("SV1*HC:A6021**UN*5~"));
        assert!(payload.contains("HI*ABK:L97412*ABF:E11621~"));
        // Delimiters inside data are stripped
        assert!(payload.contains("MI*W123456~"));

        let st = segments.iter().position(|s| s.starts_with("ST*")).unwrap();
        let se = segments.iter().position(|s| s.starts_with("SE*")).unwrap();
        assert_eq!(segments[se], format!("SE*{}*0001~", se - st + 1));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_hard_failure() {
        let mut config = full_config();
        config.password = None;
        config.submitter_id = None;
        let channel = EdiChannel::new(config, Some(Arc::new(RecordingClearinghouse::default())), clock());
        let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Edi);
        rule.edi_enabled = true;

        let err = channel.submit(&request(), &rule).await.unwrap_err();
        assert!(matches!(err, PreauthError::Configuration(ref msg) if msg.contains("password, submitter_id")));
    }

    #[tokio::test]
    async fn test_submission_returns_tracking_id() {
        let clearinghouse = Arc::new(RecordingClearinghouse::default());
        let channel = EdiChannel::new(full_config(), Some(clearinghouse.clone()), clock());
        let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Edi);
        rule.edi_enabled = true;

        let outcome = channel.submit(&request(), &rule).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.external_tracking_id.as_deref(), Some("TRK-1"));
        assert_eq!(clearinghouse.payloads.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_without_edi_enrollment_fails() {
        let channel = EdiChannel::new(full_config(), Some(Arc::new(RecordingClearinghouse::default())), clock());
        let rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Edi);
        assert!(channel.submit(&request(), &rule).await.is_err());
    }
}
