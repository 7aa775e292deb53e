// Fax channel
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use config_engine::FaxConfig;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use super::{SubmissionChannel, SubmissionOutcome};
use crate::clock::Clock;
use crate::error::{PreauthError, PreauthResult};
use crate::models::{PreauthRequest, PreauthRule, SubmissionMethod};

#[derive(Debug, Clone)]
pub struct FaxDocument {
    pub filename: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaxReceipt {
    pub transmission_id: String,
    #[serde(default)]
    pub response: Value,
}

#[async_trait]
pub trait FaxGateway: Send + Sync {
    async fn send(&self, to: &str, from: Option<&str>, document: &FaxDocument) -> PreauthResult<FaxReceipt>;
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(alias = "id", alias = "fax_id")]
    transmission_id: String,
}

pub struct HttpFaxGateway {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpFaxGateway {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl FaxGateway for HttpFaxGateway {
    async fn send(&self, to: &str, from: Option<&str>, document: &FaxDocument) -> PreauthResult<FaxReceipt> {
        let mut request = self.client.post(&self.url).json(&json!({
            "to": to,
            "from": from,
            "filename": document.filename,
            "content_type": "application/pdf",
            "content": STANDARD.encode(&document.pdf),
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PreauthError::Integration(format!("fax gateway returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PreauthError::MalformedResponse(format!("fax gateway: {}", e)))?;
        let parsed: GatewayResponse = serde_json::from_value(body.clone())
            .map_err(|e| PreauthError::MalformedResponse(format!("fax gateway receipt: {}", e)))?;

        Ok(FaxReceipt {
            transmission_id: parsed.transmission_id,
            response: body,
        })
    }
}

// ============================================================================
// PDF FORM
// ============================================================================

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

/// Writes lines top-down, starting a new page when the current one fills
struct FormWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl FormWriter<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef, indent: f32) {
        if self.y < BOTTOM {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
        self.layer.use_text(text, size, Mm(20.0 + indent), Mm(self.y), font);
        self.y -= size * 0.5;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

/// Prior authorization request form with the necessity letter attached
pub fn render_fax_form(
    request: &PreauthRequest,
    rule: &PreauthRule,
    sender_name: Option<&str>,
    at: DateTime<Utc>,
) -> PreauthResult<Vec<u8>> {
    let title = "Prior Authorization Request";
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PreauthError::Integration(format!("PDF font error: {}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PreauthError::Integration(format!("PDF font error: {}", e)))?;

    {
        let mut writer = FormWriter {
            doc: &doc,
            layer: doc.get_page(page1).get_layer(layer1),
            y: TOP,
        };

        writer.line(title, 16.0, &bold, 0.0);
        writer.gap(4.0);
        writer.line(&format!("To: {} Utilization Review", request.carrier_name), 10.0, &font, 0.0);
        if let Some(fax) = &rule.fax_number {
            writer.line(&format!("Fax: {}", fax), 10.0, &font, 0.0);
        }
        writer.line(&format!("From: {}", sender_name.unwrap_or("DME Supplier")), 10.0, &font, 0.0);
        writer.line(&format!("Date: {}", at.format("%Y-%m-%d")), 10.0, &font, 0.0);
        writer.line(&format!("Reference: {}", request.id), 10.0, &font, 0.0);
        writer.gap(6.0);

        writer.line("MEMBER", 11.0, &bold, 0.0);
        writer.line(
            &format!("Member ID: {}", request.member_id.as_deref().unwrap_or("not on file")),
            10.0,
            &font,
            5.0,
        );
        if let Some(group) = &request.group_id {
            writer.line(&format!("Group ID: {}", group), 10.0, &font, 5.0);
        }
        writer.gap(4.0);

        writer.line("REQUESTED ITEM", 11.0, &bold, 0.0);
        writer.line(&format!("HCPCS: {}", request.hcpcs_code), 10.0, &font, 5.0);
        writer.line(&format!("Description: {}", request.product_name), 10.0, &font, 5.0);
        writer.line(&format!("Quantity: {}", request.quantity), 10.0, &font, 5.0);
        let diagnoses = request.diagnosis_codes();
        if !diagnoses.is_empty() {
            writer.line(&format!("ICD-10: {}", diagnoses.join(", ")), 10.0, &font, 5.0);
        }
        if let Some(instructions) = &rule.special_instructions {
            writer.gap(2.0);
            for line in wrap_text(&format!("Carrier instructions: {}", instructions), 90) {
                writer.line(&line, 9.0, &font, 5.0);
            }
        }
        writer.gap(6.0);

        writer.line("LETTER OF MEDICAL NECESSITY", 11.0, &bold, 0.0);
        for line in wrap_text(&request.medical_necessity_letter, 95) {
            writer.line(&line, 9.0, &font, 5.0);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| PreauthError::Integration(format!("PDF save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| PreauthError::Integration(format!("PDF buffer error: {}", e)))
}

// ============================================================================
// CHANNEL
// ============================================================================

pub struct FaxChannel {
    config: FaxConfig,
    gateway: Option<Arc<dyn FaxGateway>>,
    clock: Arc<dyn Clock>,
}

impl FaxChannel {
    pub fn new(config: FaxConfig, gateway: Option<Arc<dyn FaxGateway>>, clock: Arc<dyn Clock>) -> Self {
        Self { config, gateway, clock }
    }

    pub fn from_config(config: FaxConfig, clock: Arc<dyn Clock>) -> Self {
        let gateway = config.gateway_url.as_ref().map(|url| {
            Arc::new(HttpFaxGateway::new(
                url.clone(),
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )) as Arc<dyn FaxGateway>
        });
        Self::new(config, gateway, clock)
    }
}

#[async_trait]
impl SubmissionChannel for FaxChannel {
    fn method(&self) -> SubmissionMethod {
        SubmissionMethod::Fax
    }

    async fn submit(&self, request: &PreauthRequest, rule: &PreauthRule) -> PreauthResult<SubmissionOutcome> {
        let to = rule
            .fax_number
            .as_deref()
            .filter(|number| !number.trim().is_empty())
            .ok_or_else(|| {
                PreauthError::Configuration(format!("no fax number on file for '{}'", rule.carrier_name))
            })?;
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| PreauthError::Configuration("fax gateway is not configured".to_string()))?;

        let pdf = render_fax_form(request, rule, self.config.sender_name.as_deref(), self.clock.now())?;
        let document = FaxDocument {
            filename: format!("preauth-{}.pdf", request.id),
            pdf,
        };
        let receipt = gateway
            .send(to, self.config.sender_number.as_deref(), &document)
            .await?;

        Ok(SubmissionOutcome::accepted(
            SubmissionMethod::Fax,
            "fax_gateway",
            Some(receipt.transmission_id),
            json!({
                "fax_number": to,
                "pages_bytes": document.pdf.len(),
                "gateway_response": receipt.response,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{Order, Patient};
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct CapturingGateway {
        sent: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl FaxGateway for CapturingGateway {
        async fn send(&self, to: &str, _from: Option<&str>, document: &FaxDocument) -> PreauthResult<FaxReceipt> {
            self.sent.lock().push((to.to_string(), document.pdf.len()));
            Ok(FaxReceipt {
                transmission_id: "FX-77".to_string(),
                response: json!({}),
            })
        }
    }

    fn request(letter: &str) -> PreauthRequest {
        let order = Order {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            hcpcs_code: "A6021".to_string(),
            product_name: "Collagen dressing".to_string(),
            quantity: 5,
            primary_diagnosis: Some("L97.412".to_string()),
            secondary_diagnoses: vec![],
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
            member_id: Some("M1".to_string()),
            group_id: None,
        };
        let mut request = PreauthRequest::from_order(&order, &patient, "Acme", Utc::now());
        request.medical_necessity_letter = letter.to_string();
        request
    }

    #[test]
    fn test_form_renders_pdf_across_pages() {
        let long_letter = "Clinically indicated. ".repeat(800);
        let rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Fax);
        let pdf = render_fax_form(&request(&long_letter), &rule, Some("Supplier"), Utc::now()).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn test_wrap_text_keeps_paragraphs() {
        let lines = wrap_text("one two three\n\nfour", 8);
        assert_eq!(lines, vec!["one two", "three", "", "four"]);
    }

    #[tokio::test]
    async fn test_missing_fax_number_is_hard_failure() {
        let gateway = Arc::new(CapturingGateway::default());
        let channel = FaxChannel::new(FaxConfig::default(), Some(gateway.clone()), Arc::new(SystemClock));
        let rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Fax);

        let err = channel.submit(&request("letter"), &rule).await.unwrap_err();
        assert!(matches!(err, PreauthError::Configuration(_)));
        assert!(gateway.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_gateway_is_hard_failure() {
        let channel = FaxChannel::new(FaxConfig::default(), None, Arc::new(SystemClock));
        let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Fax);
        rule.fax_number = Some("800-555-0199".to_string());
        assert!(channel.submit(&request("letter"), &rule).await.is_err());
    }

    #[tokio::test]
    async fn test_fax_is_sent_to_rule_number() {
        let gateway = Arc::new(CapturingGateway::default());
        let channel = FaxChannel::new(FaxConfig::default(), Some(gateway.clone()), Arc::new(SystemClock));
        let mut rule = PreauthRule::new("Acme", "A6021", true, SubmissionMethod::Fax);
        rule.fax_number = Some("800-555-0199".to_string());

        let outcome = channel.submit(&request("letter"), &rule).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.external_tracking_id.as_deref(), Some("FX-77"));
        let sent = gateway.sent.lock();
        assert_eq!(sent[0].0, "800-555-0199");
        assert!(sent[0].1 > 0);
    }
}
