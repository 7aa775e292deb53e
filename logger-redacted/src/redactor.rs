use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref SSN_REGEX: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"(?:\+1[-.\s]?)?\(?\b[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b").unwrap();
    static ref ISO_DATE_REGEX: Regex = Regex::new(r"\b(?:19|20)\d{2}-\d{2}-\d{2}\b").unwrap();
    static ref US_DATE_REGEX: Regex = Regex::new(r"\b\d{1,2}/\d{1,2}/(?:19|20)\d{2}\b").unwrap();
}

/// Metadata keys whose values never reach the audit log in clear text
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "api_key",
    "secret",
    "access_token",
    "authorization",
    "ssn",
    "date_of_birth",
    "dob",
];

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_ssn: bool,
    pub redact_dates: bool,
    pub hash_for_correlation: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_ssn: true,
            redact_dates: true,
            hash_for_correlation: true,
        }
    }
}

/// PHI redactor for free text headed to logs
///
/// Carrier and clearinghouse error messages routinely echo the member's
/// date of birth or a callback number; they go through here before being
/// logged.
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_emails {
            result = self.replace(&EMAIL_REGEX, &result, "EMAIL", "***@***");
        }

        // SSN before phone: the phone pattern would otherwise eat part of it
        if self.config.redact_ssn {
            result = self.replace(&SSN_REGEX, &result, "SSN", "***-**-****");
        }

        if self.config.redact_dates {
            result = self.replace(&ISO_DATE_REGEX, &result, "DATE", "****-**-**");
            result = self.replace(&US_DATE_REGEX, &result, "DATE", "**/**/****");
        }

        if self.config.redact_phones {
            result = self.replace(&PHONE_REGEX, &result, "PHONE", "(***) ***-****");
        }

        result
    }

    fn replace(&self, pattern: &Regex, text: &str, label: &str, mask: &str) -> String {
        pattern
            .replace_all(text, |caps: &regex::Captures| {
                if self.config.hash_for_correlation {
                    format!("{}[{}]", label, hash_value(&caps[0]))
                } else {
                    mask.to_string()
                }
            })
            .to_string()
    }
}

/// Mask an identifier, keeping the last four characters
///
/// `"W123456789"` becomes `"******6789"`. Identifiers of four characters or
/// fewer are masked entirely.
pub fn mask_identifier(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible = chars.len() - 4;
    let mut masked = "*".repeat(visible);
    masked.extend(chars.iter().skip(visible));
    masked
}

/// Redact sensitive fields from structured metadata, recursively
pub fn redact_metadata(mut metadata: JsonValue) -> JsonValue {
    redact_in_place(&mut metadata);
    metadata
}

fn redact_in_place(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, field) in map.iter_mut() {
                let lowered = key.to_ascii_lowercase();
                if SENSITIVE_KEYS.iter().any(|sensitive| lowered == *sensitive) {
                    *field = JsonValue::String("***REDACTED***".to_string());
                } else {
                    redact_in_place(field);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    general_purpose::STANDARD.encode(&result[..8]) // Use first 8 bytes for shorter hash
}
