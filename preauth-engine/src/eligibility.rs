// Eligibility Resolver
//
// Cache first, then the optional real-time checker, then the assumed-eligible
// fallback. Missing inputs are a hard "not eligible", never assumed.
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use config_engine::EligibilityConfig;
use logger_redacted::{mask_identifier, PiiRedactor};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{PreauthError, PreauthResult};
use crate::models::{EligibilityRecord, VerificationMethod};
use crate::store::EligibilityCache;

/// Where an eligibility verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilitySource {
    Cache,
    RealTime,
    Assumed,
    ValidationFailed,
}

impl EligibilitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilitySource::Cache => "cache",
            EligibilitySource::RealTime => "real_time",
            EligibilitySource::Assumed => "assumed",
            EligibilitySource::ValidationFailed => "validation_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityQuery {
    pub carrier_name: Option<String>,
    pub member_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub service_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityOutcome {
    pub eligible: bool,
    pub reason: String,
    pub details: serde_json::Value,
    pub source: EligibilitySource,
    /// Set when eligibility was assumed; must reach audit and notifications
    pub requires_manual_verification: bool,
}

/// Verdict returned by a live payer check (270/271 or carrier API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealTimeVerdict {
    pub eligible: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[async_trait]
pub trait RealTimeEligibilityChecker: Send + Sync {
    async fn check(
        &self,
        carrier_name: &str,
        member_id: &str,
        date_of_birth: NaiveDate,
        service_date: NaiveDate,
    ) -> PreauthResult<RealTimeVerdict>;
}

/// JSON-over-HTTP eligibility gateway
pub struct HttpRealTimeEligibilityChecker {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpRealTimeEligibilityChecker {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: std::time::Duration) -> Self {
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

    /// Build from config; `None` when real-time checks are disabled or unconfigured
    pub fn from_config(config: &EligibilityConfig) -> Option<Self> {
        if !config.real_time_enabled {
            return None;
        }
        let url = config.real_time_url.as_ref()?;
        Some(Self::new(
            url.clone(),
            config.real_time_api_key.clone(),
            std::time::Duration::from_secs(config.timeout_secs),
        ))
    }
}

#[async_trait]
impl RealTimeEligibilityChecker for HttpRealTimeEligibilityChecker {
    async fn check(
        &self,
        carrier_name: &str,
        member_id: &str,
        date_of_birth: NaiveDate,
        service_date: NaiveDate,
    ) -> PreauthResult<RealTimeVerdict> {
        let payload = json!({
            "carrier_name": carrier_name,
            "member_id": member_id,
            "date_of_birth": date_of_birth,
            "service_date": service_date,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PreauthError::Integration(format!(
                "eligibility gateway returned {}: {}",
                status, body
            )));
        }

        response
            .json::<RealTimeVerdict>()
            .await
            .map_err(|e| PreauthError::MalformedResponse(format!("eligibility gateway: {}", e)))
    }
}

pub struct EligibilityResolver {
    config: EligibilityConfig,
    cache: Arc<dyn EligibilityCache>,
    real_time: Option<Arc<dyn RealTimeEligibilityChecker>>,
    clock: Arc<dyn Clock>,
    redactor: PiiRedactor,
}

impl EligibilityResolver {
    pub fn new(
        config: EligibilityConfig,
        cache: Arc<dyn EligibilityCache>,
        real_time: Option<Arc<dyn RealTimeEligibilityChecker>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            cache,
            real_time,
            clock,
            redactor: PiiRedactor::default(),
        }
    }

    pub async fn resolve(&self, query: &EligibilityQuery) -> PreauthResult<EligibilityOutcome> {
        let carrier = query.carrier_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let member_id = query.member_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let (Some(carrier), Some(member_id), Some(dob)) = (carrier, member_id, query.date_of_birth) else {
            let missing: Vec<&str> = [
                (carrier.is_none(), "carrier_name"),
                (member_id.is_none(), "member_id"),
                (query.date_of_birth.is_none(), "date_of_birth"),
            ]
            .iter()
            .filter(|(absent, _)| *absent)
            .map(|(_, name)| *name)
            .collect();

            return Ok(EligibilityOutcome {
                eligible: false,
                reason: format!("Missing required eligibility input: {}", missing.join(", ")),
                details: json!({ "missing": missing }),
                source: EligibilitySource::ValidationFailed,
                requires_manual_verification: false,
            });
        };

        let now = self.clock.now();

        if let Some(record) = self.cache.find(member_id, carrier).await? {
            let ttl = Duration::days(i64::from(self.config.cache_ttl_days));
            if record.verified_at + ttl > now {
                info!(
                    member = %mask_identifier(member_id),
                    carrier,
                    eligible = record.eligible,
                    "Eligibility served from cache"
                );
                return Ok(EligibilityOutcome {
                    eligible: record.eligible,
                    reason: record.notes.clone().unwrap_or_else(|| {
                        format!("Verified {} via {}", record.verified_at.date_naive(), record.verification_method.as_str())
                    }),
                    details: json!({
                        "verification_method": record.verification_method.as_str(),
                        "verified_at": record.verified_at,
                        "verified_by": record.verified_by,
                    }),
                    source: EligibilitySource::Cache,
                    requires_manual_verification: false,
                });
            }
        }

        if self.config.real_time_enabled {
            if let Some(checker) = &self.real_time {
                match checker.check(carrier, member_id, dob, query.service_date).await {
                    Ok(verdict) => {
                        let record = EligibilityRecord {
                            member_id: member_id.to_string(),
                            carrier_name: carrier.to_string(),
                            eligible: verdict.eligible,
                            verification_method: VerificationMethod::RealTime,
                            notes: verdict.notes.clone(),
                            verified_by: None,
                            details: verdict.details.clone(),
                            verified_at: now,
                        };
                        self.cache.upsert(record).await?;

                        return Ok(EligibilityOutcome {
                            eligible: verdict.eligible,
                            reason: verdict.notes.unwrap_or_else(|| "Verified in real time".to_string()),
                            details: verdict.details,
                            source: EligibilitySource::RealTime,
                            requires_manual_verification: false,
                        });
                    }
                    Err(e) => {
                        warn!(
                            member = %mask_identifier(member_id),
                            carrier,
                            error = %self.redactor.redact(&e.to_string()),
                            "Real-time eligibility check failed; falling back"
                        );
                    }
                }
            }
        }

        warn!(
            member = %mask_identifier(member_id),
            carrier,
            "No eligibility proof available; assuming eligible pending manual verification"
        );
        Ok(EligibilityOutcome {
            eligible: true,
            reason: "Eligibility assumed; manual verification required".to_string(),
            details: json!({ "assumed": true }),
            source: EligibilitySource::Assumed,
            requires_manual_verification: true,
        })
    }

    /// Staff override written straight into the cache
    pub async fn record_manual_eligibility(
        &self,
        member_id: &str,
        carrier_name: &str,
        eligible: bool,
        notes: Option<String>,
        verified_by: &str,
    ) -> PreauthResult<EligibilityRecord> {
        let member_id = member_id.trim();
        let carrier_name = carrier_name.trim();
        if member_id.is_empty() || carrier_name.is_empty() {
            return Err(PreauthError::Validation(
                "member_id and carrier_name are required".to_string(),
            ));
        }
        if verified_by.trim().is_empty() {
            return Err(PreauthError::Validation("verified_by is required".to_string()));
        }

        let record = EligibilityRecord {
            member_id: member_id.to_string(),
            carrier_name: carrier_name.to_string(),
            eligible,
            verification_method: VerificationMethod::Manual,
            notes,
            verified_by: Some(verified_by.trim().to_string()),
            details: json!({}),
            verified_at: self.clock.now(),
        };

        let stored = self.cache.upsert(record).await?;
        info!(
            member = %mask_identifier(member_id),
            carrier = carrier_name,
            eligible,
            verified_by,
            "Manual eligibility recorded"
        );
        Ok(stored)
    }
}
