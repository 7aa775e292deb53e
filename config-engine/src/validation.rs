// Configuration validation
use crate::error::{ConfigError, Result};
use crate::settings::EngineConfig;

const KNOWN_METHODS: &[&str] = &["api", "edi", "portal", "fax", "manual"];

/// Reject configurations the engine cannot run with
pub fn validate(config: &EngineConfig) -> Result<()> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.retry.interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "retry.interval_secs must be greater than zero".to_string(),
        ));
    }

    if config.sweeps.retry_page_size == 0 || config.sweeps.status_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "sweep page sizes must be greater than zero".to_string(),
        ));
    }

    if config.sweeps.submission_lease_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sweeps.submission_lease_secs must be greater than zero".to_string(),
        ));
    }

    // A lease that can lapse mid-call lets a second invocation resubmit
    let slowest_call = [
        ("channels.edi.timeout_secs", config.channels.edi.timeout_secs),
        ("channels.fax.timeout_secs", config.channels.fax.timeout_secs),
        ("eligibility.timeout_secs", config.eligibility.timeout_secs),
        ("necessity.timeout_secs", config.necessity.timeout_secs),
    ]
    .into_iter()
    .max_by_key(|(_, secs)| *secs);
    if let Some((name, secs)) = slowest_call {
        if config.sweeps.submission_lease_secs <= secs {
            return Err(ConfigError::ValidationError(format!(
                "sweeps.submission_lease_secs ({}) must exceed {} ({})",
                config.sweeps.submission_lease_secs, name, secs
            )));
        }
    }

    let method = config.channels.default_method.to_ascii_lowercase();
    if !KNOWN_METHODS.contains(&method.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "channels.default_method '{}' is not one of {:?}",
            config.channels.default_method, KNOWN_METHODS
        )));
    }

    if config.eligibility.real_time_enabled && config.eligibility.real_time_url.is_none() {
        return Err(ConfigError::ValidationError(
            "eligibility.real_time_enabled requires eligibility.real_time_url".to_string(),
        ));
    }

    Ok(())
}
