// Engine settings tree
//
// Every field carries a serde default so an empty file (or no file at all)
// yields a runnable configuration.
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};

/// Root configuration handed to every resolver and channel at construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub sweeps: SweepConfig,
    pub eligibility: EligibilityConfig,
    pub necessity: NecessityConfig,
    pub channels: ChannelsConfig,
    pub notifications: NotificationConfig,
    pub database: DatabaseConfig,
    pub logging: LoggerConfig,
    pub schedule: ScheduleConfig,
}

/// Backoff between failed submission attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed attempts allowed before a request is handed to staff
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub backoff: BackoffStrategy,
    /// Upper bound on a single exponential delay
    pub max_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_secs: 3600,
            backoff: BackoffStrategy::Fixed,
            max_interval_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub retry_page_size: u32,
    pub status_page_size: u32,
    pub status_lookback_days: u32,
    /// Wall-clock budget per sweep invocation; in-flight work still finishes
    pub time_budget_secs: u64,
    /// How long a submission claim blocks other invocations
    pub submission_lease_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            retry_page_size: 50,
            status_page_size: 100,
            status_lookback_days: 30,
            time_budget_secs: 300,
            submission_lease_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub cache_ttl_days: u32,
    pub real_time_enabled: bool,
    pub real_time_url: Option<String>,
    #[serde(skip_serializing)]
    pub real_time_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_days: 30,
            real_time_enabled: false,
            real_time_url: None,
            real_time_api_key: None,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NecessityConfig {
    /// Text-generation endpoint; letters fall back to the template when unset
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for NecessityConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "default".to_string(),
            max_tokens: 1200,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Channel used when no rule matches a carrier/code pair
    pub default_method: String,
    pub edi: EdiConfig,
    pub fax: FaxConfig,
    pub manual: ManualConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            default_method: "manual".to_string(),
            edi: EdiConfig::default(),
            fax: FaxConfig::default(),
            manual: ManualConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdiConfig {
    pub enabled: bool,
    pub clearinghouse_url: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub submitter_id: Option<String>,
    pub receiver_id: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EdiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            clearinghouse_url: None,
            username: None,
            password: None,
            submitter_id: None,
            receiver_id: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaxConfig {
    pub gateway_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub sender_number: Option<String>,
    pub sender_name: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FaxConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            api_key: None,
            sender_number: None,
            sender_name: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualConfig {
    pub staff_queue: String,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            staff_queue: "preauth-intake".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/preauth".to_string(),
            max_connections: 10,
        }
    }
}

/// Cron expressions (with seconds) for the scheduled sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub retry_sweep: String,
    pub status_sweep: String,
    pub expiry_sweep: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retry_sweep: "0 */15 * * * *".to_string(),
            status_sweep: "0 0 * * * *".to_string(),
            expiry_sweep: "0 30 2 * * *".to_string(),
        }
    }
}
