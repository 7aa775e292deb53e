// Tracing subscriber initialisation
use crate::config::LoggerConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `config.level` when set. Returns an error string if a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| format!("invalid log filter '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(fmt::layer().with_target(true).with_ansi(false).json())
            .try_init()
            .map_err(|e| e.to_string())
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| e.to_string())
    }
}
