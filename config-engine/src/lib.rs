//! Configuration management for the preauthorization engine
//!
//! Configuration is layered, later sources overriding earlier ones:
//!
//! 1. Built-in defaults (every field has one)
//! 2. An optional file (`.yaml`, `.toml` or `.json`, picked by extension)
//! 3. Environment variables prefixed with `PREAUTH__`, nested with `__`
//!    (`PREAUTH__RETRY__MAX_ATTEMPTS=5`)
//!
//! The resulting [`EngineConfig`] is passed explicitly into each resolver
//! and channel at construction time; nothing reads ambient global flags.
//!
//! # Example
//!
//! ```ignore
//! let config = config_engine::load(Some(Path::new("preauth.yaml")))?;
//! assert!(config.retry.max_attempts >= 1);
//! ```

pub mod error;
pub mod settings;
pub mod validation;

pub use error::*;
pub use settings::*;
pub use validation::validate;

use std::path::Path;
use tracing::debug;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PREAUTH";

/// Load and validate configuration from defaults, an optional file and the environment
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        debug!(path = %path.display(), "Loading configuration file");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let engine_config: EngineConfig = builder.build()?.try_deserialize()?;
    validate(&engine_config)?;
    Ok(engine_config)
}
