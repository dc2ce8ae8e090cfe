//! Observability
//!
//! Structured logging through `tracing`. Binaries call [`init_tracing`] once
//! at startup; library code only emits events.

pub mod config;

pub use config::LoggingConfig;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.level`. Returns an error if a
/// subscriber is already installed or the directive does not parse.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), String> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| e.to_string())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, String> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| format!("invalid log level '{}': {}", config.level, e)),
    }
}
