//! Logging Configuration
//!
//! Settings may come from the service's TOML file; environment variables
//! override them:
//!
//! - `TELEMETRY_LOG_LEVEL`: default filter directive (default: info)
//! - `TELEMETRY_LOG_JSON`: emit JSON lines instead of human-readable text
//!
//! `RUST_LOG`, when set, replaces the level filter entirely.

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `device_telemetry=debug,info`
    pub level: String,
    /// JSON output for log shippers
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Override fields from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("TELEMETRY_LOG_LEVEL").filter(|s| !s.trim().is_empty()) {
            self.level = level;
        }
        if let Some(json) = lookup("TELEMETRY_LOG_JSON") {
            self.json = parse_flag(&json);
        }
    }
}

/// `true`/`1`/`yes`/`on`, case-insensitive
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            [("TELEMETRY_LOG_LEVEL", "debug"), ("TELEMETRY_LOG_JSON", "1")].into();
        let mut config = LoggingConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.level, "debug");
        assert!(config.json);
    }

    #[test]
    fn test_blank_level_ignored() {
        let mut config = LoggingConfig::default();
        config.apply_env(|key| (key == "TELEMETRY_LOG_LEVEL").then(|| "  ".to_string()));
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
