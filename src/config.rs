//! Service configuration
//!
//! Loaded from an optional TOML file, then overridden by environment:
//!
//! - `TELEMETRY_LISTEN_ADDR`: bind address (default: 0.0.0.0:7420)
//! - `TELEMETRY_STORE_PATH`: switches the store to the local filesystem
//! - `TELEMETRY_STORE_PREFIX`: key prefix inside the store
//! - `TELEMETRY_CACHE_CAPACITY`, `TELEMETRY_CACHE_TTL_MS`
//! - `TELEMETRY_FILES_ROOT`: directory served by READFILE (default: /tmp)
//! - `TELEMETRY_LOG_LEVEL`, `TELEMETRY_LOG_JSON` (see `observability::config`)

use crate::observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreBackend {
    #[default]
    InMemory,
    LocalFs,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory for `LocalFs`
    pub local_path: Option<PathBuf>,
    /// Key prefix for every object
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Entry lifetime in milliseconds; 0 disables expiry
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1024,
            ttl_ms: 60_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub root: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        FilesConfig {
            root: PathBuf::from("/tmp"),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub files: FilesConfig,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            listen_addr: "0.0.0.0:7420".to_string(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            files: FilesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// File (if given), then environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from a variable lookup
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("TELEMETRY_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(path) = lookup("TELEMETRY_STORE_PATH") {
            self.store.backend = StoreBackend::LocalFs;
            self.store.local_path = Some(PathBuf::from(path));
        }
        if let Some(prefix) = lookup("TELEMETRY_STORE_PREFIX") {
            self.store.prefix = prefix;
        }
        if let Some(capacity) = lookup("TELEMETRY_CACHE_CAPACITY").and_then(|s| s.parse().ok()) {
            self.cache.capacity = capacity;
        }
        if let Some(ttl_ms) = lookup("TELEMETRY_CACHE_TTL_MS").and_then(|s| s.parse().ok()) {
            self.cache.ttl_ms = ttl_ms;
        }
        if let Some(root) = lookup("TELEMETRY_FILES_ROOT") {
            self.files.root = PathBuf::from(root);
        }
        self.logging.apply_env(lookup);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.store.backend == StoreBackend::LocalFs && self.store.local_path.is_none() {
            return Err(ConfigError::Invalid(
                "store.local_path is required for the LocalFs backend".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr.parse().map_err(|_| {
            ConfigError::Invalid(format!("listen_addr '{}' is not a socket address", self.listen_addr))
        })
    }
}
