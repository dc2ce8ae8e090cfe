//! Telemetry Server
//!
//! Usage:
//!   telemetry-server [config.toml]
//!
//! The config path may also be given as `TELEMETRY_CONFIG`. Environment
//! variables override file settings (see `device_telemetry::config`).
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | TELEMETRY_LISTEN_ADDR | 0.0.0.0:7420 | Bind address |
//! | TELEMETRY_STORE_PATH | - | Use the local filesystem store rooted here |
//! | TELEMETRY_STORE_PREFIX | (empty) | Key prefix |
//! | TELEMETRY_FILES_ROOT | /tmp | Directory served by READFILE |
//! | TELEMETRY_LOG_JSON | false | JSON log lines |
//! | RUST_LOG | info | Log filter |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use device_telemetry::config::{ServiceConfig, StoreBackend};
use device_telemetry::observability::init_tracing;
use device_telemetry::server::{CommandExecutor, TelemetryServer};
use device_telemetry::storage::{InMemoryObjectStore, LocalFsObjectStore, SharedObjectStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

fn build_store(config: &ServiceConfig) -> std::io::Result<SharedObjectStore> {
    match (config.store.backend, &config.store.local_path) {
        (StoreBackend::LocalFs, Some(path)) => {
            std::fs::create_dir_all(path)?;
            info!("Object store: local filesystem at {}", path.display());
            Ok(Arc::new(LocalFsObjectStore::new(path.clone())))
        }
        (StoreBackend::LocalFs, None) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "LocalFs backend requires store.local_path",
        )),
        (StoreBackend::InMemory, _) => {
            warn!("Object store: in-memory, data is lost on exit");
            Ok(Arc::new(InMemoryObjectStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TELEMETRY_CONFIG").ok())
        .map(PathBuf::from);

    let config = ServiceConfig::load(config_path.as_deref())?;
    init_tracing(&config.logging)?;

    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let store = build_store(&config)?;
    let executor = Arc::new(CommandExecutor::from_store(store, &config));
    let server = TelemetryServer::bind(config.socket_addr()?, executor).await?;

    server
        .run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
