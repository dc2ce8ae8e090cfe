//! Command handling
//!
//! Commands served over the wire:
//! - PING: liveness
//! - TINGEST: ingest a telemetry batch
//! - TSTATE: read a device's consolidated state
//! - PROFILE / PROFILESET: read or write a user profile
//! - AVATAR: upload a user's avatar (base64)
//! - READFILE: read a file from the served directory

use crate::cache::BoundedCache;
use crate::clock::ProductionClock;
use crate::config::ServiceConfig;
use crate::files::{FileError, FileReader};
use crate::profile::{ObjectAvatarStore, ObjectUserRepository, ProfileError, ProfileService};
use crate::storage::{
    ObjectMetricStore, ObjectStateStore, SharedObjectStore, StateStore, StoreKeys,
};
use crate::telemetry::{ErrorKind, IngestError, IngestionOrchestrator};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::Deserialize;

/// Orchestrator wired to a shared object store
pub type Orchestrator = IngestionOrchestrator<
    ObjectMetricStore<SharedObjectStore, ProductionClock>,
    ObjectStateStore<SharedObjectStore>,
>;

/// Profile service wired to a shared object store
pub type Profiles =
    ProfileService<ObjectUserRepository<SharedObjectStore>, ObjectAvatarStore<SharedObjectStore>>;

/// Parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryCommand {
    /// PING [message]
    Ping(Option<String>),

    /// TINGEST <json>
    Ingest { payload: String },

    /// TSTATE <deviceId>
    State { device_id: String },

    /// PROFILE <userId>
    Profile { user_id: String },

    /// PROFILESET <userId> <json {name, email}>
    ProfileSet { user_id: String, payload: String },

    /// AVATAR <userId> <base64>
    Avatar { user_id: String, data: String },

    /// READFILE <name>
    ReadFile { name: String },
}

impl TelemetryCommand {
    /// Parse command from RESP-style arguments
    pub fn parse(args: &[String]) -> Result<TelemetryCommand, String> {
        let Some((cmd, args)) = args.split_first() else {
            return Err("No command provided".to_string());
        };

        let cmd = cmd.to_uppercase();
        match cmd.as_str() {
            "PING" => match args {
                [] => Ok(TelemetryCommand::Ping(None)),
                [message] => Ok(TelemetryCommand::Ping(Some(message.clone()))),
                _ => Err(arity(&cmd)),
            },
            "TINGEST" => match args {
                [payload] => Ok(TelemetryCommand::Ingest {
                    payload: payload.clone(),
                }),
                _ => Err(arity(&cmd)),
            },
            "TSTATE" => match args {
                [device_id] => Ok(TelemetryCommand::State {
                    device_id: device_id.clone(),
                }),
                _ => Err(arity(&cmd)),
            },
            "PROFILE" => match args {
                [user_id] => Ok(TelemetryCommand::Profile {
                    user_id: user_id.clone(),
                }),
                _ => Err(arity(&cmd)),
            },
            "PROFILESET" => match args {
                [user_id, payload] => Ok(TelemetryCommand::ProfileSet {
                    user_id: user_id.clone(),
                    payload: payload.clone(),
                }),
                _ => Err(arity(&cmd)),
            },
            "AVATAR" => match args {
                [user_id, data] => Ok(TelemetryCommand::Avatar {
                    user_id: user_id.clone(),
                    data: data.clone(),
                }),
                _ => Err(arity(&cmd)),
            },
            "READFILE" => match args {
                [name] => Ok(TelemetryCommand::ReadFile { name: name.clone() }),
                _ => Err(arity(&cmd)),
            },
            _ => Err(format!("unknown command '{}'", cmd)),
        }
    }
}

fn arity(cmd: &str) -> String {
    format!("wrong number of arguments for '{}' command", cmd)
}

/// Command reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryResult {
    Ok,
    Simple(String),
    Bulk(Bytes),
    Nil,
    /// Coded error: `-ERR <CODE> <message>`
    Error { code: &'static str, message: String },
}

impl TelemetryResult {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        TelemetryResult::Error {
            code,
            message: message.into(),
        }
    }

    fn json<T: serde::Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(data) => TelemetryResult::Bulk(Bytes::from(data)),
            Err(e) => TelemetryResult::error("INTERNAL", e.to_string()),
        }
    }

    /// Append the RESP encoding to `out`
    pub fn write_resp(&self, out: &mut Vec<u8>) {
        match self {
            TelemetryResult::Ok => out.extend_from_slice(b"+OK\r\n"),
            TelemetryResult::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            TelemetryResult::Bulk(data) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            TelemetryResult::Nil => out.extend_from_slice(b"$-1\r\n"),
            TelemetryResult::Error { code, message } => {
                // Simple strings cannot carry line breaks.
                let message = message.replace(['\r', '\n'], " ");
                out.extend_from_slice(format!("-ERR {} {}\r\n", code, message).as_bytes());
            }
        }
    }

    pub fn to_resp_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_resp(&mut out);
        out
    }
}

#[derive(Debug, Deserialize)]
struct ProfileUpdate {
    name: String,
    email: String,
}

/// Executes commands against the service's handlers
pub struct CommandExecutor {
    orchestrator: Orchestrator,
    profiles: Profiles,
    files: FileReader,
}

impl CommandExecutor {
    pub fn new(orchestrator: Orchestrator, profiles: Profiles, files: FileReader) -> Self {
        CommandExecutor {
            orchestrator,
            profiles,
            files,
        }
    }

    /// Wire every handler to one object store
    pub fn from_store(store: SharedObjectStore, config: &ServiceConfig) -> Self {
        let keys = StoreKeys::new(&config.store.prefix);
        let orchestrator = IngestionOrchestrator::new(
            ObjectMetricStore::new(store.clone(), keys.clone(), ProductionClock::new()),
            ObjectStateStore::new(store.clone(), keys.clone()),
        );
        let profiles = ProfileService::new(
            ObjectUserRepository::new(store.clone(), keys.clone()),
            ObjectAvatarStore::new(store, keys),
            BoundedCache::new(config.cache.capacity, config.cache.ttl()),
        );
        let files = FileReader::new(
            config.files.root.clone(),
            BoundedCache::new(config.cache.capacity, config.cache.ttl()),
        );
        CommandExecutor::new(orchestrator, profiles, files)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn files(&self) -> &FileReader {
        &self.files
    }

    /// Execute a command
    pub async fn execute(&self, cmd: TelemetryCommand) -> TelemetryResult {
        match cmd {
            TelemetryCommand::Ping(None) => TelemetryResult::Simple("PONG".to_string()),
            TelemetryCommand::Ping(Some(message)) => TelemetryResult::Bulk(Bytes::from(message)),

            TelemetryCommand::Ingest { payload } => {
                match self.orchestrator.ingest_payload(payload.as_bytes()).await {
                    Ok(report) if report.is_partial() => TelemetryResult::json(&report),
                    Ok(_) => TelemetryResult::Ok,
                    Err(e) => ingest_error(&e),
                }
            }

            TelemetryCommand::State { device_id } => {
                if device_id.trim().is_empty() {
                    return TelemetryResult::error(
                        ErrorKind::InvalidRequest.code(),
                        "deviceId must not be empty",
                    );
                }
                match self.orchestrator.state_store().read(&device_id).await {
                    Ok(Some(state)) => TelemetryResult::json(&state),
                    Ok(None) => TelemetryResult::Nil,
                    Err(e) => TelemetryResult::error(ErrorKind::StateReadFailure.code(), e.to_string()),
                }
            }

            TelemetryCommand::Profile { user_id } => match self.profiles.get_profile(&user_id).await {
                Ok(profile) => TelemetryResult::json(&profile),
                Err(ProfileError::NotFound(_)) => TelemetryResult::Nil,
                Err(e) => profile_error(&e),
            },

            TelemetryCommand::ProfileSet { user_id, payload } => {
                let update: ProfileUpdate = match serde_json::from_str(&payload) {
                    Ok(update) => update,
                    Err(e) => {
                        return TelemetryResult::error(
                            "INVALID_REQUEST",
                            format!("malformed profile: {}", e),
                        )
                    }
                };
                match self
                    .profiles
                    .update_profile(&user_id, &update.name, &update.email)
                    .await
                {
                    Ok(()) => TelemetryResult::Ok,
                    Err(e) => profile_error(&e),
                }
            }

            TelemetryCommand::Avatar { user_id, data } => {
                let bytes = match STANDARD.decode(data.trim()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return TelemetryResult::error(
                            "INVALID_REQUEST",
                            format!("avatar is not valid base64: {}", e),
                        )
                    }
                };
                match self.profiles.upload_avatar(&user_id, &bytes).await {
                    Ok(_) => TelemetryResult::Ok,
                    Err(e) => profile_error(&e),
                }
            }

            TelemetryCommand::ReadFile { name } => match self.files.read(&name).await {
                Ok(data) => TelemetryResult::Bulk(data),
                Err(e) => file_error(&e),
            },
        }
    }
}

/// Metric write failures carry the per-metric list as compact JSON
fn ingest_error(e: &IngestError) -> TelemetryResult {
    match e {
        IngestError::MetricWrite { failures } => {
            let detail = serde_json::to_string(failures).unwrap_or_default();
            TelemetryResult::error(e.kind().code(), format!("{} {}", e, detail))
        }
        _ => TelemetryResult::error(e.kind().code(), e.to_string()),
    }
}

fn profile_error(e: &ProfileError) -> TelemetryResult {
    let code = match e {
        ProfileError::InvalidUserId => "INVALID_USER_ID",
        ProfileError::NotFound(_) => "NOT_FOUND",
        ProfileError::EmptyFile => "EMPTY_FILE",
        ProfileError::Store(_) => "STORE_FAILURE",
    };
    TelemetryResult::error(code, e.to_string())
}

fn file_error(e: &FileError) -> TelemetryResult {
    let code = match e {
        FileError::InvalidName(_) => "INVALID_NAME",
        FileError::NotFound(_) => "NOT_FOUND",
        FileError::Io { .. } => "IO_ERROR",
    };
    TelemetryResult::error(code, e.to_string())
}
