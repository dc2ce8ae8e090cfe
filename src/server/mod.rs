//! TCP server
//!
//! One task per connection. Frames are parsed as they arrive and every
//! reply produced from one read is flushed together, so pipelined clients
//! pay one write per batch. Commands on a connection run in order.

pub mod command;
pub mod protocol;

pub use command::{CommandExecutor, Orchestrator, Profiles, TelemetryCommand, TelemetryResult};
pub use protocol::{parse_frame, ParseError};

use bytes::BytesMut;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub struct TelemetryServer {
    listener: TcpListener,
    executor: Arc<CommandExecutor>,
}

impl TelemetryServer {
    pub async fn bind(addr: SocketAddr, executor: Arc<CommandExecutor>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(TelemetryServer { listener, executor })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Telemetry server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Telemetry server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let executor = Arc::clone(&self.executor);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, executor, peer_addr).await {
                                error!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    mut stream: TcpStream,
    executor: Arc<CommandExecutor>,
    peer_addr: SocketAddr,
) -> std::io::Result<()> {
    debug!("Client connected: {}", peer_addr);

    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let mut buffer = BytesMut::with_capacity(8192);
    let mut read_buf = [0u8; 4096];

    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            debug!("Client disconnected: {}", peer_addr);
            return Ok(());
        }
        buffer.extend_from_slice(&read_buf[..n]);

        let mut responses = Vec::new();
        let mut commands_processed = 0;
        let mut fatal = false;

        loop {
            match parse_frame(&buffer) {
                Ok((args, consumed)) => {
                    let _ = buffer.split_to(consumed);
                    if args.is_empty() {
                        continue;
                    }

                    let result = match TelemetryCommand::parse(&args) {
                        Ok(cmd) => executor.execute(cmd).await,
                        Err(msg) => TelemetryResult::Error {
                            code: "UNKNOWN_COMMAND",
                            message: msg,
                        },
                    };
                    result.write_resp(&mut responses);
                    commands_processed += 1;
                }
                Err(ParseError::Incomplete) => break,
                Err(ParseError::Invalid(msg)) => {
                    warn!("Protocol error from {}: {}", peer_addr, msg);
                    TelemetryResult::Error {
                        code: "PROTOCOL",
                        message: msg,
                    }
                    .write_resp(&mut responses);
                    fatal = true;
                    break;
                }
            }
        }

        if !responses.is_empty() {
            stream.write_all(&responses).await?;
            stream.flush().await?;
            debug!("Processed {} commands from {}", commands_processed, peer_addr);
        }

        // A malformed frame leaves no reliable boundary to resume from.
        if fatal {
            return Ok(());
        }
    }
}
