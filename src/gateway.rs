//! ==============================================================================
//! gateway.rs - udp request dispatcher
//! ==============================================================================
//!
//! purpose:
//!     receives json datagrams, forwards mode commands to the device and
//!     answers snapshot queries. stateless across datagrams.
//!
//! per-datagram flow:
//!
//! ```text
//!     recv ──> Command::parse ──┬── Malformed / Unknown ──> log, drop
//!                               ├── SetMode(token) ──────> CommandWriter, no reply
//!                               └── Query ───────────────> StateStore::snapshot ──> reply
//! ```
//!
//! concurrency:
//!     every datagram is handled on its own spawned task, with no cap on
//!     the number in flight. the handlers share the state store and the
//!     command writer, both of which lock internally. the gateway never
//!     sees the serial read half.
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::IngestMode;
use crate::device::CommandWriter;
use crate::domain::{Command, LatestState, ModeToken, SCALAR_KEY};
use crate::error::{Error, Result};
use crate::state::StateStore;

/// dispatch logic, independent of the socket
pub struct Gateway {
    state: StateStore,
    commands: CommandWriter,
    ingest_mode: IngestMode,
    /// keys always present in a keyed reply (null until first seen)
    reply_keys: Vec<String>,
}

impl Gateway {
    pub fn new(state: StateStore, commands: CommandWriter, ingest_mode: IngestMode, reply_keys: Vec<String>) -> Self {
        Self { state, commands, ingest_mode, reply_keys }
    }

    /// handle one datagram; `Some(bytes)` is the reply to send back
    pub async fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let command = match Command::parse(payload) {
            Ok(command) => command,
            Err(Error::MalformedInput(reason)) => {
                tracing::warn!(%peer, "Invalid JSON received: {}", reason);
                return None;
            }
            Err(e) => {
                tracing::warn!(%peer, "Unknown JSON message: {}", e);
                return None;
            }
        };

        tracing::debug!(%peer, ?command, "Datagram decoded");

        match command {
            Command::SetMode(mode) => {
                self.forward_mode(mode).await;
                None
            }
            Command::Query => {
                let reply = self.encode_reply(&self.state.snapshot());
                match serde_json::to_vec(&reply) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::error!(%peer, "Failed to encode reply: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// shape a snapshot into the reply payload
    ///
    /// keyed mode lists every reply key, unseen ones as null, so an empty
    /// store still answers with a complete "no data" object. single mode
    /// answers `{"value": ""}` until the first reading.
    pub fn encode_reply(&self, snapshot: &LatestState) -> Value {
        let mut reply = Map::new();
        match self.ingest_mode {
            IngestMode::Keyed => {
                for key in &self.reply_keys {
                    let value = snapshot.get(key).map_or(Value::Null, |v| Value::String(v.clone()));
                    reply.insert(key.clone(), value);
                }
            }
            IngestMode::Single => {
                let value = snapshot.get(SCALAR_KEY).cloned().unwrap_or_default();
                reply.insert(SCALAR_KEY.to_string(), Value::String(value));
            }
        }
        Value::Object(reply)
    }

    async fn forward_mode(&self, mode: ModeToken) {
        let commands = self.commands.clone();
        match tokio::task::spawn_blocking(move || commands.send_mode(mode)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(%mode, "Failed to send mode to device: {}", e),
            Err(e) => tracing::error!(%mode, "Device write task failed: {}", e),
        }
    }
}

/// the udp accept loop
pub struct GatewayServer {
    socket: Arc<UdpSocket>,
    gateway: Arc<Gateway>,
    max_datagram: usize,
}

impl GatewayServer {
    pub async fn bind(addr: SocketAddr, gateway: Gateway, max_datagram: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket: Arc::new(socket), gateway: Arc::new(gateway), max_datagram })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// receive until `shutdown` flips to true (or its sender is dropped)
    ///
    /// handlers already spawned are not awaited on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut buf = vec![0u8; self.max_datagram];
        tracing::info!("Server started at {}", self.local_addr()?);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!("recv_from failed: {}", e);
                            continue;
                        }
                    };
                    let payload = buf[..len].to_vec();
                    let socket = Arc::clone(&self.socket);
                    let gateway = Arc::clone(&self.gateway);
                    tokio::spawn(async move {
                        if let Some(reply) = gateway.handle_datagram(&payload, peer).await {
                            if let Err(e) = socket.send_to(&reply, peer).await {
                                tracing::warn!(%peer, "Failed to send reply: {}", e);
                            }
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Server stopped accepting datagrams");
        Ok(())
    }
}
