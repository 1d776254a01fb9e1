//! Transport layer for gemsync.
//!
//! A [`MidiTransport`] moves whole SysEx messages. [`SysexChannel`] sits on
//! top and runs one request/response exchange at a time with a timeout.

mod memory;
mod stream;

pub use memory::MemoryTransport;
pub use stream::StreamTransport;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{Request, Response, MAX_MESSAGE_SIZE};

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Port to connect to when none is given.
    #[serde(default = "default_port")]
    pub port: String,

    /// Known ports: name to raw-MIDI device node(s).
    #[serde(default)]
    pub ports: BTreeMap<String, PortPath>,

    /// Largest SysEx message accepted from the device.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_port() -> String {
    "Gemini".into()
}
fn default_max_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ports: BTreeMap::new(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Where a port's bytes come from and go to.
///
/// In TOML either a plain path or `{ input = "...", output = "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortPath {
    /// One raw-MIDI node, opened once for reading and once for writing.
    Node(PathBuf),
    /// Separate nodes per direction.
    Split { input: PathBuf, output: PathBuf },
}

impl PortPath {
    /// Node the device's messages are read from.
    pub fn input(&self) -> &Path {
        match self {
            Self::Node(path) => path,
            Self::Split { input, .. } => input,
        }
    }

    /// Node requests are written to.
    pub fn output(&self) -> &Path {
        match self {
            Self::Node(path) => path,
            Self::Split { output, .. } => output,
        }
    }
}

impl From<PathBuf> for PortPath {
    fn from(path: PathBuf) -> Self {
        Self::Node(path)
    }
}

/// Message transport trait.
///
/// Implementations deliver complete SysEx messages in order.
#[async_trait]
pub trait MidiTransport: Send + Sync {
    /// Name of the port this transport is attached to.
    fn port_name(&self) -> &str;

    /// Send one complete message.
    async fn send(&self, message: &[u8]) -> Result<()>;

    /// Wait for the next complete message.
    ///
    /// Must be cancel-safe: dropping the future loses no message.
    async fn receive(&self) -> Result<Vec<u8>>;

    /// Close the transport.
    async fn close(&self) -> Result<()>;

    /// Get transport type name.
    fn transport_type(&self) -> &'static str;
}

/// Open a named port from the device configuration.
///
/// The input is opened before the output. Each direction gets its own
/// handle so a pending read never holds up a write.
pub async fn open_port(name: &str, config: &DeviceConfig) -> Result<Box<dyn MidiTransport>> {
    let path = config
        .ports
        .get(name)
        .ok_or_else(|| Error::TransportUnavailable {
            port: name.to_string(),
            reason: "no such port configured".into(),
        })?;

    let unavailable = |node: &Path, e: std::io::Error| Error::TransportUnavailable {
        port: name.to_string(),
        reason: format!("{}: {e}", node.display()),
    };

    let input = tokio::fs::OpenOptions::new()
        .read(true)
        .open(path.input())
        .await
        .map_err(|e| unavailable(path.input(), e))?;
    let output = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path.output())
        .await
        .map_err(|e| unavailable(path.output(), e))?;

    tracing::info!(
        port = name,
        input = %path.input().display(),
        output = %path.output().display(),
        "Opened MIDI port"
    );

    Ok(Box::new(StreamTransport::from_halves(
        name,
        input,
        output,
        config.max_message_size,
    )))
}

/// State of the current exchange on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sent,
    AwaitingResponse,
    Completed,
    TimedOut,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Sent => write!(f, "sent"),
            Self::AwaitingResponse => write!(f, "awaiting-response"),
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Request/response channel over a transport.
///
/// Exchanges take `&mut self`, so at most one is ever outstanding.
pub struct SysexChannel {
    transport: Box<dyn MidiTransport>,
    state: ExchangeState,
    exchanges: u64,
    discarded: u64,
}

impl SysexChannel {
    pub fn new(transport: Box<dyn MidiTransport>) -> Self {
        Self {
            transport,
            state: ExchangeState::Idle,
            exchanges: 0,
            discarded: 0,
        }
    }

    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Number of completed exchanges.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Number of stale messages thrown away before sending.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Send a request that has no response.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let raw = request.encode()?;
        tracing::trace!(command = %request.command, bytes = %hex::encode(&raw), "Sending");
        self.transport.send(&raw).await?;
        self.state = ExchangeState::Sent;
        Ok(())
    }

    /// Send a request and wait for its response.
    ///
    /// The response must echo the request's command byte. `timeout` covers
    /// both the write and the wait. On timeout the exchange is abandoned; a
    /// late response is discarded by the next call.
    pub async fn transact(&mut self, request: &Request, timeout: Duration) -> Result<Response> {
        let raw = request.encode()?;
        self.drain().await;

        tracing::trace!(command = %request.command, bytes = %hex::encode(&raw), "Sending");
        let transport = &self.transport;
        let exchange = async move {
            transport.send(&raw).await?;
            transport.receive().await
        };
        self.state = ExchangeState::AwaitingResponse;
        let received = match tokio::time::timeout(timeout, exchange).await {
            Ok(received) => received,
            Err(_) => {
                self.state = ExchangeState::TimedOut;
                tracing::debug!(command = %request.command, ?timeout, "Exchange timed out");
                return Err(Error::Timeout {
                    command: request.command.as_u8(),
                    after: timeout,
                });
            }
        };

        let raw = match received {
            Ok(raw) => raw,
            Err(e) => {
                self.state = ExchangeState::Idle;
                return Err(e);
            }
        };

        self.state = ExchangeState::Completed;
        self.exchanges += 1;
        tracing::trace!(command = %request.command, bytes = %hex::encode(&raw), "Received");

        Response::decode_for(&raw, request.command)
    }

    /// Run `request` as a full exchange, or just send it when the device
    /// does not answer that command.
    pub async fn exchange(
        &mut self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Option<Response>> {
        if request.command.expects_response() {
            self.transact(request, timeout).await.map(Some)
        } else {
            self.send(request).await.map(|()| None)
        }
    }

    /// Discard anything already queued, such as a response that arrived
    /// after its exchange timed out.
    async fn drain(&mut self) {
        while let Ok(Ok(stale)) =
            tokio::time::timeout(Duration::ZERO, self.transport.receive()).await
        {
            self.discarded += 1;
            tracing::debug!(
                port = self.transport.port_name(),
                bytes = %hex::encode(&stale),
                "Discarding stale message"
            );
        }
    }

    /// Close the underlying transport.
    pub async fn close(self) -> Result<()> {
        self.transport.close().await
    }
}

impl fmt::Debug for SysexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysexChannel")
            .field("port", &self.transport.port_name())
            .field("transport", &self.transport.transport_type())
            .field("state", &self.state)
            .field("exchanges", &self.exchanges)
            .finish_non_exhaustive()
    }
}
