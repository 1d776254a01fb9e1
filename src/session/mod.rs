//! Device session orchestration.
//!
//! A [`Session`] owns the channel to one device, its identity and the live
//! settings record. It is the only layer that decides whether a failed
//! exchange is worth retrying.
//!
//! ```text
//!  connect:  hello → serial number → firmware check
//!  load:     [chunk 0 … chunk n] → teeth decode → unpack   (restart on error)
//!  save:     pack → teeth encode → [chunk 0 … chunk n]      (single pass)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::chunked::{Transfer, TransferMode, DEFAULT_CHUNK_SIZE};
use crate::config::Config;
use crate::error::{Error, ErrorContext, ProtocolError, Result, TransportError};
use crate::protocol::{Command, Request};
use crate::record::{preset, Schema, SettingsRecord, DEFAULT_SCHEMA};
use crate::teeth;
use crate::transport::{open_port, MidiTransport, SysexChannel};
use crate::types::{parse_serial_payload, ConnectionState, DeviceInfo, FirmwareDate, FirmwareVersion};

/// Protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Built-in schema name.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Schema file overriding `schema`.
    #[serde(default)]
    pub schema_file: Option<PathBuf>,

    /// Chunked or single-shot settings transfer.
    #[serde(default)]
    pub transfer: TransferMode,

    /// Encoded bytes per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Time allowed for each exchange.
    #[serde(default = "default_exchange_timeout", with = "humantime_serde")]
    pub exchange_timeout: Duration,

    /// Full load attempts before giving up.
    #[serde(default = "default_max_load_attempts")]
    pub max_load_attempts: u32,

    /// Oldest firmware accepted.
    #[serde(default = "default_minimum_firmware")]
    pub minimum_firmware: FirmwareDate,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.into()
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_exchange_timeout() -> Duration {
    Duration::from_millis(1000)
}
fn default_max_load_attempts() -> u32 {
    10
}
fn default_minimum_firmware() -> FirmwareDate {
    FirmwareDate::MINIMUM
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            schema_file: None,
            transfer: TransferMode::default(),
            chunk_size: default_chunk_size(),
            exchange_timeout: default_exchange_timeout(),
            max_load_attempts: default_max_load_attempts(),
            minimum_firmware: default_minimum_firmware(),
        }
    }
}

impl ProtocolConfig {
    /// Resolve the configured settings schema.
    pub fn resolve_schema(&self) -> Result<Arc<Schema>> {
        let schema = match &self.schema_file {
            Some(path) => Schema::load(path)?,
            None => preset(&self.schema).ok_or_else(|| {
                Error::InvalidConfig(format!("unknown schema {:?}", self.schema))
            })?,
        };
        Ok(Arc::new(schema))
    }

    pub fn transfer(&self) -> Transfer {
        Transfer {
            mode: self.transfer,
            chunk_size: self.chunk_size,
            timeout: self.exchange_timeout,
        }
    }
}

/// An open connection to one device.
pub struct Session {
    channel: SysexChannel,
    config: ProtocolConfig,
    schema: Arc<Schema>,
    info: DeviceInfo,
    settings: Arc<RwLock<SettingsRecord>>,
    state: ConnectionState,
}

impl Session {
    /// Open the configured port and connect.
    pub async fn open(config: &Config, port: Option<&str>) -> Result<Self> {
        let port = port.unwrap_or(&config.device.port);
        let transport = open_port(port, &config.device).await?;
        Self::connect(transport, config.protocol.clone()).await
    }

    /// Identify the device on `transport` and check its firmware.
    ///
    /// Any failure here, timeouts included, is returned without retry.
    pub async fn connect(transport: Box<dyn MidiTransport>, config: ProtocolConfig) -> Result<Self> {
        let schema = config.resolve_schema()?;
        let mut channel = SysexChannel::new(transport);
        let port = channel.port_name().to_string();
        let timeout = config.exchange_timeout;

        let hello = channel.transact(&Request::hello(), timeout).await?;
        let firmware = FirmwareVersion::parse(hello.text()?.trim_end_matches('\0'));
        tracing::debug!(port = %port, firmware = %firmware, "Device said hello");

        let response = channel
            .transact(&Request::get_serial_number(), timeout)
            .await?;
        let (serial, revision) = parse_serial_payload(&response.decode_payload()?)?;

        let info = DeviceInfo {
            port,
            firmware,
            serial,
            revision,
        };

        if !info.firmware.is_at_least(config.minimum_firmware) {
            tracing::warn!(
                port = %info.port,
                firmware = %info.firmware,
                minimum = %config.minimum_firmware,
                "Incompatible firmware"
            );
            if let Err(e) = channel.close().await {
                tracing::debug!(port = %info.port, error = %e, "Close after firmware check failed");
            }
            return Err(Error::IncompatibleFirmware {
                version: info.firmware.raw,
                minimum: config.minimum_firmware.to_string(),
            });
        }

        tracing::info!(
            port = %info.port,
            firmware = %info.firmware,
            serial = %info.serial,
            revision = %info.revision,
            schema = %schema.name,
            "Connected"
        );

        let settings = Arc::new(RwLock::new(SettingsRecord::new(Arc::clone(&schema))));
        Ok(Self {
            channel,
            config,
            schema,
            info,
            settings,
            state: ConnectionState::Connected,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Shared handle to the live settings record.
    pub fn settings(&self) -> Arc<RwLock<SettingsRecord>> {
        Arc::clone(&self.settings)
    }

    /// Copy of the live settings record.
    pub fn snapshot(&self) -> SettingsRecord {
        self.settings.read().clone()
    }

    /// Replace the live settings record in one step.
    pub fn apply(&self, record: &SettingsRecord) -> Result<()> {
        self.settings.write().replace_all(record)?;
        Ok(())
    }

    /// Load settings from the device, retrying the whole transfer.
    ///
    /// On success the live record is replaced and a copy returned.
    pub async fn load_settings(&mut self) -> Result<SettingsRecord> {
        self.ensure_connected()?;
        let max_attempts = self.config.max_load_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.load_once().await;
            match result {
                Ok(record) => {
                    *self.settings.write() = record.clone();
                    tracing::info!(
                        port = %self.info.port,
                        attempt,
                        fields = self.schema.fields.len(),
                        "Loaded settings"
                    );
                    return Ok(record);
                }
                Err(e) if e.is_retryable() => {
                    let context = ErrorContext {
                        port: Some(self.info.port.clone()),
                        command: Some(self.load_command().as_u8()),
                        operation: "load".into(),
                        attempt: Some(attempt),
                    };
                    if attempt >= max_attempts {
                        tracing::warn!(%context, error = %e, "Giving up on settings load");
                        return Err(Error::LoadFailed {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    tracing::warn!(%context, error = %e, "Settings load failed, restarting");
                }
                Err(e) => return Err(self.observe(e)),
            }
        }
    }

    async fn load_once(&mut self) -> Result<SettingsRecord> {
        let encoded_len = teeth::encoded_length(self.schema.packed_size());
        let encoded = self
            .config
            .transfer()
            .load(&mut self.channel, encoded_len)
            .await?;
        let decoded = teeth::decode(&encoded)?;
        SettingsRecord::unpack(Arc::clone(&self.schema), &decoded)
    }

    fn load_command(&self) -> Command {
        match self.config.transfer {
            TransferMode::Chunked => Command::LoadSettingsChunk,
            TransferMode::SingleShot => Command::ReadSettings,
        }
    }

    /// Write the live settings record to the device in a single pass.
    pub async fn save_settings(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let packed = self.settings.read().pack();
        let encoded = teeth::encode(&packed);

        let result = self
            .config
            .transfer()
            .save(&mut self.channel, &encoded)
            .await;
        result.map_err(|e| self.observe(e))?;

        tracing::info!(
            port = %self.info.port,
            bytes = packed.len(),
            encoded = encoded.len(),
            "Saved settings"
        );
        Ok(())
    }

    /// Restart the device firmware. There is no response.
    pub async fn soft_reset(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.fire(&Request::soft_reset()).await?;
        tracing::info!(port = %self.info.port, "Soft reset requested");
        Ok(())
    }

    /// Erase stored settings back to firmware defaults. There is no response.
    pub async fn reset_settings(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.fire(&Request::reset_settings()).await?;
        *self.settings.write() = SettingsRecord::new(Arc::clone(&self.schema));
        tracing::info!(port = %self.info.port, "Settings reset requested");
        Ok(())
    }

    /// Read one raw ADC channel.
    pub async fn read_adc(&mut self, channel: u8) -> Result<u16> {
        self.ensure_connected()?;
        let timeout = self.config.exchange_timeout;
        let result = self.channel.transact(&Request::read_adc(channel), timeout).await;
        let response = result.map_err(|e| self.observe(e))?;

        let decoded = response.decode_payload()?;
        if decoded.len() < 2 {
            return Err(ProtocolError::LengthMismatch {
                expected: 2,
                got: decoded.len(),
            }
            .into());
        }
        let code = BigEndian::read_u16(&decoded);
        tracing::debug!(channel, code, "Read ADC");
        Ok(code)
    }

    /// Mean of `samples` sequential ADC reads.
    pub async fn read_adc_average(&mut self, channel: u8, samples: u32) -> Result<f64> {
        if samples == 0 {
            return Err(anyhow::anyhow!("sample count must be non-zero").into());
        }
        let mut total = 0u64;
        for _ in 0..samples {
            total += u64::from(self.read_adc(channel).await?);
        }
        Ok(total as f64 / f64::from(samples))
    }

    /// Close the channel, returning what was learned about the device.
    pub async fn disconnect(self) -> Result<DeviceInfo> {
        let Self { channel, info, .. } = self;
        let exchanges = channel.exchanges();
        channel.close().await?;
        tracing::info!(port = %info.port, exchanges, "Disconnected");
        Ok(info)
    }

    /// Run a command the device does not answer.
    async fn fire(&mut self, request: &Request) -> Result<()> {
        let timeout = self.config.exchange_timeout;
        let result = self.channel.exchange(request, timeout).await;
        result.map_err(|e| self.observe(e))?;
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => Err(TransportError::Closed.into()),
        }
    }

    /// Note errors that leave the channel unusable.
    fn observe(&mut self, error: Error) -> Error {
        if error.is_fatal_to_session() {
            tracing::warn!(port = %self.info.port, error = %error, "Session closed");
            self.state = ConnectionState::Closed;
        }
        error
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("schema", &self.schema.name)
            .field("state", &self.state)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
