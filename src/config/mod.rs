//! Configuration management for gemsync.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunked::{ChunkPlan, TransferMode};
use crate::error::{Error, Result};
use crate::protocol::MIN_MESSAGE_SIZE;
use crate::session::ProtocolConfig;
use crate::teeth;
use crate::transport::{DeviceConfig, PortPath};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Protocol configuration.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default path if it exists,
    /// else use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.device.max_message_size < MIN_MESSAGE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max_message_size must be at least {MIN_MESSAGE_SIZE}"
            )));
        }

        let protocol = &self.protocol;
        if protocol.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be non-zero".into()));
        }
        if protocol.max_load_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_load_attempts must be at least 1".into(),
            ));
        }
        if protocol.exchange_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "exchange_timeout must be non-zero".into(),
            ));
        }

        let schema = protocol.resolve_schema()?;
        let encoded_len = teeth::encoded_length(schema.packed_size());
        if protocol.transfer == TransferMode::Chunked {
            ChunkPlan::new(encoded_len, protocol.chunk_size)?;
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::InvalidConfig(format!(
                "Unknown log format {:?}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "winterbloom", "gemsync").map_or_else(
            || PathBuf::from("gemsync.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        let mut device = DeviceConfig::default();
        device
            .ports
            .insert("Gemini".into(), PortPath::Node("/dev/snd/midiC1D0".into()));

        Self {
            device,
            protocol: ProtocolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path.
    pub file: Option<PathBuf>,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "warn".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            color: default_color(),
        }
    }
}

/// Initialize logging.
///
/// Logs go to stderr, or to `file` when set; stdout is left for command
/// output.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use std::sync::Arc;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let file = match &config.file {
        Some(path) => Some(Arc::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Config(format!("Failed to open log file: {e}")))?,
        )),
        None => None,
    };

    let result = match (config.format.as_str(), file) {
        ("json", Some(file)) => subscriber.with(fmt::layer().json().with_writer(file)).try_init(),
        ("json", None) => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (_, Some(file)) => subscriber
            .with(fmt::layer().with_ansi(false).with_writer(file))
            .try_init(),
        (_, None) => subscriber
            .with(fmt::layer().with_ansi(config.color).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to init logging: {e}")))
}
