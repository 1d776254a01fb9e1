//! Command-line interface for gemsync.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// gemsync - settings sync for Gemini over MIDI SysEx
#[derive(Parser, Debug)]
#[command(
    name = "gemsync",
    author,
    version,
    about = "Read and write Gemini device settings over MIDI SysEx",
    long_about = r#"
gemsync talks to a Gemini module over its SysEx settings protocol:

  - Identify the device (firmware, serial number, hardware revision)
  - Dump settings to a TOML or JSON file and write them back
  - Reset settings or restart the firmware
  - Read raw ADC channels for calibration checks

QUICK START:
  gemsync config --output ~/.config/gemsync/config.toml
  gemsync info
  gemsync load --output settings.toml
  gemsync save settings.toml
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identify the connected device
    Info(PortArgs),

    /// Load settings from the device
    Load(LoadArgs),

    /// Write settings from a file to the device
    Save(SaveArgs),

    /// Erase settings back to firmware defaults
    Reset(ResetArgs),

    /// Restart the device firmware
    Restart(PortArgs),

    /// Read an ADC channel
    Adc(AdcArgs),

    /// Show a settings schema
    Schema(SchemaArgs),

    /// Show example configuration
    Config(ConfigArgs),

    /// Run the teeth codec on hex input
    Teeth(TeethArgs),
}

/// Port selection shared by device commands
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Port name (defaults to device.port from the config)
    #[arg(short, long)]
    pub port: Option<String>,
}

/// Load command arguments
#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Settings file format; inferred from the output extension if omitted
    #[arg(long)]
    pub settings_format: Option<SettingsFormat>,
}

/// Save command arguments
#[derive(Args, Debug)]
pub struct SaveArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Settings file (TOML or JSON)
    pub input: PathBuf,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Read the settings back after saving and compare
    #[arg(long)]
    pub verify: bool,
}

/// Reset command arguments
#[derive(Args, Debug)]
pub struct ResetArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Confirm erasing the stored settings
    #[arg(long)]
    pub yes: bool,
}

/// ADC command arguments
#[derive(Args, Debug)]
pub struct AdcArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// ADC channel
    #[arg(value_parser = clap::value_parser!(u8).range(0..128))]
    pub channel: u8,

    /// Number of samples to average
    #[arg(short, long, default_value = "1")]
    pub samples: u32,
}

/// Schema command arguments
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Built-in schema name (defaults to protocol.schema from the config)
    pub name: Option<String>,

    /// Load the schema from a TOML file instead
    #[arg(long, conflicts_with = "name")]
    pub file: Option<PathBuf>,

    /// Print the schema as TOML
    #[arg(long)]
    pub toml: bool,

    /// List built-in schemas
    #[arg(long)]
    pub list: bool,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Teeth command arguments
#[derive(Args, Debug)]
pub struct TeethArgs {
    #[command(subcommand)]
    pub action: TeethAction,
}

/// Teeth codec actions
#[derive(Subcommand, Debug)]
pub enum TeethAction {
    /// Encode hex bytes
    Encode {
        /// Input bytes as hex
        hex: String,
    },
    /// Decode hex bytes
    Decode {
        /// Input bytes as hex
        hex: String,

        /// Keep the well-formed prefix instead of failing
        #[arg(long)]
        lenient: bool,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Settings file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingsFormat {
    Toml,
    Json,
}

impl SettingsFormat {
    /// Pick a format from a file extension, defaulting to TOML.
    pub fn from_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}
