//! gemsync CLI - Gemini settings over MIDI SysEx.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;

use gemsync::calibration::code_to_volts;
use gemsync::cli::*;
use gemsync::config::{init_logging, Config};
use gemsync::error::{Error, Result};
use gemsync::record::{preset, Schema, SettingsRecord, PRESET_NAMES};
use gemsync::session::Session;
use gemsync::teeth;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load config if specified
    let config = Config::load_or_default(cli.config.as_deref())?;

    // Initialize logging
    let mut log_config = config.logging.clone();
    if let Some(level) = &cli.log_level {
        log_config.level.clone_from(level);
    }
    log_config.color &= !cli.no_color;
    init_logging(&log_config)?;

    // Dispatch command
    match cli.command {
        Commands::Info(args) => run_info(args, &config, cli.format).await,
        Commands::Load(args) => run_load(args, &config).await,
        Commands::Save(args) => run_save(args, &config).await,
        Commands::Reset(args) => run_reset(args, &config).await,
        Commands::Restart(args) => run_restart(args, &config).await,
        Commands::Adc(args) => run_adc(args, &config, cli.format).await,
        Commands::Schema(args) => run_schema(args, &config),
        Commands::Config(args) => run_config(args),
        Commands::Teeth(args) => run_teeth(args),
    }
}

/// Identify the device
async fn run_info(args: PortArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let session = Session::open(config, args.port.as_deref()).await?;
    let info = session.disconnect().await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&info).map_err(anyhow::Error::from)?;
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("{}", "Device:".bright_white().bold());
            println!("  Port:     {}", info.port);
            println!("  Firmware: {}", info.firmware.to_string().bright_green());
            println!("  Serial:   {}", info.serial);
            println!("  Hardware: {}", info.revision);
        }
    }
    Ok(())
}

/// Load settings and write them out
async fn run_load(args: LoadArgs, config: &Config) -> Result<()> {
    let mut session = Session::open(config, args.port.port.as_deref()).await?;
    let record = session.load_settings().await?;
    session.disconnect().await?;

    let format = args
        .settings_format
        .or_else(|| args.output.as_deref().map(SettingsFormat::from_path))
        .unwrap_or(SettingsFormat::Toml);
    let rendered = match format {
        SettingsFormat::Toml => record.to_toml()?,
        SettingsFormat::Json => record.to_json()?,
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            eprintln!(
                "{} Loaded {} settings into {}",
                "✓".green(),
                record.schema().fields.len(),
                path.display()
            );
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Write settings from a file
async fn run_save(args: SaveArgs, config: &Config) -> Result<()> {
    let schema = config.protocol.resolve_schema()?;
    let wanted = read_settings_file(&args.input, Arc::clone(&schema))?;

    let mut session = Session::open(config, args.port.port.as_deref()).await?;
    let current = session.load_settings().await?;

    let changes = current.diff(&wanted);
    if changes.is_empty() {
        println!("{} Device settings already match {}", "●".green(), args.input.display());
        session.disconnect().await?;
        return Ok(());
    }

    println!("{}", "Changes:".bright_white().bold());
    for (name, ours, theirs) in &changes {
        println!("  {name}: {} {} {}", ours.to_string().dimmed(), "→".cyan(), theirs);
    }

    if args.dry_run {
        println!("{} Dry run, nothing written.", "●".yellow());
        session.disconnect().await?;
        return Ok(());
    }

    session.apply(&wanted)?;
    session.save_settings().await?;
    println!("{} Saved {} changed settings.", "✓".green(), changes.len());

    if args.verify {
        let readback = session.load_settings().await?;
        if readback != wanted {
            session.disconnect().await?;
            return Err(Error::Other(anyhow::anyhow!(
                "verification failed: {} fields differ after save",
                readback.diff(&wanted).len()
            )));
        }
        println!("{} Verified.", "✓".green());
    }

    session.disconnect().await?;
    Ok(())
}

/// Erase stored settings
async fn run_reset(args: ResetArgs, config: &Config) -> Result<()> {
    if !args.yes {
        return Err(Error::Config(
            "Refusing to erase settings without --yes".into(),
        ));
    }
    let mut session = Session::open(config, args.port.port.as_deref()).await?;
    session.reset_settings().await?;
    session.disconnect().await?;
    println!("{} Settings reset to firmware defaults.", "✓".green());
    Ok(())
}

/// Restart the firmware
async fn run_restart(args: PortArgs, config: &Config) -> Result<()> {
    let mut session = Session::open(config, args.port.as_deref()).await?;
    session.soft_reset().await?;
    session.disconnect().await?;
    println!("{} Restart requested.", "✓".green());
    Ok(())
}

/// Read an ADC channel
async fn run_adc(args: AdcArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let mut session = Session::open(config, args.port.port.as_deref()).await?;
    let code = session.read_adc_average(args.channel, args.samples).await?;
    let info = session.disconnect().await?;
    let volts = code_to_volts(info.revision, code);

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "channel": args.channel,
                "samples": args.samples,
                "code": code,
                "volts": volts,
            })
        ),
        OutputFormat::Text => println!(
            "  Channel {}: code {:.1} ({} V)",
            args.channel,
            code,
            format!("{volts:.3}").bright_green()
        ),
    }
    Ok(())
}

/// Show a schema
fn run_schema(args: SchemaArgs, config: &Config) -> Result<()> {
    if args.list {
        for name in PRESET_NAMES {
            println!("{name}");
        }
        return Ok(());
    }

    let schema = match (&args.file, &args.name) {
        (Some(path), _) => Schema::load(path)?,
        (None, Some(name)) => preset(name)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown schema {name:?}")))?,
        (None, None) => (*config.protocol.resolve_schema()?).clone(),
    };

    if args.toml {
        print!("{}", schema.to_toml()?);
        return Ok(());
    }

    let magic = schema
        .magic
        .map_or_else(|| "none".to_string(), |m| format!("{m:#04x}"));
    println!(
        "{} (magic {}, {} bytes, {} encoded)",
        schema.name.bright_white().bold(),
        magic,
        schema.packed_size(),
        teeth::encoded_length(schema.packed_size())
    );
    for (offset, field) in schema.layout() {
        println!(
            "  {:>3}  {:<8} {:<28} {}",
            offset,
            field.kind.to_string().cyan(),
            field.name,
            field.default.to_string().dimmed()
        );
    }
    Ok(())
}

/// Print example configuration
fn run_config(args: ConfigArgs) -> Result<()> {
    let config = Config::example();
    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            config.save(&path)?;
            println!("{} Wrote {}", "✓".green(), path.display());
        }
        None => {
            let content = toml::to_string_pretty(&config)
                .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
            print!("{content}");
        }
    }
    Ok(())
}

/// Run the teeth codec
fn run_teeth(args: TeethArgs) -> Result<()> {
    let (input, output) = match args.action {
        TeethAction::Encode { hex } => {
            let input = parse_hex(&hex)?;
            let output = teeth::encode(&input);
            (input, output)
        }
        TeethAction::Decode { hex, lenient } => {
            let input = parse_hex(&hex)?;
            let output = if lenient {
                teeth::decode_lenient(&input)
            } else {
                teeth::decode(&input)?
            };
            (input, output)
        }
    };
    tracing::debug!(input = input.len(), output = output.len(), "Teeth");
    println!("{}", hex::encode(output));
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|e| Error::Other(anyhow::anyhow!("invalid hex input: {e}")))
}

fn read_settings_file(path: &Path, schema: Arc<Schema>) -> Result<SettingsRecord> {
    let content = std::fs::read_to_string(path)?;
    match SettingsFormat::from_path(path) {
        SettingsFormat::Toml => SettingsRecord::from_toml(schema, &content),
        SettingsFormat::Json => SettingsRecord::from_json(schema, &content),
    }
}
