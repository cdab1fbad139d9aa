//! IO-Link command-line tool.
//!
//! Opens one master port from a TOML configuration, runs a single port
//! operation and shuts the port down again.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use iolink_common::config::PortConfig;
use iolink_common::state::TargetState;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::commands::{execute, print_outcome, Command};

/// IO-Link command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "iolink-cli",
    about = "IO-Link master port tool - device state, ISDU parameters and process data",
    version,
    long_about = None
)]
struct Args {
    /// Path to a port configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Master channel, e.g. `COM3` (overrides config file).
    #[arg(long, value_name = "COMx")]
    channel: Option<String>,

    /// Bring the device into this state before running the command.
    #[arg(long, value_name = "STATE")]
    state: Option<TargetState>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config(&args)?;
    if let Some(channel) = &args.channel {
        config.channel = Some(channel.clone());
    }
    info!(driver = ?config.driver, channel = ?config.channel, "Configuration loaded");

    let mut port = iolink_master::open_port(&config).context("Failed to open IO-Link port")?;

    if let Some(target) = args.state {
        port.change_device_state_to(target)
            .with_context(|| format!("Failed to change device state to {target}"))?;
    }

    let result = execute(&mut port, &args.command);

    if let Err(e) = port.shut_down() {
        warn!(error = %e, "Port shutdown failed");
    }

    print_outcome(&result?, args.json)
}

/// Initialize logging with the specified log level.
///
/// Logs go to stderr so that `--json` output stays parseable.
fn init_logging(level: &str) {
    let filter = format!("iolink_cli={level},iolink_master={level},iolink_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `IOLINK_CONFIG_PATH` environment variable
/// 3. `/etc/iolink/config.toml` (system path)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<PortConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return PortConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("IOLINK_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from IOLINK_CONFIG_PATH");
            return PortConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from IOLINK_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "IOLINK_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/iolink/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return PortConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {system_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(PortConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["iolink-cli", "--json", "read", "0x51", "0"]);
        assert!(args.json);
        assert!(args.config.is_none());
        assert_eq!(
            args.command,
            Command::Read {
                index: 0x51,
                subindex: 0
            }
        );
    }

    #[test]
    fn test_args_with_config_and_state() {
        let args = Args::parse_from([
            "iolink-cli",
            "-c",
            "port.toml",
            "--channel",
            "COM4",
            "--state",
            "operate",
            "pd-out",
            "0102",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("port.toml")));
        assert_eq!(args.channel.as_deref(), Some("COM4"));
        assert_eq!(args.state, Some(TargetState::Operate));
        assert!(matches!(args.command, Command::PdOut { .. }));
    }

    #[test]
    fn test_invalid_state_rejected() {
        let result = Args::try_parse_from(["iolink-cli", "state", "auto"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel = \"COM3\"").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let args = Args::parse_from(["iolink-cli", "-c", path.as_str(), "info"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.channel.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args = Args::parse_from(["iolink-cli", "-c", "/nonexistent/port.toml", "info"]);
        assert!(load_config(&args).is_err());
    }
}
