//! Subcommand execution and output formatting.

use anyhow::{Context, Result};
use clap::Subcommand;
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::isdu::{standard_index, SystemCommand};
use iolink_common::state::TargetState;
use iolink_master::{MasterDriver, Port};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Port operations.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show driver version and connection details.
    Info,

    /// Read vendor name, product name and serial number.
    Identify,

    /// Switch the device supply.
    Power {
        /// `on` or `off`.
        #[arg(value_parser = ["on", "off"])]
        switch: String,
    },

    /// Change the device state (Inactive, PreOperate, Operate).
    State {
        /// Target state.
        target: TargetState,
    },

    /// Read a device parameter over ISDU.
    Read {
        /// Parameter index (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_index)]
        index: u16,
        /// Parameter subindex.
        #[arg(value_parser = parse_subindex, default_value = "0")]
        subindex: u8,
    },

    /// Write a device parameter over ISDU.
    Write {
        /// Parameter index (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_index)]
        index: u16,
        /// Parameter subindex.
        #[arg(value_parser = parse_subindex)]
        subindex: u8,
        /// Value as hex bytes, e.g. `01F4` or `01:f4`.
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Read the process-data input frame and device status.
    PdIn,

    /// Write a process-data output frame.
    PdOut {
        /// Frame as hex bytes.
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Send a standard system command, e.g. `restore-factory-settings`.
    SystemCommand {
        /// Command name.
        command: SystemCommand,
    },
}

/// Byte string given on the command line as hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Port details.
    Info {
        driver_version: String,
        handle: Option<u16>,
        channel: Option<u8>,
        state: Option<String>,
        transitions: u64,
    },
    /// Device identification strings.
    Identity {
        vendor: String,
        product: String,
        serial: String,
    },
    /// Device state after a transition.
    State { state: Option<String> },
    /// Parameter value.
    Isdu {
        index: u16,
        subindex: u8,
        data: String,
    },
    /// Process-data input frame.
    PdInput { data: String, status: u8 },
    /// Operation without a result value.
    Done { operation: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info {
                driver_version,
                handle,
                channel,
                state,
                transitions,
            } => {
                writeln!(f, "driver version: {driver_version}")?;
                match handle {
                    Some(h) => writeln!(f, "handle:         {h}")?,
                    None => writeln!(f, "handle:         -")?,
                }
                match channel {
                    Some(c) => writeln!(f, "channel:        COM{c}")?,
                    None => writeln!(f, "channel:        first available")?,
                }
                writeln!(f, "device state:   {}", state.as_deref().unwrap_or("unknown"))?;
                write!(f, "transitions:    {transitions}")
            }
            Self::Identity {
                vendor,
                product,
                serial,
            } => {
                writeln!(f, "vendor:  {vendor}")?;
                writeln!(f, "product: {product}")?;
                write!(f, "serial:  {serial}")
            }
            Self::State { state } => {
                write!(f, "device state: {}", state.as_deref().unwrap_or("unknown"))
            }
            Self::Isdu {
                index,
                subindex,
                data,
            } => write!(f, "{index:#06x}:{subindex} = {data}"),
            Self::PdInput { data, status } => {
                write!(f, "input: {data} (status {status:#04x})")
            }
            Self::Done { operation } => write!(f, "{operation}: ok"),
        }
    }
}

/// Run `command` on a connected port.
pub fn execute<D: MasterDriver>(port: &mut Port<D>, command: &Command) -> Result<Outcome> {
    debug!(?command, "Executing command");
    let outcome = match command {
        Command::Info => info(port),
        Command::Identify => identify(port)?,
        Command::Power { switch } => {
            if switch == "on" {
                port.power_on().context("Failed to switch port power on")?;
            } else {
                port.power_off().context("Failed to switch port power off")?;
            }
            Outcome::Done {
                operation: format!("power {switch}"),
            }
        }
        Command::State { target } => {
            port.change_device_state_to(*target)
                .with_context(|| format!("Failed to change device state to {target}"))?;
            Outcome::State {
                state: port.last_reported_state().map(|s| s.to_string()),
            }
        }
        Command::Read { index, subindex } => {
            let data = port
                .read_device_isdu(*index, *subindex)
                .with_context(|| format!("Failed to read ISDU {index:#06x}:{subindex}"))?;
            Outcome::Isdu {
                index: *index,
                subindex: *subindex,
                data: hex::encode(data),
            }
        }
        Command::Write {
            index,
            subindex,
            data,
        } => {
            port.write_device_isdu(*index, *subindex, &data.0)
                .with_context(|| format!("Failed to write ISDU {index:#06x}:{subindex}"))?;
            Outcome::Done {
                operation: format!("write {index:#06x}:{subindex}"),
            }
        }
        Command::PdIn => {
            let input = port
                .get_device_pd_input_and_status()
                .context("Failed to read process data input")?;
            Outcome::PdInput {
                data: hex::encode(&input.data),
                status: input.status,
            }
        }
        Command::PdOut { data } => {
            port.set_device_pd_output(&data.0)
                .context("Failed to write process data output")?;
            Outcome::Done {
                operation: format!("pd-out ({} bytes)", data.0.len()),
            }
        }
        Command::SystemCommand { command } => {
            port.send_system_command(*command)
                .with_context(|| format!("System command {command:?} failed"))?;
            Outcome::Done {
                operation: format!("system command {command:?}"),
            }
        }
    };
    Ok(outcome)
}

fn info<D: MasterDriver>(port: &Port<D>) -> Outcome {
    Outcome::Info {
        driver_version: port.driver_version().to_string(),
        handle: port.handle().map(|h| h.raw()),
        channel: port.channel(),
        state: port.last_reported_state().map(|s| s.to_string()),
        transitions: port.transition_count(),
    }
}

fn identify<D: MasterDriver>(port: &mut Port<D>) -> Result<Outcome> {
    let accepts_isdu = port
        .last_reported_state()
        .is_some_and(|state| state.accepts_isdu());
    if !accepts_isdu {
        port.change_device_state_to(TargetState::PreOperate)
            .context("Failed to bring device into PREOPERATE")?;
    }

    let mut read_text = |index: u16, name: &str| -> Result<String> {
        let raw = port
            .read_device_isdu(index, 0)
            .with_context(|| format!("Failed to read {name}"))?;
        Ok(String::from_utf8_lossy(&raw).trim_end_matches('\0').to_string())
    };

    Ok(Outcome::Identity {
        vendor: read_text(standard_index::VENDOR_NAME, "vendor name")?,
        product: read_text(standard_index::PRODUCT_NAME, "product name")?,
        serial: read_text(standard_index::SERIAL_NUMBER, "serial number").unwrap_or_else(|e| {
            warn!(error = %e, "Serial number not available");
            String::new()
        }),
    })
}

/// Print an outcome, as JSON or text.
pub fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(outcome).context("Failed to encode output")?;
        println!("{text}");
    } else {
        println!("{outcome}");
    }
    Ok(())
}

fn parse_number(text: &str) -> IolinkResult<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| IolinkError::InvalidArgument(format!("'{text}' is not a number")))
}

/// Parse an ISDU index.
pub fn parse_index(text: &str) -> IolinkResult<u16> {
    let value = parse_number(text)?;
    u16::try_from(value)
        .map_err(|_| IolinkError::InvalidArgument(format!("index {value} exceeds 0xffff")))
}

/// Parse an ISDU subindex.
pub fn parse_subindex(text: &str) -> IolinkResult<u8> {
    let value = parse_number(text)?;
    u8::try_from(value)
        .map_err(|_| IolinkError::InvalidArgument(format!("subindex {value} exceeds 255")))
}

/// Parse a hex byte string. `:`, `,`, `_` and whitespace separate bytes
/// and are ignored; an optional `0x` prefix is stripped.
pub fn parse_hex_bytes(text: &str) -> IolinkResult<HexBytes> {
    let trimmed = text.trim();
    let digits: String = trimmed
        .strip_prefix("0x")
        .unwrap_or(trimmed)
        .chars()
        .filter(|c| !matches!(c, ':' | ',' | '_') && !c.is_whitespace())
        .collect();

    hex::decode(&digits)
        .map(HexBytes)
        .map_err(|e| IolinkError::InvalidArgument(format!("'{text}' is not a hex byte string: {e}")))
}
