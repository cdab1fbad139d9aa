//! Common utilities for acceptance tests.
//!
//! Provides:
//! - A port configuration for a simulated stepper-drive device
//! - [`StepperDrive`], typed parameter and process-data access on top of a port

#![allow(dead_code)]

use iolink_common::config::{ParameterSeed, PortConfig};
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_master::{Port, SimulatedMaster};

/// Value width of a device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    I16,
    I32,
    Bool,
}

impl Width {
    fn len(self) -> usize {
        match self {
            Self::U8 | Self::Bool => 1,
            Self::I16 => 2,
            Self::I32 => 4,
        }
    }
}

/// Parameter table of the stepper drive: (name, index, width, writable).
pub const PARAMETERS: &[(&str, u16, Width, bool)] = &[
    ("Microstep Resolution", 0x40, Width::U8, true),
    ("Maximum Current", 0x50, Width::I16, true),
    ("Standby Current", 0x51, Width::I16, true),
    ("Initialize Position", 0x61, Width::Bool, true),
    ("Following Error Window", 0x62, Width::I32, true),
    ("Set Encoder Position", 0x63, Width::I32, true),
    ("Actual Load Value", 0xC0, Width::I16, false),
    ("PWM Scale Value", 0xC1, Width::I16, false),
    ("Motor Supply Voltage", 0xC2, Width::I32, false),
    ("Actual Current", 0xC3, Width::I16, false),
    ("Encoder Position", 0xC4, Width::I32, false),
    ("Set Actual Position", 0xD0, Width::I32, true),
];

/// Factory value of `Standby Current`.
pub const FACTORY_STANDBY_CURRENT: i64 = 32;

/// Status bit set in the input frame once the target position is reached.
pub const POSITION_REACHED: u8 = 0x02;

/// Port configuration with the stepper drive attached on channel 3.
pub fn stepper_config() -> PortConfig {
    let mut config = PortConfig::default();
    config.simulated.parameters.extend(PARAMETERS.iter().map(|&(name, index, width, writable)| {
        let mut value = vec![0u8; width.len()];
        match name {
            "Maximum Current" => value.copy_from_slice(&100i16.to_be_bytes()),
            "Standby Current" => {
                value.copy_from_slice(&(FACTORY_STANDBY_CURRENT as i16).to_be_bytes());
            }
            "Microstep Resolution" => value[0] = 8,
            "Motor Supply Voltage" => value.copy_from_slice(&240i32.to_be_bytes()),
            _ => {}
        }
        ParameterSeed {
            index,
            subindex: 0,
            value,
            writable,
        }
    }));
    config.simulated.pd_input = encode_input(0, 0, 0, 0);
    config
}

/// Open a port on the stepper drive.
pub fn open_stepper_port() -> Port<SimulatedMaster> {
    let config = stepper_config();
    Port::open(SimulatedMaster::from_config(&config.simulated), &config)
        .expect("stepper port opens")
}

/// Motion mode carried in the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Stop = 0,
    Position = 1,
    Velocity = 2,
}

/// Decoded input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveInput {
    pub actual_position: i32,
    pub actual_velocity: i32,
    pub custom_data: i32,
    pub status: u8,
}

/// Build the 13-byte input frame the drive reports.
pub fn encode_input(position: i32, velocity: i32, custom: i32, status: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(13);
    frame.extend_from_slice(&position.to_be_bytes());
    frame.extend_from_slice(&velocity.to_be_bytes());
    frame.extend_from_slice(&custom.to_be_bytes());
    frame.push(status);
    frame
}

/// Typed access to the stepper drive through a port.
pub struct StepperDrive<'a> {
    port: &'a mut Port<SimulatedMaster>,
}

impl<'a> StepperDrive<'a> {
    pub fn new(port: &'a mut Port<SimulatedMaster>) -> Self {
        Self { port }
    }

    pub fn port(&mut self) -> &mut Port<SimulatedMaster> {
        self.port
    }

    fn lookup(name: &str) -> (u16, Width) {
        PARAMETERS
            .iter()
            .find(|(n, ..)| *n == name)
            .map(|&(_, index, width, _)| (index, width))
            .unwrap_or_else(|| panic!("unknown parameter {name}"))
    }

    /// Write a parameter as a big-endian integer of its width.
    pub fn write_parameter(&mut self, name: &str, value: i64) -> IolinkResult<()> {
        let (index, width) = Self::lookup(name);
        let bytes = match width {
            Width::Bool => vec![u8::from(value != 0)],
            _ => value.to_be_bytes()[8 - width.len()..].to_vec(),
        };
        self.port.write_device_isdu(index, 0, &bytes)
    }

    /// Read a parameter as a signed big-endian integer of its width.
    pub fn read_parameter(&mut self, name: &str) -> IolinkResult<i64> {
        let (index, width) = Self::lookup(name);
        let raw = self.port.read_device_isdu(index, 0)?;
        if raw.len() != width.len() {
            return Err(IolinkError::InvalidArgument(format!(
                "{name}: expected {} bytes, got {}",
                width.len(),
                raw.len()
            )));
        }
        let value = match width {
            Width::Bool => i64::from(raw[0] != 0),
            Width::U8 => i64::from(raw[0]),
            Width::I16 => i64::from(i16::from_be_bytes([raw[0], raw[1]])),
            Width::I32 => i64::from(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])),
        };
        Ok(value)
    }

    /// Write the 9-byte output frame: target position, target velocity, mode.
    pub fn set_pd_output(&mut self, position: i32, velocity: i32, mode: MotionMode) -> IolinkResult<()> {
        let mut frame = Vec::with_capacity(9);
        frame.extend_from_slice(&position.to_be_bytes());
        frame.extend_from_slice(&velocity.to_be_bytes());
        frame.push(mode as u8);
        self.port.set_device_pd_output(&frame)
    }

    /// Read and decode the 13-byte input frame.
    pub fn get_pd_input(&mut self) -> IolinkResult<DriveInput> {
        let input = self.port.get_device_pd_input_and_status()?;
        let d = &input.data;
        if d.len() != 13 {
            return Err(IolinkError::InvalidArgument(format!(
                "expected 13 input bytes, got {}",
                d.len()
            )));
        }
        Ok(DriveInput {
            actual_position: i32::from_be_bytes([d[0], d[1], d[2], d[3]]),
            actual_velocity: i32::from_be_bytes([d[4], d[5], d[6], d[7]]),
            custom_data: i32::from_be_bytes([d[8], d[9], d[10], d[11]]),
            status: d[12],
        })
    }
}
