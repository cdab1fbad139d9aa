//! IO-Link master port layer.
//!
//! This crate provides:
//! - [`MasterDriver`] trait abstracting the native master driver
//! - [`state_machine`] module with the device operating-mode state machine
//! - [`isdu`] module with the ISDU transaction engine
//! - [`process_data`] module with the cyclic process-data channel
//! - [`port`] module composing the above into a single [`Port`]
//! - [`simulated`] module with an in-memory master for tests and demos

pub mod channel;
pub mod isdu;
pub mod port;
pub mod process_data;
#[cfg(feature = "simulated")]
pub mod simulated;
pub mod state_machine;

pub use channel::*;
pub use isdu::IsduEngine;
pub use port::Port;
pub use process_data::{PdInput, ProcessDataChannel};
#[cfg(feature = "simulated")]
pub use simulated::{DriverCall, SimulatedMaster};
pub use state_machine::DeviceStateMachine;

use iolink_common::config::{DriverKind, PortConfig};
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::isdu::{IsduAddress, IsduErrorCode};
use iolink_common::state::{OperatingMode, OperatingState};
use std::fmt;
use thiserror::Error;

/// Opaque handle for a connected master port, issued by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle(u16);

impl PortHandle {
    /// Wrap a raw driver handle.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw driver handle.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Version of the native master driver library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriverVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl DriverVersion {
    /// Create a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Failure reported by a single driver call.
///
/// `status` is the driver's negative return code. `isdu_error` is only
/// meaningful for ISDU fetch calls, where it carries the device's
/// rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("driver status {status}: {message}")]
pub struct DriverFault {
    /// Negative status code returned by the driver.
    pub status: i16,
    /// Driver message text.
    pub message: String,
    /// Device error code for rejected ISDU requests.
    pub isdu_error: IsduErrorCode,
}

impl DriverFault {
    /// Create a fault with a status and message.
    pub fn new(status: i16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            isdu_error: IsduErrorCode::default(),
        }
    }

    /// Attach the device's ISDU error code.
    #[must_use]
    pub fn with_isdu_error(mut self, code: IsduErrorCode) -> Self {
        self.isdu_error = code;
        self
    }

    /// Convert to a connection error carrying the driver message.
    #[must_use]
    pub fn into_connection_error(self) -> IolinkError {
        IolinkError::Connection(self.message)
    }
}

/// Result of a single driver call.
pub type DriverResult<T> = Result<T, DriverFault>;

/// Length and device status reported with a process-data input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputReport {
    /// Number of valid bytes the driver placed in the receive buffer.
    pub length: usize,
    /// Device status byte.
    pub status: u8,
}

/// Native master driver abstraction.
///
/// This trait is the narrow capability interface the port layer needs
/// from a concrete IO-Link master. Every call either succeeds or returns
/// a [`DriverFault`] carrying the driver's negative status and message.
/// Receive buffers are provided by the caller; their length is the
/// maximum the driver may fill.
pub trait MasterDriver: Send {
    /// Query the driver library version.
    fn query_version(&mut self) -> DriverResult<DriverVersion>;

    /// Connect to the first master found within `channels`.
    fn connect(&mut self, channels: ChannelRange) -> DriverResult<PortHandle>;

    /// Release a port handle.
    fn disconnect(&mut self, handle: PortHandle) -> DriverResult<()>;

    /// Request an operating mode.
    ///
    /// `expected` is the state the device must reach, or `None` for
    /// [`OperatingMode::Auto`]. Returns the raw state code the device
    /// reports afterwards.
    fn set_operating_mode(
        &mut self,
        handle: PortHandle,
        mode: OperatingMode,
        expected: Option<OperatingState>,
    ) -> DriverResult<u8>;

    /// Read the process-data input frame and the device status byte.
    fn get_status(&mut self, handle: PortHandle, buf: &mut [u8]) -> DriverResult<InputReport>;

    /// Write the process-data output frame.
    fn set_process_data(&mut self, handle: PortHandle, data: &[u8]) -> DriverResult<()>;

    /// Mark the current output frame valid or invalid.
    fn set_process_data_validity(&mut self, handle: PortHandle, valid: bool) -> DriverResult<()>;

    /// Switch the port's L+ supply on or off.
    fn power_control(&mut self, handle: PortHandle, on: bool) -> DriverResult<()>;

    /// Issue an ISDU read request.
    fn start_read_isdu(&mut self, handle: PortHandle, address: IsduAddress) -> DriverResult<()>;

    /// Block until the ISDU response for `address` arrived or the driver's
    /// internal deadline expired.
    fn wait_isdu_response(&mut self, handle: PortHandle, address: IsduAddress) -> DriverResult<()>;

    /// Copy the ISDU read response into `buf`; returns the number of valid bytes.
    ///
    /// A rejected request fails with the device's code in
    /// [`DriverFault::isdu_error`].
    fn fetch_read_isdu_response(&mut self, handle: PortHandle, buf: &mut [u8])
        -> DriverResult<usize>;

    /// Issue an ISDU write request.
    fn start_write_isdu(
        &mut self,
        handle: PortHandle,
        address: IsduAddress,
        data: &[u8],
    ) -> DriverResult<()>;

    /// Fetch the ISDU write response.
    fn fetch_write_isdu_response(&mut self, handle: PortHandle) -> DriverResult<()>;
}

macro_rules! forward_master_driver {
    () => {
        fn query_version(&mut self) -> DriverResult<DriverVersion> {
            (**self).query_version()
        }

        fn connect(&mut self, channels: ChannelRange) -> DriverResult<PortHandle> {
            (**self).connect(channels)
        }

        fn disconnect(&mut self, handle: PortHandle) -> DriverResult<()> {
            (**self).disconnect(handle)
        }

        fn set_operating_mode(
            &mut self,
            handle: PortHandle,
            mode: OperatingMode,
            expected: Option<OperatingState>,
        ) -> DriverResult<u8> {
            (**self).set_operating_mode(handle, mode, expected)
        }

        fn get_status(&mut self, handle: PortHandle, buf: &mut [u8]) -> DriverResult<InputReport> {
            (**self).get_status(handle, buf)
        }

        fn set_process_data(&mut self, handle: PortHandle, data: &[u8]) -> DriverResult<()> {
            (**self).set_process_data(handle, data)
        }

        fn set_process_data_validity(
            &mut self,
            handle: PortHandle,
            valid: bool,
        ) -> DriverResult<()> {
            (**self).set_process_data_validity(handle, valid)
        }

        fn power_control(&mut self, handle: PortHandle, on: bool) -> DriverResult<()> {
            (**self).power_control(handle, on)
        }

        fn start_read_isdu(&mut self, handle: PortHandle, address: IsduAddress) -> DriverResult<()> {
            (**self).start_read_isdu(handle, address)
        }

        fn wait_isdu_response(
            &mut self,
            handle: PortHandle,
            address: IsduAddress,
        ) -> DriverResult<()> {
            (**self).wait_isdu_response(handle, address)
        }

        fn fetch_read_isdu_response(
            &mut self,
            handle: PortHandle,
            buf: &mut [u8],
        ) -> DriverResult<usize> {
            (**self).fetch_read_isdu_response(handle, buf)
        }

        fn start_write_isdu(
            &mut self,
            handle: PortHandle,
            address: IsduAddress,
            data: &[u8],
        ) -> DriverResult<()> {
            (**self).start_write_isdu(handle, address, data)
        }

        fn fetch_write_isdu_response(&mut self, handle: PortHandle) -> DriverResult<()> {
            (**self).fetch_write_isdu_response(handle)
        }
    };
}

impl<T: MasterDriver + ?Sized> MasterDriver for Box<T> {
    forward_master_driver!();
}

impl<T: MasterDriver + ?Sized> MasterDriver for &mut T {
    forward_master_driver!();
}

/// Create the driver backend selected in the configuration.
///
/// # Errors
///
/// Returns a configuration error if the backend was not compiled in.
pub fn create_driver(config: &PortConfig) -> IolinkResult<Box<dyn MasterDriver>> {
    match config.driver {
        #[cfg(feature = "simulated")]
        DriverKind::Simulated => Ok(Box::new(SimulatedMaster::from_config(&config.simulated))),
        #[cfg(not(feature = "simulated"))]
        DriverKind::Simulated => Err(IolinkError::Configuration(
            "simulated master support not compiled in".into(),
        )),
    }
}

/// Create the configured driver and open a port on it.
///
/// # Errors
///
/// Fails if the driver is unsupported, its version is too old, the
/// channel selector is invalid, or the connect call fails.
pub fn open_port(config: &PortConfig) -> IolinkResult<Port> {
    let driver = create_driver(config)?;
    Port::open(driver, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_fault_builder() {
        let fault = DriverFault::new(-7, "rejected").with_isdu_error(IsduErrorCode::IDX_NOTAVAIL);
        assert_eq!(fault.status, -7);
        assert_eq!(fault.isdu_error, IsduErrorCode(0x8011));
        assert_eq!(fault.to_string(), "driver status -7: rejected");
        assert_eq!(
            fault.into_connection_error(),
            IolinkError::Connection("rejected".into())
        );
    }

    #[test]
    fn test_version_ordering() {
        assert!(DriverVersion::new(2, 0) > DriverVersion::new(1, 9));
        assert_eq!(DriverVersion::new(2, 1).to_string(), "2.1");
    }

    #[cfg(feature = "simulated")]
    #[test]
    fn test_open_port_from_default_config() {
        let mut port = open_port(&PortConfig::default()).unwrap();
        assert!(port.is_connected());
        port.shut_down().unwrap();
        assert!(!port.is_connected());
    }
}
