//! Device operating-mode state machine.
//!
//! Requests an operating mode from the master and checks the state the
//! device reports back. The cached state is advisory; the driver is
//! always the source of truth.

use crate::{MasterDriver, PortHandle};
use iolink_common::error::{IolinkError, IolinkResult};
use iolink_common::state::{OperatingMode, OperatingState};
use tracing::{debug, info, warn};

/// Tracks the last state the device reported for one port.
#[derive(Debug, Default)]
pub struct DeviceStateMachine {
    last_reported: Option<OperatingState>,
    transitions: u64,
}

impl DeviceStateMachine {
    /// Create a state machine with no known device state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State reported by the last successful transition, if any.
    #[must_use]
    pub fn last_reported_state(&self) -> Option<OperatingState> {
        self.last_reported
    }

    /// Number of successful transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Forget the cached state (after disconnect or power loss).
    pub fn reset(&mut self) {
        self.last_reported = None;
    }

    /// Request `mode` and verify the state the device reports.
    ///
    /// Returns the reported state, or `None` when the device answered
    /// [`OperatingMode::Auto`] with a code outside the known states.
    ///
    /// # Errors
    ///
    /// - [`IolinkError::Connection`] if the driver call fails
    /// - [`IolinkError::StateMismatch`] if a mode other than `Auto` did not
    ///   produce its expected state
    pub fn request<D: MasterDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        handle: PortHandle,
        mode: OperatingMode,
    ) -> IolinkResult<Option<OperatingState>> {
        let expected = mode.expected_state();
        debug!(%handle, %mode, ?expected, "Requesting operating mode");

        let actual = match driver.set_operating_mode(handle, mode, expected) {
            Ok(code) => code,
            Err(fault) => {
                self.last_reported = None;
                return Err(fault.into_connection_error());
            }
        };

        if let Some(expected) = expected {
            if actual != expected.code() {
                warn!(%mode, %expected, actual, "Device did not reach requested state");
                self.last_reported = None;
                return Err(IolinkError::StateMismatch {
                    requested: mode,
                    expected,
                    actual,
                });
            }
        }

        let reported = OperatingState::from_code(actual);
        self.last_reported = reported;
        self.transitions += 1;

        match reported {
            Some(state) => info!(%mode, %state, "Device state reached"),
            None => info!(%mode, actual, "Device reports unknown state code"),
        }

        Ok(reported)
    }
}
