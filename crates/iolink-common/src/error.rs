use crate::isdu::{IsduAddress, IsduDirection, IsduErrorCode};
use crate::state::{OperatingMode, OperatingState};
use thiserror::Error;

/// IO-Link port error types covering transport faults, device rejections,
/// and protocol sequencing violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IolinkError {
    /// Driver-level failure; carries the driver's message text.
    #[error("connection error: {0}")]
    Connection(String),

    /// The ISDU response did not arrive within the driver's deadline.
    #[error("ISDU timeout: {0}")]
    Timeout(String),

    /// The device rejected a parameter read or write.
    #[error("ISDU error {0}")]
    Isdu(IsduErrorCode),

    /// The device did not reach the requested operating state.
    #[error("state mismatch: requested {requested}, expected {expected}, device reports {actual}")]
    StateMismatch {
        /// Requested operating mode.
        requested: OperatingMode,
        /// State the mode should have produced.
        expected: OperatingState,
        /// Raw state code reported by the device.
        actual: u8,
    },

    /// Invalid channel selector or unsupported driver.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The port has no driver handle (never connected, or shut down).
    #[error("port is not connected")]
    NotConnected,

    /// An ISDU transaction is already in flight on this port.
    #[error("ISDU transaction already pending for {address}")]
    TransactionPending {
        /// Address of the pending transaction.
        address: IsduAddress,
    },

    /// No ISDU transaction of the requested direction is pending.
    #[error("no pending ISDU {direction} transaction")]
    NoPendingTransaction {
        /// Direction the caller tried to finish.
        direction: IsduDirection,
    },

    /// Caller-supplied text could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IolinkError {
    /// Device error code if this is an ISDU rejection.
    #[must_use]
    pub fn isdu_code(&self) -> Option<IsduErrorCode> {
        match self {
            Self::Isdu(code) => Some(*code),
            _ => None,
        }
    }

    /// Returns true for failures after which the device state is unknown
    /// and the caller should resynchronize.
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Convenience type alias for port operations.
pub type IolinkResult<T> = Result<T, IolinkError>;
