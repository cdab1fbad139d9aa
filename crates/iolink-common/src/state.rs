//! IO-Link device operating modes and states.
//!
//! The master *requests* an operating mode; the device *reports* an
//! operating state. The two enumerations share codes for Inactive,
//! PreOperate and Operate, but code 3 means `Auto` as a mode and
//! `CheckFault` as a state:
//!
//! | Code | Mode       | State      |
//! |------|------------|------------|
//! | 0    | Inactive   | Inactive   |
//! | 3    | Auto       | CheckFault |
//! | 4    | PreOperate | PreOperate |
//! | 5    | Operate    | Operate    |

use crate::error::{IolinkError, IolinkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating mode requested from the master port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OperatingMode {
    /// Port deactivated; no communication with the device.
    Inactive = 0,
    /// Let the master and device negotiate the state on their own.
    Auto = 3,
    /// Parameterization phase: ISDU access, no cyclic process data.
    PreOperate = 4,
    /// Cyclic process data exchange.
    Operate = 5,
}

impl OperatingMode {
    /// Raw mode code passed to the master driver.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The single state the device must report after this mode was requested.
    ///
    /// Returns `None` for [`OperatingMode::Auto`], where the device settles
    /// on a state autonomously.
    #[must_use]
    pub fn expected_state(self) -> Option<OperatingState> {
        match self {
            Self::Inactive => Some(OperatingState::Inactive),
            Self::Auto => None,
            Self::PreOperate => Some(OperatingState::PreOperate),
            Self::Operate => Some(OperatingState::Operate),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Auto => write!(f, "AUTO"),
            Self::PreOperate => write!(f, "PREOPERATE"),
            Self::Operate => write!(f, "OPERATE"),
        }
    }
}

/// Operating state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum OperatingState {
    /// Port inactive.
    Inactive = 0,
    /// Startup checks failed (wrong device, missing supply, ...).
    CheckFault = 3,
    /// Device answered and accepts parameterization.
    PreOperate = 4,
    /// Device exchanges cyclic process data.
    Operate = 5,
}

impl OperatingState {
    /// Parse a raw state code reported by the driver.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Inactive),
            3 => Some(Self::CheckFault),
            4 => Some(Self::PreOperate),
            5 => Some(Self::Operate),
            _ => None,
        }
    }

    /// Raw state code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if the device accepts ISDU requests in this state.
    #[must_use]
    pub fn accepts_isdu(self) -> bool {
        matches!(self, Self::PreOperate | Self::Operate)
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "INACTIVE"),
            Self::CheckFault => write!(f, "CHK_FAULT"),
            Self::PreOperate => write!(f, "PREOPERATE"),
            Self::Operate => write!(f, "OPERATE"),
        }
    }
}

/// Device state a port user may ask for.
///
/// `Auto` is deliberately absent; it is only reachable through the
/// lower-level state machine API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetState {
    /// Deactivate the port.
    Inactive,
    /// Bring the device up for parameterization.
    PreOperate,
    /// Bring the device up for cyclic process data.
    Operate,
}

impl TargetState {
    /// Mode to request from the master for this target.
    #[must_use]
    pub fn mode(self) -> OperatingMode {
        match self {
            Self::Inactive => OperatingMode::Inactive,
            Self::PreOperate => OperatingMode::PreOperate,
            Self::Operate => OperatingMode::Operate,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "Inactive"),
            Self::PreOperate => write!(f, "PreOperate"),
            Self::Operate => write!(f, "Operate"),
        }
    }
}

impl FromStr for TargetState {
    type Err = IolinkError;

    fn from_str(s: &str) -> IolinkResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inactive" => Ok(Self::Inactive),
            "preoperate" => Ok(Self::PreOperate),
            "operate" => Ok(Self::Operate),
            other => Err(IolinkError::InvalidArgument(format!(
                "unknown target state '{other}' (expected Inactive, PreOperate or Operate)"
            ))),
        }
    }
}
