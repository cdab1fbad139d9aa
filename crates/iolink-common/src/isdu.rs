//! ISDU (Indexed Service Data Unit) addressing and device error codes.
//!
//! Provides:
//! - [`IsduAddress`] identifying one device parameter by (index, subindex)
//! - [`IsduErrorCode`] carrying the device's rejection reason
//! - [`SystemCommand`] values written to the standard system command index
//! - [`standard_index`] constants for well-known device parameters

use crate::error::{IolinkError, IolinkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of one device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsduAddress {
    /// Parameter index.
    pub index: u16,
    /// Subindex within the parameter (0 addresses the whole parameter).
    pub subindex: u8,
}

impl IsduAddress {
    /// Create a new ISDU address.
    #[must_use]
    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }
}

impl fmt::Display for IsduAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{}", self.index, self.subindex)
    }
}

/// Direction of an ISDU transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsduDirection {
    /// Parameter read.
    Read,
    /// Parameter write.
    Write,
}

impl fmt::Display for IsduDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// 16-bit error code reported by a device that rejected an ISDU request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsduErrorCode(pub u16);

impl IsduErrorCode {
    /// Device application error, no details.
    pub const APP_DEV: Self = Self(0x8000);
    /// Index not available.
    pub const IDX_NOTAVAIL: Self = Self(0x8011);
    /// Subindex not available.
    pub const SUBIDX_NOTAVAIL: Self = Self(0x8012);
    /// Service temporarily not available.
    pub const SERV_NOTAVAIL: Self = Self(0x8020);
    /// Service temporarily not available, local control.
    pub const SERV_NOTAVAIL_LOCCTRL: Self = Self(0x8021);
    /// Service temporarily not available, device control.
    pub const SERV_NOTAVAIL_DEVCTRL: Self = Self(0x8022);
    /// Access denied.
    pub const IDX_NOT_ACCESSIBLE: Self = Self(0x8023);
    /// Parameter value out of range.
    pub const PAR_VALOUTOFRNG: Self = Self(0x8030);
    /// Parameter value above limit.
    pub const PAR_VALGTLIM: Self = Self(0x8031);
    /// Parameter value below limit.
    pub const PAR_VALLTLIM: Self = Self(0x8032);
    /// Parameter length overrun.
    pub const VAL_LENOVRRUN: Self = Self(0x8033);
    /// Parameter length underrun.
    pub const VAL_LENUNDRUN: Self = Self(0x8034);
    /// Function not available.
    pub const FUNC_NOTAVAIL: Self = Self(0x8035);
    /// Function temporarily unavailable.
    pub const FUNC_UNAVAILTEMP: Self = Self(0x8036);
    /// Invalid parameter set.
    pub const PAR_SETINVALID: Self = Self(0x8040);
    /// Inconsistent parameter set.
    pub const PAR_SETINCONSIST: Self = Self(0x8041);
    /// Application not ready.
    pub const APP_DEVNOTRDY: Self = Self(0x8082);

    /// Raw code value.
    #[must_use]
    pub fn code(self) -> u16 {
        self.0
    }

    /// Human-readable description for well-known codes.
    #[must_use]
    pub fn description(self) -> Option<&'static str> {
        let text = match self.0 {
            0x8000 => "device application error",
            0x8011 => "index not available",
            0x8012 => "subindex not available",
            0x8020 => "service temporarily not available",
            0x8021 => "service temporarily not available (local control)",
            0x8022 => "service temporarily not available (device control)",
            0x8023 => "access denied",
            0x8030 => "parameter value out of range",
            0x8031 => "parameter value above limit",
            0x8032 => "parameter value below limit",
            0x8033 => "parameter length overrun",
            0x8034 => "parameter length underrun",
            0x8035 => "function not available",
            0x8036 => "function temporarily unavailable",
            0x8040 => "invalid parameter set",
            0x8041 => "inconsistent parameter set",
            0x8082 => "application not ready",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for IsduErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "{:#06x} ({text})", self.0),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Well-known ISDU indices.
pub mod standard_index {
    /// System command (write-only, 1 byte).
    pub const SYSTEM_COMMAND: u16 = 0x0002;
    /// Vendor name string.
    pub const VENDOR_NAME: u16 = 0x0010;
    /// Product name string.
    pub const PRODUCT_NAME: u16 = 0x0012;
    /// Serial number string.
    pub const SERIAL_NUMBER: u16 = 0x0015;
}

/// Standard system commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SystemCommand {
    /// Start a parameter upload to the data storage.
    ParamUploadStart = 0x05,
    /// End a parameter upload.
    ParamUploadEnd = 0x06,
    /// Start a parameter download.
    ParamDownloadStart = 0x07,
    /// End a parameter download.
    ParamDownloadEnd = 0x08,
    /// Store downloaded parameters.
    ParamDownloadStore = 0x09,
    /// Abort a parameter transfer.
    ParamBreak = 0x0A,
    /// Restart the device.
    DeviceReset = 0x80,
    /// Restart the device application.
    ApplicationReset = 0x81,
    /// Restore all parameters to factory defaults.
    RestoreFactorySettings = 0x82,
    /// Restore the out-of-the-box state.
    BackToBox = 0x83,
}

impl SystemCommand {
    /// Byte written to [`standard_index::SYSTEM_COMMAND`].
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a command byte.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x05 => Some(Self::ParamUploadStart),
            0x06 => Some(Self::ParamUploadEnd),
            0x07 => Some(Self::ParamDownloadStart),
            0x08 => Some(Self::ParamDownloadEnd),
            0x09 => Some(Self::ParamDownloadStore),
            0x0A => Some(Self::ParamBreak),
            0x80 => Some(Self::DeviceReset),
            0x81 => Some(Self::ApplicationReset),
            0x82 => Some(Self::RestoreFactorySettings),
            0x83 => Some(Self::BackToBox),
            _ => None,
        }
    }

    /// Address of the system command parameter.
    #[must_use]
    pub fn address() -> IsduAddress {
        IsduAddress::new(standard_index::SYSTEM_COMMAND, 0)
    }
}

impl FromStr for SystemCommand {
    type Err = IolinkError;

    fn from_str(s: &str) -> IolinkResult<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let cmd = match normalized.as_str() {
            "param_upload_start" => Self::ParamUploadStart,
            "param_upload_end" => Self::ParamUploadEnd,
            "param_download_start" => Self::ParamDownloadStart,
            "param_download_end" => Self::ParamDownloadEnd,
            "param_download_store" => Self::ParamDownloadStore,
            "param_break" => Self::ParamBreak,
            "device_reset" => Self::DeviceReset,
            "application_reset" => Self::ApplicationReset,
            "restore_factory_settings" => Self::RestoreFactorySettings,
            "back_to_box" => Self::BackToBox,
            _ => {
                return Err(IolinkError::InvalidArgument(format!(
                    "unknown system command '{}'",
                    s.trim()
                )))
            }
        };
        Ok(cmd)
    }
}
