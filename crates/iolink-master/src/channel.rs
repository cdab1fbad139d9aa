//! Master channel selection.
//!
//! A port connects either to a specific channel, given as a `COM<n>`
//! selector, or to the first master the driver finds.

use iolink_common::error::{IolinkError, IolinkResult};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Channel range passed to the driver's connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRange {
    /// First channel to probe.
    pub first: u8,
    /// Last channel to probe (inclusive).
    pub last: u8,
}

impl ChannelRange {
    /// Probe every channel and take the first available master.
    pub const ANY: Self = Self {
        first: 0,
        last: 255,
    };

    /// Exactly one channel.
    #[must_use]
    pub const fn single(channel: u8) -> Self {
        Self {
            first: channel,
            last: channel,
        }
    }

    /// Resolve an optional textual selector.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the selector is not of the form
    /// `COM<digits>`.
    pub fn from_selector(selector: Option<&str>) -> IolinkResult<Self> {
        match selector {
            Some(text) => parse_channel_selector(text).map(Self::single),
            None => Ok(Self::ANY),
        }
    }

    /// Returns true if `channel` lies within the range.
    #[must_use]
    pub fn contains(&self, channel: u8) -> bool {
        (self.first..=self.last).contains(&channel)
    }
}

impl fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ANY {
            write!(f, "any")
        } else if self.first == self.last {
            write!(f, "COM{}", self.first)
        } else {
            write!(f, "COM{}..COM{}", self.first, self.last)
        }
    }
}

fn selector_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^COM([0-9]+)(?:\s+|$)").expect("valid selector pattern"))
}

/// Parse a `COM<digits>` selector into the driver's channel number.
///
/// Trailing text is accepted after at least one whitespace character,
/// so `"COM3 (USB Serial)"` selects channel 3.
///
/// # Errors
///
/// Returns a configuration error for any other form, or if the number
/// does not fit the driver's 8-bit channel id.
pub fn parse_channel_selector(selector: &str) -> IolinkResult<u8> {
    let digits = selector_pattern()
        .captures(selector)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| {
            IolinkError::Configuration(format!("invalid channel selector '{selector}'"))
        })?;

    digits.as_str().parse::<u8>().map_err(|_| {
        IolinkError::Configuration(format!(
            "channel number {} in '{selector}' is out of range",
            digits.as_str()
        ))
    })
}
