//! ChannelId - digitizer channel identifier
//!
//! Channels are numbered by the digitizer (0..=7 on the production board).
//! The reference clock (target changer) is conventionally channel 0.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digitizer channel number.
///
/// A plain `u32` underneath so it can be copied freely into every output
/// record and used as an ordered map key.
///
/// # Examples
/// ```
/// use contracts::ChannelId;
///
/// let ch: ChannelId = 2.into();
/// assert_eq!(ch.get(), 2);
/// assert_eq!(ch.to_string(), "2");
/// assert_eq!(ch.label(), "ch2");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Create a new ChannelId.
    #[inline]
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// Raw channel number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Short label used for file names and metric labels (`ch2`).
    pub fn label(self) -> String {
        format!("ch{}", self.0)
    }
}

impl From<u32> for ChannelId {
    #[inline]
    fn from(number: u32) -> Self {
        Self(number)
    }
}

impl From<ChannelId> for u32 {
    #[inline]
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("ch").unwrap_or(s);
        digits.parse().map(Self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
