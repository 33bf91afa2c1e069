//! Macropulse markers and waveform epochs produced by the clock track.

use serde::{Deserialize, Serialize};

/// Target slot reported when the changer is moving or the charge is ambiguous
pub const NO_TARGET: u8 = 0;

/// Start of one beam macropulse on the reference clock.
///
/// Built once per run and read-only afterwards. `index` increases strictly
/// along the table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacropulseMarker {
    /// Macropulse number, starting at 0
    pub index: u64,
    /// Absolute start time in nanoseconds (resets at each new epoch)
    pub start_time: f64,
    /// Target slot 1–6, or 0 when no target was in the beam
    pub target_position: u8,
    /// First marker after a waveform-mode period
    pub is_new_epoch: bool,
}

impl MacropulseMarker {
    pub fn has_target(&self) -> bool {
        self.target_position != NO_TARGET
    }
}

/// A run of waveform-mode events chained by small gaps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformEpoch {
    pub epoch_id: u64,
    pub epoch_start_time: f64,
}
