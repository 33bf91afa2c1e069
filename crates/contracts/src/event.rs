//! Raw digitizer events and the tick-to-nanosecond time base.

use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Number of ticks covered by one turn of the 32-bit coarse counter
pub const COARSE_WRAP_TICKS: u64 = 1 << 32;

/// Resolution of the fine timestamp within one sample period
pub const FINE_TIME_STEPS: f64 = 1024.0;

/// Acquisition mode of a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMode {
    /// Integrated-charge ("list") event
    Dpp,
    /// Full sampled waveform
    Waveform,
}

impl EventMode {
    /// Decode the on-disk event type (1 = DPP, 2 = waveform)
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Dpp),
            2 => Some(Self::Waveform),
            _ => None,
        }
    }

    /// On-disk event type
    pub fn code(self) -> u32 {
        match self {
            Self::Dpp => 1,
            Self::Waveform => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dpp => "dpp",
            Self::Waveform => "waveform",
        }
    }
}

/// Extended/coarse counter pair of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStamp {
    pub extended: u32,
    pub coarse: u32,
}

impl TickStamp {
    /// Total tick count since the last counter reset
    #[inline]
    pub fn ticks(self) -> u64 {
        (u64::from(self.extended) << 32) | u64::from(self.coarse)
    }
}

/// One raw event as read from the digitizer stream.
///
/// Immutable once ingested. Arrival order is authoritative; within one channel
/// the order is monotonic in true time except across a mode switch, where the
/// hardware counters reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub channel: ChannelId,
    pub mode: EventMode,
    /// Number of wraps of the coarse counter
    pub extended_time: u32,
    /// 32-bit coarse counter, in sample ticks
    pub coarse_time: u32,
    /// Sub-sample interpolation in 1/1024 of a sample period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_time: Option<u16>,
    pub short_gate_charge: u16,
    pub long_gate_charge: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waveform: Vec<u16>,
}

impl RawEvent {
    /// DPP-mode event without charges or samples
    pub fn dpp(channel: impl Into<ChannelId>, extended_time: u32, coarse_time: u32) -> Self {
        Self {
            channel: channel.into(),
            mode: EventMode::Dpp,
            extended_time,
            coarse_time,
            fine_time: None,
            short_gate_charge: 0,
            long_gate_charge: 0,
            waveform: Vec::new(),
        }
    }

    /// Waveform-mode event
    pub fn waveform(
        channel: impl Into<ChannelId>,
        extended_time: u32,
        coarse_time: u32,
        samples: Vec<u16>,
    ) -> Self {
        Self {
            channel: channel.into(),
            mode: EventMode::Waveform,
            extended_time,
            coarse_time,
            fine_time: None,
            short_gate_charge: 0,
            long_gate_charge: 0,
            waveform: samples,
        }
    }

    pub fn with_charges(mut self, short_gate: u16, long_gate: u16) -> Self {
        self.short_gate_charge = short_gate;
        self.long_gate_charge = long_gate;
        self
    }

    pub fn with_fine_time(mut self, fine_time: u16) -> Self {
        self.fine_time = Some(fine_time);
        self
    }

    pub fn with_samples(mut self, samples: Vec<u16>) -> Self {
        self.waveform = samples;
        self
    }

    #[inline]
    pub fn stamp(&self) -> TickStamp {
        TickStamp {
            extended: self.extended_time,
            coarse: self.coarse_time,
        }
    }
}

/// Conversion between digitizer ticks and absolute nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    /// Duration of one sample tick in nanoseconds
    pub sample_period_ns: f64,
}

impl Default for TimeBase {
    fn default() -> Self {
        Self {
            sample_period_ns: 2.0,
        }
    }
}

impl TimeBase {
    pub fn new(sample_period_ns: f64) -> Self {
        Self { sample_period_ns }
    }

    /// `(extended · 2^32 + coarse) · period`, plus the fine correction when enabled
    pub fn absolute_ns(&self, event: &RawEvent, use_fine_time: bool) -> f64 {
        let coarse = self.ticks_to_ns(event.stamp().ticks());
        match event.fine_time {
            Some(fine) if use_fine_time => {
                coarse + f64::from(fine) * self.sample_period_ns / FINE_TIME_STEPS
            }
            _ => coarse,
        }
    }

    #[inline]
    pub fn ticks_to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * self.sample_period_ns
    }

    /// Nearest whole tick for an absolute time (used by generators)
    pub fn ns_to_stamp(&self, ns: f64) -> TickStamp {
        let ticks = (ns / self.sample_period_ns).round().max(0.0) as u64;
        TickStamp {
            extended: (ticks >> 32) as u32,
            coarse: (ticks & 0xffff_ffff) as u32,
        }
    }

    /// Time covered by one full turn of the coarse counter
    pub fn wrap_period_ns(&self) -> f64 {
        self.ticks_to_ns(COARSE_WRAP_TICKS)
    }
}
