//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};

use crate::{ChannelId, TimeBase};

/// Runtime configuration of one synchronization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tick to nanosecond conversion
    #[serde(default)]
    pub timebase: TimeBase,

    /// Reference clock (target changer) settings
    #[serde(default)]
    pub clock: ClockConfig,

    /// Expected spacing of consecutive macropulses
    #[serde(default)]
    pub period: PeriodRule,

    /// Largest gap (ns) that still chains two waveform events into one epoch
    pub waveform_epoch_gap_ns: f64,

    /// Half-width (ns) of the band around the coarse counter wrap
    pub wrap_guard_ns: f64,

    /// Log window-gate drops as aggregated `OutOfWindow` entries
    pub audit_window_drops: bool,

    /// Detector channels to demultiplex, ordered by channel id
    #[serde(default)]
    pub channels: Vec<ChannelSyncConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timebase: TimeBase::default(),
            clock: ClockConfig::default(),
            period: PeriodRule::default(),
            waveform_epoch_gap_ns: 700_000.0,
            wrap_guard_ns: 500.0,
            audit_window_drops: true,
            channels: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelSyncConfig> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

/// Reference clock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub channel: ChannelId,

    /// Long-gate charge of retriggered clock pulses, skipped when set
    #[serde(default)]
    pub retrigger_charge: Option<u16>,

    /// Long-gate charge intervals identifying target slots 1–6
    #[serde(default)]
    pub target_gates: TargetGateTable,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            channel: ChannelId::new(0),
            retrigger_charge: Some(u16::MAX),
            target_gates: TargetGateTable::default(),
        }
    }
}

/// Per-channel demultiplexing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSyncConfig {
    pub channel: ChannelId,

    /// Human-readable detector name
    #[serde(default)]
    pub name: String,

    /// Cable and electronics delay relative to the macropulse start (ns)
    pub offset_ns: f64,

    /// Length of the acceptance window after `start + offset` (ns)
    pub period_limit_ns: f64,

    /// Add the fine timestamp to the coarse time
    pub use_fine_time: bool,
}

impl ChannelSyncConfig {
    pub fn new(channel: impl Into<ChannelId>, offset_ns: f64, period_limit_ns: f64) -> Self {
        Self {
            channel: channel.into(),
            name: String::new(),
            offset_ns,
            period_limit_ns,
            use_fine_time: true,
        }
    }
}

/// Accepted macropulse spacings: `k · nominal · (1 ± tolerance)` for each k
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRule {
    pub nominal_period_ns: f64,
    /// Relative half-width of each band
    pub tolerance: f64,
    pub expected_multiples: Vec<u32>,
}

impl Default for PeriodRule {
    fn default() -> Self {
        Self {
            nominal_period_ns: 1e9 / 120.0,
            tolerance: 0.005,
            expected_multiples: vec![1, 2, 3],
        }
    }
}

impl PeriodRule {
    /// Whether two marker starts `gap_ns` apart are in sync with the beam period
    pub fn accepts(&self, gap_ns: f64) -> bool {
        self.expected_multiples.iter().any(|&k| {
            let expected = f64::from(k) * self.nominal_period_ns;
            gap_ns > expected * (1.0 - self.tolerance) && gap_ns < expected * (1.0 + self.tolerance)
        })
    }
}

/// Half-open charge interval `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct TargetGate {
    pub low: u32,
    pub high: u32,
}

impl TargetGate {
    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    #[inline]
    pub fn contains(&self, charge: u32) -> bool {
        charge >= self.low && charge < self.high
    }

    pub fn overlaps(&self, other: &TargetGate) -> bool {
        self.low < other.high && other.low < self.high
    }
}

impl From<[u32; 2]> for TargetGate {
    fn from([low, high]: [u32; 2]) -> Self {
        Self { low, high }
    }
}

impl From<TargetGate> for [u32; 2] {
    fn from(gate: TargetGate) -> Self {
        [gate.low, gate.high]
    }
}

/// Number of target slots on the changer
pub const TARGET_SLOTS: usize = 6;

/// Ordered gates, slot `i + 1` for `gates[i]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetGateTable {
    gates: Vec<TargetGate>,
}

impl Default for TargetGateTable {
    fn default() -> Self {
        Self {
            gates: vec![
                TargetGate::new(2000, 3500),
                TargetGate::new(4500, 6000),
                TargetGate::new(6800, 8200),
                TargetGate::new(9000, 10500),
                TargetGate::new(11500, 13000),
                TargetGate::new(13800, 15200),
            ],
        }
    }
}

impl TargetGateTable {
    pub fn new(gates: Vec<TargetGate>) -> Self {
        Self { gates }
    }

    pub fn gates(&self) -> &[TargetGate] {
        &self.gates
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
