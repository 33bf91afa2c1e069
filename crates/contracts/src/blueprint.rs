//! RunBlueprint - Config Loader output
//!
//! Describes one sorting run: input stream, reference clock, synchronization
//! policy, detector channels and output routing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::Validate;

use crate::{
    ChannelId, ChannelSyncConfig, ClockConfig, PeriodRule, SyncConfig, TargetGate,
    TargetGateTable, TimeBase,
};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete run blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Raw input settings
    #[serde(default)]
    pub input: InputConfig,

    /// Reference clock channel
    #[serde(default)]
    pub clock: ClockSection,

    /// Synchronization policy
    #[serde(default)]
    pub sync: SyncSection,

    /// Detector channels
    pub channels: Vec<ChannelConfig>,

    /// Output routing
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Raw input settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InputConfig {
    /// `.evt` file; may be supplied on the command line instead
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Digitizer sample period (ns)
    #[serde(default = "default_sample_period_ns")]
    #[validate(range(exclusive_min = 0.0))]
    pub sample_period_ns: f64,

    /// Where the extended timestamp comes from
    #[serde(default)]
    pub extended_time: ExtendedTimeSource,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: None,
            sample_period_ns: default_sample_period_ns(),
            extended_time: ExtendedTimeSource::default(),
        }
    }
}

fn default_sample_period_ns() -> f64 {
    2.0
}

/// Extended timestamp origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedTimeSource {
    /// Use the value recorded by the digitizer
    #[default]
    Hardware,
    /// Rebuild it from coarse counter wraps
    Reconstructed,
}

/// Reference clock section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSection {
    #[serde(default)]
    pub channel: ChannelId,

    /// Off-scale charge marking retriggered pulses
    #[serde(default = "default_retrigger_charge")]
    pub retrigger_charge: Option<u16>,

    /// Six `[low, high)` long-gate charge intervals
    #[serde(default)]
    pub target_gates: Vec<TargetGate>,
}

impl Default for ClockSection {
    fn default() -> Self {
        Self {
            channel: ChannelId::default(),
            retrigger_charge: default_retrigger_charge(),
            target_gates: Vec::new(),
        }
    }
}

fn default_retrigger_charge() -> Option<u16> {
    Some(u16::MAX)
}

/// Synchronization policy section
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SyncSection {
    /// Nominal macropulse period (ns)
    #[serde(default = "default_nominal_period_ns")]
    #[validate(range(exclusive_min = 0.0))]
    pub nominal_period_ns: f64,

    /// Relative tolerance of each accepted period multiple
    #[serde(default = "default_period_tolerance")]
    #[validate(range(exclusive_min = 0.0, exclusive_max = 0.5))]
    pub period_tolerance: f64,

    /// Accepted multiples of the nominal period between markers
    #[serde(default = "default_expected_multiples")]
    #[validate(length(min = 1))]
    pub expected_multiples: Vec<u32>,

    /// Gap (ns) above which a waveform event opens a new epoch
    #[serde(default = "default_waveform_epoch_gap_ns")]
    #[validate(range(exclusive_min = 0.0))]
    pub waveform_epoch_gap_ns: f64,

    /// Band (ns) around the coarse counter wrap checked for corruption
    #[serde(default = "default_wrap_guard_ns")]
    #[validate(range(min = 0.0))]
    pub wrap_guard_ns: f64,

    /// Record out-of-window drops in the error log
    #[serde(default = "default_audit_window_drops")]
    pub audit_window_drops: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            nominal_period_ns: default_nominal_period_ns(),
            period_tolerance: default_period_tolerance(),
            expected_multiples: default_expected_multiples(),
            waveform_epoch_gap_ns: default_waveform_epoch_gap_ns(),
            wrap_guard_ns: default_wrap_guard_ns(),
            audit_window_drops: default_audit_window_drops(),
        }
    }
}

fn default_nominal_period_ns() -> f64 {
    PeriodRule::default().nominal_period_ns
}

fn default_period_tolerance() -> f64 {
    0.005
}

fn default_expected_multiples() -> Vec<u32> {
    vec![1, 2, 3]
}

fn default_waveform_epoch_gap_ns() -> f64 {
    700_000.0
}

fn default_wrap_guard_ns() -> f64 {
    500.0
}

fn default_audit_window_drops() -> bool {
    true
}

/// Detector channel definition
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChannelConfig {
    pub id: ChannelId,

    /// Detector name (e.g. "monitor", "summed", "veto")
    #[serde(default)]
    pub name: String,

    /// Channel delay relative to the macropulse start (ns)
    #[serde(default)]
    pub offset_ns: f64,

    /// Acceptance window length after `start + offset` (ns)
    #[serde(default = "default_period_limit_ns")]
    #[validate(range(exclusive_min = 0.0))]
    pub period_limit_ns: f64,

    /// Apply the fine timestamp correction
    #[serde(default = "default_use_fine_time")]
    pub use_fine_time: bool,
}

fn default_period_limit_ns() -> f64 {
    8_330_000.0
}

fn default_use_fine_time() -> bool {
    true
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

fn default_queue_capacity() -> usize {
    1024
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Tracing summary output
    Log,
    /// JSON lines files
    File,
}

impl RunBlueprint {
    /// Build the runtime SyncConfig, channels ordered by id
    pub fn to_sync_config(&self) -> SyncConfig {
        let target_gates = if self.clock.target_gates.is_empty() {
            TargetGateTable::default()
        } else {
            TargetGateTable::new(self.clock.target_gates.clone())
        };

        let mut channels: Vec<ChannelSyncConfig> = self
            .channels
            .iter()
            .map(|c| ChannelSyncConfig {
                channel: c.id,
                name: c.name.clone(),
                offset_ns: c.offset_ns,
                period_limit_ns: c.period_limit_ns,
                use_fine_time: c.use_fine_time,
            })
            .collect();
        channels.sort_by_key(|c| c.channel);

        SyncConfig {
            timebase: TimeBase::new(self.input.sample_period_ns),
            clock: ClockConfig {
                channel: self.clock.channel,
                retrigger_charge: self.clock.retrigger_charge,
                target_gates,
            },
            period: PeriodRule {
                nominal_period_ns: self.sync.nominal_period_ns,
                tolerance: self.sync.period_tolerance,
                expected_multiples: self.sync.expected_multiples.clone(),
            },
            waveform_epoch_gap_ns: self.sync.waveform_epoch_gap_ns,
            wrap_guard_ns: self.sync.wrap_guard_ns,
            audit_window_drops: self.sync.audit_window_drops,
            channels,
        }
    }

    /// Whether the clock channel is also demultiplexed as a detector channel
    pub fn clock_is_detector(&self) -> bool {
        self.channels.iter().any(|c| c.id == self.clock.channel)
    }
}
