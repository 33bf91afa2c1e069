//! Synchronized output records and the audit log.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChannelId, MacropulseMarker};

/// DPP event stamped with the macropulse it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DppRecord {
    pub channel: ChannelId,
    pub macropulse_index: u64,
    pub macro_start_time: f64,
    /// Position of the event within its macropulse, from 0
    pub within_macro_sequence: u64,
    pub absolute_time: f64,
    pub target_position: u8,
    pub short_gate_charge: u16,
    pub long_gate_charge: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<u16>>,
}

/// Waveform-mode event placed in its epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformRecord {
    pub channel: ChannelId,
    pub epoch_id: u64,
    /// Position within the epoch, from 0
    pub sub_index: u64,
    pub absolute_time: f64,
    pub waveform: Vec<u16>,
}

/// Category of an audit log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Extended/coarse counters disagree around the 32-bit wrap
    CorruptedTimestamp,
    /// Marker spacing broke the expected period multiples
    BeamAnomaly,
    /// No marker left for the channel; its pass ends here
    MarkerCursorExhausted,
    /// Events passed over while moving to the next epoch
    EpochSkip,
    /// Events outside the macropulse window, aggregated per macropulse
    OutOfWindow,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CorruptedTimestamp => "corrupted_timestamp",
            Self::BeamAnomaly => "beam_anomaly",
            Self::MarkerCursorExhausted => "marker_cursor_exhausted",
            Self::EpochSkip => "epoch_skip",
            Self::OutOfWindow => "out_of_window",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::CorruptedTimestamp | Self::BeamAnomaly | Self::MarkerCursorExhausted => {
                Severity::Warn
            }
            Self::EpochSkip => Severity::Info,
            Self::OutOfWindow => Severity::Debug,
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
}

/// One audit trail entry.
///
/// `discarded_events` is the number of raw events this entry accounts for, so
/// every event of a channel is either emitted or counted by exactly one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub channel: ChannelId,
    pub macropulse_index: Option<u64>,
    pub absolute_time: f64,
    pub discarded_events: u64,
    pub message: String,
}

impl LogEntry {
    pub fn new(
        kind: LogKind,
        channel: ChannelId,
        macropulse_index: Option<u64>,
        absolute_time: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            channel,
            macropulse_index,
            absolute_time,
            discarded_events: 0,
            message: message.into(),
        }
    }

    pub fn discarding(mut self, count: u64) -> Self {
        self.discarded_events = count;
        self
    }
}

/// Unit of work handed to the sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum OutputRecord {
    Marker(MacropulseMarker),
    Dpp(DppRecord),
    Waveform(WaveformRecord),
    Log(LogEntry),
}

impl OutputRecord {
    /// Channel the record belongs to; markers are global
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Self::Marker(_) => None,
            Self::Dpp(r) => Some(r.channel),
            Self::Waveform(r) => Some(r.channel),
            Self::Log(e) => Some(e.channel),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Marker(_) => "marker",
            Self::Dpp(_) => "dpp",
            Self::Waveform(_) => "waveform",
            Self::Log(_) => "log",
        }
    }
}

/// Outcome counters of one channel pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Raw events of the channel in the source
    pub events_seen: u64,
    pub dpp_emitted: u64,
    pub waveform_emitted: u64,
    pub corrupted: u64,
    pub anomaly_discarded: u64,
    pub epoch_discarded: u64,
    pub window_dropped: u64,
    pub exhausted_discarded: u64,
    pub beam_anomalies: u64,
    pub waveform_epochs: u64,
}

impl ChannelStats {
    /// Events with a known fate: emitted or discarded for a logged reason
    pub fn accounted(&self) -> u64 {
        self.dpp_emitted
            + self.waveform_emitted
            + self.corrupted
            + self.anomaly_discarded
            + self.epoch_discarded
            + self.window_dropped
            + self.exhausted_discarded
    }

    pub fn merge(&mut self, other: &ChannelStats) {
        self.events_seen += other.events_seen;
        self.dpp_emitted += other.dpp_emitted;
        self.waveform_emitted += other.waveform_emitted;
        self.corrupted += other.corrupted;
        self.anomaly_discarded += other.anomaly_discarded;
        self.epoch_discarded += other.epoch_discarded;
        self.window_dropped += other.window_dropped;
        self.exhausted_discarded += other.exhausted_discarded;
        self.beam_anomalies += other.beam_anomalies;
        self.waveform_epochs += other.waveform_epochs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_record_tagging() {
        let entry = LogEntry::new(
            LogKind::BeamAnomaly,
            ChannelId::new(2),
            Some(7),
            100.0,
            "gap",
        )
        .discarding(3);
        let json = serde_json::to_string(&OutputRecord::Log(entry)).unwrap();
        assert!(json.starts_with(r#"{"record":"log","kind":"beam_anomaly""#), "got: {json}");
        assert!(json.contains(r#""discarded_events":3"#));
    }

    #[test]
    fn test_dpp_record_omits_missing_waveform() {
        let record = DppRecord {
            channel: ChannelId::new(4),
            macropulse_index: 0,
            macro_start_time: 0.0,
            within_macro_sequence: 0,
            absolute_time: 4_000_000.0,
            target_position: 3,
            short_gate_charge: 10,
            long_gate_charge: 20,
            waveform: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("waveform"));
    }

    #[test]
    fn test_stats_accounting() {
        let stats = ChannelStats {
            events_seen: 10,
            dpp_emitted: 4,
            waveform_emitted: 2,
            corrupted: 1,
            window_dropped: 3,
            ..Default::default()
        };
        assert_eq!(stats.accounted(), stats.events_seen);
    }

    #[test]
    fn test_severity_order() {
        assert!(LogKind::OutOfWindow.severity() < LogKind::BeamAnomaly.severity());
        assert_eq!(LogKind::EpochSkip.to_string(), "epoch_skip");
    }
}
