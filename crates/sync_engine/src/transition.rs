//! Explicit two-mode tracking state and its pure transition function.

use contracts::EventMode;

/// Acquisition mode a channel is currently tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    DppTracking,
    WaveformTracking,
}

impl From<EventMode> for TrackingMode {
    fn from(mode: EventMode) -> Self {
        match mode {
            EventMode::Dpp => Self::DppTracking,
            EventMode::Waveform => Self::WaveformTracking,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub mode: TrackingMode,
    pub is_new_epoch: bool,
}

/// Decide the next tracking mode and whether the observed event opens a new epoch.
///
/// `delta_ns` is the time since the previous event of the *same* mode on this
/// channel, `None` when there is none.
///
/// - DPP: a new epoch starts when the counter went backwards, or when the
///   channel comes back from waveform mode after earlier DPP events.
/// - Waveform: a new epoch starts on the first waveform event, after DPP
///   events, after a counter reset, or after a gap above `waveform_epoch_gap_ns`.
pub fn transition(
    previous: Option<TrackingMode>,
    observed: EventMode,
    delta_ns: Option<f64>,
    waveform_epoch_gap_ns: f64,
) -> Transition {
    let is_new_epoch = match observed {
        EventMode::Dpp => match (previous, delta_ns) {
            (_, Some(delta)) if delta < 0.0 => true,
            (Some(TrackingMode::WaveformTracking), Some(_)) => true,
            _ => false,
        },
        EventMode::Waveform => match (previous, delta_ns) {
            (None | Some(TrackingMode::DppTracking), _) => true,
            (_, None) => true,
            (_, Some(delta)) => delta < 0.0 || delta > waveform_epoch_gap_ns,
        },
    };

    Transition {
        mode: observed.into(),
        is_new_epoch,
    }
}
