//! Extended timestamp reconstruction for streams without a hardware value.

use std::collections::BTreeMap;

use contracts::{ChannelId, EventMode, RawEvent, TimeBase, COARSE_WRAP_TICKS};

use crate::config::IngestionMetrics;

/// A coarse decrease only counts as a wrap when the previous value was this close to it
const WRAP_WINDOW_NS: f64 = 50_000_000.0;

/// Per-channel extended counters rebuilt from coarse counter wraps
#[derive(Debug, Clone)]
pub struct ExtendedTimeRebuilder {
    window_ticks: u64,
    channels: BTreeMap<ChannelId, ChannelCounter>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelCounter {
    extended: u32,
    previous_coarse: Option<u32>,
}

impl ExtendedTimeRebuilder {
    pub fn new(timebase: &TimeBase) -> Self {
        Self {
            window_ticks: (WRAP_WINDOW_NS / timebase.sample_period_ns) as u64,
            channels: BTreeMap::new(),
        }
    }

    /// Overwrite `event.extended_time`; returns true when a wrap was counted
    ///
    /// Waveform events mark a counter reset on the digitizer and restart
    /// every channel at zero.
    pub fn apply(&mut self, event: &mut RawEvent) -> bool {
        if event.mode == EventMode::Waveform {
            self.channels.clear();
            event.extended_time = 0;
            return false;
        }

        let wrap_start = COARSE_WRAP_TICKS.saturating_sub(self.window_ticks);
        let counter = self.channels.entry(event.channel).or_default();
        let wrapped = counter.previous_coarse.is_some_and(|previous| {
            event.coarse_time < previous && u64::from(previous) > wrap_start
        });
        if wrapped {
            counter.extended += 1;
        }
        counter.previous_coarse = Some(event.coarse_time);
        event.extended_time = counter.extended;
        wrapped
    }
}

/// Rebuild extended time across a whole stream in arrival order
pub fn rebuild_extended_time(events: &mut [RawEvent], timebase: &TimeBase, metrics: &IngestionMetrics) {
    let mut rebuilder = ExtendedTimeRebuilder::new(timebase);
    for event in events.iter_mut() {
        if rebuilder.apply(event) {
            metrics.record_extended_increment();
        }
    }
}
