//! In-memory event arena indexed by arrival order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use contracts::{ChannelId, EventMode, ExtendedTimeSource, InputConfig, RawEvent, RawEventSource, TimeBase};

use crate::config::IngestionMetrics;
use crate::error::Result;
use crate::evt::decode_all;
use crate::timebase::rebuild_extended_time;

/// Event counts of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub dpp: u64,
    pub waveform: u64,
}

/// Owns every raw event of a run; channel passes borrow it read-only
#[derive(Debug, Clone, Default)]
pub struct EventArena {
    events: Vec<RawEvent>,
}

impl EventArena {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }

    /// Decode a `.evt` file and apply the configured extended-time source
    pub fn load(path: &Path, input: &InputConfig, metrics: Arc<IngestionMetrics>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "reading event file");

        let mut events = decode_all(bytes, metrics.clone())?;
        if input.extended_time == ExtendedTimeSource::Reconstructed {
            rebuild_extended_time(
                &mut events,
                &TimeBase::new(input.sample_period_ns),
                &metrics,
            );
        }

        let snapshot = metrics.snapshot();
        ::metrics::counter!("macrosort_events_decoded_total", "mode" => "dpp")
            .increment(snapshot.dpp_events);
        ::metrics::counter!("macrosort_events_decoded_total", "mode" => "waveform")
            .increment(snapshot.waveform_events);
        ::metrics::counter!("macrosort_input_bytes_total").increment(snapshot.bytes_read);
        if snapshot.extended_increments > 0 {
            ::metrics::counter!("macrosort_extended_time_rebuilt_total")
                .increment(snapshot.extended_increments);
        }

        let arena = Self::new(events);
        tracing::info!(
            events = arena.len(),
            channels = arena.summary().len(),
            "event arena ready"
        );
        Ok(arena)
    }

    pub fn as_slice(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RawEvent> {
        self.events
    }

    /// Per-channel event counts, ordered by channel
    pub fn summary(&self) -> BTreeMap<ChannelId, ChannelSummary> {
        let mut summary: BTreeMap<ChannelId, ChannelSummary> = BTreeMap::new();
        for event in &self.events {
            let entry = summary.entry(event.channel).or_default();
            match event.mode {
                EventMode::Dpp => entry.dpp += 1,
                EventMode::Waveform => entry.waveform += 1,
            }
        }
        summary
    }
}

impl From<Vec<RawEvent>> for EventArena {
    fn from(events: Vec<RawEvent>) -> Self {
        Self::new(events)
    }
}

impl RawEventSource for EventArena {
    #[inline]
    fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    fn event(&self, index: usize) -> Option<&RawEvent> {
        self.events.get(index)
    }
}
