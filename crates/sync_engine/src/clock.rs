//! ClockTrack - macropulse marker table from the reference clock channel.

use contracts::{
    ChannelId, ContractError, EventMode, LogEntry, LogKind, MacropulseMarker, RawEventSource,
    SyncConfig, WaveformEpoch,
};
use tracing::instrument;

use crate::cancel::CancelFlag;
use crate::classifier::classify_target;
use crate::transition::{transition, TrackingMode};
use crate::waveform::WaveformTracker;
use crate::wrap::WrapGuard;

/// Ordered, immutable macropulse markers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerTable {
    markers: Vec<MacropulseMarker>,
}

impl MarkerTable {
    pub fn new(markers: Vec<MacropulseMarker>) -> Self {
        Self { markers }
    }

    /// Markers at the given start times, `index` in order, no target, no epoch starts
    pub fn from_start_times(times: &[f64]) -> Self {
        Self::new(
            times
                .iter()
                .enumerate()
                .map(|(index, &start_time)| MacropulseMarker {
                    index: index as u64,
                    start_time,
                    target_position: 0,
                    is_new_epoch: false,
                })
                .collect(),
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&MacropulseMarker> {
        self.markers.get(position)
    }

    pub fn as_slice(&self) -> &[MacropulseMarker] {
        &self.markers
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacropulseMarker> {
        self.markers.iter()
    }

    /// First epoch-start marker strictly after `position`
    pub fn next_epoch_start(&self, position: usize) -> Option<usize> {
        self.markers
            .iter()
            .enumerate()
            .skip(position + 1)
            .find(|(_, marker)| marker.is_new_epoch)
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockStats {
    pub events_seen: u64,
    pub markers: u64,
    pub retriggers: u64,
    pub corrupted: u64,
    pub waveform_events: u64,
}

/// Result of the single forward pass over the clock channel
#[derive(Debug, Clone)]
pub struct ClockTrack {
    pub channel: ChannelId,
    pub markers: MarkerTable,
    pub epochs: Vec<WaveformEpoch>,
    pub log: Vec<LogEntry>,
    pub stats: ClockStats,
}

impl ClockTrack {
    /// Scan the whole source for clock channel events and build the track
    pub fn build<S>(source: &S, config: &SyncConfig) -> Result<Self, ContractError>
    where
        S: RawEventSource + ?Sized,
    {
        let channel = config.clock.channel;
        let positions: Vec<usize> = (0..source.len())
            .filter(|&i| source.event(i).is_some_and(|e| e.channel == channel))
            .collect();
        Self::build_indexed(source, &positions, config, &CancelFlag::new())
    }

    /// Build the track from the clock channel's positions in `source`
    ///
    /// Fails with `ContractError::Configuration` when the clock channel has
    /// no events or none of them yields a marker.
    #[instrument(
        name = "clock_track_build",
        skip(source, positions, config, cancel),
        fields(channel = %config.clock.channel, events = positions.len())
    )]
    pub fn build_indexed<S>(
        source: &S,
        positions: &[usize],
        config: &SyncConfig,
        cancel: &CancelFlag,
    ) -> Result<Self, ContractError>
    where
        S: RawEventSource + ?Sized,
    {
        let channel = config.clock.channel;
        if positions.is_empty() {
            return Err(ContractError::configuration(format!(
                "clock channel {channel} has no events"
            )));
        }

        let mut markers = Vec::new();
        let mut log = Vec::new();
        let mut stats = ClockStats::default();
        let mut guard = WrapGuard::new(&config.timebase, config.wrap_guard_ns);
        let mut tracker = WaveformTracker::new();
        let mut previous_mode: Option<TrackingMode> = None;
        let mut previous_start: Option<f64> = None;

        for &index in positions {
            cancel.check(channel)?;
            let event = source
                .event(index)
                .ok_or(ContractError::SourceIndex { index })?;
            stats.events_seen += 1;

            // The clock never uses the fine correction
            let time = config.timebase.absolute_ns(event, false);

            match event.mode {
                EventMode::Dpp => {
                    if config.clock.retrigger_charge == Some(event.long_gate_charge) {
                        stats.retriggers += 1;
                        tracing::trace!(time, "skipping clock retrigger");
                        continue;
                    }

                    if let Err(fault) = guard.check(event.stamp()) {
                        stats.corrupted += 1;
                        tracing::warn!(time, %fault, "corrupted clock timestamp");
                        log.push(
                            LogEntry::new(
                                LogKind::CorruptedTimestamp,
                                channel,
                                markers.last().map(|m: &MacropulseMarker| m.index),
                                time,
                                fault.to_string(),
                            )
                            .discarding(1),
                        );
                        continue;
                    }

                    let is_new_epoch = previous_mode == Some(TrackingMode::WaveformTracking)
                        || previous_start.is_some_and(|start| time < start);
                    markers.push(MacropulseMarker {
                        index: markers.len() as u64,
                        start_time: time,
                        target_position: classify_target(
                            &config.clock.target_gates,
                            u32::from(event.long_gate_charge),
                        ),
                        is_new_epoch,
                    });
                    previous_start = Some(time);
                    previous_mode = Some(TrackingMode::DppTracking);
                }
                EventMode::Waveform => {
                    stats.waveform_events += 1;
                    guard.reset();
                    let step = transition(
                        previous_mode,
                        EventMode::Waveform,
                        tracker.delta(time),
                        config.waveform_epoch_gap_ns,
                    );
                    tracker.advance(time, step.is_new_epoch);
                    previous_mode = Some(step.mode);
                }
            }
        }

        if markers.is_empty() {
            return Err(ContractError::configuration(format!(
                "clock channel {channel} produced no macropulse markers"
            )));
        }

        stats.markers = markers.len() as u64;
        tracing::info!(
            markers = stats.markers,
            retriggers = stats.retriggers,
            corrupted = stats.corrupted,
            waveform_epochs = tracker.epochs().len(),
            "clock track built"
        );

        Ok(Self {
            channel,
            markers: MarkerTable::new(markers),
            epochs: tracker.into_epochs(),
            log,
            stats,
        })
    }
}
