//! ChannelDemultiplexer - per-channel synchronization state machine.
//!
//! One pass walks the channel's raw events through an explicit cursor pair
//! `(stream, marker)`: `stream` indexes the channel's positions in the raw
//! source and `marker` indexes the clock track. Resynchronization after an
//! epoch switch or a beam anomaly only moves these cursors, so a pass can be
//! replayed over any indexable stream.

use contracts::{
    ChannelId, ChannelStats, ChannelSyncConfig, ContractError, DppRecord, EventMode, LogEntry,
    LogKind, MacropulseMarker, RawEvent, RawEventSource, SyncConfig, WaveformEpoch,
    WaveformRecord,
};
use tracing::instrument;

use crate::cancel::CancelFlag;
use crate::clock::MarkerTable;
use crate::transition::{transition, TrackingMode};
use crate::waveform::WaveformTracker;
use crate::wrap::WrapGuard;

/// Cursor pair over the channel's positions and the marker table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub stream: usize,
    pub marker: usize,
}

/// Transient state owned by one channel pass
#[derive(Debug, Clone)]
pub struct ChannelSyncState {
    pub mode: Option<TrackingMode>,
    pub cursor: Cursor,
    pub within_macro_sequence: u64,
    pub previous_complete_time: Option<f64>,
    pub wrap: WrapGuard,
}

impl ChannelSyncState {
    fn new(wrap: WrapGuard) -> Self {
        Self {
            mode: None,
            cursor: Cursor::default(),
            within_macro_sequence: 0,
            previous_complete_time: None,
            wrap,
        }
    }
}

/// Everything one channel pass produced
#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    pub channel: ChannelId,
    pub dpp: Vec<DppRecord>,
    pub waveform: Vec<WaveformRecord>,
    pub epochs: Vec<WaveformEpoch>,
    pub log: Vec<LogEntry>,
    pub stats: ChannelStats,
}

/// What the main loop does after one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Next,
    Jump(usize),
    Exhausted,
}

/// Where a fast-forward stops
#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    /// First DPP event that itself opens a new epoch
    EpochStart,
    /// First DPP event at or after the bound (ns)
    NotBefore(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Landing {
    At(usize),
    End,
}

/// Outcome of advancing past an expired macropulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Advanced,
    Resumed(Step),
}

/// Window-gate drops of one macropulse, logged as a single entry
#[derive(Debug, Clone, Copy)]
struct WindowDrops {
    marker: usize,
    count: u64,
    first_time: f64,
}

pub struct ChannelDemultiplexer<'a, S: ?Sized> {
    source: &'a S,
    positions: &'a [usize],
    markers: &'a MarkerTable,
    sync: &'a SyncConfig,
    channel: &'a ChannelSyncConfig,
    cancel: &'a CancelFlag,
    state: ChannelSyncState,
    tracker: WaveformTracker,
    pending_drops: Option<WindowDrops>,
    output: ChannelOutput,
}

impl<'a, S> ChannelDemultiplexer<'a, S>
where
    S: RawEventSource + ?Sized,
{
    pub fn new(
        source: &'a S,
        positions: &'a [usize],
        markers: &'a MarkerTable,
        sync: &'a SyncConfig,
        channel: &'a ChannelSyncConfig,
        cancel: &'a CancelFlag,
    ) -> Self {
        let output = ChannelOutput {
            channel: channel.channel,
            stats: ChannelStats {
                events_seen: positions.len() as u64,
                ..Default::default()
            },
            ..Default::default()
        };

        Self {
            source,
            positions,
            markers,
            sync,
            channel,
            cancel,
            state: ChannelSyncState::new(WrapGuard::new(&sync.timebase, sync.wrap_guard_ns)),
            tracker: WaveformTracker::new(),
            pending_drops: None,
            output,
        }
    }

    pub fn state(&self) -> &ChannelSyncState {
        &self.state
    }

    /// Run the pass to the end of the channel's stream or of the marker table
    #[instrument(
        name = "channel_demux_run",
        skip(self),
        fields(channel = %self.channel.channel, events = self.positions.len())
    )]
    pub fn run(mut self) -> Result<ChannelOutput, ContractError> {
        if self.markers.is_empty() {
            self.exhaust(0);
            return Ok(self.finish());
        }

        let mut pos = 0;
        while pos < self.positions.len() {
            self.cancel.check(self.channel.channel)?;
            self.state.cursor.stream = pos;
            let event = self.event_at(pos)?;

            let step = match event.mode {
                EventMode::Dpp => self.on_dpp(pos, event)?,
                EventMode::Waveform => {
                    self.on_waveform(event);
                    Step::Next
                }
            };

            match step {
                Step::Next => pos += 1,
                Step::Jump(next) => pos = next,
                Step::Exhausted => {
                    self.exhaust(pos);
                    break;
                }
            }
        }

        Ok(self.finish())
    }

    fn finish(mut self) -> ChannelOutput {
        self.flush_window_drops();
        self.output.epochs = self.tracker.into_epochs();
        self.output.stats.waveform_epochs = self.output.epochs.len() as u64;

        let stats = &self.output.stats;
        tracing::info!(
            dpp = stats.dpp_emitted,
            waveform = stats.waveform_emitted,
            window_dropped = stats.window_dropped,
            beam_anomalies = stats.beam_anomalies,
            corrupted = stats.corrupted,
            "channel pass finished"
        );
        self.output
    }

    #[inline]
    fn event_at(&self, pos: usize) -> Result<&'a RawEvent, ContractError> {
        let source: &'a S = self.source;
        let index = self.positions[pos];
        source
            .event(index)
            .ok_or(ContractError::SourceIndex { index })
    }

    #[inline]
    fn marker(&self) -> &'a MacropulseMarker {
        let markers: &'a MarkerTable = self.markers;
        &markers.as_slice()[self.state.cursor.marker]
    }

    #[inline]
    fn complete_time(&self, event: &RawEvent) -> f64 {
        self.sync
            .timebase
            .absolute_ns(event, self.channel.use_fine_time)
    }

    /// Time of `time` relative to the current window start
    #[inline]
    fn window_delta(&self, time: f64) -> f64 {
        time - self.marker().start_time - self.channel.offset_ns
    }

    fn on_dpp(&mut self, pos: usize, event: &'a RawEvent) -> Result<Step, ContractError> {
        let time = self.complete_time(event);

        if let Err(fault) = self.state.wrap.check(event.stamp()) {
            self.output.stats.corrupted += 1;
            tracing::warn!(channel = %self.channel.channel, time, %fault, "corrupted timestamp");
            let entry = LogEntry::new(
                LogKind::CorruptedTimestamp,
                self.channel.channel,
                Some(self.marker().index),
                time,
                fault.to_string(),
            )
            .discarding(1);
            self.output.log.push(entry);
            return Ok(Step::Next);
        }

        let delta = self.state.previous_complete_time.map(|previous| time - previous);
        let step = transition(
            self.state.mode,
            EventMode::Dpp,
            delta,
            self.sync.waveform_epoch_gap_ns,
        );
        self.state.mode = Some(step.mode);
        self.state.previous_complete_time = Some(time);

        if step.is_new_epoch {
            match self.markers.next_epoch_start(self.state.cursor.marker) {
                Some(next) => {
                    tracing::debug!(
                        channel = %self.channel.channel,
                        from = self.state.cursor.marker,
                        to = next,
                        "epoch switch"
                    );
                    self.enter_marker(next);
                }
                None => return Ok(Step::Exhausted),
            }
        }

        while self.window_delta(time) > self.channel.period_limit_ns {
            match self.expire(pos, time)? {
                Expiry::Advanced => {}
                Expiry::Resumed(step) => return Ok(step),
            }
        }

        let window_delta = self.window_delta(time);
        if !(0.0..self.channel.period_limit_ns).contains(&window_delta) {
            self.drop_out_of_window(time);
            return Ok(Step::Next);
        }

        self.emit_dpp(event, time);
        Ok(Step::Next)
    }

    /// Advance past the expired macropulse and resynchronize when needed
    fn expire(&mut self, pos: usize, time: f64) -> Result<Expiry, ContractError> {
        let markers: &'a MarkerTable = self.markers;
        let old = self.state.cursor.marker;
        let next = old + 1;
        let Some(new_marker) = markers.get(next) else {
            return Ok(Expiry::Resumed(Step::Exhausted));
        };
        self.enter_marker(next);

        if new_marker.is_new_epoch {
            // The clock moved to a new epoch while this channel still reports the old one
            let (landing, discarded) = self.fast_forward(pos, Target::EpochStart)?;
            self.output.stats.epoch_discarded += discarded;
            let entry = LogEntry::new(
                LogKind::EpochSkip,
                self.channel.channel,
                Some(new_marker.index),
                time,
                format!(
                    "macropulse {} opens a new epoch; skipped to the channel's next epoch",
                    new_marker.index
                ),
            )
            .discarding(discarded);
            self.output.log.push(entry);
            return Ok(Expiry::Resumed(self.land_on_epoch(landing)));
        }

        let old_marker = &markers.as_slice()[old];
        let gap = new_marker.start_time - old_marker.start_time;
        if self.sync.period.accepts(gap) {
            tracing::trace!(channel = %self.channel.channel, marker = next, "macropulse advanced");
            return Ok(Expiry::Advanced);
        }

        self.recover_from_anomaly(pos, time, old, gap).map(Expiry::Resumed)
    }

    /// Skip markers until two consecutive ones are in sync again, then skip
    /// raw events up to the resumed macropulse
    fn recover_from_anomaly(
        &mut self,
        pos: usize,
        time: f64,
        anomaly_start: usize,
        gap: f64,
    ) -> Result<Step, ContractError> {
        let markers: &'a MarkerTable = self.markers;
        let table = markers.as_slice();
        let mut previous = anomaly_start + 1;
        let mut current = previous + 1;
        let mut crossed_epoch = false;
        let resumed = loop {
            let Some(marker) = table.get(current) else {
                break None;
            };
            if marker.is_new_epoch {
                crossed_epoch = true;
            } else if self.sync.period.accepts(marker.start_time - table[previous].start_time) {
                break Some(current);
            }
            previous = current;
            current += 1;
        };

        self.output.stats.beam_anomalies += 1;
        let start = &table[anomaly_start];
        tracing::warn!(
            channel = %self.channel.channel,
            macropulse = start.index,
            window_start = start.start_time,
            gap,
            resumed = ?resumed.map(|m| table[m].index),
            resumed_start = ?resumed.map(|m| table[m].start_time),
            "beam anomaly"
        );

        let Some(resumed) = resumed else {
            let entry = LogEntry::new(
                LogKind::BeamAnomaly,
                self.channel.channel,
                Some(start.index),
                time,
                format!(
                    "gap of {gap:.0} ns after macropulse {} (start {:.0} ns); no later macropulse is in sync",
                    start.index, start.start_time
                ),
            );
            self.output.log.push(entry);
            self.state.cursor.marker = table.len() - 1;
            return Ok(Step::Exhausted);
        };
        self.enter_marker(resumed);

        let bound = table[resumed].start_time - self.channel.offset_ns;
        let (landing, discarded) = if crossed_epoch {
            let (first, skipped) = self.fast_forward(pos, Target::EpochStart)?;
            match first {
                Landing::At(at) => {
                    self.state.previous_complete_time = None;
                    let (second, more) = self.fast_forward_from(at, Target::NotBefore(bound))?;
                    (second, skipped + more)
                }
                Landing::End => (Landing::End, skipped),
            }
        } else if time >= bound {
            // The triggering event already belongs to the resumed macropulse
            (Landing::At(pos), 0)
        } else {
            self.fast_forward(pos, Target::NotBefore(bound))?
        };

        self.output.stats.anomaly_discarded += discarded;
        let entry = LogEntry::new(
            LogKind::BeamAnomaly,
            self.channel.channel,
            Some(start.index),
            time,
            format!(
                "gap of {gap:.0} ns after macropulse {} (start {:.0} ns); resumed at macropulse {} (start {:.0} ns)",
                start.index, start.start_time, table[resumed].index, table[resumed].start_time
            ),
        )
        .discarding(discarded);
        self.output.log.push(entry);

        Ok(match landing {
            Landing::At(at) => Step::Jump(at),
            Landing::End => Step::Jump(self.positions.len()),
        })
    }

    fn land_on_epoch(&mut self, landing: Landing) -> Step {
        match landing {
            Landing::At(at) => {
                // The cursor already sits on the epoch start; do not switch again
                self.state.previous_complete_time = None;
                Step::Jump(at)
            }
            Landing::End => Step::Jump(self.positions.len()),
        }
    }

    /// Discard the DPP event at `pos` and skip forward to `target`
    fn fast_forward(&mut self, pos: usize, target: Target) -> Result<(Landing, u64), ContractError> {
        let (landing, discarded) = self.fast_forward_from(pos + 1, target)?;
        Ok((landing, discarded + 1))
    }

    /// Skip DPP events from `start` on until one matches `target`
    ///
    /// Waveform events met on the way are still emitted. Returns the landing
    /// position (the landing event is not consumed) and the number of DPP
    /// events discarded.
    fn fast_forward_from(
        &mut self,
        start: usize,
        target: Target,
    ) -> Result<(Landing, u64), ContractError> {
        let mut discarded = 0;
        for pos in start..self.positions.len() {
            self.cancel.check(self.channel.channel)?;
            self.state.cursor.stream = pos;
            let event = self.event_at(pos)?;

            if event.mode == EventMode::Waveform {
                self.on_waveform(event);
                continue;
            }

            let time = self.complete_time(event);
            if self.state.wrap.inspect(event.stamp()).is_ok() {
                let delta = self.state.previous_complete_time.map(|previous| time - previous);
                let step = transition(
                    self.state.mode,
                    EventMode::Dpp,
                    delta,
                    self.sync.waveform_epoch_gap_ns,
                );

                // An epoch start also ends a NotBefore skip: the main loop
                // sees it again and switches epoch itself
                let lands = match target {
                    Target::EpochStart => step.is_new_epoch,
                    Target::NotBefore(bound) => step.is_new_epoch || time >= bound,
                };
                if lands {
                    tracing::debug!(
                        channel = %self.channel.channel,
                        position = pos,
                        discarded,
                        "fast-forward landed"
                    );
                    return Ok((Landing::At(pos), discarded));
                }

                self.state.wrap.commit(event.stamp());
                self.state.mode = Some(step.mode);
                self.state.previous_complete_time = Some(time);
            }
            discarded += 1;
        }

        Ok((Landing::End, discarded))
    }

    fn on_waveform(&mut self, event: &RawEvent) {
        let time = self.complete_time(event);
        let step = transition(
            self.state.mode,
            EventMode::Waveform,
            self.tracker.delta(time),
            self.sync.waveform_epoch_gap_ns,
        );
        self.state.mode = Some(step.mode);
        // Mode switches reset the hardware counters
        self.state.wrap.reset();

        let slot = self.tracker.advance(time, step.is_new_epoch);
        if slot.opened_epoch {
            tracing::debug!(channel = %self.channel.channel, epoch = slot.epoch_id, time, "waveform epoch");
        }

        self.output.waveform.push(WaveformRecord {
            channel: self.channel.channel,
            epoch_id: slot.epoch_id,
            sub_index: slot.sub_index,
            absolute_time: time,
            waveform: event.waveform.clone(),
        });
        self.output.stats.waveform_emitted += 1;
    }

    fn emit_dpp(&mut self, event: &RawEvent, time: f64) {
        let marker = self.marker();
        self.output.dpp.push(DppRecord {
            channel: self.channel.channel,
            macropulse_index: marker.index,
            macro_start_time: marker.start_time,
            within_macro_sequence: self.state.within_macro_sequence,
            absolute_time: time,
            target_position: marker.target_position,
            short_gate_charge: event.short_gate_charge,
            long_gate_charge: event.long_gate_charge,
            waveform: (!event.waveform.is_empty()).then(|| event.waveform.clone()),
        });
        self.state.within_macro_sequence += 1;
        self.output.stats.dpp_emitted += 1;
    }

    /// Move the marker cursor, restarting the sequence when the macropulse changes
    fn enter_marker(&mut self, marker: usize) {
        if marker != self.state.cursor.marker {
            self.flush_window_drops();
            self.state.cursor.marker = marker;
            self.state.within_macro_sequence = 0;
        }
    }

    fn drop_out_of_window(&mut self, time: f64) {
        self.output.stats.window_dropped += 1;
        if !self.sync.audit_window_drops {
            return;
        }
        let marker = self.state.cursor.marker;
        if let Some(drops) = self.pending_drops.as_mut().filter(|d| d.marker == marker) {
            drops.count += 1;
            return;
        }
        self.flush_window_drops();
        self.pending_drops = Some(WindowDrops {
            marker,
            count: 1,
            first_time: time,
        });
    }

    fn flush_window_drops(&mut self) {
        let Some(drops) = self.pending_drops.take() else {
            return;
        };
        let marker = &self.markers.as_slice()[drops.marker];
        let entry = LogEntry::new(
            LogKind::OutOfWindow,
            self.channel.channel,
            Some(marker.index),
            drops.first_time,
            format!(
                "outside [start + {:.0}, start + {:.0}) ns of macropulse {}",
                self.channel.offset_ns,
                self.channel.offset_ns + self.channel.period_limit_ns,
                marker.index
            ),
        )
        .discarding(drops.count);
        self.output.log.push(entry);
    }

    /// Account for every remaining event of the channel, from `pos` on
    fn exhaust(&mut self, pos: usize) {
        self.flush_window_drops();
        let remaining = (self.positions.len() - pos) as u64;
        self.output.stats.exhausted_discarded += remaining;

        let time = if pos < self.positions.len() {
            self.event_at(pos)
                .map(|event| self.complete_time(event))
                .unwrap_or_default()
        } else {
            0.0
        };
        let last = self.markers.as_slice().last().map(|m| m.index);
        tracing::warn!(
            channel = %self.channel.channel,
            remaining,
            time,
            "marker cursor exhausted"
        );
        let entry = LogEntry::new(
            LogKind::MarkerCursorExhausted,
            self.channel.channel,
            last,
            time,
            format!("no macropulse marker left; {remaining} events not synchronized"),
        )
        .discarding(remaining);
        self.output.log.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::TimeBase;

    const OFFSET: f64 = 951.0;
    const LIMIT: f64 = 8_330_000.0;

    fn sync_config() -> SyncConfig {
        SyncConfig {
            channels: vec![ChannelSyncConfig::new(4, OFFSET, LIMIT)],
            ..Default::default()
        }
    }

    fn dpp_at(ns: f64) -> RawEvent {
        let stamp = TimeBase::default().ns_to_stamp(ns);
        RawEvent::dpp(4, stamp.extended, stamp.coarse).with_charges(100, 400)
    }

    fn waveform_at(ns: f64) -> RawEvent {
        let stamp = TimeBase::default().ns_to_stamp(ns);
        RawEvent::waveform(4, stamp.extended, stamp.coarse, vec![7, 8])
    }

    fn markers_at(times: &[f64]) -> MarkerTable {
        MarkerTable::from_start_times(times)
    }

    fn epoch_markers(times: &[(f64, bool)]) -> MarkerTable {
        MarkerTable::new(
            times
                .iter()
                .enumerate()
                .map(|(i, &(start_time, is_new_epoch))| MacropulseMarker {
                    index: i as u64,
                    start_time,
                    target_position: 1,
                    is_new_epoch,
                })
                .collect(),
        )
    }

    fn run(events: &[RawEvent], markers: &MarkerTable) -> ChannelOutput {
        run_with(events, markers, &sync_config())
    }

    fn run_with(events: &[RawEvent], markers: &MarkerTable, config: &SyncConfig) -> ChannelOutput {
        let positions: Vec<usize> = (0..events.len()).collect();
        let cancel = CancelFlag::new();
        ChannelDemultiplexer::new(events, &positions, markers, config, &config.channels[0], &cancel)
            .run()
            .unwrap()
    }

    fn assert_covered(output: &ChannelOutput) {
        assert_eq!(output.stats.accounted(), output.stats.events_seen);
        let emitted = output.stats.dpp_emitted + output.stats.waveform_emitted;
        let logged: u64 = output.log.iter().map(|e| e.discarded_events).sum();
        assert_eq!(emitted + logged, output.stats.events_seen);
    }

    #[test]
    fn test_events_in_first_macropulse() {
        let markers = markers_at(&[0.0, 8_330_000.0, 16_660_000.0]);
        let output = run(&[dpp_at(4_000_000.0), dpp_at(4_005_000.0)], &markers);

        assert_eq!(output.dpp.len(), 2);
        assert_eq!(output.dpp[0].macropulse_index, 0);
        assert_eq!(output.dpp[0].within_macro_sequence, 0);
        assert_eq!(output.dpp[1].macropulse_index, 0);
        assert_eq!(output.dpp[1].within_macro_sequence, 1);
        assert_eq!(output.dpp[0].short_gate_charge, 100);
        assert!(output.log.is_empty());
        assert_covered(&output);
    }

    #[test]
    fn test_sequence_restarts_on_next_macropulse() {
        let p = 1e9 / 120.0;
        let markers = markers_at(&[0.0, p, 2.0 * p, 3.0 * p]);
        let events = [
            dpp_at(1_000.0),
            dpp_at(2_000.0),
            dpp_at(p + 1_000.0),
            dpp_at(3.0 * p + 1_000.0),
            dpp_at(3.0 * p + 2_000.0),
        ];
        let output = run(&events, &markers);

        let seen: Vec<(u64, u64)> = output
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (0, 1), (1, 0), (3, 0), (3, 1)]);
        assert_covered(&output);
    }

    #[test]
    fn test_window_gate_drop_is_audited() {
        let markers = markers_at(&[0.0, 8_333_333.0, 16_666_666.0]);
        // Before the offset, then in the dead time after the window
        let events = [dpp_at(500.0), dpp_at(100_000.0), dpp_at(8_331_500.0)];
        let output = run(&events, &markers);

        assert_eq!(output.dpp.len(), 1);
        assert_eq!(output.stats.window_dropped, 2);
        let drops: Vec<_> = output
            .log
            .iter()
            .filter(|e| e.kind == LogKind::OutOfWindow)
            .collect();
        assert_eq!(drops.len(), 2);
        assert_eq!(drops[0].macropulse_index, Some(0));
        assert_eq!(drops[1].macropulse_index, Some(1));
        assert_covered(&output);
    }

    #[test]
    fn test_beam_anomaly_resumes_at_next_in_sync_marker() {
        let p = 8_330_000.0;
        let markers = markers_at(&[0.0, p, 100_000_000.0, 100_000_000.0 + p, 100_000_000.0 + 2.0 * p]);
        let events = [
            dpp_at(4_000_000.0),
            dpp_at(30_000_000.0),
            dpp_at(50_000_000.0),
            dpp_at(100_000_000.0 + p + 5_000.0),
        ];
        let output = run(&events, &markers);

        let anomalies: Vec<_> = output
            .log
            .iter()
            .filter(|e| e.kind == LogKind::BeamAnomaly)
            .collect();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].macropulse_index, Some(1));
        assert_eq!(anomalies[0].discarded_events, 2);
        assert_eq!(output.dpp.len(), 2);
        assert_eq!(output.dpp[1].macropulse_index, 3);
        assert_eq!(output.dpp[1].within_macro_sequence, 0);
        assert_covered(&output);
    }

    #[test]
    fn test_beam_anomaly_keeps_event_already_in_resumed_window() {
        let p = 8_330_000.0;
        let markers = markers_at(&[0.0, p, 100_000_000.0, 100_000_000.0 + p, 100_000_000.0 + 2.0 * p]);
        // Quiet through the anomaly; the first event after it already sits in macropulse 3
        let events = [
            dpp_at(4_000_000.0),
            dpp_at(108_335_000.0),
            dpp_at(108_336_000.0),
        ];
        let output = run(&events, &markers);

        let anomaly = output
            .log
            .iter()
            .find(|e| e.kind == LogKind::BeamAnomaly)
            .unwrap();
        assert_eq!(anomaly.macropulse_index, Some(1));
        assert_eq!(anomaly.discarded_events, 0);
        assert!(anomaly.message.contains("start 108330000 ns"), "got: {}", anomaly.message);
        let seen: Vec<(u64, u64)> = output
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (3, 0), (3, 1)]);
        assert_eq!(output.dpp[1].absolute_time, 108_335_000.0);
        assert_covered(&output);
    }

    #[test]
    fn test_beam_anomaly_without_in_sync_pair_exhausts() {
        let markers = markers_at(&[0.0, 8_330_000.0, 100_000_000.0]);
        let events = [
            dpp_at(1_000_000.0),
            dpp_at(20_000_000.0),
            dpp_at(50_000_000.0),
            dpp_at(101_000_000.0),
            dpp_at(109_000_000.0),
        ];
        let output = run(&events, &markers);

        assert_eq!(output.log.len(), 2);
        assert_eq!(output.log[0].kind, LogKind::BeamAnomaly);
        assert_eq!(output.log[0].macropulse_index, Some(1));
        assert_eq!(output.log[0].discarded_events, 0);
        assert_eq!(output.log[1].kind, LogKind::MarkerCursorExhausted);
        assert_eq!(output.log[1].discarded_events, 4);
        assert_eq!(output.dpp.len(), 1);
        assert_eq!(output.dpp[0].macropulse_index, 0);
        assert_eq!(output.stats.beam_anomalies, 1);
        assert_covered(&output);
    }

    #[test]
    fn test_beam_anomaly_across_epoch_skips_to_resumed_macropulse() {
        let p = 1e9 / 120.0;
        // Non-multiple gap after marker 1, then the clock resets its counters
        let markers = epoch_markers(&[
            (0.0, false),
            (p, false),
            (40_000_000.0, false),
            (200.0, true),
            (200.0 + p, false),
        ]);
        let events = [
            dpp_at(2_000.0),
            dpp_at(20_000_000.0),
            dpp_at(30_000_000.0),
            // Channel counters reset; this one precedes the resumed window
            dpp_at(2_000.0),
            dpp_at(200.0 + p + 3_000.0),
            dpp_at(200.0 + p + 5_000.0),
        ];
        let output = run(&events, &markers);

        assert_eq!(output.log.len(), 1);
        let anomaly = &output.log[0];
        assert_eq!(anomaly.kind, LogKind::BeamAnomaly);
        assert_eq!(anomaly.macropulse_index, Some(1));
        assert_eq!(anomaly.discarded_events, 3);
        assert_eq!(output.stats.anomaly_discarded, 3);
        assert_eq!(output.stats.epoch_discarded, 0);
        let seen: Vec<(u64, u64)> = output
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (4, 0), (4, 1)]);
        assert_covered(&output);
    }

    #[test]
    fn test_silent_window_drops_are_counted() {
        let markers = markers_at(&[0.0, 8_333_333.0, 16_666_666.0]);
        let events = [dpp_at(500.0), dpp_at(100_000.0), dpp_at(8_331_500.0)];
        let mut config = sync_config();
        config.audit_window_drops = false;
        let output = run_with(&events, &markers, &config);

        assert_eq!(output.dpp.len(), 1);
        assert_eq!(output.stats.window_dropped, 2);
        assert!(output.log.iter().all(|e| e.kind != LogKind::OutOfWindow));
        assert!(output.log.is_empty());
        assert_eq!(output.stats.accounted(), output.stats.events_seen);
    }

    #[test]
    fn test_double_and_triple_gaps_are_not_anomalies() {
        let p = 1e9 / 120.0;
        let markers = markers_at(&[0.0, 2.0 * p, 5.0 * p, 6.0 * p]);
        let events = [dpp_at(1_000.0), dpp_at(2.0 * p + 1_000.0), dpp_at(5.0 * p + 1_000.0)];
        let output = run(&events, &markers);

        assert_eq!(output.dpp.len(), 3);
        assert_eq!(output.stats.beam_anomalies, 0);
        assert!(output.log.is_empty());
    }

    #[test]
    fn test_corrupted_timestamp_is_dropped() {
        let p = 1e9 / 120.0;
        let start = 8_589_930_000.0;
        let markers = markers_at(&[start, start + p, start + 2.0 * p]);
        let events = [
            RawEvent::dpp(4, 0, 4_294_967_200),
            RawEvent::dpp(4, 0, 40),
            RawEvent::dpp(4, 1, 40),
        ];
        let output = run(&events, &markers);

        let corrupted: Vec<_> = output
            .log
            .iter()
            .filter(|e| e.kind == LogKind::CorruptedTimestamp)
            .collect();
        assert_eq!(corrupted.len(), 1);
        assert_eq!(corrupted[0].absolute_time, 80.0);
        assert_eq!(output.stats.corrupted, 1);
        assert_eq!(output.dpp.len(), 2);
        assert_covered(&output);
    }

    #[test]
    fn test_counter_reset_moves_to_next_epoch_marker() {
        let p = 1e9 / 120.0;
        let markers = epoch_markers(&[(0.0, false), (p, false), (500.0, true), (500.0 + p, false)]);
        let events = [
            dpp_at(2_000.0),
            dpp_at(p + 2_000.0),
            // Counters reset: back near zero
            dpp_at(2_000.0),
            dpp_at(p + 3_000.0),
        ];
        let output = run(&events, &markers);

        let seen: Vec<(u64, u64)> = output
            .dpp
            .iter()
            .map(|r| (r.macropulse_index, r.within_macro_sequence))
            .collect();
        assert_eq!(seen, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_covered(&output);
    }

    #[test]
    fn test_clock_epoch_skips_stale_channel_events() {
        let p = 1e9 / 120.0;
        // The clock switched epochs after marker 1; this channel keeps
        // counting up for a while before its own reset
        let markers = epoch_markers(&[(0.0, false), (p, false), (100.0, true), (100.0 + p, false)]);
        let events = [
            dpp_at(2_000.0),
            dpp_at(2.0 * p + 2_000.0),
            dpp_at(2.0 * p + 9_000.0),
            waveform_at(3_000.0),
            dpp_at(2_000.0),
        ];
        let output = run(&events, &markers);

        assert_eq!(output.dpp.len(), 2);
        assert_eq!(output.dpp[1].macropulse_index, 2);
        assert_eq!(output.waveform.len(), 1);
        let skip = output
            .log
            .iter()
            .find(|e| e.kind == LogKind::EpochSkip)
            .unwrap();
        assert_eq!(skip.discarded_events, 2);
        assert_covered(&output);
    }

    #[test]
    fn test_marker_exhaustion_is_terminal() {
        let markers = markers_at(&[0.0, 8_333_333.0]);
        let events = [
            dpp_at(1_000.0),
            dpp_at(40_000_000.0),
            waveform_at(40_000_100.0),
            dpp_at(40_001_000.0),
        ];
        let output = run(&events, &markers);

        assert_eq!(output.dpp.len(), 1);
        let last = output.log.last().unwrap();
        assert_eq!(last.kind, LogKind::MarkerCursorExhausted);
        assert_eq!(last.discarded_events, 3);
        assert!(output.waveform.is_empty());
        assert_covered(&output);
    }

    #[test]
    fn test_waveform_epochs_chain_by_gap() {
        let markers = markers_at(&[0.0]);
        let mut events: Vec<RawEvent> = (0..350_000).map(|i| waveform_at(f64::from(i) * 2.0)).collect();
        events.push(waveform_at(1_500_000.0));
        let output = run(&events, &markers);

        assert_eq!(output.epochs.len(), 2);
        assert_eq!(output.waveform[0].epoch_id, 0);
        assert_eq!(output.waveform[349_999].epoch_id, 0);
        assert_eq!(output.waveform[349_999].sub_index, 349_999);
        assert_eq!(output.waveform[350_000].epoch_id, 1);
        assert_eq!(output.waveform[350_000].sub_index, 0);
    }

    #[test]
    fn test_cancelled_pass_returns_error() {
        let markers = markers_at(&[0.0]);
        let events = [dpp_at(1_000.0)];
        let config = sync_config();
        let positions = [0];
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result =
            ChannelDemultiplexer::new(&events[..], &positions, &markers, &config, &config.channels[0], &cancel)
                .run();
        assert!(matches!(result, Err(ContractError::Cancelled { .. })));
    }
}
