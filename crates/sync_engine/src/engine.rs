//! SyncEngine - clock track followed by independent channel passes.

use std::collections::BTreeMap;
use std::time::Instant;

use contracts::{ChannelId, ContractError, OutputRecord, RawEventSource, SyncConfig};
use rayon::prelude::*;
use tracing::instrument;

use crate::cancel::CancelFlag;
use crate::clock::ClockTrack;
use crate::demux::{ChannelDemultiplexer, ChannelOutput};

/// Positions of every channel's events in the raw source, in arrival order
#[derive(Debug, Clone, Default)]
pub struct ChannelIndex {
    positions: BTreeMap<ChannelId, Vec<usize>>,
}

impl ChannelIndex {
    pub fn build<S>(source: &S) -> Result<Self, ContractError>
    where
        S: RawEventSource + ?Sized,
    {
        let mut positions: BTreeMap<ChannelId, Vec<usize>> = BTreeMap::new();
        for index in 0..source.len() {
            let event = source
                .event(index)
                .ok_or(ContractError::SourceIndex { index })?;
            positions.entry(event.channel).or_default().push(index);
        }
        Ok(Self { positions })
    }

    /// Positions of `channel`, empty when it never fired
    pub fn positions(&self, channel: ChannelId) -> &[usize] {
        self.positions
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, usize)> + '_ {
        self.positions.iter().map(|(&id, p)| (id, p.len()))
    }

    pub fn total(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }
}

/// Result of one engine run
#[derive(Debug, Clone)]
pub struct SyncOutput {
    pub clock: ClockTrack,
    /// One entry per configured channel, ordered by channel id
    pub channels: Vec<ChannelOutput>,
}

impl SyncOutput {
    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelOutput> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    /// All records in dispatch order: markers, clock log, then each channel's
    /// DPP records, waveform records and log entries
    pub fn records(&self) -> impl Iterator<Item = OutputRecord> + '_ {
        let markers = self.clock.markers.iter().copied().map(OutputRecord::Marker);
        let clock_log = self.clock.log.iter().cloned().map(OutputRecord::Log);
        let channels = self.channels.iter().flat_map(|c| {
            c.dpp
                .iter()
                .cloned()
                .map(OutputRecord::Dpp)
                .chain(c.waveform.iter().cloned().map(OutputRecord::Waveform))
                .chain(c.log.iter().cloned().map(OutputRecord::Log))
        });
        markers.chain(clock_log).chain(channels)
    }

    pub fn record_count(&self) -> usize {
        self.clock.markers.len()
            + self.clock.log.len()
            + self
                .channels
                .iter()
                .map(|c| c.dpp.len() + c.waveform.len() + c.log.len())
                .sum::<usize>()
    }
}

/// Synchronization engine
#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(mut config: SyncConfig) -> Self {
        config.channels.sort_by_key(|c| c.channel);
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Build the clock track, then demultiplex every configured channel in parallel
    ///
    /// Only a missing reference clock or cancellation fails the run; every
    /// other fault stays inside the affected channel's log.
    #[instrument(
        name = "sync_engine_run",
        skip(self, source, cancel),
        fields(events = source.len(), channels = self.config.channels.len())
    )]
    pub fn run<S>(&self, source: &S, cancel: &CancelFlag) -> Result<SyncOutput, ContractError>
    where
        S: RawEventSource + ?Sized,
    {
        let started = Instant::now();
        let index = ChannelIndex::build(source)?;
        let clock = ClockTrack::build_indexed(
            source,
            index.positions(self.config.clock.channel),
            &self.config,
            cancel,
        )?;
        observability::record_clock_track(
            clock.markers.len(),
            clock.epochs.len(),
            clock.stats.retriggers,
            clock.stats.corrupted,
        );

        let channels = self
            .config
            .channels
            .par_iter()
            .map(|channel| {
                ChannelDemultiplexer::new(
                    source,
                    index.positions(channel.channel),
                    &clock.markers,
                    &self.config,
                    channel,
                    cancel,
                )
                .run()
            })
            .collect::<Result<Vec<_>, _>>()?;

        for channel in &channels {
            observability::record_channel_pass(channel.channel, &channel.stats);
            for entry in &channel.log {
                observability::record_log_entry(entry);
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_run_duration_ms(elapsed_ms);
        metrics::counter!("macrosort_runs_total").increment(1);
        tracing::info!(
            markers = clock.markers.len(),
            elapsed_ms,
            "synchronization finished"
        );

        Ok(SyncOutput { clock, channels })
    }
}
