//! Synchronization metrics
//!
//! Prometheus counters for the clock track and channel passes, plus an
//! in-memory aggregator that produces the end-of-run summary.

use std::collections::BTreeMap;

use contracts::{ChannelId, ChannelStats, DppRecord, LogEntry, LogKind, MacropulseMarker};
use metrics::{counter, gauge, histogram};

/// Record the outcome of building the clock track
pub fn record_clock_track(markers: usize, epochs: usize, retriggers: u64, corrupted: u64) {
    gauge!("macrosort_markers").set(markers as f64);
    gauge!("macrosort_clock_waveform_epochs").set(epochs as f64);
    counter!("macrosort_clock_retriggers_total").increment(retriggers);
    counter!("macrosort_clock_corrupted_total").increment(corrupted);
}

/// Record the counters of one finished channel pass
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_channel_pass;
///
/// for channel in &output.channels {
///     record_channel_pass(channel.channel, &channel.stats);
/// }
/// ```
pub fn record_channel_pass(channel: ChannelId, stats: &ChannelStats) {
    let label = channel.label();
    let series = [
        ("events_seen", stats.events_seen),
        ("dpp_emitted", stats.dpp_emitted),
        ("waveform_emitted", stats.waveform_emitted),
        ("corrupted", stats.corrupted),
        ("anomaly_discarded", stats.anomaly_discarded),
        ("epoch_discarded", stats.epoch_discarded),
        ("window_dropped", stats.window_dropped),
        ("exhausted_discarded", stats.exhausted_discarded),
    ];
    for (outcome, value) in series {
        counter!(
            "macrosort_channel_events_total",
            "channel" => label.clone(),
            "outcome" => outcome
        )
        .increment(value);
    }
    counter!("macrosort_beam_anomalies_total", "channel" => label.clone())
        .increment(stats.beam_anomalies);
    gauge!("macrosort_waveform_epochs", "channel" => label).set(stats.waveform_epochs as f64);
}

/// Record one error-log entry
pub fn record_log_entry(entry: &LogEntry) {
    counter!(
        "macrosort_log_entries_total",
        "channel" => entry.channel.label(),
        "kind" => entry.kind.as_str()
    )
    .increment(1);
    if entry.discarded_events > 0 {
        histogram!("macrosort_discarded_per_entry", "kind" => entry.kind.as_str())
            .record(entry.discarded_events as f64);
    }
}

/// Record the final write counts of one sink
pub fn record_records_dispatched(sink_name: &str, written: u64, failed: u64) {
    counter!(
        "macrosort_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => "success"
    )
    .increment(written);
    counter!(
        "macrosort_records_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => "failure"
    )
    .increment(failed);
}

/// Wall time of one engine run
pub fn record_run_duration_ms(duration_ms: f64) {
    histogram!("macrosort_run_duration_ms").record(duration_ms);
}

/// In-memory aggregation of a whole run
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    pub total_markers: u64,

    /// Markers whose target position could not be classified
    pub untargeted_markers: u64,

    pub channels: BTreeMap<ChannelId, ChannelStats>,

    pub log_counts: BTreeMap<LogKind, u64>,

    /// Accepted DPP events per (channel, macropulse)
    pub occupancy_stats: RunningStats,

    /// Arrival time within the macropulse (µs)
    pub delay_stats: RunningStats,

    /// Spacing of consecutive markers inside one epoch (ms)
    pub marker_gap_stats: RunningStats,
}

impl SyncMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_markers(&mut self, markers: &[MacropulseMarker]) {
        self.total_markers += markers.len() as u64;
        self.untargeted_markers += markers.iter().filter(|m| !m.has_target()).count() as u64;
        for pair in markers.windows(2) {
            if !pair[1].is_new_epoch {
                self.marker_gap_stats
                    .push((pair[1].start_time - pair[0].start_time) / 1e6);
            }
        }
    }

    pub fn update_channel(&mut self, channel: ChannelId, stats: &ChannelStats) {
        self.channels.entry(channel).or_default().merge(stats);
    }

    pub fn update_log(&mut self, entry: &LogEntry) {
        *self.log_counts.entry(entry.kind).or_insert(0) += 1;
    }

    /// Fold the accepted records of one channel, in emission order
    pub fn update_records(&mut self, records: &[DppRecord]) {
        let mut current: Option<(u64, u64)> = None;
        for record in records {
            self.delay_stats
                .push((record.absolute_time - record.macro_start_time) / 1000.0);
            current = match current {
                Some((index, count)) if index == record.macropulse_index => {
                    Some((index, count + 1))
                }
                Some((_, count)) => {
                    self.occupancy_stats.push(count as f64);
                    Some((record.macropulse_index, 1))
                }
                None => Some((record.macropulse_index, 1)),
            };
        }
        if let Some((_, count)) = current {
            self.occupancy_stats.push(count as f64);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut totals = ChannelStats::default();
        for stats in self.channels.values() {
            totals.merge(stats);
        }
        let discarded = totals.events_seen.saturating_sub(totals.dpp_emitted + totals.waveform_emitted);
        MetricsSummary {
            total_markers: self.total_markers,
            untargeted_markers: self.untargeted_markers,
            totals,
            discard_rate: if totals.events_seen > 0 {
                discarded as f64 / totals.events_seen as f64 * 100.0
            } else {
                0.0
            },
            channels: self.channels.clone(),
            log_counts: self.log_counts.clone(),
            occupancy: StatsSummary::from(&self.occupancy_stats),
            delay_us: StatsSummary::from(&self.delay_stats),
            marker_gap_ms: StatsSummary::from(&self.marker_gap_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_markers: u64,
    pub untargeted_markers: u64,
    pub totals: ChannelStats,
    /// Share of channel events not emitted (%)
    pub discard_rate: f64,
    pub channels: BTreeMap<ChannelId, ChannelStats>,
    pub log_counts: BTreeMap<LogKind, u64>,
    pub occupancy: StatsSummary,
    pub delay_us: StatsSummary,
    pub marker_gap_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Sync Metrics Summary ===")?;
        writeln!(
            f,
            "Macropulses: {} ({} without target)",
            self.total_markers, self.untargeted_markers
        )?;
        writeln!(f, "Channel events: {}", self.totals.events_seen)?;
        writeln!(
            f,
            "Emitted: {} dpp, {} waveform",
            self.totals.dpp_emitted, self.totals.waveform_emitted
        )?;
        writeln!(f, "Discarded: {:.2}%", self.discard_rate)?;
        writeln!(f, "Events per macropulse: {}", self.occupancy)?;
        writeln!(f, "Delay in macropulse (us): {}", self.delay_us)?;
        writeln!(f, "Marker gap (ms): {}", self.marker_gap_ms)?;

        if !self.channels.is_empty() {
            writeln!(f, "Per channel:")?;
            for (channel, stats) in &self.channels {
                writeln!(
                    f,
                    "  {}: seen={} dpp={} wf={} window={} anomaly={} epoch={} corrupt={} exhausted={}",
                    channel.label(),
                    stats.events_seen,
                    stats.dpp_emitted,
                    stats.waveform_emitted,
                    stats.window_dropped,
                    stats.anomaly_discarded,
                    stats.epoch_discarded,
                    stats.corrupted,
                    stats.exhausted_discarded
                )?;
            }
        }

        if !self.log_counts.is_empty() {
            writeln!(f, "Error log:")?;
            for (kind, count) in &self.log_counts {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
