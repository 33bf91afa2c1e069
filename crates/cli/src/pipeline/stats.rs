//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::SyncMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Raw events decoded from the input
    pub events_read: u64,

    pub markers: u64,

    pub dpp_records: u64,

    pub waveform_records: u64,

    /// Audit entries from the clock track and all channels
    pub log_entries: u64,

    /// Records handed to the dispatcher
    pub records_dispatched: u64,

    /// Failed sink writes, summed over sinks
    pub sink_failures: u64,

    /// Time spent decoding the input
    pub decode_time: Duration,

    /// Time spent in the synchronization engine
    pub sync_time: Duration,

    /// Total duration of the pipeline run
    pub duration: Duration,

    pub active_channels: usize,

    pub active_sinks: usize,

    /// Run-wide synchronization aggregates
    pub sync_metrics: SyncMetricsAggregator,
}

impl PipelineStats {
    /// Raw event throughput over the whole run
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Pipeline Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Decode: {:.2}s", self.decode_time.as_secs_f64());
        println!("   ├─ Synchronize: {:.2}s", self.sync_time.as_secs_f64());
        println!("   ├─ Events read: {}", self.events_read);
        println!("   ├─ Events/s: {:.0}", self.events_per_sec());
        println!("   ├─ Active channels: {}", self.active_channels);
        println!("   └─ Active sinks: {}", self.active_sinks);

        println!("\n📦 Records");
        println!("   ├─ Markers: {}", self.markers);
        println!("   ├─ DPP: {}", self.dpp_records);
        println!("   ├─ Waveform: {}", self.waveform_records);
        println!("   ├─ Log entries: {}", self.log_entries);
        println!("   ├─ Dispatched: {}", self.records_dispatched);
        println!("   └─ Sink failures: {}", self.sink_failures);

        println!("\n{}", self.sync_metrics.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_per_sec() {
        let stats = PipelineStats {
            events_read: 5_000,
            duration: Duration::from_millis(500),
            ..Default::default()
        };
        assert!((stats.events_per_sec() - 10_000.0).abs() < 1e-6);
        assert_eq!(PipelineStats::default().events_per_sec(), 0.0);
    }
}
