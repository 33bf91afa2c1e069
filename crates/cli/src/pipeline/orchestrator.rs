//! Pipeline orchestrator - coordinates all components.
//!
//! Decode → synchronize (blocking pool, parallel channel passes) → dispatch.
//! Records reach the sinks in the engine's deterministic order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{ContractError, OutputRecord, RawEventSource, RunBlueprint};
use ingestion::{EventArena, IngestionMetrics};
use observability::record_records_dispatched;
use sync_engine::{CancelFlag, SyncEngine, SyncOutput};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: RunBlueprint,

    /// Raw `.evt` input
    pub input: PathBuf,

    /// Channel buffer size between engine output and dispatcher
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Raised by the signal handler
    pub cancel: CancelFlag,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Decode
        info!(input = %self.config.input.display(), "Decoding input...");
        let decode_start = Instant::now();
        let ingestion_metrics = Arc::new(IngestionMetrics::new());
        let arena = {
            let path = self.config.input.clone();
            let input = blueprint.input.clone();
            let metrics = Arc::clone(&ingestion_metrics);
            tokio::task::spawn_blocking(move || EventArena::load(&path, &input, metrics))
                .await
                .context("Decoder task failed")?
                .with_context(|| format!("Failed to decode {}", self.config.input.display()))?
        };
        let decode_time = decode_start.elapsed();

        let snapshot = ingestion_metrics.snapshot();
        info!(
            events = snapshot.events_decoded,
            dpp = snapshot.dpp_events,
            waveform = snapshot.waveform_events,
            size_mismatches = snapshot.size_mismatches,
            "Input decoded"
        );
        if snapshot.size_mismatches > 0 {
            warn!(
                count = snapshot.size_mismatches,
                "Event size fields disagreed with decoded lengths"
            );
        }

        // Synchronize
        let sync_config = blueprint.to_sync_config();
        let active_channels = sync_config.channels.len();
        info!(
            clock = %sync_config.clock.channel,
            channels = active_channels,
            "Synchronizing..."
        );
        let sync_start = Instant::now();
        let arena = Arc::new(arena);
        let output = {
            let engine = SyncEngine::new(sync_config);
            let arena = Arc::clone(&arena);
            let cancel = self.config.cancel.clone();
            tokio::task::spawn_blocking(move || engine.run(arena.as_ref(), &cancel))
                .await
                .context("Synchronization task failed")?
        };
        let output = match output {
            Ok(output) => output,
            Err(ContractError::Cancelled { channel }) => {
                warn!(%channel, "Synchronization cancelled");
                return Err(CliError::Cancelled.into());
            }
            Err(e) => return Err(e).context("Synchronization failed"),
        };
        let sync_time = sync_start.elapsed();

        let mut stats = PipelineStats {
            events_read: arena.len() as u64,
            decode_time,
            sync_time,
            active_channels,
            active_sinks: blueprint.sinks.len(),
            ..Default::default()
        };
        collect_output_stats(&output, &mut stats);

        // Dispatch
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - synchronized records will be discarded");
        }
        let (record_tx, record_rx) = mpsc::channel::<OutputRecord>(self.config.buffer_size);
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), record_rx)
            .await
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = stats.active_sinks, "Dispatcher started");

        for record in output.records() {
            if record_tx.send(record).await.is_err() {
                return Err(CliError::pipeline_execution("dispatcher stopped early").into());
            }
        }
        drop(record_tx);

        let report = dispatcher_handle
            .await
            .context("Dispatcher task failed")?;
        for (name, snap) in &report.sinks {
            record_records_dispatched(name, snap.write_count, snap.failure_count);
        }
        stats.records_dispatched = report.records;
        stats.sink_failures = report.total_failures();
        if stats.sink_failures > 0 {
            warn!(failures = stats.sink_failures, "Some records failed to write");
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records = stats.records_dispatched,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Fold the engine output into run statistics
fn collect_output_stats(output: &SyncOutput, stats: &mut PipelineStats) {
    let aggregator = &mut stats.sync_metrics;
    aggregator.update_markers(output.clock.markers.as_slice());
    for entry in &output.clock.log {
        aggregator.update_log(entry);
    }
    stats.markers = output.clock.markers.len() as u64;
    stats.log_entries = output.clock.log.len() as u64;

    for channel in &output.channels {
        aggregator.update_channel(channel.channel, &channel.stats);
        aggregator.update_records(&channel.dpp);
        for entry in &channel.log {
            aggregator.update_log(entry);
        }
        stats.dpp_records += channel.dpp.len() as u64;
        stats.waveform_records += channel.waveform.len() as u64;
        stats.log_entries += channel.log.len() as u64;
    }
}
