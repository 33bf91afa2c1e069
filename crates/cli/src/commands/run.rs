//! `run` command implementation.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use contracts::{RunBlueprint, SinkConfig, SinkType};
use sync_engine::CancelFlag;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref input) = args.input {
        info!(input = %input.display(), "Overriding input from CLI");
        blueprint.input.path = Some(input.clone());
    }
    if let Some(ref output) = args.output {
        info!(output = %output.display(), "Directing file output from CLI");
        apply_output_override(&mut blueprint, output);
    }

    info!(
        clock = %blueprint.clock.channel,
        channels = blueprint.channels.len(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let input = blueprint.input.path.clone().ok_or(CliError::InputMissing)?;
    if !input.exists() {
        return Err(CliError::input_not_found(input).into());
    }

    let cancel = CancelFlag::new();
    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        input,
        buffer_size: args.buffer_size.max(1),
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
        cancel: cancel.clone(),
    });

    // The signal only raises the flag; channel passes observe it per event
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, cancelling run...");
        cancel.cancel();
    });

    info!("Starting pipeline...");
    let result = pipeline.run().await;
    watcher.abort();

    let stats = result.context("Pipeline execution failed")?;
    info!(
        records = stats.records_dispatched,
        duration_secs = stats.duration.as_secs_f64(),
        events_per_sec = format!("{:.0}", stats.events_per_sec()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("macrosort finished");
    Ok(())
}

/// Point the first file sink at `output`, or add one
fn apply_output_override(blueprint: &mut RunBlueprint, output: &Path) {
    let base_path = output.to_string_lossy().into_owned();
    match blueprint
        .sinks
        .iter_mut()
        .find(|s| s.sink_type == SinkType::File)
    {
        Some(sink) => {
            sink.params.insert("base_path".to_string(), base_path);
        }
        None => blueprint.sinks.push(SinkConfig {
            name: "output".to_string(),
            sink_type: SinkType::File,
            queue_capacity: 1024,
            params: BTreeMap::from([("base_path".to_string(), base_path)]),
        }),
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RunBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Input:");
    match &blueprint.input.path {
        Some(path) => println!("  File: {}", path.display()),
        None => println!("  File: (not set)"),
    }
    println!("  Sample period: {} ns", blueprint.input.sample_period_ns);
    println!("  Extended time: {:?}", blueprint.input.extended_time);

    println!("\nClock:");
    println!("  Channel: {}", blueprint.clock.channel);
    println!(
        "  Nominal period: {:.1} ns (tolerance {})",
        blueprint.sync.nominal_period_ns, blueprint.sync.period_tolerance
    );

    println!("\nChannels ({}):", blueprint.channels.len());
    for channel in &blueprint.channels {
        println!(
            "  - {} {} offset {} ns, window {} ns",
            channel.id.label(),
            channel.name,
            channel.offset_ns,
            channel.period_limit_ns
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
