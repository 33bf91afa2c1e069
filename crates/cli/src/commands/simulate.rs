//! `simulate` command implementation.

use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};
use ingestion::{EvtWriter, MockRunBuilder};
use tracing::info;

use crate::cli::SimulateArgs;

/// Execute the `simulate` command
pub fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let mut builder = MockRunBuilder::new(args.seed)
        .pulses(args.pulses)
        .events_per_pulse(args.events_per_pulse);
    for &pulse in &args.anomaly_at {
        builder = builder.anomaly_at(pulse);
    }
    for &pulse in &args.wrap_fault_at {
        builder = builder.wrap_fault_at(pulse);
    }
    if let Some(every) = args.waveform_every {
        builder = builder.waveform_every(every);
    }

    info!(
        seed = args.seed,
        pulses = args.pulses,
        anomalies = args.anomaly_at.len(),
        wrap_faults = args.wrap_fault_at.len(),
        "Generating synthetic run"
    );
    let run = builder.build();

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = EvtWriter::new(BufWriter::new(file));
    for event in &run.events {
        writer
            .write_event(event)
            .context("Failed to encode event")?;
    }
    let written = writer.events_written();
    writer.finish().context("Failed to flush output")?;

    info!(events = written, output = %args.output.display(), "Synthetic run written");
    println!(
        "Wrote {} events ({} macropulses, {} detector events) to {}",
        written,
        run.pulse_starts.len(),
        run.detector_events,
        args.output.display()
    );
    Ok(())
}
