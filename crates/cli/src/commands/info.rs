//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::RunBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    input: InputInfo,
    clock: ClockInfo,
    sync_settings: SyncInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channels: Vec<ChannelInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct InputInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    sample_period_ns: f64,
    extended_time: String,
}

#[derive(Serialize)]
struct ClockInfo {
    channel: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrigger_charge: Option<u16>,
    target_gates: Vec<[u32; 2]>,
}

#[derive(Serialize)]
struct SyncInfo {
    nominal_period_ns: f64,
    period_tolerance: f64,
    expected_multiples: Vec<u32>,
    waveform_epoch_gap_ns: f64,
    wrap_guard_ns: f64,
    audit_window_drops: bool,
}

#[derive(Serialize)]
struct ChannelInfo {
    id: u32,
    name: String,
    offset_ns: f64,
    period_limit_ns: f64,
    use_fine_time: bool,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &RunBlueprint, args: &InfoArgs) -> ConfigInfo {
    // Effective gate table, defaults included
    let sync = blueprint.to_sync_config();

    let channels = if args.channels {
        sync.channels
            .iter()
            .map(|c| ChannelInfo {
                id: c.channel.get(),
                name: c.name.clone(),
                offset_ns: c.offset_ns,
                period_limit_ns: c.period_limit_ns,
                use_fine_time: c.use_fine_time,
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        input: InputInfo {
            path: blueprint
                .input
                .path
                .as_ref()
                .map(|p| p.display().to_string()),
            sample_period_ns: blueprint.input.sample_period_ns,
            extended_time: format!("{:?}", blueprint.input.extended_time),
        },
        clock: ClockInfo {
            channel: sync.clock.channel.get(),
            retrigger_charge: sync.clock.retrigger_charge,
            target_gates: sync
                .clock
                .target_gates
                .gates()
                .iter()
                .map(|&g| g.into())
                .collect(),
        },
        sync_settings: SyncInfo {
            nominal_period_ns: sync.period.nominal_period_ns,
            period_tolerance: sync.period.tolerance,
            expected_multiples: sync.period.expected_multiples.clone(),
            waveform_epoch_gap_ns: sync.waveform_epoch_gap_ns,
            wrap_guard_ns: sync.wrap_guard_ns,
            audit_window_drops: sync.audit_window_drops,
        },
        channels,
        sinks,
    }
}

fn print_config_info(blueprint: &RunBlueprint, args: &InfoArgs) {
    let sync = blueprint.to_sync_config();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  macrosort Run Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📂 Input");
    println!("   ├─ Version: {:?}", blueprint.version);
    match &blueprint.input.path {
        Some(path) => println!("   ├─ File: {}", path.display()),
        None => println!("   ├─ File: (from --input)"),
    }
    println!("   ├─ Sample period: {} ns", blueprint.input.sample_period_ns);
    println!("   └─ Extended time: {:?}", blueprint.input.extended_time);

    println!("\n⏱  Clock");
    println!("   ├─ Channel: {}", sync.clock.channel);
    match sync.clock.retrigger_charge {
        Some(charge) => println!("   ├─ Retrigger charge: {}", charge),
        None => println!("   ├─ Retrigger charge: (none)"),
    }
    let gates = sync.clock.target_gates.gates();
    println!("   └─ Target gates ({}):", gates.len());
    for (i, gate) in gates.iter().enumerate() {
        let prefix = if i == gates.len() - 1 { "└─" } else { "├─" };
        println!("        {} {}: [{}, {})", prefix, i + 1, gate.low, gate.high);
    }

    println!("\n⚙️  Sync Settings");
    println!(
        "   ├─ Nominal period: {:.1} ns",
        sync.period.nominal_period_ns
    );
    println!("   ├─ Tolerance: {}", sync.period.tolerance);
    println!("   ├─ Multiples: {:?}", sync.period.expected_multiples);
    println!("   ├─ Waveform epoch gap: {} ns", sync.waveform_epoch_gap_ns);
    println!("   ├─ Wrap guard: {} ns", sync.wrap_guard_ns);
    println!("   └─ Audit window drops: {}", sync.audit_window_drops);

    println!("\n📡 Channels ({})", sync.channels.len());
    for (i, channel) in sync.channels.iter().enumerate() {
        let prefix = if i == sync.channels.len() - 1 { "└─" } else { "├─" };
        if args.channels {
            println!(
                "   {} {} {} (offset {} ns, window {} ns, fine time {})",
                prefix,
                channel.channel.label(),
                channel.name,
                channel.offset_ns,
                channel.period_limit_ns,
                if channel.use_fine_time { "on" } else { "off" }
            );
        } else {
            println!("   {} {} {}", prefix, channel.channel.label(), channel.name);
        }
    }

    if args.sinks && !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let prefix = if i == blueprint.sinks.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            println!(
                "   {} {} ({:?}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
