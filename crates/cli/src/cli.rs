//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// macrosort - macropulse synchronization of digitizer event streams
#[derive(Parser, Debug)]
#[command(
    name = "macrosort",
    author,
    version,
    about = "Macropulse synchronization of pulsed-beam digitizer data",
    long_about = "Assigns every detector event of a raw digitizer stream to the beam \n\
                  macropulse it belongs to, tags it with the target position, and \n\
                  writes the synchronized records plus an audit log to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MACROSORT_VERBOSE")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "MACROSORT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize one run and dispatch the records
    Run(RunArgs),

    /// Validate a run file without processing data
    Validate(ValidateArgs),

    /// Display run file information
    Info(InfoArgs),

    /// Write a synthetic `.evt` stream
    Simulate(SimulateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to run file (TOML or JSON)
    #[arg(short, long, default_value = "run.toml", env = "MACROSORT_CONFIG")]
    pub config: PathBuf,

    /// Raw `.evt` input, overriding `input.path`
    #[arg(short, long, env = "MACROSORT_INPUT")]
    pub input: Option<PathBuf>,

    /// Write JSON lines into this directory (adds or retargets a file sink)
    #[arg(short, long, env = "MACROSORT_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Validate configuration and exit without processing
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between the engine and the dispatcher
    #[arg(long, default_value = "1024", env = "MACROSORT_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "MACROSORT_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to run file to validate
    #[arg(short, long, default_value = "run.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to run file
    #[arg(short, long, default_value = "run.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed channel information
    #[arg(long)]
    pub channels: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Destination `.evt` file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Number of macropulses
    #[arg(long, default_value = "1200")]
    pub pulses: usize,

    /// Generator seed
    #[arg(long, default_value = "0", env = "MACROSORT_SEED")]
    pub seed: u64,

    /// Upper bound of detector events per channel and macropulse
    #[arg(long, default_value = "8")]
    pub events_per_pulse: usize,

    /// Insert a beam anomaly after these pulses
    #[arg(long, value_delimiter = ',')]
    pub anomaly_at: Vec<usize>,

    /// Inject a wrap-corrupted detector timestamp at these pulses
    #[arg(long, value_delimiter = ',')]
    pub wrap_fault_at: Vec<usize>,

    /// Insert a waveform-mode period after every K pulses
    #[arg(long)]
    pub waveform_every: Option<usize>,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::parse_from([
            "macrosort",
            "run",
            "--config",
            "run.toml",
            "--input",
            "run-0042.evt",
            "--output",
            "out",
            "--dry-run",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, Some(PathBuf::from("run-0042.evt")));
                assert_eq!(args.output, Some(PathBuf::from("out")));
                assert!(args.dry_run);
                assert_eq!(args.metrics_port, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate_lists() {
        let cli = Cli::parse_from([
            "macrosort",
            "simulate",
            "--output",
            "mock.evt",
            "--pulses",
            "50",
            "--anomaly-at",
            "10,20",
            "--waveform-every",
            "25",
        ]);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.pulses, 50);
                assert_eq!(args.anomaly_at, vec![10, 20]);
                assert!(args.wrap_fault_at.is_empty());
                assert_eq!(args.waveform_every, Some(25));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
