//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "dispenser", version, about = "Two-funnel pill dispenser")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dispenser_config.toml")]
    pub config: PathBuf,

    /// Override the state file from the config
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Optional HX711 calibration CSV (strict header `raw,grams`)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Machine-readable output: JSON results on stdout, JSON log lines on stderr
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins, then
    /// this flag, then `[logging] level`, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load state (or ask for initial counts) and run the control loop until Ctrl-C
    #[command(
        long_about = "Load state (or ask for initial counts) and run the control loop until Ctrl-C.\n\nWithout the `hardware` feature the three buttons are simulated from stdin: `1`, `2`, `3` press B1/B2/B3 once, `11`, `22`, `33` double-press them, `q` stops the loop."
    )]
    Run {
        /// Stop after this many control-loop ticks
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Skip the start-up splash screens
        #[arg(long, action = ArgAction::SetTrue)]
        no_splash: bool,
    },
    /// Show inventory, schedules and time remaining for both funnels
    Status,
    /// Set or clear the weekly schedule of one funnel
    Schedule(ScheduleArgs),
    /// Set the pill count of one funnel
    Refill {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        funnel: u8,
        #[arg(long)]
        count: u32,
    },
    /// Run one fingerprint-gated dose right now
    Dispense {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        funnel: u8,
    },
    /// Tare, weigh a known mass and print the HX711 reference unit
    Calibrate {
        /// Mass of the calibration weight in grams
        #[arg(long, value_name = "GRAMS")]
        known_grams: f32,
        /// Time to place the weight after taring
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        wait_secs: u64,
    },
    /// Quick health check (backends construct, scale reads)
    SelfCheck,
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub funnel: u8,
    /// Day of week, 0 = Monday .. 6 = Sunday
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6), required_unless_present = "clear")]
    pub day: Option<u8>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=23), required_unless_present = "clear")]
    pub hour: Option<u8>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=59), required_unless_present = "clear")]
    pub minute: Option<u8>,
    /// Remove the schedule
    #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["day", "hour", "minute"])]
    pub clear: bool,
}
