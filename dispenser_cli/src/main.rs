#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod backend;
mod cli;
mod commands;
mod error_fmt;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::commands::Ctx;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn load_config(path: &Path) -> eyre::Result<dispenser_config::Config> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("read config {path:?}"))?;
    let cfg = dispenser_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("invalid configuration in {path:?}: {e}"))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    // dropped at the end of this function, flushing the log file
    let _log_guard = logging::init(cli.log_level.as_deref(), cli.json, &cfg.logging)?;

    let calibration = cli
        .calibration
        .as_deref()
        .map(dispenser_config::load_calibration_csv)
        .transpose()?;
    let state_path = cli
        .state
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.state.path));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    tracing::debug!(config = %cli.config.display(), state = %state_path.display(), "configuration loaded");
    let ctx = Ctx {
        cfg,
        calibration,
        state_path,
        json: cli.json,
    };

    match &cli.cmd {
        Commands::Run {
            max_ticks,
            no_splash,
        } => commands::run(&ctx, *max_ticks, *no_splash, shutdown),
        Commands::Status => commands::status(&ctx),
        Commands::Schedule(args) => commands::schedule(&ctx, args),
        Commands::Refill { funnel, count } => commands::refill(&ctx, *funnel, *count),
        Commands::Dispense { funnel } => commands::dispense(&ctx, *funnel),
        Commands::Calibrate {
            known_grams,
            wait_secs,
        } => commands::calibrate(&ctx, *known_grams, *wait_secs),
        Commands::SelfCheck => commands::self_check(&ctx),
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: could not install error report hook: {e}");
    }

    let code = match real_main(cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            exit_code_for_error(&err)
        }
    };
    std::process::exit(code);
}
