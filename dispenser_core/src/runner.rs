//! Fixed-interval control loop around [`Dispenser::tick`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::dispenser::Dispenser;

/// Totals for one `run` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub doses: u32,
    pub dispensed: u32,
}

/// Tick until `shutdown` is raised or `max_ticks` iterations ran.
///
/// A tick that overruns the interval (a dose in progress) is followed
/// immediately by the next one; there is no catch-up burst.
pub fn run(dispenser: &mut Dispenser, shutdown: &AtomicBool, max_ticks: Option<u64>) -> RunSummary {
    let tick = dispenser.loop_cfg().tick;
    let mut summary = RunSummary::default();
    info!(tick_ms = tick.as_millis() as u64, ?max_ticks, "control loop started");

    while !shutdown.load(Ordering::Relaxed) && max_ticks.is_none_or(|m| summary.ticks < m) {
        let started = dispenser.clock().now();
        for report in dispenser.tick() {
            summary.doses += 1;
            if report.is_dispensed() {
                summary.dispensed += 1;
            } else if let Some(e) = report.error() {
                warn!(funnel = %report.funnel, error = %e, "scheduled dose not dispensed");
            }
        }
        summary.ticks += 1;

        let spent = dispenser.clock().now().saturating_duration_since(started);
        if let Some(rest) = tick.checked_sub(spent) {
            dispenser.clock().sleep(rest);
        }
    }

    info!(
        ticks = summary.ticks,
        doses = summary.doses,
        dispensed = summary.dispensed,
        "control loop stopped"
    );
    summary
}
