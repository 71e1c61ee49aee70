//! One function per subcommand. Results go to stdout (text or JSON); logs go
//! to stderr.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispenser_config::{Calibration, Config, DisplayBackend};
use dispenser_core::hw_error::map_sensor_error;
use dispenser_core::runner;
use dispenser_core::{
    DispenseOutcome, DispenseReport, Dispenser, PersistedState, Schedule, StateLock, StateStore,
    Startup, time_remaining,
};
use dispenser_hardware::SimButtonHandle;
use dispenser_traits::{Clock, Display, Funnel, MonotonicClock, SystemWallClock, WallClock};
use dispenser_ui::{LcdDisplay, LogDisplay, SPLASH, TerminalDisplay};
use eyre::WrapErr;
use serde_json::json;

use crate::backend::{self, Backend};
use crate::cli::ScheduleArgs;

/// Everything a command needs besides its own arguments.
pub struct Ctx {
    pub cfg: Config,
    pub calibration: Option<Calibration>,
    pub state_path: PathBuf,
    pub json: bool,
}

fn funnel(n: u8) -> eyre::Result<Funnel> {
    Funnel::from_number(n).ok_or_else(|| eyre::eyre!("funnel must be 1 or 2, got {n}"))
}

fn schedule_json(s: &Schedule) -> serde_json::Value {
    match s.day {
        Some(day) => json!({ "day": day, "hour": s.hour, "minute": s.minute, "text": s.to_string() }),
        None => serde_json::Value::Null,
    }
}

fn load_or_default(store: &StateStore) -> eyre::Result<(PersistedState, bool)> {
    Ok(match store.load()? {
        Some(s) => (s, true),
        None => (PersistedState::default(), false),
    })
}

/// Exclusive write access to the state file for the rest of the command.
fn lock_state(ctx: &Ctx, command: &str) -> eyre::Result<StateLock> {
    Ok(StateLock::acquire(&ctx.state_path, &format!("dispenser {command}"))?)
}

fn display_for(ctx: &Ctx) -> Box<dyn Display> {
    if ctx.json {
        return Box::new(LogDisplay);
    }
    match ctx.cfg.display.backend {
        DisplayBackend::Terminal => Box::new(TerminalDisplay::stdout()),
        DisplayBackend::Lcd => Box::new(LcdDisplay::new(TerminalDisplay::stdout())),
        DisplayBackend::Log => Box::new(LogDisplay),
    }
}

fn build_dispenser(
    ctx: &Ctx,
    backend: Backend,
    display: Box<dyn Display>,
    wire_buttons: bool,
) -> eyre::Result<Dispenser> {
    let Backend {
        actuator,
        scale,
        verifier,
        buttons,
        ..
    } = backend;
    let mut builder = Dispenser::builder()
        .apply_config(&ctx.cfg)
        .with_state_path(&ctx.state_path)
        .with_actuator(actuator)
        .with_weight_sensor(scale)
        .with_verifier(verifier)
        .with_display(display);
    if wire_buttons {
        let [set, confirm, time] = buttons;
        builder = builder.with_buttons(set, confirm, time);
    }
    builder.build()
}

// ── run ─────────────────────────────────────────────────────────────────────

/// Tick-counted hold and gap that the classifier reads as one press and as a
/// double press.
fn press_script(cfg: &Config) -> (usize, usize) {
    let tick = cfg.scheduler.tick_ms.max(1);
    let hold = 2usize;
    let reach = (cfg.buttons.debounce_ms + cfg.buttons.double_press_window_ms / 2) / tick;
    let gap = usize::try_from(reach).unwrap_or(usize::MAX).saturating_sub(hold).max(1);
    (hold, gap)
}

/// Feed stdin lines to the simulated buttons until EOF or `q`.
fn spawn_stdin_buttons(handles: [SimButtonHandle; 3], hold: usize, gap: usize, shutdown: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let cmd = line.trim();
            let sent = match cmd {
                "1" | "2" | "3" => handles[usize::from(cmd.as_bytes()[0] - b'1')].single(hold),
                "11" | "22" | "33" => handles[usize::from(cmd.as_bytes()[0] - b'1')].double(hold, gap),
                "q" | "quit" => {
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                "" => true,
                other => {
                    tracing::warn!(input = other, "unknown input; use 1/2/3, 11/22/33 or q");
                    true
                }
            };
            if !sent {
                break;
            }
        }
    });
}

pub fn run(ctx: &Ctx, max_ticks: Option<u64>, no_splash: bool, shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    let _lock = lock_state(ctx, "run")?;
    let backend = backend::open(&ctx.cfg, ctx.calibration.as_ref())?;
    let backend_name = backend.name();
    let sim_buttons = backend.sim.as_ref().map(|s| s.buttons.clone());

    let mut display = display_for(ctx);
    if !no_splash {
        let clock = MonotonicClock::new();
        for (l1, l2) in SPLASH {
            display.render(l1, l2);
            clock.sleep(Duration::from_secs(2));
        }
    }

    let mut dispenser = build_dispenser(ctx, backend, display, true)?;
    let startup = dispenser.start();
    tracing::info!(backend = backend_name, ?startup, state = %ctx.state_path.display(), "dispenser started");

    if let Some(handles) = sim_buttons {
        let (hold, gap) = press_script(&ctx.cfg);
        spawn_stdin_buttons(handles, hold, gap, shutdown.clone());
    }

    let summary = runner::run(&mut dispenser, &shutdown, max_ticks);
    let [a, b] = dispenser.inventory().counts();
    if ctx.json {
        println!(
            "{}",
            json!({
                "command": "run",
                "startup": match startup { Startup::Restored => "restored", Startup::ColdStart => "cold_start" },
                "ticks": summary.ticks,
                "doses": summary.doses,
                "dispensed": summary.dispensed,
                "pills": [a, b],
            })
        );
    } else {
        println!(
            "Stopped after {} ticks: {} dose(s), {} dispensed. Pills left F1:{a} F2:{b}",
            summary.ticks, summary.doses, summary.dispensed
        );
    }
    Ok(())
}

// ── status / schedule / refill ──────────────────────────────────────────────

pub fn status(ctx: &Ctx) -> eyre::Result<()> {
    let store = StateStore::new(&ctx.state_path);
    let (state, saved) = load_or_default(&store)?;
    let now = SystemWallClock.local_now();

    if ctx.json {
        let funnels: Vec<_> = Funnel::ALL
            .iter()
            .map(|&f| {
                let s = state.schedule(f);
                let tr = time_remaining(s, now);
                json!({
                    "funnel": f.number(),
                    "pills": state.inventory.get(f),
                    "empty": state.inventory.is_empty(f),
                    "schedule": schedule_json(s),
                    "minutes_remaining": tr.map(|t| t.total_minutes),
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "command": "status",
                "state_path": ctx.state_path.display().to_string(),
                "saved": saved,
                "funnels": funnels,
            })
        );
        return Ok(());
    }

    println!(
        "State: {} ({})",
        ctx.state_path.display(),
        if saved { "saved" } else { "not saved yet" }
    );
    for f in Funnel::ALL {
        let s = state.schedule(f);
        let pills = state.inventory.get(f);
        let empty = if state.inventory.is_empty(f) { " EMPTY" } else { "" };
        match time_remaining(s, now) {
            Some(tr) => println!("{f}: {pills} pills{empty}  schedule {s}  next in {tr}"),
            None => println!("{f}: {pills} pills{empty}  schedule unset"),
        }
    }
    Ok(())
}

pub fn schedule(ctx: &Ctx, args: &ScheduleArgs) -> eyre::Result<()> {
    let f = funnel(args.funnel)?;
    let new = if args.clear {
        Schedule::UNSET
    } else {
        match (args.day, args.hour, args.minute) {
            (Some(d), Some(h), Some(m)) => Schedule::new(d, h, m)
                .ok_or_else(|| eyre::eyre!("schedule out of range: day {d} hour {h} minute {m}"))?,
            _ => eyre::bail!("--day, --hour and --minute are required unless --clear is given"),
        }
    };

    let _lock = lock_state(ctx, "schedule")?;
    let store = StateStore::new(&ctx.state_path);
    let (mut state, _) = load_or_default(&store)?;
    state.schedules[f.index()] = new;
    store.save(&state).wrap_err("save schedule")?;
    tracing::info!(funnel = %f, schedule = %new, "schedule saved");

    if ctx.json {
        println!(
            "{}",
            json!({ "command": "schedule", "funnel": f.number(), "schedule": schedule_json(&new) })
        );
    } else {
        println!("{f} schedule: {new}");
    }
    Ok(())
}

pub fn refill(ctx: &Ctx, n: u8, count: u32) -> eyre::Result<()> {
    let f = funnel(n)?;
    let max = ctx.cfg.inventory.max_count;
    if count > max {
        eyre::bail!("count {count} exceeds inventory.max_count ({max})");
    }

    let _lock = lock_state(ctx, "refill")?;
    let store = StateStore::new(&ctx.state_path);
    let (mut state, _) = load_or_default(&store)?;
    state.inventory.set(f, count);
    store.save(&state).wrap_err("save inventory")?;
    tracing::info!(funnel = %f, count, "inventory saved");

    if ctx.json {
        println!(
            "{}",
            json!({ "command": "refill", "funnel": f.number(), "pills": count })
        );
    } else {
        println!("{f}: {count} pills");
    }
    Ok(())
}

// ── dispense ────────────────────────────────────────────────────────────────

fn report_json(r: &DispenseReport) -> serde_json::Value {
    let (outcome, overdose) = match &r.outcome {
        DispenseOutcome::Dispensed { overdose } => ("dispensed", *overdose),
        DispenseOutcome::VerificationFailed(_) => ("verification_failed", false),
        DispenseOutcome::Exhausted => ("exhausted", false),
    };
    json!({
        "command": "dispense",
        "funnel": r.funnel.number(),
        "outcome": outcome,
        "overdose": overdose,
        "attempts": r.attempts,
        "weight_g": r.last_weight_g,
        "sensor_faults": r.sensor_faults,
        "remaining": r.remaining,
    })
}

pub fn dispense(ctx: &Ctx, n: u8) -> eyre::Result<()> {
    let f = funnel(n)?;
    let _lock = lock_state(ctx, "dispense")?;
    let backend = backend::open(&ctx.cfg, ctx.calibration.as_ref())?;
    let mut dispenser = build_dispenser(ctx, backend, Box::new(LogDisplay), false)?;
    if !dispenser.load_state()? {
        tracing::warn!(state = %ctx.state_path.display(), "no saved state; counts start at 0");
    }

    let report = dispenser.dispense_now(f);
    if ctx.json {
        println!("{}", report_json(&report));
    } else {
        let (l1, l2) = report.screen();
        println!("{l1} / {l2} ({} attempt(s))", report.attempts);
    }
    match report.error() {
        Some(e) => Err(e).wrap_err_with(|| format!("dispense from {f}")),
        None => Ok(()),
    }
}

// ── calibrate / self-check ──────────────────────────────────────────────────

pub fn calibrate(ctx: &Ctx, known_grams: f32, wait_secs: u64) -> eyre::Result<()> {
    if !(known_grams.is_finite() && known_grams > 0.0) {
        eyre::bail!("calibration weight must be positive");
    }
    let mut backend = backend::open(&ctx.cfg, ctx.calibration.as_ref())?;
    let samples = ctx.cfg.dispense.weight_samples;

    backend.scale.tare().map_err(|e| map_sensor_error(e.as_ref()))?;
    match &backend.sim {
        Some(sim) => sim.bench.add_load(known_grams)?,
        None => {
            eprintln!("Place {known_grams} g on the scale...");
            MonotonicClock::new().sleep(Duration::from_secs(wait_secs));
        }
    }
    let measured = backend
        .scale
        .read_weight(samples)
        .map_err(|e| map_sensor_error(e.as_ref()))?;
    if !(measured.is_finite() && measured.abs() > f32::EPSILON) {
        eyre::bail!("no load detected on the scale (read {measured} g)");
    }

    let current = backend::reference_unit(&ctx.cfg, ctx.calibration.as_ref());
    let reference_unit = current * measured / known_grams;
    tracing::info!(known_grams, measured, current, reference_unit, "calibration computed");

    if ctx.json {
        println!(
            "{}",
            json!({
                "command": "calibrate",
                "known_g": known_grams,
                "measured_g": measured,
                "reference_unit": reference_unit,
            })
        );
    } else {
        println!("Measured {measured:.3} g for {known_grams} g.");
        println!("Set [scale] reference_unit = {reference_unit:.3}");
    }
    Ok(())
}

pub fn self_check(ctx: &Ctx) -> eyre::Result<()> {
    let mut backend = backend::open(&ctx.cfg, ctx.calibration.as_ref())?;
    let name = backend.name();
    backend.scale.tare().map_err(|e| map_sensor_error(e.as_ref()))?;
    let weight = backend
        .scale
        .read_weight(ctx.cfg.dispense.weight_samples)
        .map_err(|e| map_sensor_error(e.as_ref()))?;

    if ctx.json {
        println!(
            "{}",
            json!({ "command": "self-check", "ok": true, "backend": name, "weight_g": weight })
        );
    } else {
        println!("OK ({name}): scale reads {weight:.2} g");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(tick_ms: u64) -> Config {
        let mut c = dispenser_config::load_toml(
            "[pins]\nbtn_set = 5\nbtn_confirm = 6\nbtn_time = 13\nservo_1 = 17\nservo_2 = 27\nhx711_dt = 23\nhx711_sck = 24\n",
        )
        .unwrap();
        c.scheduler.tick_ms = tick_ms;
        c
    }

    #[test]
    fn double_press_gap_lands_inside_the_window() {
        assert_eq!(press_script(&cfg(50)), (2, 5));
        assert_eq!(press_script(&cfg(200)), (2, 1));
    }
}
