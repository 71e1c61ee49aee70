//! The controller object: owns all mutable dispenser state and runs one
//! control-loop iteration per [`Dispenser::tick`].

use std::sync::Arc;
use std::time::Instant;

use dispenser_traits::{Actuator, Button, Clock, Display, Funnel, Verifier, WallClock, WeightSensor};
use tracing::{debug, info, warn};

use crate::builder::{DispenserBuilder, Missing};
use crate::config::LoopCfg;
use crate::dispense::{DispenseController, DispenseReport, WeightReading};
use crate::error::DispenserError;
use crate::inventory::Inventory;
use crate::menu::{CountPurpose, Menu, MenuButton, MenuEffect};
use crate::press::{PressClassifier, PressEvent};
use crate::schedule::{DoseScheduler, FunnelState, Schedule, SchedulerAction, TimeRemaining, time_remaining};
use crate::state::{PersistedState, StateStore};

/// Scheduled fires of one funnel closer together than this, on the monotonic
/// clock, are suppressed. Covers wall-clock steps backward over a dose.
pub const REFIRE_GUARD_MS: u64 = 6 * 24 * 60 * 60 * 1000;

pub(crate) type BoxedController =
    DispenseController<Box<dyn Actuator>, Box<dyn WeightSensor>, Box<dyn Verifier>>;

/// How [`Dispenser::start`] found the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Restored,
    /// No usable state; the operator is being asked for initial counts.
    ColdStart,
}

pub struct Dispenser {
    pub(crate) funnels: [FunnelState; 2],
    pub(crate) inventory: Inventory,
    pub(crate) store: StateStore,
    pub(crate) buttons: [Box<dyn Button>; 3],
    pub(crate) classifiers: [PressClassifier; 3],
    pub(crate) display: Box<dyn Display>,
    pub(crate) controller: BoxedController,
    pub(crate) scheduler: DoseScheduler,
    pub(crate) menu: Menu,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) wall: Box<dyn WallClock>,
    pub(crate) loop_cfg: LoopCfg,
    pub(crate) epoch: Instant,
    pub(crate) hold_until_ms: Option<u64>,
    /// Target minute whose arming notice was already shown, per funnel.
    pub(crate) armed: [Option<u32>; 2],
    /// Monotonic time of the last scheduled fire, per funnel.
    pub(crate) last_fire_ms: [Option<u64>; 2],
}

impl std::fmt::Debug for Dispenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispenser")
            .field("funnels", &self.funnels)
            .field("inventory", &self.inventory)
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .field("menu", &self.menu)
            .finish_non_exhaustive()
    }
}

impl Dispenser {
    pub fn builder() -> DispenserBuilder<Missing, Missing, Missing> {
        DispenserBuilder::default()
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn funnel_state(&self, funnel: Funnel) -> &FunnelState {
        &self.funnels[funnel.index()]
    }

    pub fn schedule(&self, funnel: Funnel) -> &Schedule {
        self.funnels[funnel.index()].schedule()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn clock(&self) -> &(dyn Clock + Send + Sync) {
        &*self.clock
    }

    pub fn loop_cfg(&self) -> &LoopCfg {
        &self.loop_cfg
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            inventory: self.inventory,
            schedules: [*self.funnels[0].schedule(), *self.funnels[1].schedule()],
        }
    }

    fn apply_state(&mut self, state: PersistedState) {
        self.inventory = state.inventory;
        for f in Funnel::ALL {
            self.funnels[f.index()].set_schedule(*state.schedule(f));
        }
    }

    /// Load persisted state if present. `Ok(false)` when nothing was saved.
    pub fn load_state(&mut self) -> Result<bool, DispenserError> {
        match self.store.load()? {
            Some(state) => {
                self.apply_state(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn persist(&self) -> Result<(), DispenserError> {
        self.store.save(&self.snapshot())
    }

    /// Persistence failures never interrupt the control flow.
    fn persist_or_log(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, path = %self.store.path().display(), "could not persist state");
        }
    }

    /// Load state, or fall into the operator cold-start flow.
    pub fn start(&mut self) -> Startup {
        self.epoch = self.clock.now();
        let loaded = self.load_state().unwrap_or_else(|e| {
            warn!(error = %e, "saved state unreadable; starting cold");
            false
        });
        if loaded {
            let [a, b] = self.inventory.counts();
            info!(funnel_1 = a, funnel_2 = b, "saved state loaded");
            self.show_held("Loaded saved state", &format!("F1:{a}  F2:{b}"));
            Startup::Restored
        } else {
            info!("no saved state; asking for initial pill counts");
            self.menu.begin_cold_start();
            self.render_prompt();
            Startup::ColdStart
        }
    }

    /// Operator or CLI schedule edit; resets occurrence tracking and persists.
    pub fn set_schedule(&mut self, funnel: Funnel, schedule: Schedule) -> Result<(), DispenserError> {
        self.funnels[funnel.index()].set_schedule(schedule);
        self.armed[funnel.index()] = None;
        self.last_fire_ms[funnel.index()] = None;
        info!(%funnel, %schedule, "schedule set");
        self.persist()
    }

    pub fn refill(&mut self, funnel: Funnel, count: u32) -> Result<(), DispenserError> {
        self.inventory.set(funnel, count);
        info!(%funnel, count, "inventory set");
        self.persist()
    }

    pub fn time_remaining(&self, funnel: Funnel) -> Option<TimeRemaining> {
        time_remaining(self.schedule(funnel), self.wall.local_now())
    }

    pub fn measure_weight(&mut self) -> WeightReading {
        self.controller.measure()
    }

    pub fn tare(&mut self) -> Result<(), DispenserError> {
        self.controller.tare()
    }

    /// Gated dose for `funnel` right now; persists the outcome.
    pub fn dispense_now(&mut self, funnel: Funnel) -> DispenseReport {
        let report = self
            .controller
            .run_dose(funnel, &mut self.inventory, self.display.as_mut());
        self.persist_or_log();
        report
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn render_prompt(&mut self) {
        let (l1, l2) = self.menu.prompt();
        self.display.render(&l1, &l2);
    }

    /// Keep whatever is on the display up for `message_hold`.
    fn hold(&mut self) {
        let hold_ms = self.loop_cfg.message_hold.as_millis() as u64;
        self.hold_until_ms = Some(self.now_ms().saturating_add(hold_ms));
    }

    fn show_held(&mut self, line1: &str, line2: &str) {
        self.display.render(line1, line2);
        self.hold();
    }

    fn apply(&mut self, effect: MenuEffect) {
        match effect {
            MenuEffect::Redraw => {
                self.hold_until_ms = None;
                self.render_prompt();
            }
            MenuEffect::ScheduleSet(funnel, schedule) => {
                self.funnels[funnel.index()].set_schedule(schedule);
                self.armed[funnel.index()] = None;
                info!(%funnel, %schedule, "schedule set from menu");
                self.persist_or_log();
                self.show_held(&format!("Funnel {} Schedule Set!", funnel.number()), &schedule.to_string());
            }
            MenuEffect::CountSet {
                funnel,
                count,
                purpose,
            } => {
                self.inventory.set(funnel, count);
                info!(%funnel, count, ?purpose, "inventory set from menu");
                self.persist_or_log();
                if funnel == Funnel::Two {
                    let [a, b] = self.inventory.counts();
                    let title = match purpose {
                        CountPurpose::Initial => "Initial inventory:",
                        CountPurpose::Refill => "Refill Complete",
                    };
                    self.show_held(title, &format!("F1:{a}  F2:{b}"));
                } else {
                    self.hold_until_ms = None;
                    self.render_prompt();
                }
            }
            MenuEffect::ShowInventory => {
                let (l1, l2) = inventory_lines(&self.inventory);
                self.show_held(&l1, &l2);
            }
            MenuEffect::ShowTimeRemaining => {
                let tr = [self.time_remaining(Funnel::One), self.time_remaining(Funnel::Two)];
                let (l1, l2) = time_remaining_lines(&tr);
                self.show_held(&l1, &l2);
            }
            MenuEffect::BackToMain => self.show_held("Returning to", "Main Menu"),
            MenuEffect::EditCancelled => self.show_held("Edit cancelled", "No changes"),
        }
    }

    /// One control-loop iteration: buttons and menu first, then the scheduler
    /// for each funnel. Returns the doses run during this tick.
    pub fn tick(&mut self) -> Vec<DispenseReport> {
        let now_ms = self.now_ms();
        if self.hold_until_ms.is_some_and(|until| now_ms >= until) {
            self.hold_until_ms = None;
            self.render_prompt();
        }

        for (i, role) in MenuButton::ALL.into_iter().enumerate() {
            let active = self.buttons[i].is_active();
            let event = self.classifiers[i].poll(active, now_ms);
            if event == PressEvent::None {
                continue;
            }
            debug!(button = ?role, ?event, "press");
            if let Some(effect) = self.menu.handle(role, event, &self.inventory) {
                self.apply(effect);
            }
        }

        let now = self.wall.local_now();
        let mut doses = Vec::new();
        for funnel in Funnel::ALL {
            let i = funnel.index();
            match self.scheduler.tick(&mut self.funnels[i], now) {
                SchedulerAction::None => {}
                SchedulerAction::Arm => {
                    let target = self.funnels[i].last_target_minute();
                    if self.armed[i] != target {
                        self.armed[i] = target;
                        info!(%funnel, target_minute = ?target, "dose in one minute");
                        self.show_held(&format!("Arming scale F{}", funnel.number()), "Dose in 1 minute");
                    }
                }
                SchedulerAction::Fire => {
                    let since_last = self.last_fire_ms[i].map(|last| now_ms.saturating_sub(last));
                    if since_last.is_some_and(|ms| ms < REFIRE_GUARD_MS) {
                        warn!(
                            %funnel,
                            since_last_ms = since_last.unwrap_or_default(),
                            "dose already given for this occurrence; wall clock stepped back"
                        );
                        continue;
                    }
                    self.last_fire_ms[i] = Some(now_ms);
                    // run_dose leaves its outcome on the display
                    doses.push(self.dispense_now(funnel));
                    self.hold();
                }
            }
        }
        doses
    }
}

/// Inventory screen; flags empty funnels.
pub fn inventory_lines(inv: &Inventory) -> (String, String) {
    let [a, b] = inv.counts();
    let title = match (inv.is_empty(Funnel::One), inv.is_empty(Funnel::Two)) {
        (true, true) => "Both EMPTY".to_string(),
        (true, false) => "F1 EMPTY".to_string(),
        (false, true) => "F2 EMPTY".to_string(),
        (false, false) => "Pills left".to_string(),
    };
    (title, format!("F1:{a}  F2:{b}"))
}

/// Time-remaining screen for both funnels.
pub fn time_remaining_lines(tr: &[Option<TimeRemaining>; 2]) -> (String, String) {
    if tr.iter().all(Option::is_none) {
        return ("No schedules set".into(), "Use Btn1 to set".into());
    }
    let line = |n: u8, t: &Option<TimeRemaining>| match t {
        Some(t) => format!("F{n}: {t}"),
        None => format!("F{n}: -- (no sched)"),
    };
    (line(1, &tr[0]), line(2, &tr[1]))
}
