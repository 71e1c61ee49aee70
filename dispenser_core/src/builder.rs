//! Type-state builder for [`Dispenser`].
//!
//! `build()` only exists once the actuator, weight sensor and verifier are
//! provided. `try_build()` is always available and reports what is missing.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use dispenser_traits::{Actuator, Button, Clock, Display, MonotonicClock, SystemWallClock, Verifier, WallClock, WeightSensor};

use crate::config::{CounterCfg, DispenseCfg, LoopCfg, PressCfg};
use crate::dispense::DispenseController;
use crate::dispenser::Dispenser;
use crate::error::{BuildError, Result};
use crate::menu::Menu;
use crate::press::PressClassifier;
use crate::schedule::{DoseScheduler, FunnelState, TriggerMode};
use crate::state::StateStore;

pub const DEFAULT_STATE_PATH: &str = "daily_dose_state.json";

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Never pressed; used when no buttons are wired (one-shot commands).
struct InertButton;

impl Button for InertButton {
    fn is_active(&mut self) -> bool {
        false
    }
}

struct NullDisplay;

impl Display for NullDisplay {
    fn render(&mut self, _line1: &str, _line2: &str) {}
}

pub struct DispenserBuilder<A, W, V> {
    actuator: Option<Box<dyn Actuator>>,
    sensor: Option<Box<dyn WeightSensor>>,
    verifier: Option<Box<dyn Verifier>>,
    buttons: Option<[Box<dyn Button>; 3]>,
    display: Option<Box<dyn Display>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    wall: Option<Box<dyn WallClock>>,
    state_path: Option<PathBuf>,
    press: PressCfg,
    dispense: DispenseCfg,
    counter: CounterCfg,
    loop_cfg: LoopCfg,
    trigger: TriggerMode,
    _a: PhantomData<A>,
    _w: PhantomData<W>,
    _v: PhantomData<V>,
}

impl Default for DispenserBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            actuator: None,
            sensor: None,
            verifier: None,
            buttons: None,
            display: None,
            clock: None,
            wall: None,
            state_path: None,
            press: PressCfg::default(),
            dispense: DispenseCfg::default(),
            counter: CounterCfg::default(),
            loop_cfg: LoopCfg::default(),
            trigger: TriggerMode::default(),
            _a: PhantomData,
            _w: PhantomData,
            _v: PhantomData,
        }
    }
}

impl<A, W, V> DispenserBuilder<A, W, V> {
    fn retype<A2, W2, V2>(self) -> DispenserBuilder<A2, W2, V2> {
        DispenserBuilder {
            actuator: self.actuator,
            sensor: self.sensor,
            verifier: self.verifier,
            buttons: self.buttons,
            display: self.display,
            clock: self.clock,
            wall: self.wall,
            state_path: self.state_path,
            press: self.press,
            dispense: self.dispense,
            counter: self.counter,
            loop_cfg: self.loop_cfg,
            trigger: self.trigger,
            _a: PhantomData,
            _w: PhantomData,
            _v: PhantomData,
        }
    }

    pub fn with_actuator(self, actuator: impl Actuator + 'static) -> DispenserBuilder<Set, W, V> {
        let mut b = self.retype();
        b.actuator = Some(Box::new(actuator));
        b
    }

    pub fn with_weight_sensor(self, sensor: impl WeightSensor + 'static) -> DispenserBuilder<A, Set, V> {
        let mut b = self.retype();
        b.sensor = Some(Box::new(sensor));
        b
    }

    pub fn with_verifier(self, verifier: impl Verifier + 'static) -> DispenserBuilder<A, W, Set> {
        let mut b = self.retype();
        b.verifier = Some(Box::new(verifier));
        b
    }

    /// Buttons in role order: set (B1), confirm (B2), time (B3).
    pub fn with_buttons(
        mut self,
        set: impl Button + 'static,
        confirm: impl Button + 'static,
        time: impl Button + 'static,
    ) -> Self {
        self.buttons = Some([Box::new(set), Box::new(confirm), Box::new(time)]);
        self
    }

    pub fn with_display(mut self, display: impl Display + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_wall_clock(mut self, wall: impl WallClock + 'static) -> Self {
        self.wall = Some(Box::new(wall));
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn with_press(mut self, press: PressCfg) -> Self {
        self.press = press;
        self
    }

    pub fn with_dispense(mut self, dispense: DispenseCfg) -> Self {
        self.dispense = dispense;
        self
    }

    pub fn with_counter(mut self, counter: CounterCfg) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_loop(mut self, loop_cfg: LoopCfg) -> Self {
        self.loop_cfg = loop_cfg;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerMode) -> Self {
        self.trigger = trigger;
        self
    }

    /// Take every runtime knob from a loaded TOML config.
    pub fn apply_config(self, cfg: &dispenser_config::Config) -> Self {
        self.with_press((&cfg.buttons).into())
            .with_dispense(cfg.into())
            .with_counter((&cfg.inventory).into())
            .with_loop((&cfg.scheduler).into())
            .with_trigger(cfg.scheduler.trigger.into())
            .with_state_path(&cfg.state.path)
    }

    /// Build, reporting missing collaborators at run time.
    pub fn try_build(self) -> Result<Dispenser> {
        let actuator = self.actuator.ok_or(BuildError::MissingActuator)?;
        let sensor = self.sensor.ok_or(BuildError::MissingWeightSensor)?;
        let verifier = self.verifier.ok_or(BuildError::MissingVerifier)?;
        validate(&self.press, &self.dispense, &self.counter, &self.loop_cfg)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()) as Arc<dyn Clock + Send + Sync>);
        let inert = || Box::new(InertButton) as Box<dyn Button>;
        let buttons = self.buttons.unwrap_or_else(|| [inert(), inert(), inert()]);
        let epoch = clock.now();
        let path = self.state_path.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

        Ok(Dispenser {
            funnels: [FunnelState::default(), FunnelState::default()],
            inventory: Default::default(),
            store: StateStore::new(path),
            buttons,
            classifiers: [
                PressClassifier::new(self.press),
                PressClassifier::new(self.press),
                PressClassifier::new(self.press),
            ],
            display: self
                .display
                .unwrap_or_else(|| Box::new(NullDisplay) as Box<dyn Display>),
            controller: DispenseController::new(actuator, sensor, verifier, self.dispense, clock.clone()),
            scheduler: DoseScheduler::new(self.trigger),
            menu: Menu::new(self.counter),
            clock,
            wall: self
                .wall
                .unwrap_or_else(|| Box::new(SystemWallClock) as Box<dyn WallClock>),
            loop_cfg: self.loop_cfg,
            epoch,
            hold_until_ms: None,
            armed: [None; 2],
            last_fire_ms: [None; 2],
        })
    }
}

impl DispenserBuilder<Set, Set, Set> {
    /// Available once actuator, weight sensor and verifier are set.
    pub fn build(self) -> Result<Dispenser> {
        self.try_build()
    }
}

fn validate(
    press: &PressCfg,
    dispense: &DispenseCfg,
    counter: &CounterCfg,
    loop_cfg: &LoopCfg,
) -> std::result::Result<(), BuildError> {
    if press.window.is_zero() {
        return Err(BuildError::InvalidConfig("double-press window must be > 0"));
    }
    if dispense.max_attempts == 0 {
        return Err(BuildError::InvalidConfig("max_attempts must be >= 1"));
    }
    if dispense.weight_samples == 0 {
        return Err(BuildError::InvalidConfig("weight_samples must be >= 1"));
    }
    for f in &dispense.funnels {
        if !(f.pill_threshold_g.is_finite() && f.pill_threshold_g > 0.0) {
            return Err(BuildError::InvalidConfig("pill_threshold_g must be > 0"));
        }
        if !(f.overdose_factor.is_finite() && f.overdose_factor > 1.0) {
            return Err(BuildError::InvalidConfig("overdose_factor must be > 1"));
        }
    }
    if counter.step == 0 || counter.max == 0 {
        return Err(BuildError::InvalidConfig("counter step and max must be >= 1"));
    }
    if loop_cfg.tick.is_zero() {
        return Err(BuildError::InvalidConfig("tick must be > 0"));
    }
    Ok(())
}
