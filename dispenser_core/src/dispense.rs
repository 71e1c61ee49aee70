//! Biometric-gated, weight-verified pill release with bounded retries.

use std::sync::Arc;

use dispenser_traits::{Actuator, Clock, Display, Funnel, Verifier, WeightSensor};
use tracing::{debug, info, warn};

use crate::config::DispenseCfg;
use crate::error::DispenserError;
use crate::hw_error::{map_hw_error, map_sensor_error, map_verifier_error};
use crate::inventory::Inventory;

/// One weight measurement. A failed read is never folded into a zero reading.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightReading {
    Grams(f32),
    Unavailable(DispenserError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    Timeout,
    Mismatch,
    /// The verifier itself failed (bus error, protocol error).
    Fault(String),
}

impl From<VerifyFailure> for DispenserError {
    fn from(v: VerifyFailure) -> Self {
        match v {
            VerifyFailure::Timeout => DispenserError::VerifierTimeout,
            VerifyFailure::Mismatch => DispenserError::VerifierMismatch,
            VerifyFailure::Fault(m) => DispenserError::Hardware(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispenseOutcome {
    Dispensed { overdose: bool },
    VerificationFailed(VerifyFailure),
    Exhausted,
}

/// What happened during one dose attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseReport {
    pub funnel: Funnel,
    pub outcome: DispenseOutcome,
    /// Actuations performed.
    pub attempts: u32,
    /// Absolute value of the last valid reading.
    pub last_weight_g: Option<f32>,
    /// Attempts whose weight reading was unavailable.
    pub sensor_faults: u32,
    /// Inventory for this funnel after the attempt.
    pub remaining: u32,
}

impl DispenseReport {
    pub fn is_dispensed(&self) -> bool {
        matches!(self.outcome, DispenseOutcome::Dispensed { .. })
    }

    /// Error for non-dispensed outcomes.
    pub fn error(&self) -> Option<DispenserError> {
        match &self.outcome {
            DispenseOutcome::Dispensed { .. } => None,
            DispenseOutcome::VerificationFailed(v) => Some(v.clone().into()),
            DispenseOutcome::Exhausted => Some(DispenserError::DispenseExhausted {
                attempts: self.attempts,
            }),
        }
    }

    /// Two display lines summarising the outcome.
    pub fn screen(&self) -> (String, String) {
        let n = self.funnel.number();
        match &self.outcome {
            DispenseOutcome::Dispensed { overdose: true } => {
                ("Potential overdose".into(), format!("F{n}: >1 pill?"))
            }
            DispenseOutcome::Dispensed { overdose: false } => {
                (format!("Pill OK (F{n})"), format!("Pills left: {}", self.remaining))
            }
            DispenseOutcome::VerificationFailed(VerifyFailure::Timeout) => {
                ("FP timeout".into(), "No dispense".into())
            }
            DispenseOutcome::VerificationFailed(_) => ("FP failed".into(), "No dispense".into()),
            DispenseOutcome::Exhausted => (format!("F{n}: NO PILL"), "Max retries reached".into()),
        }
    }
}

/// Drives the actuator/scale/verifier trio for one dose at a time.
pub struct DispenseController<A, W, V> {
    actuator: A,
    sensor: W,
    verifier: V,
    cfg: DispenseCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<A, W, V> std::fmt::Debug for DispenseController<A, W, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispenseController")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl<A: Actuator, W: WeightSensor, V: Verifier> DispenseController<A, W, V> {
    pub fn new(
        actuator: A,
        sensor: W,
        verifier: V,
        cfg: DispenseCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            actuator,
            sensor,
            verifier,
            cfg,
            clock,
        }
    }

    pub fn cfg(&self) -> &DispenseCfg {
        &self.cfg
    }

    /// Averaged weight reading in grams (signed).
    pub fn measure(&mut self) -> WeightReading {
        match self.sensor.read_weight(self.cfg.weight_samples) {
            Ok(g) if g.is_finite() => WeightReading::Grams(g),
            Ok(g) => WeightReading::Unavailable(DispenserError::SensorRead(format!(
                "non-finite reading {g}"
            ))),
            Err(e) => WeightReading::Unavailable(map_sensor_error(&*e)),
        }
    }

    pub fn tare(&mut self) -> Result<(), DispenserError> {
        self.sensor.tare().map_err(|e| map_sensor_error(&*e))
    }

    fn verify(&mut self) -> Result<(), VerifyFailure> {
        match self.verifier.scan_and_match(self.cfg.verify_timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(VerifyFailure::Mismatch),
            Err(e) => match map_verifier_error(&*e) {
                DispenserError::VerifierTimeout => Err(VerifyFailure::Timeout),
                other => Err(VerifyFailure::Fault(other.to_string())),
            },
        }
    }

    /// Run one gated dose for `funnel`. On success the funnel's inventory is
    /// decremented by exactly one; persisting it is the caller's job.
    pub fn run_dose(
        &mut self,
        funnel: Funnel,
        inventory: &mut Inventory,
        display: &mut dyn Display,
    ) -> DispenseReport {
        let mut report = DispenseReport {
            funnel,
            outcome: DispenseOutcome::Exhausted,
            attempts: 0,
            last_weight_g: None,
            sensor_faults: 0,
            remaining: inventory.get(funnel),
        };
        info!(%funnel, pills = report.remaining, "dose started");

        display.render("Dose Ready!", "Scan finger");
        if let Err(failure) = self.verify() {
            warn!(%funnel, ?failure, "verification failed; nothing dispensed");
            report.outcome = DispenseOutcome::VerificationFailed(failure);
            let (l1, l2) = report.screen();
            display.render(&l1, &l2);
            return report;
        }

        if inventory.is_empty(funnel) {
            warn!(%funnel, "inventory reads zero; attempting dispense anyway");
        }
        if let Err(e) = self.tare() {
            warn!(%funnel, error = %e, "tare failed; continuing with previous zero");
        }

        let fcfg = *self.cfg.funnel(funnel);
        for attempt in 1..=self.cfg.max_attempts {
            report.attempts = attempt;
            display.render(&format!("Motor {} ON", funnel.number()), &format!("Attempt {attempt}"));

            match self.actuator.actuate(funnel) {
                Ok(()) => {
                    self.clock.sleep(self.cfg.settle);
                    match self.measure() {
                        WeightReading::Grams(raw) => {
                            let w = raw.abs();
                            report.last_weight_g = Some(w);
                            debug!(%funnel, attempt, weight_g = raw, abs_g = w, "weight after actuation");
                            if w >= fcfg.pill_threshold_g {
                                let overdose = w >= fcfg.overdose_threshold_g();
                                report.remaining = inventory.decrement(funnel);
                                report.outcome = DispenseOutcome::Dispensed { overdose };
                                info!(
                                    %funnel,
                                    attempt,
                                    weight_g = w,
                                    overdose,
                                    remaining = report.remaining,
                                    "pill dispensed"
                                );
                                let (l1, l2) = report.screen();
                                display.render(&l1, &l2);
                                return report;
                            }
                        }
                        WeightReading::Unavailable(e) => {
                            report.sensor_faults += 1;
                            warn!(%funnel, attempt, error = %e, "weight unavailable; counting as a miss");
                        }
                    }
                }
                Err(e) => {
                    warn!(%funnel, attempt, error = %map_hw_error(&*e), "actuation failed");
                }
            }

            if attempt < self.cfg.max_attempts {
                display.render("No pill detected", "Retrying...");
                self.clock.sleep(self.cfg.retry_pause);
            }
        }

        warn!(
            %funnel,
            attempts = report.attempts,
            sensor_faults = report.sensor_faults,
            "no pill detected; giving up on this occurrence"
        );
        let (l1, l2) = report.screen();
        display.render(&l1, &l2);
        report
    }
}
