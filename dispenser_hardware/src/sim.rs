//! Simulated backends for development machines and tests.
//!
//! A [`SimBench`] ties the simulated actuator to the simulated scale: every
//! swing that is not scripted as a miss drops one pill's mass onto the tray.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use dispenser_traits::{Actuator, BoxError, Button, Funnel, Verifier, WeightSensor};

use crate::error::HwError;

/// Button fed by level samples from a channel; one sample per poll.
pub struct SimulatedButton {
    rx: Receiver<bool>,
}

/// Sending side of a [`SimulatedButton`].
#[derive(Clone)]
pub struct SimButtonHandle {
    tx: Sender<bool>,
}

impl SimulatedButton {
    pub fn new() -> (Self, SimButtonHandle) {
        let (tx, rx) = unbounded();
        (Self { rx }, SimButtonHandle { tx })
    }
}

impl Button for SimulatedButton {
    fn is_active(&mut self) -> bool {
        self.rx.try_recv().unwrap_or(false)
    }
}

impl SimButtonHandle {
    /// Queue raw level samples. Returns false once the button is gone.
    pub fn push_levels(&self, levels: impl IntoIterator<Item = bool>) -> bool {
        levels.into_iter().all(|l| self.tx.send(l).is_ok())
    }

    /// Hold for `hold` polls, then release for `hold` polls.
    pub fn single(&self, hold: usize) -> bool {
        self.push_levels(
            std::iter::repeat_n(true, hold).chain(std::iter::repeat_n(false, hold)),
        )
    }

    /// Two presses whose activations are `hold + gap` polls apart.
    pub fn double(&self, hold: usize, gap: usize) -> bool {
        self.push_levels(
            std::iter::repeat_n(true, hold)
                .chain(std::iter::repeat_n(false, gap))
                .chain(std::iter::repeat_n(true, hold))
                .chain(std::iter::repeat_n(false, hold)),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    Accept,
    Reject,
    Timeout,
}

#[derive(Debug)]
struct BenchState {
    load_g: f32,
    zero_g: f32,
    pill_g: f32,
    misses: u32,
    actuations: [u32; 2],
    sensor_fault: bool,
}

/// Shared physical state behind the simulated actuator and scale.
#[derive(Debug, Clone)]
pub struct SimBench {
    state: Arc<Mutex<BenchState>>,
}

impl SimBench {
    pub fn new(pill_g: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BenchState {
                load_g: 0.0,
                zero_g: 0.0,
                pill_g,
                misses: 0,
                actuations: [0; 2],
                sensor_fault: false,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BenchState>, HwError> {
        self.state
            .lock()
            .map_err(|_| HwError::Simulation("bench state poisoned".into()))
    }

    /// The next `n` swings release nothing.
    pub fn script_misses(&self, n: u32) -> Result<(), HwError> {
        self.lock()?.misses = n;
        Ok(())
    }

    pub fn set_pill_mass(&self, grams: f32) -> Result<(), HwError> {
        self.lock()?.pill_g = grams;
        Ok(())
    }

    /// Put extra mass on the tray, e.g. a calibration weight.
    pub fn add_load(&self, grams: f32) -> Result<(), HwError> {
        self.lock()?.load_g += grams;
        Ok(())
    }

    pub fn set_sensor_fault(&self, fault: bool) -> Result<(), HwError> {
        self.lock()?.sensor_fault = fault;
        Ok(())
    }

    pub fn actuations(&self, funnel: Funnel) -> u32 {
        self.lock().map(|s| s.actuations[funnel.index()]).unwrap_or(0)
    }

    pub fn actuator(&self) -> SimulatedActuator {
        SimulatedActuator { bench: self.clone() }
    }

    pub fn scale(&self) -> SimulatedScale {
        SimulatedScale { bench: self.clone() }
    }
}

pub struct SimulatedActuator {
    bench: SimBench,
}

impl Actuator for SimulatedActuator {
    fn actuate(&mut self, funnel: Funnel) -> Result<(), BoxError> {
        let mut s = self.bench.lock()?;
        s.actuations[funnel.index()] += 1;
        if s.misses > 0 {
            s.misses -= 1;
            tracing::debug!(%funnel, "simulated swing released nothing");
        } else {
            s.load_g += s.pill_g;
            tracing::debug!(%funnel, load_g = s.load_g, "simulated pill dropped");
        }
        Ok(())
    }
}

pub struct SimulatedScale {
    bench: SimBench,
}

impl WeightSensor for SimulatedScale {
    fn tare(&mut self) -> Result<(), BoxError> {
        let mut s = self.bench.lock()?;
        if s.sensor_fault {
            return Err(HwError::DataReadyTimeout.into());
        }
        s.zero_g = s.load_g;
        Ok(())
    }

    fn read_weight(&mut self, _samples: u32) -> Result<f32, BoxError> {
        let s = self.bench.lock()?;
        if s.sensor_fault {
            return Err(HwError::DataReadyTimeout.into());
        }
        Ok(s.load_g - s.zero_g)
    }
}

pub struct SimulatedVerifier {
    mode: VerifyMode,
}

impl SimulatedVerifier {
    pub fn new(mode: VerifyMode) -> Self {
        Self { mode }
    }
}

impl Verifier for SimulatedVerifier {
    fn scan_and_match(&mut self, _timeout: Duration) -> Result<bool, BoxError> {
        match self.mode {
            VerifyMode::Accept => Ok(true),
            VerifyMode::Reject => Ok(false),
            VerifyMode::Timeout => Err(HwError::Timeout.into()),
        }
    }
}
