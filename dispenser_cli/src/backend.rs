//! Backend assembly: the simulated bench by default, Raspberry Pi drivers
//! with the `hardware` feature.

use dispenser_config::{Calibration, Config};
use dispenser_hardware::{SimBench, SimButtonHandle, SimulatedButton, SimulatedVerifier, VerifyMode};
use dispenser_traits::{Actuator, Button, Verifier, WeightSensor};

pub struct Backend {
    pub actuator: Box<dyn Actuator>,
    pub scale: Box<dyn WeightSensor>,
    pub verifier: Box<dyn Verifier>,
    /// Set, confirm, time.
    pub buttons: [Box<dyn Button>; 3],
    /// Present only for the simulated backend.
    pub sim: Option<SimControls>,
}

/// Handles into the simulated bench and buttons.
pub struct SimControls {
    pub bench: SimBench,
    pub buttons: [SimButtonHandle; 3],
}

impl Backend {
    pub fn name(&self) -> &'static str {
        if self.sim.is_some() { "sim" } else { "hardware" }
    }
}

/// Environment knobs for the simulated bench.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimKnobs {
    pub misses: u32,
    pub pill_g: f32,
    pub verify: VerifyMode,
    pub sensor_fault: bool,
}

impl Default for SimKnobs {
    fn default() -> Self {
        Self {
            misses: 0,
            pill_g: 0.5,
            verify: VerifyMode::Accept,
            sensor_fault: false,
        }
    }
}

impl SimKnobs {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let mut k = Self::default();
        if let Some(v) = get("DISPENSER_SIM_MISSES") {
            k.misses = v
                .trim()
                .parse()
                .map_err(|_| eyre::eyre!("DISPENSER_SIM_MISSES must be a whole number, got {v:?}"))?;
        }
        if let Some(v) = get("DISPENSER_SIM_PILL_G") {
            k.pill_g = v
                .trim()
                .parse()
                .map_err(|_| eyre::eyre!("DISPENSER_SIM_PILL_G must be grams, got {v:?}"))?;
        }
        if let Some(v) = get("DISPENSER_SIM_VERIFY") {
            k.verify = match v.trim().to_ascii_lowercase().as_str() {
                "" | "accept" => VerifyMode::Accept,
                "reject" => VerifyMode::Reject,
                "timeout" => VerifyMode::Timeout,
                _ => eyre::bail!("DISPENSER_SIM_VERIFY must be accept|reject|timeout, got {v:?}"),
            };
        }
        if let Some(v) = get("DISPENSER_SIM_SENSOR_FAULT") {
            k.sensor_fault = matches!(v.trim(), "1" | "true" | "yes");
        }
        Ok(k)
    }
}

/// HX711 counts per gram in effect: calibration CSV, then the persisted
/// calibration, then `[scale] reference_unit`.
pub fn reference_unit(cfg: &Config, calibration: Option<&Calibration>) -> f32 {
    match (calibration, cfg.scale.calibration) {
        (Some(c), _) => c.reference_unit(),
        (None, Some(p)) => 1.0 / p.gain_g_per_count,
        (None, None) => cfg.scale.reference_unit,
    }
}

pub fn simulated(knobs: SimKnobs) -> eyre::Result<Backend> {
    let bench = SimBench::new(knobs.pill_g);
    bench.script_misses(knobs.misses)?;
    bench.set_sensor_fault(knobs.sensor_fault)?;

    let (b1, h1) = SimulatedButton::new();
    let (b2, h2) = SimulatedButton::new();
    let (b3, h3) = SimulatedButton::new();
    tracing::info!(?knobs, "using simulated backend");

    Ok(Backend {
        actuator: Box::new(bench.actuator()),
        scale: Box::new(bench.scale()),
        verifier: Box::new(SimulatedVerifier::new(knobs.verify)),
        buttons: [Box::new(b1), Box::new(b2), Box::new(b3)],
        sim: Some(SimControls {
            bench,
            buttons: [h1, h2, h3],
        }),
    })
}

#[cfg(not(feature = "hardware"))]
pub fn open(_cfg: &Config, _calibration: Option<&Calibration>) -> eyre::Result<Backend> {
    simulated(SimKnobs::from_env()?)
}

#[cfg(feature = "hardware")]
pub fn open(cfg: &Config, calibration: Option<&Calibration>) -> eyre::Result<Backend> {
    use std::time::Duration;

    use dispenser_config::ActuatorBackend;
    use dispenser_hardware::servo::{ServoGeometry, SwingTiming};
    use dispenser_hardware::{GpioButton, Hx711, Hx711Scale, ServoActuator, ServoDrive, UartFingerprint};
    use eyre::WrapErr;

    let pins = &cfg.pins;
    let timeout = Duration::from_millis(cfg.hardware.sensor_read_timeout_ms);
    let hx = Hx711::open(pins.hx711_dt, pins.hx711_sck, timeout).wrap_err("open hx711")?;
    let mut scale = Hx711Scale::new(hx, reference_unit(cfg, calibration));
    let zero = calibration
        .map(|c| c.offset)
        .or(cfg.scale.calibration.map(|p| p.zero_counts));
    if let Some(z) = zero {
        scale = scale.with_zero(z);
    }

    let drive = match cfg.actuator.backend {
        ActuatorBackend::Pwm => ServoDrive::gpio([pins.servo_1, pins.servo_2]),
        ActuatorBackend::Pca9685 => ServoDrive::pca9685(cfg.actuator.i2c_address),
    }
    .wrap_err("open servo driver")?;
    let geometry = cfg.funnels().map(|f| ServoGeometry {
        center_deg: f.servo_center_deg,
        offset_deg: f.servo_offset_deg,
    });
    let timing = SwingTiming {
        step: Duration::from_millis(cfg.actuator.step_delay_ms),
        ..SwingTiming::default()
    };

    let verifier = UartFingerprint::open(&pins.fingerprint_uart).wrap_err("open fingerprint uart")?;

    let active_low = cfg.buttons.active_low;
    let button = |pin: u8| -> eyre::Result<Box<dyn Button>> {
        Ok(Box::new(
            GpioButton::open(pin, active_low).wrap_err_with(|| format!("open button pin {pin}"))?,
        ))
    };
    let buttons = [button(pins.btn_set)?, button(pins.btn_confirm)?, button(pins.btn_time)?];

    tracing::info!(actuator = ?cfg.actuator.backend, "using hardware backend");
    Ok(Backend {
        actuator: Box::new(ServoActuator::new(drive, geometry, timing)),
        scale: Box::new(scale),
        verifier: Box::new(verifier),
        buttons,
        sim: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn knobs(pairs: &[(&str, &str)]) -> eyre::Result<SimKnobs> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimKnobs::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(knobs(&[]).unwrap(), SimKnobs::default());
    }

    #[test]
    fn parses_all_knobs() {
        let k = knobs(&[
            ("DISPENSER_SIM_MISSES", "3"),
            ("DISPENSER_SIM_PILL_G", "0.9"),
            ("DISPENSER_SIM_VERIFY", "Timeout"),
            ("DISPENSER_SIM_SENSOR_FAULT", "1"),
        ])
        .unwrap();
        assert_eq!(k.misses, 3);
        assert!((k.pill_g - 0.9).abs() < 1e-6);
        assert_eq!(k.verify, VerifyMode::Timeout);
        assert!(k.sensor_fault);
    }

    #[test]
    fn rejects_bad_verify_mode() {
        let err = knobs(&[("DISPENSER_SIM_VERIFY", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("accept|reject|timeout"));
    }
}
