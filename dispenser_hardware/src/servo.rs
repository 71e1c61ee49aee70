//! Hobby-servo drive for the two funnel gates.
//!
//! Pulse math is always compiled; the GPIO and PCA9685 drivers need the
//! `hardware` feature.

use std::time::Duration;

pub const MIN_PULSE_US: u32 = 500;
pub const MAX_PULSE_US: u32 = 2500;
pub const SERVO_HZ: u32 = 50;
pub const PERIOD_US: u32 = 1_000_000 / SERVO_HZ;

/// Gate geometry for one funnel: rest angle and the swing to release a pill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoGeometry {
    pub center_deg: f32,
    pub offset_deg: f32,
}

impl ServoGeometry {
    pub fn target_deg(&self) -> f32 {
        self.center_deg + self.offset_deg
    }
}

/// Timing of one gate swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwingTiming {
    pub settle: Duration,
    pub step: Duration,
    pub rest: Duration,
}

impl Default for SwingTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            step: Duration::from_millis(55),
            rest: Duration::from_millis(200),
        }
    }
}

/// Angle in degrees (clamped to [0, 180]) to pulse width in microseconds.
pub fn angle_to_pulse_us(angle_deg: f32) -> u32 {
    let a = if angle_deg.is_finite() { angle_deg.clamp(0.0, 180.0) } else { 0.0 };
    let span = (MAX_PULSE_US - MIN_PULSE_US) as f32;
    MIN_PULSE_US + (span * a / 180.0).round() as u32
}

/// Pulse width to a 12-bit PCA9685 "off" count at [`SERVO_HZ`].
pub fn pulse_to_pca9685_ticks(pulse_us: u32) -> u16 {
    let ticks = (u64::from(pulse_us) * 4096 + u64::from(PERIOD_US) / 2) / u64::from(PERIOD_US);
    ticks.min(4095) as u16
}

/// PCA9685 prescale for a 25 MHz internal oscillator.
pub fn pca9685_prescale(freq_hz: u32) -> u8 {
    let v = (25_000_000.0 / (4096.0 * freq_hz as f64)).round() - 1.0;
    v.clamp(3.0, 255.0) as u8
}

#[cfg(feature = "hardware")]
pub use driver::{ServoActuator, ServoDrive};

#[cfg(feature = "hardware")]
mod driver {
    use super::*;
    use crate::error::{HwError, Result};
    use dispenser_traits::{Actuator, BoxError, Funnel};
    use rppal::gpio::{Gpio, OutputPin};
    use rppal::i2c::I2c;

    const MODE1: u8 = 0x00;
    const PRESCALE: u8 = 0xFE;
    const LED0_ON_L: u8 = 0x06;
    const MODE1_SLEEP: u8 = 0x10;
    const MODE1_AUTO_INC: u8 = 0x20;
    const FULL_OFF: u8 = 0x10;

    pub enum ServoDrive {
        /// Software PWM on two GPIO lines.
        Gpio([OutputPin; 2]),
        /// PCA9685 on the I2C bus, channel 0 for funnel 1 and channel 1 for funnel 2.
        Pca9685(I2c),
    }

    impl ServoDrive {
        pub fn gpio(pins: [u8; 2]) -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
            let open = |p: u8| -> Result<OutputPin> {
                Ok(gpio.get(p).map_err(|e| HwError::Gpio(e.to_string()))?.into_output())
            };
            Ok(Self::Gpio([open(pins[0])?, open(pins[1])?]))
        }

        pub fn pca9685(address: u16) -> Result<Self> {
            let i2c_err = |e: rppal::i2c::Error| HwError::I2c(e.to_string());
            let mut i2c = I2c::new().map_err(i2c_err)?;
            i2c.set_slave_address(address).map_err(i2c_err)?;
            i2c.write(&[MODE1, MODE1_SLEEP]).map_err(i2c_err)?;
            i2c.write(&[PRESCALE, pca9685_prescale(SERVO_HZ)]).map_err(i2c_err)?;
            i2c.write(&[MODE1, MODE1_AUTO_INC]).map_err(i2c_err)?;
            std::thread::sleep(Duration::from_micros(500));
            Ok(Self::Pca9685(i2c))
        }

        fn set_angle(&mut self, funnel: Funnel, angle_deg: f32) -> Result<()> {
            let pulse = angle_to_pulse_us(angle_deg);
            match self {
                Self::Gpio(pins) => pins[funnel.index()]
                    .set_pwm(
                        Duration::from_micros(u64::from(PERIOD_US)),
                        Duration::from_micros(u64::from(pulse)),
                    )
                    .map_err(|e| HwError::Gpio(e.to_string())),
                Self::Pca9685(i2c) => {
                    let off = pulse_to_pca9685_ticks(pulse);
                    let reg = LED0_ON_L + 4 * funnel.index() as u8;
                    i2c.write(&[reg, 0, 0, (off & 0xFF) as u8, (off >> 8) as u8])
                        .map(|_| ())
                        .map_err(|e| HwError::I2c(e.to_string()))
                }
            }
        }

        fn release(&mut self, funnel: Funnel) -> Result<()> {
            match self {
                Self::Gpio(pins) => pins[funnel.index()]
                    .clear_pwm()
                    .map_err(|e| HwError::Gpio(e.to_string())),
                Self::Pca9685(i2c) => {
                    let reg = LED0_ON_L + 4 * funnel.index() as u8;
                    i2c.write(&[reg, 0, 0, 0, FULL_OFF])
                        .map(|_| ())
                        .map_err(|e| HwError::I2c(e.to_string()))
                }
            }
        }
    }

    /// Two servo gates behind the [`Actuator`] capability.
    pub struct ServoActuator {
        drive: ServoDrive,
        geometry: [ServoGeometry; 2],
        timing: SwingTiming,
    }

    impl ServoActuator {
        pub fn new(drive: ServoDrive, geometry: [ServoGeometry; 2], timing: SwingTiming) -> Self {
            Self {
                drive,
                geometry,
                timing,
            }
        }

        fn swing(&mut self, funnel: Funnel) -> Result<()> {
            let g = self.geometry[funnel.index()];
            self.drive.set_angle(funnel, g.center_deg)?;
            std::thread::sleep(self.timing.settle);
            self.drive.set_angle(funnel, g.target_deg())?;
            std::thread::sleep(self.timing.step);
            self.drive.set_angle(funnel, g.center_deg)?;
            std::thread::sleep(self.timing.step);
            std::thread::sleep(self.timing.rest);
            Ok(())
        }
    }

    impl Actuator for ServoActuator {
        fn actuate(&mut self, funnel: Funnel) -> std::result::Result<(), BoxError> {
            tracing::debug!(%funnel, "servo swing");
            let res = self.swing(funnel);
            if let Err(e) = self.drive.release(funnel) {
                tracing::warn!(%funnel, error = %e, "servo release failed");
            }
            res.map_err(Into::into)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 500)]
    #[case(90.0, 1500)]
    #[case(180.0, 2500)]
    #[case(-15.0, 500)]
    #[case(200.0, 2500)]
    #[case(f32::NAN, 500)]
    fn angle_maps_onto_pulse_range(#[case] angle: f32, #[case] expected: u32) {
        assert_eq!(angle_to_pulse_us(angle), expected);
    }

    #[test]
    fn pca9685_ticks_scale_with_period() {
        assert_eq!(pulse_to_pca9685_ticks(1500), 307);
        assert_eq!(pulse_to_pca9685_ticks(PERIOD_US), 4095);
    }

    #[test]
    fn prescale_for_50hz() {
        assert_eq!(pca9685_prescale(50), 121);
    }

    #[test]
    fn funnel_geometry_targets() {
        let f1 = ServoGeometry { center_deg: 30.0, offset_deg: -30.0 };
        let f2 = ServoGeometry { center_deg: 10.0, offset_deg: 31.0 };
        assert_eq!(f1.target_deg(), 0.0);
        assert_eq!(f2.target_deg(), 41.0);
    }
}
