use std::time::Duration;
use tracing::{trace, warn};

use dispenser_traits::{BoxError, WeightSensor};
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::error::{HwError, Result};
use crate::util::wait_until_low_with_timeout;

/// Channel A, gain 128.
const GAIN_PULSES_A128: u8 = 1;
const TARE_SAMPLES: u32 = 15;
const READ_RETRIES: u32 = 3;

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8,
    ready_timeout: Duration,
}

impl Hx711 {
    pub fn open(dt_pin: u8, sck_pin: u8, ready_timeout: Duration) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input();
        let mut sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        sck.set_low();
        Ok(Self {
            dt,
            sck,
            gain_pulses: GAIN_PULSES_A128,
            ready_timeout,
        })
    }

    pub fn read_raw(&mut self) -> Result<i32> {
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), self.ready_timeout, Duration::from_micros(200))?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay_100ns();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay_100ns();
        }
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        // sign extend 24-bit
        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// SCK held high for more than 60 µs powers the chip down.
    pub fn power_down(&mut self) {
        self.sck.set_low();
        self.sck.set_high();
        std::thread::sleep(Duration::from_micros(100));
    }

    pub fn power_up(&mut self) {
        self.sck.set_low();
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}

/// HX711 wrapped as a gram-reporting [`WeightSensor`].
pub struct Hx711Scale {
    hx: Hx711,
    zero_counts: f64,
    counts_per_gram: f64,
}

impl Hx711Scale {
    /// `counts_per_gram` is the HX711 "reference unit".
    pub fn new(hx: Hx711, counts_per_gram: f32) -> Self {
        Self {
            hx,
            zero_counts: 0.0,
            counts_per_gram: f64::from(counts_per_gram),
        }
    }

    /// Seed the zero point from a persisted calibration instead of waiting for `tare`.
    pub fn with_zero(mut self, zero_counts: i32) -> Self {
        self.zero_counts = f64::from(zero_counts);
        self
    }

    fn read_retrying(&mut self) -> Result<i32> {
        let mut attempts = 0;
        loop {
            match self.hx.read_raw() {
                Ok(raw) => return Ok(raw),
                Err(HwError::DataReadyTimeout) if attempts < READ_RETRIES => {
                    attempts += 1;
                    warn!(retries = attempts, "hx711 not ready, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn average(&mut self, samples: u32) -> Result<f64> {
        let n = samples.max(1);
        let mut sum = 0.0f64;
        for _ in 0..n {
            sum += f64::from(self.read_retrying()?);
        }
        Ok(sum / f64::from(n))
    }
}

impl WeightSensor for Hx711Scale {
    fn tare(&mut self) -> std::result::Result<(), BoxError> {
        self.zero_counts = self.average(TARE_SAMPLES)?;
        tracing::debug!(zero_counts = self.zero_counts, "scale tared");
        Ok(())
    }

    fn read_weight(&mut self, samples: u32) -> std::result::Result<f32, BoxError> {
        let avg = self.average(samples);
        // power cycle between readings keeps the chip from drifting warm
        self.hx.power_down();
        self.hx.power_up();
        let grams = (avg? - self.zero_counts) / self.counts_per_gram;
        Ok(grams as f32)
    }
}
