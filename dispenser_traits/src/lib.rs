//! Capability interfaces shared by the dispenser core and its backends.
//!
//! Fallible calls return boxed errors at the trait boundary so that backends
//! can surface their own error types; `dispenser_core::hw_error` maps them to
//! typed core errors.
pub mod clock;

pub use clock::{Clock, MonotonicClock, SystemWallClock, WallClock};

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One of the two independent pill-release mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Funnel {
    One,
    Two,
}

impl Funnel {
    pub const ALL: [Funnel; 2] = [Funnel::One, Funnel::Two];

    /// Zero-based index for per-funnel arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Funnel::One => 0,
            Funnel::Two => 1,
        }
    }

    /// One-based number as printed on the device.
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            Funnel::One => 1,
            Funnel::Two => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Funnel::One),
            2 => Some(Funnel::Two),
            _ => None,
        }
    }
}

impl std::fmt::Display for Funnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.number())
    }
}

/// A digital push button, one instance per input pin.
pub trait Button {
    /// True while the button is held down (after any active-low inversion).
    fn is_active(&mut self) -> bool;
}

/// Pill-release mechanism. One call performs exactly one open/close motion
/// and blocks for its physical duration.
pub trait Actuator {
    fn actuate(&mut self, funnel: Funnel) -> Result<(), BoxError>;
}

/// Load cell under the pill tray.
pub trait WeightSensor {
    /// Re-zero the sensor at the current load.
    fn tare(&mut self) -> Result<(), BoxError>;
    /// Average of `samples` raw readings converted to grams. Signed.
    fn read_weight(&mut self, samples: u32) -> Result<f32, BoxError>;
}

/// Biometric gate in front of every dose.
pub trait Verifier {
    /// `Ok(true)` on a match, `Ok(false)` on a mismatch. Implementations
    /// return an error when `timeout` elapses without a usable scan.
    fn scan_and_match(&mut self, timeout: Duration) -> Result<bool, BoxError>;
}

/// Two-line status output. Fire-and-forget.
pub trait Display {
    fn render(&mut self, line1: &str, line2: &str);
}

impl<T: Button + ?Sized> Button for Box<T> {
    fn is_active(&mut self) -> bool {
        (**self).is_active()
    }
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn actuate(&mut self, funnel: Funnel) -> Result<(), BoxError> {
        (**self).actuate(funnel)
    }
}

impl<T: WeightSensor + ?Sized> WeightSensor for Box<T> {
    fn tare(&mut self) -> Result<(), BoxError> {
        (**self).tare()
    }
    fn read_weight(&mut self, samples: u32) -> Result<f32, BoxError> {
        (**self).read_weight(samples)
    }
}

impl<T: Verifier + ?Sized> Verifier for Box<T> {
    fn scan_and_match(&mut self, timeout: Duration) -> Result<bool, BoxError> {
        (**self).scan_and_match(timeout)
    }
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn render(&mut self, line1: &str, line2: &str) {
        (**self).render(line1, line2)
    }
}
