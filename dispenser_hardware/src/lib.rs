pub mod error;
pub mod fingerprint;
pub mod servo;
pub mod sim;
pub mod util;

#[cfg(feature = "hardware")]
pub mod gpio;
#[cfg(feature = "hardware")]
pub mod hx711;

pub use error::HwError;
pub use sim::{SimBench, SimButtonHandle, SimulatedButton, SimulatedVerifier, VerifyMode};

#[cfg(feature = "hardware")]
pub use fingerprint::UartFingerprint;
#[cfg(feature = "hardware")]
pub use gpio::GpioButton;
#[cfg(feature = "hardware")]
pub use hx711::{Hx711, Hx711Scale};
#[cfg(feature = "hardware")]
pub use servo::{ServoActuator, ServoDrive};
