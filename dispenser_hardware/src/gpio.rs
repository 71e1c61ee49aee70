use dispenser_traits::Button;
use rppal::gpio::{Gpio, InputPin};

use crate::error::{HwError, Result};

/// Momentary push button on a GPIO line.
pub struct GpioButton {
    pin: InputPin,
    active_low: bool,
}

impl GpioButton {
    /// Active-low buttons get the internal pull-up.
    pub fn open(bcm_pin: u8, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio.get(bcm_pin).map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = if active_low {
            pin.into_input_pullup()
        } else {
            pin.into_input_pulldown()
        };
        Ok(Self { pin, active_low })
    }
}

impl Button for GpioButton {
    fn is_active(&mut self) -> bool {
        if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        }
    }
}
