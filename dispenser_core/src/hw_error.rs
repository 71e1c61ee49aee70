//! Maps `Box<dyn Error>` from trait boundaries to typed `DispenserError`.
//!
//! With the `hardware-errors` feature the known `dispenser_hardware::HwError`
//! kinds are matched exactly; otherwise the message is inspected.

use crate::error::DispenserError;

fn looks_like_timeout(e: &(dyn std::error::Error + 'static)) -> bool {
    let s = e.to_string().to_lowercase();
    s.contains("timeout") || s.contains("timed out")
}

/// Weight sensor failures always mean "reading unavailable".
pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> DispenserError {
    DispenserError::SensorRead(e.to_string())
}

/// Verifier failures: a timeout gets its own kind, everything else is a hardware fault.
pub fn map_verifier_error(e: &(dyn std::error::Error + 'static)) -> DispenserError {
    #[cfg(feature = "hardware-errors")]
    {
        use dispenser_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => DispenserError::VerifierTimeout,
                other => DispenserError::Hardware(other.to_string()),
            };
        }
    }

    if looks_like_timeout(e) {
        DispenserError::VerifierTimeout
    } else {
        DispenserError::Hardware(e.to_string())
    }
}

/// Generic mapping for actuator and other collaborator failures.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DispenserError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<dispenser_hardware::error::HwError>() {
            return DispenserError::Hardware(hw.to_string());
        }
    }
    DispenserError::Hardware(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);
    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }
    impl std::error::Error for Plain {}

    #[test]
    fn verifier_timeout_by_message() {
        assert_eq!(
            map_verifier_error(&Plain("scan Timeout after 20s")),
            DispenserError::VerifierTimeout
        );
        assert!(matches!(
            map_verifier_error(&Plain("uart closed")),
            DispenserError::Hardware(_)
        ));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn verifier_timeout_by_type() {
        use dispenser_hardware::error::HwError;
        assert_eq!(
            map_verifier_error(&HwError::Timeout),
            DispenserError::VerifierTimeout
        );
        // a scale timeout surfacing from a verifier is still a fault, not a scan timeout
        assert!(matches!(
            map_verifier_error(&HwError::DataReadyTimeout),
            DispenserError::Hardware(_)
        ));
    }

    #[test]
    fn sensor_errors_are_sensor_reads() {
        assert_eq!(
            map_sensor_error(&Plain("hx711 data-ready timeout")),
            DispenserError::SensorRead("hx711 data-ready timeout".into())
        );
    }
}
