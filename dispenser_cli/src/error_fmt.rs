//! Human-readable error descriptions, exit codes and structured JSON errors.

use dispenser_core::error::{BuildError, DispenserError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the dispenser.\nLikely causes: The servo driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the servo backend is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::MissingWeightSensor => {
                "What happened: No weight sensor was provided to the dispenser.\nLikely causes: The HX711 failed to initialize or was not wired into the builder.\nHow to fix: Ensure the scale is created successfully and passed via with_weight_sensor(...).".to_string()
            }
            BuildError::MissingVerifier => {
                "What happened: No fingerprint verifier was provided to the dispenser.\nLikely causes: The fingerprint reader failed to initialize or was not wired into the builder.\nHow to fix: Ensure the reader is created successfully and passed via with_verifier(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/dispenser_config.toml for a sample."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DispenserError>() {
        return match de {
            DispenserError::VerifierTimeout => "What happened: Fingerprint verification timed out.\nLikely causes: No finger was placed on the reader, or the reader is not responding.\nHow to fix: Place an enrolled finger on the reader when \"Scan finger\" shows; check the UART wiring and dispense.verify_timeout_ms.".to_string(),
            DispenserError::VerifierMismatch => "What happened: Fingerprint did not match an enrolled print.\nLikely causes: Wrong finger, dirty sensor, or the print was never enrolled.\nHow to fix: Clean the sensor and retry with an enrolled finger. No pill was released.".to_string(),
            DispenserError::DispenseExhausted { attempts } => format!(
                "What happened: No pill was detected after {attempts} attempts.\nLikely causes: Empty funnel, jammed gate, or a scale threshold set too high.\nHow to fix: Refill the funnel and check the gate; adjust funnel_N.pill_threshold_g if pills are lighter than expected."
            ),
            DispenserError::SensorRead(msg) => format!(
                "What happened: The scale could not be read ({msg}).\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config."
            ),
            DispenserError::Persistence(msg) => format!(
                "What happened: The state file could not be read or written ({msg}).\nLikely causes: Wrong state.path, missing permissions, or a corrupted file.\nHow to fix: Check state.path (or --state) and its directory permissions; a corrupted file can be removed to start cold."
            ),
            DispenserError::StateLocked { pid, holder } => format!(
                "What happened: The state file is in use by another process (pid {pid}, {holder}).\nLikely causes: `dispenser run` is active on the same state.path.\nHow to fix: Make the change from the device buttons, or stop the running dispenser first. A lock left by a crashed process is reclaimed automatically."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    if lower.contains("open hx711")
        || lower.contains("open servo")
        || lower.contains("open button")
        || lower.contains("open fingerprint")
    {
        return format!(
            "What happened: Failed to initialize hardware ({msg}).\nLikely causes: Incorrect pin numbers, I2C/UART not enabled, or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO, I2C and the serial port."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("read config") {
        let cause = err.root_cause().to_string();
        return format!(
            "What happened: Configuration is invalid or incomplete ({cause}).\nLikely causes: Missing [pins] (btn_set, btn_confirm, btn_time, servo_1, servo_2, hx711_dt, hx711_sck), or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: verification 2, exhausted 3, persistence 4, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<DispenserError>() {
        Some(DispenserError::VerifierTimeout | DispenserError::VerifierMismatch) => 2,
        Some(DispenserError::DispenseExhausted { .. }) => 3,
        Some(DispenserError::Persistence(_) | DispenserError::StateLocked { .. }) => 4,
        _ => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<DispenserError>() {
        Some(DispenserError::SensorRead(_)) => "SensorRead",
        Some(DispenserError::VerifierTimeout) => "VerifierTimeout",
        Some(DispenserError::VerifierMismatch) => "VerifierMismatch",
        Some(DispenserError::DispenseExhausted { .. }) => "DispenseExhausted",
        Some(DispenserError::Persistence(_)) => "Persistence",
        Some(DispenserError::Hardware(_)) => "Hardware",
        Some(DispenserError::StateLocked { .. }) => "StateLocked",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(DispenserError::DispenseExhausted { attempts }) = err.downcast_ref::<DispenserError>() {
        obj["details"] = json!({ "attempts": attempts });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;
    use rstest::rstest;

    #[rstest]
    #[case(DispenserError::VerifierTimeout, 2, "VerifierTimeout")]
    #[case(DispenserError::VerifierMismatch, 2, "VerifierMismatch")]
    #[case(DispenserError::DispenseExhausted { attempts: 10 }, 3, "DispenseExhausted")]
    #[case(DispenserError::Persistence("disk full".into()), 4, "Persistence")]
    #[case(DispenserError::StateLocked { pid: 42, holder: "run".into() }, 4, "StateLocked")]
    #[case(DispenserError::SensorRead("timeout".into()), 1, "SensorRead")]
    fn codes_and_reasons(#[case] e: DispenserError, #[case] code: i32, #[case] reason: &str) {
        let report = eyre::Report::new(e);
        assert_eq!(exit_code_for_error(&report), code);
        assert_eq!(reason_name(&report), reason);
        assert!(humanize(&report).starts_with("What happened:"));
    }

    #[test]
    fn context_does_not_hide_the_kind() {
        let r: eyre::Result<()> = Err(DispenserError::Persistence("x".into()).into());
        let report = r.wrap_err("save state").unwrap_err();
        assert_eq!(exit_code_for_error(&report), 4);
    }

    #[test]
    fn exhausted_json_carries_attempts() {
        let report = eyre::Report::new(DispenserError::DispenseExhausted { attempts: 7 });
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], "DispenseExhausted");
        assert_eq!(v["exit_code"], 3);
        assert_eq!(v["details"]["attempts"], 7);
    }

    #[test]
    fn unknown_errors_fall_back() {
        let report = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&report), 1);
        assert!(humanize(&report).contains("Original: boom"));
    }
}
