use dispenser_config::{ActuatorBackend, DisplayBackend, TriggerMode, load_toml};
use rstest::rstest;

const PINS: &str = r#"
[pins]
btn_set = 5
btn_confirm = 6
btn_time = 13
servo_1 = 18
servo_2 = 19
hx711_dt = 23
hx711_sck = 24
"#;

fn with_pins(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[rstest]
fn minimal_config_uses_device_defaults() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults are valid");

    assert_eq!(cfg.pins.fingerprint_uart, "/dev/ttyS0");
    assert_eq!(cfg.buttons.debounce_ms, 150);
    assert_eq!(cfg.buttons.double_press_window_ms, 400);
    assert_eq!(cfg.scheduler.tick_ms, 50);
    assert_eq!(cfg.scheduler.trigger, TriggerMode::Exact);
    assert_eq!(cfg.dispense.max_attempts, 10);
    assert_eq!(cfg.dispense.verify_timeout_ms, 20_000);
    assert!((cfg.funnel_1.pill_threshold_g - 0.4).abs() < f32::EPSILON);
    assert!((cfg.funnel_2.overdose_factor - 1.8).abs() < f32::EPSILON);
    assert!((cfg.funnel_2.servo_center_deg - 10.0).abs() < f32::EPSILON);
    assert_eq!(cfg.inventory.refill_step, 5);
    assert_eq!(cfg.inventory.max_count, 99);
    assert_eq!(cfg.state.path, "daily_dose_state.json");
    assert_eq!(cfg.display.backend, DisplayBackend::Terminal);
    assert_eq!(cfg.actuator.backend, ActuatorBackend::Pca9685);
}

#[rstest]
fn missing_pins_section_is_a_parse_error() {
    assert!(load_toml("[dispense]\nmax_attempts = 3\n").is_err());
}

#[rstest]
fn parses_enums_and_overrides() {
    let cfg = load_toml(&with_pins(
        r#"
[scheduler]
trigger = "catch_up"

[display]
backend = "lcd"

[actuator]
backend = "pwm"

[funnel_2]
pill_threshold_g = 0.25
"#,
    ))
    .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.scheduler.trigger, TriggerMode::CatchUp);
    assert_eq!(cfg.display.backend, DisplayBackend::Lcd);
    assert_eq!(cfg.actuator.backend, ActuatorBackend::Pwm);
    assert!((cfg.funnel_2.pill_threshold_g - 0.25).abs() < f32::EPSILON);
    // Unset keys in a present section fall back to the per-field defaults
    assert!((cfg.funnel_2.overdose_factor - 1.8).abs() < f32::EPSILON);
}

#[rstest]
#[case("[dispense]\nmax_attempts = 0", "dispense.max_attempts must be >= 1")]
#[case("[dispense]\nweight_samples = 0", "dispense.weight_samples must be >= 1")]
#[case("[scheduler]\ntick_ms = 60000", "scheduler.tick_ms must be < 60000")]
#[case("[buttons]\ndebounce_ms = 0", "buttons.debounce_ms must be >= 1")]
#[case("[funnel_1]\npill_threshold_g = 0.0", "funnel_1.pill_threshold_g must be > 0.0")]
#[case("[funnel_2]\noverdose_factor = 1.0", "funnel_2.overdose_factor must be > 1.0")]
#[case("[funnel_1]\nservo_center_deg = 170.0\nservo_offset_deg = 20.0", "funnel_1.servo_offset_deg")]
#[case("[inventory]\nrefill_step = 0", "inventory.refill_step must be >= 1")]
#[case("[state]\npath = \"  \"", "state.path must not be empty")]
#[case("[scale]\nreference_unit = 0.0", "scale.reference_unit")]
fn rejects_out_of_range_values(#[case] extra: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_pins(extra)).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "got: {err}");
}
