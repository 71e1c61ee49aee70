use dispenser_core::error::BuildError;
use dispenser_core::{DispenseCfg, Dispenser, FunnelDoseCfg};
use dispenser_hardware::{SimBench, SimulatedVerifier, VerifyMode};
use rstest::rstest;

#[rstest]
fn builder_missing_actuator_yields_typed_build_error() {
    let bench = SimBench::new(0.5);
    let err = Dispenser::builder()
        .with_weight_sensor(bench.scale())
        .with_verifier(SimulatedVerifier::new(VerifyMode::Accept))
        .try_build()
        .expect_err("should fail with MissingActuator");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingActuator) => {}
        other => panic!("expected MissingActuator, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_sensor_and_verifier() {
    let bench = SimBench::new(0.5);
    let err = Dispenser::builder()
        .with_actuator(bench.actuator())
        .with_verifier(SimulatedVerifier::new(VerifyMode::Accept))
        .try_build()
        .expect_err("missing sensor");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingWeightSensor)));

    let err = Dispenser::builder()
        .with_actuator(bench.actuator())
        .with_weight_sensor(bench.scale())
        .try_build()
        .expect_err("missing verifier");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::MissingVerifier)));
}

#[rstest]
#[case(DispenseCfg { max_attempts: 0, ..DispenseCfg::default() })]
#[case(DispenseCfg { weight_samples: 0, ..DispenseCfg::default() })]
#[case(DispenseCfg { funnels: [FunnelDoseCfg { pill_threshold_g: 0.0, overdose_factor: 1.8 }; 2], ..DispenseCfg::default() })]
#[case(DispenseCfg { funnels: [FunnelDoseCfg { pill_threshold_g: 0.4, overdose_factor: 1.0 }; 2], ..DispenseCfg::default() })]
fn builder_rejects_invalid_dispense_cfg(#[case] cfg: DispenseCfg) {
    let bench = SimBench::new(0.5);
    let err = Dispenser::builder()
        .with_actuator(bench.actuator())
        .with_weight_sensor(bench.scale())
        .with_verifier(SimulatedVerifier::new(VerifyMode::Accept))
        .with_dispense(cfg)
        .build()
        .expect_err("invalid config");
    assert!(matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_))));
}

#[rstest]
fn builder_applies_toml_config() {
    let toml = r#"
        [pins]
        btn_set = 5
        btn_confirm = 6
        btn_time = 13
        servo_1 = 17
        servo_2 = 27
        hx711_dt = 23
        hx711_sck = 24

        [dispense]
        max_attempts = 3

        [state]
        path = "custom_state.json"
    "#;
    let cfg = dispenser_config::load_toml(toml).expect("parse");
    let bench = SimBench::new(0.5);
    let d = Dispenser::builder()
        .with_actuator(bench.actuator())
        .with_weight_sensor(bench.scale())
        .with_verifier(SimulatedVerifier::new(VerifyMode::Accept))
        .apply_config(&cfg)
        .build()
        .expect("valid config builds");
    assert_eq!(d.store().path(), std::path::Path::new("custom_state.json"));
}
