#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<dispenser_config::Config>(data)
        && cfg.validate().is_ok()
    {
        // Every validated config must map onto runtime settings the builder accepts.
        let _ = dispenser_core::Dispenser::builder().apply_config(&cfg);
    }
});
