#![no_main]
use dispenser_core::PersistedState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(state) = PersistedState::from_json(data) {
        // Anything accepted must survive a save/load cycle unchanged.
        let text = state.to_json().unwrap_or_default();
        assert_eq!(PersistedState::from_json(&text).ok(), Some(state));
    }
});
