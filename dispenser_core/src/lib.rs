#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core dispenser logic (hardware-agnostic).
//!
//! All hardware goes through the capability traits in `dispenser_traits`
//! (`Button`, `Actuator`, `WeightSensor`, `Verifier`, `Display`).
//!
//! ## Architecture
//!
//! - **Press classification**: tick-driven single/double press state machine (`press`)
//! - **Scheduling**: weekly minute-of-week targets with fire-once semantics (`schedule`)
//! - **Dispensing**: verifier gate, tare, bounded actuate/measure retry loop (`dispense`)
//! - **Inventory and persistence**: counts, operator counter, JSON snapshot, single-writer lock (`inventory`, `state`, `lock`)
//! - **Controller**: the `Dispenser` object owning all of the above, its
//!   builder, the operator menu and the tick runner

pub mod atomic;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod dispense;
pub mod dispenser;
pub mod error;
pub mod hw_error;
pub mod inventory;
pub mod lock;
pub mod menu;
pub mod press;
pub mod runner;
pub mod schedule;
pub mod state;

pub use builder::{DispenserBuilder, Missing, Set};
pub use config::{CounterCfg, DispenseCfg, FunnelDoseCfg, LoopCfg, PressCfg};
pub use dispense::{
    DispenseController, DispenseOutcome, DispenseReport, VerifyFailure, WeightReading,
};
pub use dispenser::{Dispenser, Startup, inventory_lines, time_remaining_lines};
pub use error::{BuildError, DispenserError, Result};
pub use inventory::{ButtonCounter, Inventory};
pub use lock::{LockOwner, StateLock};
pub use menu::{Menu, MenuButton, MenuEffect};
pub use press::{PressClassifier, PressEvent, classify_blocking};
pub use schedule::{
    DoseScheduler, FunnelState, Schedule, SchedulerAction, TimeRemaining, TriggerMode,
    time_remaining,
};
pub use state::{PersistedState, StateStore};
