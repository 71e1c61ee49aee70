//! `From` implementations bridging `dispenser_config` types to `dispenser_core` types.

use std::time::Duration;

use crate::config::{CounterCfg, DispenseCfg, FunnelDoseCfg, LoopCfg, PressCfg};
use crate::schedule::TriggerMode;

impl From<&dispenser_config::ButtonsCfg> for PressCfg {
    fn from(c: &dispenser_config::ButtonsCfg) -> Self {
        Self {
            debounce: Duration::from_millis(c.debounce_ms),
            window: Duration::from_millis(c.double_press_window_ms),
        }
    }
}

impl From<&dispenser_config::FunnelCfg> for FunnelDoseCfg {
    fn from(c: &dispenser_config::FunnelCfg) -> Self {
        Self {
            pill_threshold_g: c.pill_threshold_g,
            overdose_factor: c.overdose_factor,
        }
    }
}

/// Needs the whole config: retry knobs live in `[dispense]`, thresholds per funnel.
impl From<&dispenser_config::Config> for DispenseCfg {
    fn from(c: &dispenser_config::Config) -> Self {
        let d = &c.dispense;
        Self {
            max_attempts: d.max_attempts,
            settle: Duration::from_millis(d.settle_ms),
            retry_pause: Duration::from_millis(d.retry_pause_ms),
            weight_samples: d.weight_samples,
            verify_timeout: Duration::from_millis(d.verify_timeout_ms),
            funnels: [(&c.funnel_1).into(), (&c.funnel_2).into()],
        }
    }
}

impl From<&dispenser_config::InventoryCfg> for CounterCfg {
    fn from(c: &dispenser_config::InventoryCfg) -> Self {
        Self {
            step: c.refill_step,
            max: c.max_count,
        }
    }
}

impl From<&dispenser_config::SchedulerCfg> for LoopCfg {
    fn from(c: &dispenser_config::SchedulerCfg) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            ..Self::default()
        }
    }
}

impl From<dispenser_config::TriggerMode> for TriggerMode {
    fn from(m: dispenser_config::TriggerMode) -> Self {
        match m {
            dispenser_config::TriggerMode::Exact => TriggerMode::Exact,
            dispenser_config::TriggerMode::CatchUp => TriggerMode::CatchUp,
        }
    }
}
