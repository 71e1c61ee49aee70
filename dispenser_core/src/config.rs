//! Runtime configuration used by the core.
//!
//! These are separate from the TOML schema in `dispenser_config`; see
//! `conversions` for the mapping.

use std::time::Duration;

use dispenser_traits::Funnel;

/// Press classifier timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressCfg {
    /// Contact-bounce rejection delay after an activation.
    pub debounce: Duration,
    /// How long after the first debounce a second activation still counts as a double press.
    pub window: Duration,
}

impl Default for PressCfg {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
            window: Duration::from_millis(400),
        }
    }
}

/// Per-funnel weight thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunnelDoseCfg {
    /// Minimum absolute weight change that counts as "a pill fell".
    pub pill_threshold_g: f32,
    /// Readings at or above `pill_threshold_g * overdose_factor` flag a probable multi-pill drop.
    pub overdose_factor: f32,
}

impl FunnelDoseCfg {
    #[inline]
    pub fn overdose_threshold_g(&self) -> f32 {
        self.pill_threshold_g * self.overdose_factor
    }
}

impl Default for FunnelDoseCfg {
    fn default() -> Self {
        Self {
            pill_threshold_g: 0.4,
            overdose_factor: 1.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispenseCfg {
    pub max_attempts: u32,
    pub settle: Duration,
    pub retry_pause: Duration,
    /// Raw samples averaged per weight reading.
    pub weight_samples: u32,
    pub verify_timeout: Duration,
    pub funnels: [FunnelDoseCfg; 2],
}

impl DispenseCfg {
    #[inline]
    pub fn funnel(&self, funnel: Funnel) -> &FunnelDoseCfg {
        &self.funnels[funnel.index()]
    }
}

impl Default for DispenseCfg {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            settle: Duration::from_millis(500),
            retry_pause: Duration::from_millis(1000),
            weight_samples: 5,
            verify_timeout: Duration::from_secs(20),
            funnels: [FunnelDoseCfg::default(); 2],
        }
    }
}

/// Operator counter (initial inventory and refills).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterCfg {
    pub step: u32,
    pub max: u32,
}

impl Default for CounterCfg {
    fn default() -> Self {
        Self { step: 5, max: 99 }
    }
}

/// Control loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCfg {
    pub tick: Duration,
    /// How long a transient screen stays up before the menu prompt returns.
    pub message_hold: Duration,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            message_hold: Duration::from_secs(2),
        }
    }
}
