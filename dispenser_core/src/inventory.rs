use dispenser_traits::Funnel;

use crate::config::CounterCfg;

/// Remaining pill count per funnel. Never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inventory {
    counts: [u32; 2],
}

impl Inventory {
    pub fn new(funnel_1: u32, funnel_2: u32) -> Self {
        Self {
            counts: [funnel_1, funnel_2],
        }
    }

    #[inline]
    pub fn get(&self, funnel: Funnel) -> u32 {
        self.counts[funnel.index()]
    }

    /// Explicit refill or initial entry.
    pub fn set(&mut self, funnel: Funnel, count: u32) {
        self.counts[funnel.index()] = count;
    }

    /// One confirmed dispense. Floors at zero; returns the new count.
    pub fn decrement(&mut self, funnel: Funnel) -> u32 {
        let c = &mut self.counts[funnel.index()];
        *c = c.saturating_sub(1);
        *c
    }

    #[inline]
    pub fn is_empty(&self, funnel: Funnel) -> bool {
        self.get(funnel) == 0
    }

    pub fn counts(&self) -> [u32; 2] {
        self.counts
    }
}

/// Step-and-wrap counter driven by two buttons (increment / confirm).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonCounter {
    value: u32,
    step: u32,
    max: u32,
}

impl ButtonCounter {
    /// `initial` is kept as-is until the first step, so confirming an
    /// untouched counter never changes a stored count above `max`.
    pub fn new(initial: u32, cfg: CounterCfg) -> Self {
        Self {
            value: initial,
            step: cfg.step,
            max: cfg.max,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Adds one step from `min(value, max)`, wrapping past `max` back into range.
    pub fn increment(&mut self) -> u32 {
        let modulus = u64::from(self.max) + 1;
        let from = u64::from(self.value.min(self.max));
        self.value = ((from + u64::from(self.step)) % modulus) as u32;
        self.value
    }
}
