//! Single/double press disambiguation.
//!
//! [`PressClassifier`] is the tick-driven form used by the control loop: feed
//! it the pin level and a monotonic timestamp on every tick and it reports a
//! press once the press has resolved. [`classify_blocking`] keeps the simple
//! blocking contract for one-shot use.

use std::time::Duration;

use dispenser_traits::{Button, Clock};

use crate::config::PressCfg;

/// Result of classifying one press. Events are produced fresh and never queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressEvent {
    #[default]
    None,
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Debounce { until_ms: u64 },
    Window { deadline_ms: u64, released: bool },
    SecondDebounce { until_ms: u64 },
    /// Resolved; ignore the pin until it is released.
    WaitRelease,
}

/// Non-blocking edge/timer press classifier, one per button.
#[derive(Debug, Clone)]
pub struct PressClassifier {
    debounce_ms: u64,
    window_ms: u64,
    phase: Phase,
}

impl PressClassifier {
    pub fn new(cfg: PressCfg) -> Self {
        Self {
            debounce_ms: cfg.debounce.as_millis() as u64,
            window_ms: cfg.window.as_millis() as u64,
            phase: Phase::Idle,
        }
    }

    /// Advance with the current pin level. Returns `PressEvent::None` until a
    /// press resolves.
    pub fn poll(&mut self, active: bool, now_ms: u64) -> PressEvent {
        match self.phase {
            Phase::Idle => {
                if active {
                    self.phase = Phase::Debounce {
                        until_ms: now_ms.saturating_add(self.debounce_ms),
                    };
                }
                PressEvent::None
            }
            Phase::Debounce { until_ms } => {
                if now_ms >= until_ms {
                    self.phase = Phase::Window {
                        deadline_ms: until_ms.saturating_add(self.window_ms),
                        released: !active,
                    };
                }
                PressEvent::None
            }
            Phase::Window {
                deadline_ms,
                released,
            } => {
                if active && released {
                    self.phase = Phase::SecondDebounce {
                        until_ms: now_ms.saturating_add(self.debounce_ms),
                    };
                    return PressEvent::None;
                }
                if now_ms >= deadline_ms {
                    self.phase = if active { Phase::WaitRelease } else { Phase::Idle };
                    return PressEvent::Single;
                }
                self.phase = Phase::Window {
                    deadline_ms,
                    released: released || !active,
                };
                PressEvent::None
            }
            Phase::SecondDebounce { until_ms } => {
                if now_ms >= until_ms {
                    self.phase = if active { Phase::WaitRelease } else { Phase::Idle };
                    return PressEvent::Double;
                }
                PressEvent::None
            }
            Phase::WaitRelease => {
                if !active {
                    self.phase = Phase::Idle;
                }
                PressEvent::None
            }
        }
    }
}

/// Blocking classification. Returns immediately with `None` when the button
/// is not active; otherwise occupies the caller for at most
/// `debounce + window` (single) or about `2 * debounce` (double).
pub fn classify_blocking<B, C>(button: &mut B, clock: &C, cfg: &PressCfg, poll: Duration) -> PressEvent
where
    B: Button + ?Sized,
    C: Clock + ?Sized,
{
    if !button.is_active() {
        return PressEvent::None;
    }
    clock.sleep(cfg.debounce);
    let start = clock.now();
    let mut released = false;
    while clock.now().saturating_duration_since(start) < cfg.window {
        if !button.is_active() {
            released = true;
        } else if released {
            clock.sleep(cfg.debounce);
            return PressEvent::Double;
        }
        clock.sleep(poll);
    }
    PressEvent::Single
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(levels: &[bool], tick_ms: u64) -> Vec<(u64, PressEvent)> {
        let mut c = PressClassifier::new(PressCfg::default());
        let mut out = Vec::new();
        for (i, &l) in levels.iter().enumerate() {
            let t = i as u64 * tick_ms;
            let e = c.poll(l, t);
            if e != PressEvent::None {
                out.push((t, e));
            }
        }
        out
    }

    #[test]
    fn never_active_is_none() {
        assert!(run(&[false; 40], 50).is_empty());
    }

    #[test]
    fn tap_resolves_single_after_window() {
        let mut levels = vec![true, true];
        levels.extend([false; 20]);
        // debounce ends at 150, window closes at 550
        assert_eq!(run(&levels, 50), vec![(550, PressEvent::Single)]);
    }

    #[test]
    fn two_taps_resolve_double() {
        let mut levels = vec![true, true];
        levels.extend([false; 5]);
        levels.extend([true, true]);
        levels.extend([false; 20]);
        // second activation at 350, second debounce ends at 500
        assert_eq!(run(&levels, 50), vec![(500, PressEvent::Double)]);
    }

    #[test]
    fn held_press_is_single_once() {
        let mut levels = vec![true; 30];
        levels.extend([false; 10]);
        assert_eq!(run(&levels, 50), vec![(550, PressEvent::Single)]);
    }

    #[test]
    fn bounce_inside_debounce_is_ignored() {
        let mut levels = vec![true, false, true];
        levels.extend([false; 20]);
        assert_eq!(run(&levels, 50), vec![(550, PressEvent::Single)]);
    }
}
