use std::time::Duration;

use dispenser_core::{PressCfg, PressClassifier, PressEvent, classify_blocking};
use dispenser_traits::Button;
use dispenser_traits::clock::test_clock::TestClock;
use proptest::prelude::*;
use rstest::rstest;

/// Button whose level is a function of the test clock's elapsed time.
struct TimedButton {
    clock: TestClock,
    /// Half-open [start, end) active intervals in ms.
    active: Vec<(u64, u64)>,
}

impl Button for TimedButton {
    fn is_active(&mut self) -> bool {
        let t = self.clock.elapsed().as_millis() as u64;
        self.active.iter().any(|&(s, e)| t >= s && t < e)
    }
}

const POLL: Duration = Duration::from_millis(10);

#[rstest]
#[case::never_pressed(vec![], PressEvent::None)]
#[case::tap(vec![(0, 80)], PressEvent::Single)]
#[case::held(vec![(0, 2000)], PressEvent::Single)]
#[case::two_taps(vec![(0, 80), (300, 380)], PressEvent::Double)]
#[case::second_tap_too_late(vec![(0, 80), (600, 680)], PressEvent::Single)]
fn blocking_classification(#[case] active: Vec<(u64, u64)>, #[case] expected: PressEvent) {
    let clock = TestClock::new();
    let mut b = TimedButton {
        clock: clock.clone(),
        active,
    };
    let got = classify_blocking(&mut b, &clock, &PressCfg::default(), POLL);
    assert_eq!(got, expected);
}

#[test]
fn inactive_pin_does_not_block() {
    let clock = TestClock::new();
    let mut b = TimedButton {
        clock: clock.clone(),
        active: vec![],
    };
    classify_blocking(&mut b, &clock, &PressCfg::default(), POLL);
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn blocking_single_is_bounded_by_debounce_plus_window() {
    let clock = TestClock::new();
    let mut b = TimedButton {
        clock: clock.clone(),
        active: vec![(0, 50)],
    };
    classify_blocking(&mut b, &clock, &PressCfg::default(), POLL);
    assert!(clock.elapsed() <= Duration::from_millis(150 + 400) + POLL);
}

#[test]
fn blocking_double_returns_after_second_debounce() {
    let clock = TestClock::new();
    let mut b = TimedButton {
        clock: clock.clone(),
        active: vec![(0, 50), (200, 260)],
    };
    assert_eq!(
        classify_blocking(&mut b, &clock, &PressCfg::default(), POLL),
        PressEvent::Double
    );
    assert_eq!(clock.elapsed(), Duration::from_millis(200 + 150));
}

fn levels_from_presses(presses: &[(u64, u64)], total_ms: u64, tick: u64) -> Vec<(u64, bool)> {
    (0..total_ms / tick)
        .map(|i| {
            let t = i * tick;
            (t, presses.iter().any(|&(s, e)| t >= s && t < e))
        })
        .collect()
}

#[test]
fn tick_driven_matches_blocking_for_simple_inputs() {
    for (presses, expected) in [
        (vec![(0, 100)], PressEvent::Single),
        (vec![(0, 100), (350, 450)], PressEvent::Double),
    ] {
        let mut c = PressClassifier::new(PressCfg::default());
        let events: Vec<PressEvent> = levels_from_presses(&presses, 2000, 50)
            .into_iter()
            .map(|(t, l)| c.poll(l, t))
            .filter(|e| *e != PressEvent::None)
            .collect();
        assert_eq!(events, vec![expected]);
    }
}

proptest! {
    /// Never more events than activations, and each Double needs two.
    #[test]
    fn events_never_outnumber_activations(levels in proptest::collection::vec(any::<bool>(), 0..400)) {
        let mut c = PressClassifier::new(PressCfg::default());
        let mut activations = 0u32;
        let mut prev = false;
        let mut weight = 0u32;
        for (i, &l) in levels.iter().enumerate() {
            if l && !prev {
                activations += 1;
            }
            prev = l;
            match c.poll(l, i as u64 * 50) {
                PressEvent::Single => weight += 1,
                PressEvent::Double => weight += 2,
                PressEvent::None => {}
            }
        }
        prop_assert!(weight <= activations);
    }
}
