use chrono::{NaiveDate, NaiveDateTime};
use dispenser_core::schedule::{MINUTES_PER_DAY, MINUTES_PER_WEEK};
use dispenser_core::{DoseScheduler, FunnelState, Schedule, SchedulerAction, TriggerMode, time_remaining};
use rstest::rstest;

/// 2024-01-01 is a Monday; `day` 0..=6 walks Monday..Sunday.
fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1 + day)
        .and_then(|d| d.and_hms_opt(h, m, 0))
        .expect("valid test time")
}

const MON: u8 = 0;
const WED: u8 = 2;
const SUN: u8 = 6;

#[test]
fn monday_midnight_one_minute_late_waits_a_week() {
    let s = Schedule::new(MON, 0, 0).unwrap();
    let tr = time_remaining(&s, at(0, 0, 1)).unwrap();
    assert_eq!((tr.days, tr.hours, tr.minutes), (6, 23, 59));
}

#[test]
fn arm_then_fire_exactly_once_in_the_minute() {
    let sched = DoseScheduler::default();
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());

    assert_eq!(sched.tick(&mut st, at(2, 8, 59)), SchedulerAction::Arm);

    let fires = (0..20)
        .map(|_| sched.tick(&mut st, at(2, 9, 0)))
        .filter(|a| *a == SchedulerAction::Fire)
        .count();
    assert_eq!(fires, 1);
    assert!(st.fired_for_target());
}

#[test]
fn second_tick_in_same_minute_is_none() {
    let sched = DoseScheduler::default();
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    assert!(!st.fired_for_target());
    assert_eq!(sched.tick(&mut st, at(2, 9, 0)), SchedulerAction::Fire);
    assert_eq!(sched.tick(&mut st, at(2, 9, 0)), SchedulerAction::None);
}

#[test]
fn arm_repeats_within_its_minute_but_does_not_mutate() {
    let sched = DoseScheduler::default();
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(2, 8, 59)), SchedulerAction::Arm);
    assert_eq!(sched.tick(&mut st, at(2, 8, 59)), SchedulerAction::Arm);
    assert!(!st.fired_for_target());
}

#[test]
fn next_week_is_a_new_occurrence() {
    let sched = DoseScheduler::default();
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(2, 9, 0)), SchedulerAction::Fire);
    assert_eq!(sched.tick(&mut st, at(2, 9, 1)), SchedulerAction::None);
    assert_eq!(
        st.last_target_minute(),
        Some(u32::from(WED) * MINUTES_PER_DAY + 9 * 60 + MINUTES_PER_WEEK)
    );
    assert!(!st.fired_for_target());
    // a week later (Jan 10 is the next Wednesday)
    assert_eq!(sched.tick(&mut st, at(9, 9, 0)), SchedulerAction::Fire);
}

#[test]
fn sunday_to_monday_wrap_arms_and_fires() {
    let sched = DoseScheduler::default();
    let mut st = FunnelState::new(Schedule::new(MON, 0, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(6, 23, 59)), SchedulerAction::Arm);
    assert_eq!(sched.tick(&mut st, at(7, 0, 0)), SchedulerAction::Fire);
    assert_eq!(sched.tick(&mut st, at(7, 0, 0)), SchedulerAction::None);
}

#[test]
fn sunday_late_dose_from_monday() {
    let s = Schedule::new(SUN, 23, 59).unwrap();
    let tr = time_remaining(&s, at(0, 0, 0)).unwrap();
    assert_eq!(tr.total_minutes, MINUTES_PER_WEEK - 1);
}

#[test]
fn unset_schedule_never_acts() {
    let sched = DoseScheduler::new(TriggerMode::CatchUp);
    let mut st = FunnelState::new(Schedule::UNSET);
    for m in 0..120 {
        assert_eq!(sched.tick(&mut st, at(2, 8, 0) + chrono::Duration::minutes(m)), SchedulerAction::None);
    }
    assert_eq!(st.last_target_minute(), None);
}

#[rstest]
#[case(TriggerMode::Exact, 0)]
#[case(TriggerMode::CatchUp, 1)]
fn skipped_boundary(#[case] mode: TriggerMode, #[case] expected_fires: usize) {
    let sched = DoseScheduler::new(mode);
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    let ticks = [at(2, 8, 57), at(2, 8, 58), at(2, 9, 3), at(2, 9, 4), at(2, 9, 5)];
    let fires = ticks
        .iter()
        .map(|t| sched.tick(&mut st, *t))
        .filter(|a| *a == SchedulerAction::Fire)
        .count();
    assert_eq!(fires, expected_fires);
}

#[test]
fn catch_up_does_not_refire_after_a_normal_fire() {
    let sched = DoseScheduler::new(TriggerMode::CatchUp);
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(2, 9, 0)), SchedulerAction::Fire);
    assert_eq!(sched.tick(&mut st, at(2, 9, 7)), SchedulerAction::None);
}

#[test]
fn catch_up_ignores_fresh_schedules() {
    let sched = DoseScheduler::new(TriggerMode::CatchUp);
    let mut st = FunnelState::new(Schedule::new(WED, 9, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(2, 9, 30)), SchedulerAction::None);
    st.set_schedule(Schedule::new(WED, 8, 0).unwrap());
    assert_eq!(sched.tick(&mut st, at(2, 9, 31)), SchedulerAction::None);
}
