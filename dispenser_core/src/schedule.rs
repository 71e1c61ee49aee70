//! Weekly dose schedules and the fire-once scheduler.
//!
//! Times are expressed as minute-of-week, Monday 00:00 = 0.

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::{debug, info, warn};

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;
pub const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY;

pub const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Weekly dose time. `day == None` is the unset sentinel and never yields a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schedule {
    pub day: Option<u8>,
    pub hour: u8,
    pub minute: u8,
}

impl Schedule {
    pub const UNSET: Schedule = Schedule {
        day: None,
        hour: 0,
        minute: 0,
    };

    /// `day` 0 = Monday. Returns `None` when any field is out of range.
    pub fn new(day: u8, hour: u8, minute: u8) -> Option<Self> {
        (day < 7 && hour < 24 && minute < 60).then_some(Self {
            day: Some(day),
            hour,
            minute,
        })
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.day.is_some()
    }

    /// Minute-of-week of this schedule, without week advancement.
    pub fn target_minute(&self) -> Option<u32> {
        self.day.map(|d| {
            u32::from(d) * MINUTES_PER_DAY
                + u32::from(self.hour) * MINUTES_PER_HOUR
                + u32::from(self.minute)
        })
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.day.and_then(|d| DAY_NAMES.get(usize::from(d))) {
            Some(name) => write!(f, "{name} {:02}:{:02}", self.hour, self.minute),
            None => f.write_str("unset"),
        }
    }
}

/// Minute-of-week for a local timestamp.
pub fn minute_of_week(now: NaiveDateTime) -> u32 {
    now.weekday().num_days_from_monday() * MINUTES_PER_DAY
        + now.hour() * MINUTES_PER_HOUR
        + now.minute()
}

/// Time until the next occurrence of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub total_minutes: u32,
    /// Absolute minute-of-week of the occurrence, advanced by one week when it
    /// already passed. Identifies the occurrence.
    pub target_minute: u32,
}

impl std::fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.days > 0 {
            write!(f, "{}d {}h {}m", self.days, self.hours, self.minutes)
        } else {
            write!(f, "{:02}h {:02}m", self.hours, self.minutes)
        }
    }
}

/// `None` for an unset schedule. A target equal to the current minute is due
/// now (zero), not deferred a week.
pub fn time_remaining(schedule: &Schedule, now: NaiveDateTime) -> Option<TimeRemaining> {
    let mut target = schedule.target_minute()?;
    let current = minute_of_week(now);
    if target < current {
        target += MINUTES_PER_WEEK;
    }
    let delta = target - current;
    Some(TimeRemaining {
        days: delta / MINUTES_PER_DAY,
        hours: (delta % MINUTES_PER_DAY) / MINUTES_PER_HOUR,
        minutes: delta % MINUTES_PER_HOUR,
        total_minutes: delta,
        target_minute: target,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerAction {
    None,
    /// One minute before a dose; informational.
    Arm,
    /// Dispense now. Emitted at most once per occurrence.
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Arm and fire only on ticks that land exactly on the 1- and 0-minute marks.
    #[default]
    Exact,
    /// As `Exact`, plus a late fire when a tick finds that an unfired
    /// occurrence's zero mark was skipped.
    CatchUp,
}

/// Scheduling state of one funnel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunnelState {
    schedule: Schedule,
    last_target_minute: Option<u32>,
    fired_for_target: bool,
    last_remaining: Option<u32>,
}

impl FunnelState {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            ..Self::default()
        }
    }

    #[inline]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[inline]
    pub fn last_target_minute(&self) -> Option<u32> {
        self.last_target_minute
    }

    #[inline]
    pub fn fired_for_target(&self) -> bool {
        self.fired_for_target
    }

    /// Operator edit. The next tick sees a fresh occurrence.
    pub fn set_schedule(&mut self, schedule: Schedule) {
        self.schedule = schedule;
        self.last_target_minute = None;
        self.fired_for_target = false;
        self.last_remaining = None;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoseScheduler {
    mode: TriggerMode,
}

impl DoseScheduler {
    pub fn new(mode: TriggerMode) -> Self {
        Self { mode }
    }

    pub fn tick(&self, state: &mut FunnelState, now: NaiveDateTime) -> SchedulerAction {
        let Some(tr) = time_remaining(&state.schedule, now) else {
            state.last_remaining = None;
            return SchedulerAction::None;
        };
        let prev_remaining = state.last_remaining.replace(tr.total_minutes);

        if state.last_target_minute != Some(tr.target_minute) {
            // Remaining time can only jump upward when the previous target passed.
            let skipped_unfired = state.last_target_minute.is_some()
                && !state.fired_for_target
                && prev_remaining.is_some_and(|p| tr.total_minutes > p);
            debug!(
                target_minute = tr.target_minute,
                previous = ?state.last_target_minute,
                "new dose occurrence"
            );
            state.last_target_minute = Some(tr.target_minute);
            state.fired_for_target = false;

            if skipped_unfired && self.mode == TriggerMode::CatchUp {
                warn!(
                    target_minute = tr.target_minute,
                    previous_remaining = prev_remaining.unwrap_or_default(),
                    "dose boundary passed without a tick; firing late"
                );
                return SchedulerAction::Fire;
            }
        }

        if state.fired_for_target {
            return SchedulerAction::None;
        }
        match tr.total_minutes {
            1 => SchedulerAction::Arm,
            0 => {
                state.fired_for_target = true;
                info!(target_minute = tr.target_minute, "dose due");
                SchedulerAction::Fire
            }
            _ => SchedulerAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-01-01 is a Monday.
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1 + day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    #[test]
    fn unset_has_no_target() {
        assert_eq!(time_remaining(&Schedule::UNSET, at(0, 0, 0)), None);
        assert_eq!(Schedule::UNSET.to_string(), "unset");
    }

    #[test]
    fn due_now_is_zero_not_a_week() {
        let s = Schedule::new(2, 9, 0).unwrap();
        let tr = time_remaining(&s, at(2, 9, 0)).unwrap();
        assert_eq!(tr.total_minutes, 0);
        assert_eq!(tr.target_minute, 2 * MINUTES_PER_DAY + 9 * 60);
    }

    #[test]
    fn passed_target_rolls_over() {
        let s = Schedule::new(0, 0, 0).unwrap();
        let tr = time_remaining(&s, at(0, 0, 1)).unwrap();
        assert_eq!((tr.days, tr.hours, tr.minutes), (6, 23, 59));
        assert_eq!(tr.target_minute, MINUTES_PER_WEEK);
    }

    #[test]
    fn display_formats() {
        let s = Schedule::new(4, 7, 5).unwrap();
        assert_eq!(s.to_string(), "Fri 07:05");
        let tr = time_remaining(&s, at(2, 3, 1)).unwrap();
        assert_eq!(tr.to_string(), "2d 4h 4m");
        let tr = time_remaining(&s, at(4, 3, 1)).unwrap();
        assert_eq!(tr.to_string(), "04h 04m");
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(Schedule::new(7, 0, 0).is_none());
        assert!(Schedule::new(0, 24, 0).is_none());
        assert!(Schedule::new(0, 0, 60).is_none());
    }

    #[test]
    fn edit_resets_occurrence_tracking() {
        let sched = DoseScheduler::default();
        let mut st = FunnelState::new(Schedule::new(0, 8, 0).unwrap());
        assert_eq!(sched.tick(&mut st, at(0, 8, 0)), SchedulerAction::Fire);
        assert!(st.fired_for_target());
        st.set_schedule(Schedule::new(0, 8, 0).unwrap());
        assert!(!st.fired_for_target());
        assert_eq!(st.last_target_minute(), None);
        assert_eq!(sched.tick(&mut st, at(0, 8, 0)), SchedulerAction::Fire);
    }
}
