/// Next role-change instant for a single schedule
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc};
use chrono_tz::Tz;

use super::days::DaySet;
use super::local_to_utc;
use super::model::Schedule;
use super::window::{is_in_window, is_overnight};

/// How many days ahead to look for the next shift start (a full week plus today)
const SEARCH_DAYS: i64 = 7;

/// Current state of a schedule and when it next changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Whether the user should hold the role right now
    pub active: bool,
    /// Next instant the state flips, if there is one
    pub next_change: Option<DateTime<Utc>>,
}

impl Transition {
    fn inactive(next_change: Option<DateTime<Utc>>) -> Self {
        Self {
            active: false,
            next_change,
        }
    }
}

/// Work out whether `schedule` is on shift at `now` and when that changes.
///
/// A sick override wins over everything and its expiry is the next change.
/// Otherwise the weekday and window are checked in the schedule's zone. An
/// on-shift result carries the end of the current shift; an off-shift result
/// carries the next shift start. Returned instants are always strictly after
/// `now`.
pub fn next_transition(schedule: &Schedule, now: DateTime<Utc>) -> Transition {
    if let Some(until) = schedule.sick_until {
        if now < until {
            return Transition::inactive(Some(until));
        }
    }

    if schedule.start_time == schedule.end_time {
        return Transition::inactive(None);
    }

    let tz = schedule.timezone;
    let local = now.with_timezone(&tz).naive_local();

    if !schedule.days.contains(local.weekday()) {
        return Transition::inactive(next_shift_start(tz, now, schedule.days, schedule.start_time));
    }

    if is_in_window(local.time(), schedule.start_time, schedule.end_time) {
        let end = current_shift_end(tz, now, schedule.start_time, schedule.end_time);
        return Transition {
            active: true,
            next_change: end,
        };
    }

    Transition::inactive(next_shift_start(tz, now, schedule.days, schedule.start_time))
}

/// End of the shift that is running at `now`
fn current_shift_end(
    tz: Tz,
    now: DateTime<Utc>,
    start: NaiveTime,
    end: NaiveTime,
) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&tz).naive_local();
    let today = local.date();

    // Reports the configured end even when tomorrow is not a work day. The
    // role actually drops at local midnight then, because the early-morning
    // part is judged by tomorrow's weekday.
    let end_date = if is_overnight(start, end) && local.time() >= start {
        today.succ_opt()?
    } else {
        today
    };

    // A same-day window whose end is already behind us yields None
    local_to_utc(tz, end_date.and_time(end)).filter(|end_utc| *end_utc > now)
}

/// First shift start strictly after `now` on an allowed weekday
fn next_shift_start(
    tz: Tz,
    now: DateTime<Utc>,
    days: DaySet,
    start: NaiveTime,
) -> Option<DateTime<Utc>> {
    if days.is_empty() {
        return None;
    }
    let today: NaiveDate = now.with_timezone(&tz).date_naive();

    (0..=SEARCH_DAYS)
        .filter_map(|offset| today.checked_add_signed(TimeDelta::days(offset)))
        .filter(|date| days.contains(date.weekday()))
        .filter_map(|date| local_to_utc(tz, date.and_time(start)))
        .find(|start_utc| *start_utc > now)
}
