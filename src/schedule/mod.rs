//! Shift evaluation engine
//!
//! Pure functions over schedule snapshots: window membership, weekday sets,
//! next role-change instant and the active population. Nothing in here does
//! I/O or locking.

mod days;
mod error;
mod model;
mod population;
mod transition;
mod window;

pub use days::{format_days_display, parse_days_input, DaySet, DAY_NAMES};
pub use error::ScheduleError;
pub use model::{parse_time_of_day, Schedule, ScheduleRecord, UserId};
pub use population::{active_users, resolve_population, Population, RowFailure};
pub use transition::{next_transition, Transition};
pub use window::is_in_window;

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Longest spring-forward gap we step across when resolving local times
const MAX_DST_GAP_MINUTES: i64 = 180;

/// Resolve a local wall-clock time in `tz` to a UTC instant.
///
/// Ambiguous times (clocks falling back) resolve to the earlier instant.
/// Times inside a spring-forward gap resolve to the first valid minute after
/// the gap. Returns None only if no valid minute exists within three hours.
pub(crate) fn local_to_utc(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    for step in 0..=MAX_DST_GAP_MINUTES {
        let candidate = local + TimeDelta::minutes(step);
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    None
}
