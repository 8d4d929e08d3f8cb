/// Who should hold the role right now
use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use super::error::ScheduleError;
use super::model::{Schedule, ScheduleRecord, UserId};
use super::window::is_in_window;

/// A stored row that could not be evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub user_id: UserId,
    pub error: ScheduleError,
}

/// Result of evaluating a snapshot of schedules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    pub active: Vec<UserId>,
    pub failed: Vec<RowFailure>,
}

/// Evaluate every record at `now`.
///
/// A row that fails to parse is reported in `failed` and logged; it never
/// stops the remaining rows from being evaluated.
pub fn resolve_population(records: &[ScheduleRecord], now: DateTime<Utc>) -> Population {
    let mut population = Population::default();

    for record in records {
        match Schedule::try_from(record) {
            Ok(schedule) => {
                if is_active_at(&schedule, now) {
                    population.active.push(schedule.user_id);
                }
            }
            Err(error) => {
                warn!(
                    "Skipping schedule for user {}: {}",
                    record.user_id, error
                );
                population.failed.push(RowFailure {
                    user_id: record.user_id,
                    error,
                });
            }
        }
    }

    population
}

/// User IDs that should currently be active; order is not meaningful
pub fn active_users(records: &[ScheduleRecord], now: DateTime<Utc>) -> Vec<UserId> {
    resolve_population(records, now).active
}

pub(crate) fn is_active_at(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&schedule.timezone).naive_local();

    if !schedule.days.contains(local.weekday()) {
        return false;
    }
    if schedule.is_sick_at(now) {
        return false;
    }
    is_in_window(local.time(), schedule.start_time, schedule.end_time)
}
