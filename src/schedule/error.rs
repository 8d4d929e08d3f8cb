use thiserror::Error;

/// Errors produced while parsing or evaluating schedules.
///
/// Day-set and time errors are shown to the user as-is when they come from
/// command input. From stored rows they mean the record is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid day: {0}. Use mon,tue,wed,thu,fri,sat,sun or 0-6.")]
    InvalidDayToken(String),
    #[error("Specify at least one day (e.g. mon,tue,wed or 0,1,2).")]
    EmptyDaySet,
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("Invalid time '{0}'. Use HH:MM (e.g. 09:00).")]
    MalformedTimeOfDay(String),
}
