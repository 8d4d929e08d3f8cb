use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::days::DaySet;
use super::error::ScheduleError;

/// Discord user snowflake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

/// Schedule row as persisted by the store.
///
/// Times are `HH:MM` strings and the day set is kept in its canonical digit
/// form. Nothing here is validated until it is turned into a [`Schedule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub user_id: UserId,
    pub timezone: String,
    pub start_time: String,
    pub end_time: String,
    pub days: String,
    #[serde(default)]
    pub sick_until: Option<DateTime<Utc>>,
}

/// Validated schedule the engine works on
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub user_id: UserId,
    pub timezone: Tz,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub days: DaySet,
    pub sick_until: Option<DateTime<Utc>>,
}

impl Schedule {
    /// True while a sick override is in force at `now`
    pub fn is_sick_at(&self, now: DateTime<Utc>) -> bool {
        self.sick_until.is_some_and(|until| now < until)
    }
}

impl TryFrom<&ScheduleRecord> for Schedule {
    type Error = ScheduleError;

    fn try_from(record: &ScheduleRecord) -> Result<Self, Self::Error> {
        Ok(Schedule {
            user_id: record.user_id,
            timezone: parse_timezone(&record.timezone)?,
            start_time: parse_time_of_day(&record.start_time)?,
            end_time: parse_time_of_day(&record.end_time)?,
            days: DaySet::from_canonical(&record.days)?,
            sick_until: record.sick_until,
        })
    }
}

pub(crate) fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

/// Parse a time of day written as `HH:MM` (stored rows may carry `HH:MM:SS`)
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ScheduleError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ScheduleError::MalformedTimeOfDay(s.to_string()))
}
