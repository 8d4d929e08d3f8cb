/// Human-readable status text for role changes
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;

use crate::schedule::{Schedule, Transition};

/// Format a duration as `2d 3h 15m`, keeping only non-zero parts.
///
/// Negative durations read "now" and anything under a minute reads
/// "under 1m".
pub fn format_timedelta(delta: TimeDelta) -> String {
    let total_seconds = delta.num_seconds();
    if total_seconds < 0 {
        return "now".to_string();
    }
    if total_seconds < 60 {
        return "under 1m".to_string();
    }

    let minutes = total_seconds / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }

    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}

/// One line describing the next role change, e.g.
/// `Role will be **added** in **2h 5m** (at 09:00 Australia/Sydney).`
///
/// Returns None when nothing is scheduled to change.
pub fn describe_next_change(
    schedule: &Schedule,
    transition: &Transition,
    now: DateTime<Utc>,
    display_tz: Tz,
) -> Option<String> {
    let next = transition.next_change?;
    let delta = format_timedelta(next - now);
    let at = next.with_timezone(&display_tz).format("%H:%M");

    let line = if schedule.sick_until == Some(next) {
        format!("Sick ends in **{}** (at {} {}).", delta, at, display_tz.name())
    } else if transition.active {
        format!("Role will be **removed** in **{}** (at {} {}).", delta, at, display_tz.name())
    } else {
        format!("Role will be **added** in **{}** (at {} {}).", delta, at, display_tz.name())
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{DaySet, UserId};
    use chrono::{NaiveTime, TimeZone};
    use chrono_tz::Australia::Sydney;

    #[test]
    fn test_format_timedelta_examples() {
        assert_eq!(format_timedelta(TimeDelta::minutes(125)), "2h 5m");
        assert_eq!(format_timedelta(TimeDelta::seconds(30)), "under 1m");
        assert_eq!(format_timedelta(TimeDelta::seconds(-5)), "now");
    }

    #[test]
    fn test_format_timedelta_components() {
        assert_eq!(format_timedelta(TimeDelta::seconds(60)), "1m");
        assert_eq!(format_timedelta(TimeDelta::hours(2)), "2h");
        assert_eq!(format_timedelta(TimeDelta::days(1)), "1d");
        assert_eq!(format_timedelta(TimeDelta::days(1) + TimeDelta::minutes(1)), "1d 1m");
        assert_eq!(
            format_timedelta(TimeDelta::days(3) + TimeDelta::hours(4) + TimeDelta::minutes(5) + TimeDelta::seconds(59)),
            "3d 4h 5m"
        );
    }

    #[test]
    fn test_format_timedelta_boundaries() {
        assert_eq!(format_timedelta(TimeDelta::zero()), "under 1m");
        assert_eq!(format_timedelta(TimeDelta::seconds(59)), "under 1m");
        assert_eq!(format_timedelta(TimeDelta::milliseconds(-1)), "under 1m");
    }

    fn schedule() -> Schedule {
        Schedule {
            user_id: UserId(1),
            timezone: Sydney,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            days: DaySet::all(),
            sick_until: None,
        }
    }

    #[test]
    fn test_describe_next_change() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 21, 0, 0).unwrap(); // 07:00 Sydney
        let next = now + TimeDelta::hours(2);

        let added = Transition { active: false, next_change: Some(next) };
        assert_eq!(
            describe_next_change(&schedule(), &added, now, Sydney).unwrap(),
            "Role will be **added** in **2h** (at 09:00 Australia/Sydney)."
        );

        let removed = Transition { active: true, next_change: Some(next) };
        assert!(describe_next_change(&schedule(), &removed, now, Sydney)
            .unwrap()
            .contains("**removed**"));

        let mut sick = schedule();
        sick.sick_until = Some(next);
        assert!(describe_next_change(&sick, &added, now, Sydney)
            .unwrap()
            .starts_with("Sick ends in **2h**"));

        let none = Transition { active: false, next_change: None };
        assert!(describe_next_change(&schedule(), &none, now, Sydney).is_none());
    }
}
