/// Weekday sets and their text forms
///
/// Users type days as `mon,wed,fri` or `0,2,4`. Storage keeps the canonical
/// digit form `0,2,4` (0 = Monday). Internally a day set is a 7-bit mask.
use chrono::Weekday;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::error::ScheduleError;

pub const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const ALL_DAYS: u8 = 0b111_1111;

/// Set of weekdays, Monday = 0 .. Sunday = 6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub const fn empty() -> Self {
        DaySet(0)
    }

    pub const fn all() -> Self {
        DaySet(ALL_DAYS)
    }

    /// Monday to Friday
    pub const fn weekdays() -> Self {
        DaySet(0b001_1111)
    }

    pub fn from_indices<I: IntoIterator<Item = u8>>(indices: I) -> Self {
        let mut set = DaySet::empty();
        for i in indices {
            set.insert_index(i);
        }
        set
    }

    fn insert_index(&mut self, index: u8) {
        if index < 7 {
            self.0 |= 1 << index;
        }
    }

    pub fn insert(&mut self, day: Weekday) {
        self.insert_index(day.num_days_from_monday() as u8);
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Day indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..7).filter(move |i| self.0 & (1 << i) != 0)
    }

    /// Storage form: ascending digits joined by commas, e.g. `0,1,2`
    pub fn to_canonical(&self) -> String {
        self.indices()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the storage form.
    ///
    /// An empty string is a valid (empty) set here; only user input must be
    /// non-empty.
    pub fn from_canonical(s: &str) -> Result<Self, ScheduleError> {
        let mut set = DaySet::empty();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            set.insert_index(parse_digit(token).ok_or_else(|| ScheduleError::InvalidDayToken(token.to_string()))?);
        }
        Ok(set)
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.indices().map(|i| DAY_NAMES[i as usize]).collect();
        f.write_str(&names.join(", "))
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DaySet::from_canonical(&s).map_err(serde::de::Error::custom)
    }
}

fn parse_digit(token: &str) -> Option<u8> {
    match token.parse::<u8>() {
        Ok(d) if d <= 6 && token.bytes().all(|b| b.is_ascii_digit()) => Some(d),
        _ => None,
    }
}

fn parse_abbrev(token: &str) -> Option<u8> {
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(token))
        .map(|i| i as u8)
}

/// Parse user input like `mon,tue,wed` or `0,1,2` into a day set.
///
/// Tokens are trimmed and case-insensitive, blanks are skipped, duplicates
/// collapse. Fails on the first token that is neither a three-letter day
/// name nor a digit 0-6, and when nothing is left.
pub fn parse_days_input(input: &str) -> Result<DaySet, ScheduleError> {
    let mut set = DaySet::empty();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let lower = token.to_lowercase();
        let day = parse_abbrev(&lower)
            .or_else(|| parse_digit(&lower))
            .ok_or(ScheduleError::InvalidDayToken(lower))?;
        set.insert_index(day);
    }
    if set.is_empty() {
        return Err(ScheduleError::EmptyDaySet);
    }
    Ok(set)
}

/// Turn stored `0,1,2` into `Mon, Tue, Wed`.
///
/// Anything that does not parse as in-range digits is returned unchanged.
pub fn format_days_display(canonical: &str) -> String {
    let mut names = Vec::new();
    for token in canonical.split(',') {
        match parse_digit(token.trim()) {
            Some(d) => names.push(DAY_NAMES[d as usize]),
            None => return canonical.to_string(),
        }
    }
    names.join(", ")
}
