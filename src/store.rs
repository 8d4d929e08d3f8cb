//! Schedule persistence
//!
//! One [`ScheduleRecord`] per user, kept in a JSON file:
//! ```text
//! schedules.json   <- array of records, rewritten on every change
//! ```
//! Writes go to a temp file next to it and are renamed into place, so a
//! crash mid-write leaves the previous file intact.

use chrono::{DateTime, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::schedule::{DaySet, ScheduleRecord, UserId};

/// Errors produced by [`FileStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keyed schedule storage used by the command surface and the tick driver
pub trait ScheduleStore: Send + Sync {
    /// Create or replace a user's schedule. Clears any sick override.
    fn upsert(
        &self,
        user_id: UserId,
        timezone: &str,
        start: NaiveTime,
        end: NaiveTime,
        days: DaySet,
    ) -> Result<(), StoreError>;

    fn get(&self, user_id: UserId) -> Result<Option<ScheduleRecord>, StoreError>;

    /// Set or clear the sick override. Returns false if the user has no schedule.
    fn set_sick(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> Result<bool, StoreError>;

    /// Replace the day set. Returns false if the user has no schedule.
    fn set_days(&self, user_id: UserId, days: DaySet) -> Result<bool, StoreError>;

    /// Snapshot of every stored schedule
    fn get_all(&self) -> Result<Vec<ScheduleRecord>, StoreError>;
}

/// JSON-file backed store; `in_memory()` skips persistence entirely
pub struct FileStore {
    path: Option<PathBuf>,
    rows: Mutex<BTreeMap<UserId, ScheduleRecord>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing rows if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let rows = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let records: Vec<ScheduleRecord> = if json.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&json)?
            };
            records.into_iter().map(|r| (r.user_id, r)).collect()
        } else {
            BTreeMap::new()
        };

        info!("Schedule store opened at {} ({} schedules)", path.display(), rows.len());

        Ok(Self {
            path: Some(path),
            rows: Mutex::new(rows),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<UserId, ScheduleRecord>> {
        // A panic while holding the lock cannot leave a half-written row behind
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, rows: &BTreeMap<UserId, ScheduleRecord>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let records: Vec<&ScheduleRecord> = rows.values().collect();
        let json = serde_json::to_string_pretty(&records)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!("Persisted {} schedules to {}", records.len(), path.display());
        Ok(())
    }

    /// Apply `f` to a copy of the rows, persist it, then swap it in.
    ///
    /// A failed write leaves the in-memory rows untouched.
    fn commit<F>(&self, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut BTreeMap<UserId, ScheduleRecord>) -> bool,
    {
        let mut rows = self.lock();
        let mut next = rows.clone();
        if !f(&mut next) {
            return Ok(false);
        }
        self.persist(&next)?;
        *rows = next;
        Ok(true)
    }

    /// Apply `f` to an existing row and persist. Returns false if absent.
    fn update<F>(&self, user_id: UserId, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut ScheduleRecord),
    {
        self.commit(|rows| match rows.get_mut(&user_id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        })
    }
}

impl ScheduleStore for FileStore {
    fn upsert(
        &self,
        user_id: UserId,
        timezone: &str,
        start: NaiveTime,
        end: NaiveTime,
        days: DaySet,
    ) -> Result<(), StoreError> {
        let record = ScheduleRecord {
            user_id,
            timezone: timezone.to_string(),
            start_time: start.format("%H:%M").to_string(),
            end_time: end.format("%H:%M").to_string(),
            days: days.to_canonical(),
            sick_until: None,
        };

        self.commit(|rows| {
            rows.insert(user_id, record);
            true
        })
        .map(|_| ())
    }

    fn get(&self, user_id: UserId) -> Result<Option<ScheduleRecord>, StoreError> {
        Ok(self.lock().get(&user_id).cloned())
    }

    fn set_sick(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> Result<bool, StoreError> {
        self.update(user_id, |record| record.sick_until = until)
    }

    fn set_days(&self, user_id: UserId, days: DaySet) -> Result<bool, StoreError> {
        self.update(user_id, |record| record.days = days.to_canonical())
    }

    fn get_all(&self) -> Result<Vec<ScheduleRecord>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }
}
