//! Tick orchestration
//!
//! One reconciliation pass: snapshot schedules, work out who is on shift and
//! make the guild role match.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::health::TickMetrics;
use crate::roles::{RoleSync, SyncReport};
use crate::schedule::{resolve_population, UserId};
use crate::store::ScheduleStore;

/// Run a single reconciliation tick at `now`.
///
/// Failures are logged and recorded in `metrics`; the caller keeps ticking.
/// Returns the sync report when the role pass completed.
pub async fn run_tick<S, R>(store: &S, roles: &R, metrics: &TickMetrics, now: DateTime<Utc>) -> Option<SyncReport>
where
    S: ScheduleStore + ?Sized,
    R: RoleSync,
{
    let records = match store.get_all() {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to load schedules: {}", e);
            metrics.record_failure();
            return None;
        }
    };

    let population = resolve_population(&records, now);
    if !population.failed.is_empty() {
        warn!(
            "{} of {} schedules could not be evaluated",
            population.failed.len(),
            records.len()
        );
    }

    let active: HashSet<UserId> = population.active.iter().copied().collect();

    match roles.sync_roles(&active).await {
        Ok(report) => {
            metrics.record_success(active.len(), report.changes());
            if report.changes() > 0 || !report.failed.is_empty() {
                info!(
                    "Tick: {} active, {} added, {} removed, {} failed",
                    active.len(),
                    report.added,
                    report.removed,
                    report.failed.len()
                );
            } else {
                info!("Tick: {} active, no role changes", active.len());
            }
            Some(report)
        }
        Err(e) => {
            error!("Role sync failed: {:#}", e);
            metrics.record_failure();
            None
        }
    }
}
