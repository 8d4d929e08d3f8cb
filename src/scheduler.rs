/// Tick driver
/// Runs the reconciliation pass on a fixed interval aligned to the wall clock

use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Wait from `now` (time since the Unix epoch) until the
/// next multiple of `interval`. Always waits at least a little so a tick
/// that lands exactly on a boundary does not fire twice.
pub fn time_until_next_tick_at(now: Duration, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1);
    let now_ms = now.as_millis();
    let into_interval = now_ms % interval_ms;
    let wait_ms = interval_ms - into_interval;
    Duration::from_millis(wait_ms as u64)
}

/// Format duration for logging
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let rem = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m {}s", mins, rem)
    } else {
        format!("{}s", rem)
    }
}

/// Run the tick loop until `cancel_token` fires.
///
/// The first tick runs immediately. Ticks never overlap: the next wait is
/// computed only after `tick_fn` has returned, and a tick in progress is
/// allowed to finish before shutdown.
pub async fn run_scheduler<F, Fut>(interval: Duration, cancel_token: CancellationToken, mut tick_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    info!("Scheduler started (every {})", format_duration(interval));

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        tick_fn().await;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let wait = time_until_next_tick_at(now, interval);
        debug!("Next tick in {}", format_duration(wait));

        tokio::select! {
            _ = sleep(wait) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    info!("Scheduler stopped");
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn wait_bounded_by_interval() {
        let now_secs: u32 = kani::any();
        let interval_secs: u16 = kani::any();
        kani::assume(interval_secs > 0 && interval_secs <= 3600);

        let interval = Duration::from_secs(interval_secs as u64);
        let wait = time_until_next_tick_at(Duration::from_secs(now_secs as u64), interval);

        kani::assert(wait > Duration::ZERO, "wait must be positive");
        kani::assert(wait <= interval, "wait must not exceed the interval");
    }
}
