/// Shift window membership for a single local time-of-day
use chrono::NaiveTime;

/// Check whether `now` falls inside the shift window `start..=end`.
///
/// Both ends are inclusive. When `end` is earlier than `start` the window
/// wraps past midnight (22:00-06:00 covers 23:30 and 05:00). A window with
/// `start == end` has no length and is never active.
pub fn is_in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= now && now <= end
    } else if start > end {
        now >= start || now <= end
    } else {
        false
    }
}

/// True when the window wraps past midnight
pub(crate) fn is_overnight(start: NaiveTime, end: NaiveTime) -> bool {
    start > end
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn overnight_window_covers_midnight() {
        let start: u32 = kani::any();
        let end: u32 = kani::any();
        kani::assume(start < 1440 && end < start);

        let s = NaiveTime::from_hms_opt(start / 60, start % 60, 0).unwrap();
        let e = NaiveTime::from_hms_opt(end / 60, end % 60, 0).unwrap();
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();

        kani::assert(is_in_window(midnight, s, e), "overnight window must contain midnight");
    }

    #[kani::proof]
    fn degenerate_window_never_active() {
        let at: u32 = kani::any();
        let now: u32 = kani::any();
        kani::assume(at < 1440 && now < 1440);

        let t = NaiveTime::from_hms_opt(at / 60, at % 60, 0).unwrap();
        let n = NaiveTime::from_hms_opt(now / 60, now % 60, 0).unwrap();

        kani::assert(!is_in_window(n, t, t), "zero-length window must be inactive");
    }
}
