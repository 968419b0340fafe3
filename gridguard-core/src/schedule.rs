//! Boundary detection for timed resets.
//!
//! Timed events are detected by polling: every cycle compares the current
//! wall time against a stored "next boundary" value. The comparison is a
//! pure function of `(now, stored_boundary)` so it is unit-testable with
//! an injected clock, and it is idempotent — if cycles are skipped, the
//! next cycle still fires exactly one reset and advances the boundary
//! past `now`.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};

/// Result of one boundary poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoll {
    /// A boundary was crossed since the last poll.
    pub fire: bool,
    /// The boundary to store for the next poll. Always strictly after `now`
    /// when `fire` is true.
    pub next: DateTime<Utc>,
}

/// First daily reset instant strictly after `after`.
pub fn next_daily_boundary(after: DateTime<Utc>, reset_hour: u32) -> DateTime<Utc> {
    debug_assert!(reset_hour < 24);
    let candidate = Utc
        .with_ymd_and_hms(after.year(), after.month(), after.day(), reset_hour, 0, 0)
        .single()
        .expect("valid reset time");
    if candidate > after {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// First weekly reset instant strictly after `after`.
pub fn next_weekly_boundary(after: DateTime<Utc>, weekday: Weekday, reset_hour: u32) -> DateTime<Utc> {
    let mut candidate = next_daily_boundary(after, reset_hour);
    while candidate.weekday() != weekday {
        candidate += Duration::days(1);
    }
    candidate
}

/// Poll a daily boundary. `stored_next` is the value returned by the
/// previous poll (or [`next_daily_boundary`] at init).
pub fn poll_daily(now: DateTime<Utc>, stored_next: DateTime<Utc>, reset_hour: u32) -> BoundaryPoll {
    if now < stored_next {
        return BoundaryPoll { fire: false, next: stored_next };
    }
    BoundaryPoll { fire: true, next: next_daily_boundary(now, reset_hour) }
}

/// Poll a weekly boundary.
pub fn poll_weekly(
    now: DateTime<Utc>,
    stored_next: DateTime<Utc>,
    weekday: Weekday,
    reset_hour: u32,
) -> BoundaryPoll {
    if now < stored_next {
        return BoundaryPoll { fire: false, next: stored_next };
    }
    BoundaryPoll { fire: true, next: next_weekly_boundary(now, weekday, reset_hour) }
}
