//! Versioned state record for restart continuity.
//!
//! Storage is collaborator-owned; this module only defines the record and
//! the acceptance rules: a load is treated as "no state" when the version
//! does not match or the record is older than 24 hours.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bump when the record layout changes; older records are discarded.
pub const STATE_VERSION: u32 = 2;

/// Maximum age before a stored record is considered stale.
pub const MAX_STATE_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub high_water_mark: f64,
    pub daily_pl_pct: f64,
    pub emergency_trigger_count: u32,
    pub hard_stop_trigger_count: u32,
    pub last_reset_time: DateTime<Utc>,
}

impl SavedState {
    /// Gate a loaded record. Returns `None` when it must be ignored.
    pub fn accept(self, now: DateTime<Utc>) -> Option<SavedState> {
        if self.version != STATE_VERSION {
            tracing::warn!(found = self.version, expected = STATE_VERSION, "stored state version mismatch, ignoring");
            return None;
        }
        if now - self.timestamp > Duration::hours(MAX_STATE_AGE_HOURS) {
            tracing::warn!(age_hours = (now - self.timestamp).num_hours(), "stored state stale, ignoring");
            return None;
        }
        Some(self)
    }
}
