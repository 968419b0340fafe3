//! Session breaker: stops trading for the rest of the day once the daily
//! loss limit is breached. Sticky until the next daily boundary, not
//! sticky forever.

use chrono::{DateTime, Utc};

use crate::breakers::BreakerStatus;
use crate::config::DailyLossConfig;

#[derive(Debug, Clone)]
pub struct DailyLossLimit {
    limit_pct: f64,
    status: BreakerStatus,
    trigger_count: u32,
}

impl DailyLossLimit {
    pub fn new(cfg: &DailyLossConfig) -> Self {
        Self { limit_pct: cfg.limit_pct, status: BreakerStatus::Inactive, trigger_count: 0 }
    }

    pub fn status(&self) -> BreakerStatus {
        self.status
    }

    pub fn trigger_count(&self) -> u32 {
        self.trigger_count
    }

    /// Evaluate against the signed daily P/L percentage. Returns whether
    /// trading is blocked for the rest of the session.
    pub fn check(&mut self, daily_pl_pct: f64, now: DateTime<Utc>) -> bool {
        if self.status.is_triggered() {
            // Intraday recovery does not un-trip the layer.
            return true;
        }
        if daily_pl_pct <= -self.limit_pct {
            self.status = BreakerStatus::Triggered { since: now };
            self.trigger_count += 1;
            tracing::warn!(daily_pl_pct, limit = self.limit_pct, "daily loss limit hit");
            return true;
        }
        false
    }

    /// Called when the daily boundary rolls: the layer auto-clears.
    pub fn on_daily_boundary(&mut self) {
        if self.status.is_triggered() {
            tracing::info!("daily loss limit cleared at day boundary");
        }
        self.status = BreakerStatus::Inactive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn limit() -> DailyLossLimit {
        DailyLossLimit::new(&DailyLossConfig { limit_pct: 5.0 })
    }

    #[test]
    fn trips_at_limit() {
        let mut dl = limit();
        assert!(!dl.check(-4.9, t0()));
        assert!(dl.check(-6.0, t0()));
        assert_eq!(dl.trigger_count(), 1);
    }

    #[test]
    fn stays_tripped_despite_intraday_recovery() {
        let mut dl = limit();
        // Equity 10_000 -> 9_400 is -6%, beyond the 5% limit.
        assert!(dl.check(-6.0, t0()));
        // Recovery to -4% within the same day: still blocked.
        assert!(dl.check(-4.0, t0()));
        assert!(dl.check(1.0, t0()));
        assert_eq!(dl.trigger_count(), 1);
    }

    #[test]
    fn clears_at_day_boundary() {
        let mut dl = limit();
        dl.check(-6.0, t0());
        dl.on_daily_boundary();
        assert_eq!(dl.status(), BreakerStatus::Inactive);
        assert!(!dl.check(-1.0, t0()));
    }

    #[test]
    fn exact_limit_counts_as_hit() {
        let mut dl = limit();
        assert!(dl.check(-5.0, t0()));
    }
}
