//! Terminal drawdown breaker.
//!
//! Latching: once tripped it blocks unconditionally until an explicit,
//! confirmed manual reset. A catastrophic loss event must never
//! self-heal.

use chrono::{DateTime, Duration, Utc};

use crate::breakers::BreakerStatus;
use crate::config::HardStopConfig;

/// Outcome of one hard-stop check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardStopCheck {
    pub blocked: bool,
    /// True only on the cycle where the layer transitioned into the lock.
    /// The caller must flatten the book exactly once, on this transition.
    pub just_tripped: bool,
}

#[derive(Debug, Clone)]
pub struct HardStop {
    trigger_pct: f64,
    warning_pct: f64,
    settle: Duration,
    status: BreakerStatus,
    trigger_count: u32,
}

impl HardStop {
    pub fn new(cfg: &HardStopConfig) -> Self {
        Self {
            trigger_pct: cfg.trigger_pct,
            warning_pct: cfg.warning_pct,
            settle: Duration::minutes(cfg.reset_settle_minutes),
            status: BreakerStatus::Inactive,
            trigger_count: 0,
        }
    }

    pub fn status(&self) -> BreakerStatus {
        self.status
    }

    pub fn is_locked(&self) -> bool {
        self.status.is_triggered()
    }

    pub fn trigger_count(&self) -> u32 {
        self.trigger_count
    }

    pub fn check(&mut self, dd: f64, now: DateTime<Utc>) -> HardStopCheck {
        match self.status {
            // Latched: blocked regardless of where drawdown sits now.
            BreakerStatus::Triggered { .. } => HardStopCheck { blocked: true, just_tripped: false },
            BreakerStatus::Cooldown { until } => {
                if now >= until {
                    self.status = BreakerStatus::Inactive;
                    self.evaluate_thresholds(dd, now)
                } else {
                    // Settle window after a manual reset: still no new exposure.
                    HardStopCheck { blocked: true, just_tripped: false }
                }
            }
            BreakerStatus::Inactive | BreakerStatus::Warning => self.evaluate_thresholds(dd, now),
        }
    }

    fn evaluate_thresholds(&mut self, dd: f64, now: DateTime<Utc>) -> HardStopCheck {
        if dd >= self.trigger_pct {
            self.status = BreakerStatus::Triggered { since: now };
            self.trigger_count += 1;
            tracing::error!(dd, trigger = self.trigger_pct, "hard stop tripped, trading halted");
            return HardStopCheck { blocked: true, just_tripped: true };
        }
        if dd >= self.warning_pct {
            if self.status != BreakerStatus::Warning {
                tracing::warn!(dd, warning = self.warning_pct, "approaching hard stop");
            }
            self.status = BreakerStatus::Warning;
        } else {
            self.status = BreakerStatus::Inactive;
        }
        HardStopCheck { blocked: false, just_tripped: false }
    }

    /// Manual recovery. Clears the lock only with `confirmed == true`;
    /// the layer then holds in a settle window before trading resumes.
    /// Returns whether the reset was applied.
    pub fn manual_reset(&mut self, confirmed: bool, now: DateTime<Utc>) -> bool {
        if !confirmed || !self.status.is_triggered() {
            return false;
        }
        self.status = BreakerStatus::Cooldown { until: now + self.settle };
        tracing::warn!(settle_minutes = self.settle.num_minutes(), "hard stop manually reset");
        true
    }

    /// Administrative override used by the scheduled full reset. Clears
    /// the lock with no settle window.
    pub fn admin_clear(&mut self) {
        self.status = BreakerStatus::Inactive;
    }
}
