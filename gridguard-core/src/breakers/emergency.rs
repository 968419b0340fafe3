//! Non-latching, hysteretic size/entry breaker.
//!
//! Above the trigger threshold new entries stop (existing positions are
//! still managed); in the warning band sizes shrink. Recovery requires
//! drawdown to fall below half the warning threshold so the layer does
//! not chatter at the boundary.

use chrono::{DateTime, Utc};

use crate::breakers::BreakerStatus;
use crate::config::EmergencyConfig;

/// What the layer asks of the caller this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyAction {
    None,
    ReduceSize,
    StopNew,
}

#[derive(Debug, Clone)]
pub struct EmergencyStop {
    trigger_pct: f64,
    warning_pct: f64,
    status: BreakerStatus,
    trigger_count: u32,
}

impl EmergencyStop {
    pub fn new(cfg: &EmergencyConfig) -> Self {
        Self {
            trigger_pct: cfg.trigger_pct,
            warning_pct: cfg.warning_pct,
            status: BreakerStatus::Inactive,
            trigger_count: 0,
        }
    }

    pub fn status(&self) -> BreakerStatus {
        self.status
    }

    pub fn trigger_count(&self) -> u32 {
        self.trigger_count
    }

    fn release_pct(&self) -> f64 {
        0.5 * self.warning_pct
    }

    pub fn check(&mut self, dd: f64, now: DateTime<Utc>) -> EmergencyAction {
        let engaged = !self.status.is_inactive();

        if dd >= self.trigger_pct {
            if !self.status.is_triggered() {
                self.trigger_count += 1;
                tracing::warn!(dd, trigger = self.trigger_pct, "emergency stop: new entries halted");
            }
            self.status = BreakerStatus::Triggered { since: now };
            return EmergencyAction::StopNew;
        }

        if engaged {
            // Hysteresis: hold a reduced state until well clear of the band.
            if dd < self.release_pct() {
                self.status = BreakerStatus::Inactive;
                tracing::info!(dd, release = self.release_pct(), "emergency stop released");
                return EmergencyAction::None;
            }
            self.status = BreakerStatus::Warning;
            return EmergencyAction::ReduceSize;
        }

        if dd >= self.warning_pct {
            self.status = BreakerStatus::Warning;
            return EmergencyAction::ReduceSize;
        }
        EmergencyAction::None
    }

    /// Administrative full reset.
    pub fn admin_clear(&mut self) {
        self.status = BreakerStatus::Inactive;
    }
}
