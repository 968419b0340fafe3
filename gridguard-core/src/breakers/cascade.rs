//! Fixed-priority orchestration of the four protection layers.
//!
//! Evaluation order is not configurable: a terminal stop must dominate
//! everything; a daily stop must dominate intraday hedging and sizing;
//! hedging (which spends margin on an opposing order) takes precedence
//! over simple size reduction because it is the stronger protection.

use chrono::{DateTime, Utc};

use crate::breakers::daily_loss::DailyLossLimit;
use crate::breakers::emergency::{EmergencyAction, EmergencyStop};
use crate::breakers::hard_stop::HardStop;
use crate::breakers::hedge_lock::HedgeSoftLock;
use crate::config::GuardConfig;
use crate::domain::position::OpenPosition;
use crate::domain::snapshot::ExposureSnapshot;
use crate::drawdown::DrawdownSnapshot;
use crate::ports::{AlertEvent, AlertSink, OrderGateway};
use crate::retry::RetryPolicy;

/// Outcome of one cascade pass, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDecision {
    /// Terminal stop. On `just_tripped` the caller must flatten the whole
    /// book exactly once; afterwards the lock simply holds.
    HardStopped { just_tripped: bool },
    /// Daily loss limit reached; no trading until the day boundary.
    DailyStopped,
    /// Exposure is frozen; de-escalation may run.
    HedgeLocked,
    /// No new entries; existing positions are still managed.
    StopNew,
    /// Entries allowed at reduced size.
    ReduceSize,
    /// Nothing blocks.
    Clear,
}

impl CascadeDecision {
    /// Whether new grid entries are permitted under this decision.
    pub fn allows_new_entries(&self) -> bool {
        matches!(self, CascadeDecision::ReduceSize | CascadeDecision::Clear)
    }
}

pub struct ProtectionCascade {
    pub hard_stop: HardStop,
    pub daily_loss: DailyLossLimit,
    pub hedge_lock: HedgeSoftLock,
    pub emergency: EmergencyStop,
}

impl ProtectionCascade {
    pub fn new(cfg: &GuardConfig) -> Self {
        Self {
            hard_stop: HardStop::new(&cfg.hard_stop),
            daily_loss: DailyLossLimit::new(&cfg.daily_loss),
            hedge_lock: HedgeSoftLock::new(&cfg.hedge),
            emergency: EmergencyStop::new(&cfg.emergency),
        }
    }

    /// Evaluate all layers in priority order, short-circuiting on the
    /// first one that blocks.
    ///
    /// The terminal stop watches loss of starting capital
    /// (`dd_from_balance`); the hedge lock and the emergency stop watch
    /// the episode drawdown (`dd_from_hwm`); the daily limit watches the
    /// signed daily performance.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &mut self,
        dd: &DrawdownSnapshot,
        positions: &[OpenPosition],
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        alerts: &dyn AlertSink,
        now: DateTime<Utc>,
    ) -> CascadeDecision {
        let hard = self.hard_stop.check(dd.dd_from_balance, now);
        if hard.blocked {
            if hard.just_tripped {
                alerts.notify(&AlertEvent::HardStopTripped { drawdown_pct: dd.dd_from_balance });
            }
            return CascadeDecision::HardStopped { just_tripped: hard.just_tripped };
        }

        let daily_was_triggered = self.daily_loss.status().is_triggered();
        if self.daily_loss.check(dd.daily_pl_pct, now) {
            if !daily_was_triggered {
                alerts.notify(&AlertEvent::DailyLimitHit { daily_pl_pct: dd.daily_pl_pct });
            }
            return CascadeDecision::DailyStopped;
        }

        // Exposure is computed fresh here, at evaluation time, never
        // carried over from a previous cycle.
        let exposure = ExposureSnapshot::from_positions(positions);
        if self.hedge_lock.check(
            dd.dd_from_hwm,
            &exposure,
            dd.current_equity,
            gateway,
            retry,
            alerts,
            now,
        ) {
            return CascadeDecision::HedgeLocked;
        }

        let emergency_was_triggered = self.emergency.status().is_triggered();
        match self.emergency.check(dd.dd_from_hwm, now) {
            EmergencyAction::StopNew => {
                if !emergency_was_triggered {
                    alerts.notify(&AlertEvent::EmergencyEntered { drawdown_pct: dd.dd_from_hwm });
                }
                CascadeDecision::StopNew
            }
            EmergencyAction::ReduceSize => CascadeDecision::ReduceSize,
            EmergencyAction::None => CascadeDecision::Clear,
        }
    }

    /// Propagate a daily boundary crossing to the session layer.
    pub fn on_daily_boundary(&mut self) {
        self.daily_loss.on_daily_boundary();
    }

    /// Scheduled administrative reset. Clears the session and emergency
    /// layers and drops a hedge lock; the latched hard stop is cleared
    /// only when explicitly requested by configuration.
    pub fn admin_reset(&mut self, clear_hard_stop: bool) {
        self.daily_loss.on_daily_boundary();
        self.emergency.admin_clear();
        self.hedge_lock.admin_clear();
        if clear_hard_stop {
            tracing::warn!("administrative reset cleared a latched hard stop");
            self.hard_stop.admin_clear();
        }
    }
}
