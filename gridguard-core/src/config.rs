//! Engine configuration.
//!
//! All thresholds are validated at construction; the cascade never runs
//! with an invalid ordering of thresholds.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal breaker thresholds, in percent drawdown from starting balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardStopConfig {
    pub trigger_pct: f64,
    /// Informational warning level. Defaults to 0.9 × trigger.
    pub warning_pct: f64,
    /// Settle window after a confirmed manual reset, in minutes. No new
    /// exposure while it runs.
    pub reset_settle_minutes: i64,
}

impl Default for HardStopConfig {
    fn default() -> Self {
        Self { trigger_pct: 25.0, warning_pct: 22.5, reset_settle_minutes: 60 }
    }
}

/// Session breaker: daily loss as a percentage of day-start equity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyLossConfig {
    pub limit_pct: f64,
}

impl Default for DailyLossConfig {
    fn default() -> Self {
        Self { limit_pct: 5.0 }
    }
}

/// Exposure-freezing hedge lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HedgeConfig {
    pub enabled: bool,
    /// Drawdown (from high-water mark) at which the book is frozen.
    pub trigger_pct: f64,
    /// Net exposure below this is treated as already flat.
    pub epsilon_lots: f64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self { enabled: true, trigger_pct: 15.0, epsilon_lots: 0.001 }
    }
}

/// Hysteretic size/entry breaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyConfig {
    pub trigger_pct: f64,
    pub warning_pct: f64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self { trigger_pct: 10.0, warning_pct: 8.0 }
    }
}

/// Drawdown-adaptive position sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizingConfig {
    /// Drawdown at which the multiplier starts shrinking below 1.0.
    pub reduction_start_pct: f64,
    /// Drawdown at which the multiplier bottoms out.
    pub reduction_full_pct: f64,
    pub min_multiplier: f64,
    /// Multiplier applied on the first sizing call after a reduction
    /// episode fully recovers.
    pub recovery_boost: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            reduction_start_pct: 5.0,
            reduction_full_pct: 15.0,
            min_multiplier: 0.25,
            recovery_boost: 1.0,
        }
    }
}

/// Grid spacing, in points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpacingConfig {
    /// When false, `fixed_points` is used unconditionally.
    pub dynamic: bool,
    pub fixed_points: f64,
    pub atr_multiplier: f64,
    pub min_dynamic_points: f64,
    pub max_dynamic_points: f64,
    /// Per-level lot growth factor (1.0 disables martingale scaling).
    pub level_lot_multiplier: f64,
    /// Fixed capacity of each directional grid, set at init.
    pub max_levels: usize,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            dynamic: true,
            fixed_points: 300.0,
            atr_multiplier: 1.5,
            min_dynamic_points: 100.0,
            max_dynamic_points: 2000.0,
            level_lot_multiplier: 1.0,
            max_levels: 10,
        }
    }
}

/// De-escalation (recovery) parameters, active while the book is locked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub scalp_lot: f64,
    pub scalp_tp_points: f64,
    /// Wider than the take-profit so scalps fail slow and win fast.
    pub scalp_sl_points: f64,
    pub scalp_cooldown_secs: i64,
    /// Volume shaved off the worst position per funded partial close.
    pub close_increment_lots: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scalp_lot: 0.01,
            scalp_tp_points: 100.0,
            scalp_sl_points: 300.0,
            scalp_cooldown_secs: 300,
            close_increment_lots: 0.01,
        }
    }
}

/// Timed reset schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Hour (UTC) of the daily equity re-base.
    pub daily_reset_hour: u32,
    pub weekly_reset_enabled: bool,
    pub weekly_reset_weekday: Weekday,
    /// Administrative override: a weekly reset clears even a latched hard
    /// stop. Off by default; intended for unattended simulation only.
    pub weekly_reset_clears_hard_stop: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_reset_hour: 0,
            weekly_reset_enabled: false,
            weekly_reset_weekday: Weekday::Sun,
            weekly_reset_clears_hard_stop: false,
        }
    }
}

/// Bounded retry for transient gateway failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, delay_ms: 250 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    /// Base lot before the adaptive multiplier.
    pub base_lot: f64,
    /// Capacity of the recent-equity window.
    pub equity_history_len: usize,
    pub hard_stop: HardStopConfig,
    pub daily_loss: DailyLossConfig,
    pub hedge: HedgeConfig,
    pub emergency: EmergencyConfig,
    pub sizing: SizingConfig,
    pub spacing: SpacingConfig,
    pub recovery: RecoveryConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            base_lot: 0.01,
            equity_history_len: 256,
            hard_stop: HardStopConfig::default(),
            daily_loss: DailyLossConfig::default(),
            hedge: HedgeConfig::default(),
            emergency: EmergencyConfig::default(),
            sizing: SizingConfig::default(),
            spacing: SpacingConfig::default(),
            recovery: RecoveryConfig::default(),
            schedule: ScheduleConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Validate threshold ordering and value ranges. Called once at engine
    /// construction; a failure here aborts initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_lot <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "base_lot",
                detail: format!("must be positive, got {}", self.base_lot),
            });
        }
        if self.equity_history_len == 0 {
            return Err(ConfigError::OutOfRange {
                field: "equity_history_len",
                detail: "must be at least 1".into(),
            });
        }
        if self.hard_stop.warning_pct >= self.hard_stop.trigger_pct {
            return Err(ConfigError::InvertedThresholds {
                layer: "hard_stop",
                warning: self.hard_stop.warning_pct,
                trigger: self.hard_stop.trigger_pct,
            });
        }
        if self.emergency.warning_pct >= self.emergency.trigger_pct {
            return Err(ConfigError::InvertedThresholds {
                layer: "emergency",
                warning: self.emergency.warning_pct,
                trigger: self.emergency.trigger_pct,
            });
        }
        if self.daily_loss.limit_pct <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "daily_loss.limit_pct",
                detail: format!("must be positive, got {}", self.daily_loss.limit_pct),
            });
        }
        // The hedge freeze must engage above the stop-new level and below
        // the terminal stop, or the cascade priority is meaningless.
        if self.hedge.enabled
            && (self.hedge.trigger_pct < self.emergency.trigger_pct
                || self.hedge.trigger_pct >= self.hard_stop.trigger_pct)
        {
            return Err(ConfigError::LayerOrdering {
                detail: format!(
                    "hedge trigger {} must lie in [emergency trigger {}, hard stop trigger {})",
                    self.hedge.trigger_pct,
                    self.emergency.trigger_pct,
                    self.hard_stop.trigger_pct
                ),
            });
        }
        if self.sizing.reduction_start_pct >= self.sizing.reduction_full_pct {
            return Err(ConfigError::OutOfRange {
                field: "sizing.reduction_start_pct",
                detail: format!(
                    "reduction band inverted: start {} >= full {}",
                    self.sizing.reduction_start_pct, self.sizing.reduction_full_pct
                ),
            });
        }
        if !(0.0 < self.sizing.min_multiplier && self.sizing.min_multiplier <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "sizing.min_multiplier",
                detail: format!("must be in (0, 1], got {}", self.sizing.min_multiplier),
            });
        }
        if self.sizing.recovery_boost < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "sizing.recovery_boost",
                detail: format!("must be >= 1.0, got {}", self.sizing.recovery_boost),
            });
        }
        if self.spacing.fixed_points <= 0.0
            || self.spacing.min_dynamic_points <= 0.0
            || self.spacing.min_dynamic_points > self.spacing.max_dynamic_points
        {
            return Err(ConfigError::OutOfRange {
                field: "spacing",
                detail: format!(
                    "fixed={}, min={}, max={}",
                    self.spacing.fixed_points,
                    self.spacing.min_dynamic_points,
                    self.spacing.max_dynamic_points
                ),
            });
        }
        if self.spacing.level_lot_multiplier < 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "spacing.level_lot_multiplier",
                detail: format!("must be >= 1.0, got {}", self.spacing.level_lot_multiplier),
            });
        }
        if self.spacing.max_levels == 0 {
            return Err(ConfigError::OutOfRange {
                field: "spacing.max_levels",
                detail: "grid capacity must be at least 1".into(),
            });
        }
        if self.recovery.enabled {
            if self.recovery.scalp_lot <= 0.0 || self.recovery.close_increment_lots <= 0.0 {
                return Err(ConfigError::OutOfRange {
                    field: "recovery",
                    detail: "scalp_lot and close_increment_lots must be positive".into(),
                });
            }
            if self.recovery.scalp_tp_points <= 0.0
                || self.recovery.scalp_sl_points <= self.recovery.scalp_tp_points
            {
                return Err(ConfigError::OutOfRange {
                    field: "recovery.scalp_sl_points",
                    detail: format!(
                        "stop {} must exceed take-profit {}",
                        self.recovery.scalp_sl_points, self.recovery.scalp_tp_points
                    ),
                });
            }
        }
        if self.schedule.daily_reset_hour >= 24 {
            return Err(ConfigError::OutOfRange {
                field: "schedule.daily_reset_hour",
                detail: format!("must be 0..=23, got {}", self.schedule.daily_reset_hour),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "retry.max_attempts",
                detail: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{layer}: warning threshold {warning} must be below trigger threshold {trigger}")]
    InvertedThresholds { layer: &'static str, warning: f64, trigger: f64 },

    #[error("cascade layer ordering invalid: {detail}")]
    LayerOrdering { detail: String },

    #[error("{field}: {detail}")]
    OutOfRange { field: &'static str, detail: String },
}
