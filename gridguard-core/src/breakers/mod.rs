//! The four protection layers and their fixed-priority orchestration.

pub mod cascade;
pub mod daily_loss;
pub mod emergency;
pub mod hard_stop;
pub mod hedge_lock;

pub use cascade::{CascadeDecision, ProtectionCascade};
pub use daily_loss::DailyLossLimit;
pub use emergency::{EmergencyAction, EmergencyStop};
pub use hard_stop::{HardStop, HardStopCheck};
pub use hedge_lock::{HedgeLockState, HedgeSoftLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one breaker layer.
///
/// `Triggered` and `Cooldown` carry their timestamps so the transition
/// history survives in the layer itself rather than in ad-hoc fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BreakerStatus {
    Inactive,
    Warning,
    Triggered { since: DateTime<Utc> },
    Cooldown { until: DateTime<Utc> },
}

impl BreakerStatus {
    pub fn is_triggered(&self) -> bool {
        matches!(self, BreakerStatus::Triggered { .. })
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self, BreakerStatus::Inactive)
    }
}

impl std::fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerStatus::Inactive => write!(f, "inactive"),
            BreakerStatus::Warning => write!(f, "warning"),
            BreakerStatus::Triggered { since } => write!(f, "triggered since {since}"),
            BreakerStatus::Cooldown { until } => write!(f, "cooling down until {until}"),
        }
    }
}
