//! System-wide state enum and the single mutation point for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::RingBuffer;

/// Overall engine state, resolved once per cycle to the highest-priority
/// active condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    Initializing,
    Idle,
    Trading,
    Paused,
    Emergency,
    Locked,
    DeEscalating,
    Recovery,
    Stopped,
    Error,
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SystemState::Initializing => "Initializing",
            SystemState::Idle => "Idle",
            SystemState::Trading => "Trading",
            SystemState::Paused => "Paused",
            SystemState::Emergency => "Emergency",
            SystemState::Locked => "Locked",
            SystemState::DeEscalating => "DeEscalating",
            SystemState::Recovery => "Recovery",
            SystemState::Stopped => "Stopped",
            SystemState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Structured cause attached to every state transition. Free text stays in
/// the human-facing log line, never in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateReason {
    Startup,
    MarketClear,
    EntriesOpen,
    HardStopTripped,
    DailyLimitHit,
    HedgeLockEngaged,
    RecoveryStarted,
    RecoveryComplete,
    EmergencyActive,
    AdminReset,
    ManualReset,
    FlattenFailed,
    TelemetryLost,
}

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub at: DateTime<Utc>,
    pub from: SystemState,
    pub to: SystemState,
    pub reason: StateReason,
}

/// Owns `SystemState`. All mutation goes through [`StateMachine::set_state`],
/// which records the transition time and silently rejects no-op transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: SystemState,
    changed_at: DateTime<Utc>,
    log: RingBuffer<Transition>,
}

impl StateMachine {
    pub fn new(now: DateTime<Utc>, log_capacity: usize) -> Self {
        Self {
            current: SystemState::Initializing,
            changed_at: now,
            log: RingBuffer::new(log_capacity),
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    /// Apply a transition. Returns `false` (and does nothing) when the
    /// target equals the current state.
    pub fn set_state(&mut self, new: SystemState, reason: StateReason, now: DateTime<Utc>) -> bool {
        if new == self.current {
            return false;
        }
        let transition = Transition { at: now, from: self.current, to: new, reason };
        tracing::info!(from = %transition.from, to = %transition.to, ?reason, "state transition");
        self.log.push(transition);
        self.current = new;
        self.changed_at = now;
        true
    }

    /// Recent transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.log.iter()
    }
}
