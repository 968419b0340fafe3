//! GridGuard Core — capital-preservation control layer for a grid strategy.
//!
//! The heart of the crate:
//! - Domain types (instruments, positions, exposure, grid levels, state)
//! - Drawdown tracking with a monotonic high-water mark
//! - Four-layer protection cascade evaluated in fixed priority order
//! - Drawdown-adaptive sizing and volatility-driven grid spacing
//! - De-escalation engine that unwinds a hedge-locked book
//! - Per-cycle orchestrator over injectable collaborator ports

pub mod breakers;
pub mod config;
pub mod deescalation;
pub mod domain;
pub mod drawdown;
pub mod history;
pub mod orchestrator;
pub mod persist;
pub mod ports;
pub mod retry;
pub mod schedule;
pub mod sizing;
pub mod spacing;

pub use breakers::{CascadeDecision, ProtectionCascade};
pub use config::{ConfigError, GuardConfig};
pub use orchestrator::{CycleIo, CycleReport, EngineContext, EntryPlan};
