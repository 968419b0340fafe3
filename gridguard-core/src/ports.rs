//! Collaborator interfaces consumed by the engine.
//!
//! The engine never talks to a broker or platform API directly; everything
//! outside goes through these traits so tests and the simulator can stand
//! in for the real thing.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::position::{OpenPosition, PendingOrder, PositionKind, Ticket, TradeDirection};
use crate::domain::snapshot::{AccountView, CycleSnapshot, MarketView};

/// Current quotes plus the volatility reading for the configured
/// lookback/timeframe. Returns `None` when the feed is unavailable; the
/// cycle is skipped without touching engine state.
pub trait MarketData {
    fn view(&self) -> Option<MarketView>;
}

/// Current equity and balance. `None` on a failed read.
pub trait AccountTelemetry {
    fn sample(&self) -> Option<AccountView>;
}

/// Enumerates this strategy's own open positions and pending orders,
/// already filtered by instrument and strategy identifier.
pub trait PositionLedger {
    fn open_positions(&self) -> Vec<OpenPosition>;
    fn pending_orders(&self) -> Vec<PendingOrder>;
    /// Realized profit of a closed ticket, if the ledger still knows it.
    fn closed_profit(&self, ticket: Ticket) -> Option<f64>;
}

/// A new-order request. Take-profit and stop-loss are absolute prices.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub kind: PositionKind,
    pub direction: TradeDirection,
    pub volume: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

/// Order execution port. Success means the broker confirmed the state
/// change; on any error the caller must assume nothing happened.
pub trait OrderGateway {
    fn place_market(&mut self, request: &OrderRequest) -> Result<Ticket, OrderError>;
    fn close_position(&mut self, ticket: Ticket) -> Result<(), OrderError>;
    fn close_partial(&mut self, ticket: Ticket, volume: f64) -> Result<(), OrderError>;
    fn cancel_pending(&mut self, ticket: Ticket) -> Result<(), OrderError>;
}

/// Wall time, injectable for deterministic boundary tests.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Take the one consistent snapshot a cycle runs against. Returns `None`
/// when the market or account read fails; the caller skips the cycle and
/// engine state stays untouched.
pub fn gather_snapshot(
    market: &dyn MarketData,
    account: &dyn AccountTelemetry,
    ledger: &dyn PositionLedger,
    clock: &dyn Clock,
) -> Option<CycleSnapshot> {
    let market = market.view()?;
    let account = account.sample()?;
    Some(CycleSnapshot {
        time: clock.now(),
        market,
        account,
        positions: ledger.open_positions(),
        pending: ledger.pending_orders(),
    })
}

/// Fire-and-forget notification sink. Not required for correctness.
pub trait AlertSink {
    fn notify(&self, event: &AlertEvent);
}

/// No-op sink for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _event: &AlertEvent) {}
}

/// Transient failure kinds that are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Requote,
    Timeout,
    ConnectionLost,
    PriceOff,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransientKind::Requote => "requote",
            TransientKind::Timeout => "timeout",
            TransientKind::ConnectionLost => "connection lost",
            TransientKind::PriceOff => "price off",
        };
        write!(f, "{name}")
    }
}

/// Execution failure, classified for retry decisions: transient errors are
/// retried a bounded number of times, permanent rejections surface
/// immediately.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("transient execution failure: {0}")]
    Transient(TransientKind),

    #[error("order rejected: {0}")]
    Rejected(String),
}

impl OrderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::Transient(_))
    }
}

/// Structured notification of a notable engine event.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    HardStopTripped { drawdown_pct: f64 },
    DailyLimitHit { daily_pl_pct: f64 },
    HedgeLockEngaged { net_lots: f64 },
    HedgeOrderFailed { error: OrderError },
    EmergencyEntered { drawdown_pct: f64 },
    RecoveryProgress { bucket: f64, remaining_positions: usize },
    RecoveryComplete,
    SpacingDegraded,
    FlattenFailed { ticket: Ticket, error: OrderError },
}

impl std::fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertEvent::HardStopTripped { drawdown_pct } => {
                write!(f, "hard stop tripped at {drawdown_pct:.2}% drawdown")
            }
            AlertEvent::DailyLimitHit { daily_pl_pct } => {
                write!(f, "daily loss limit hit at {daily_pl_pct:.2}%")
            }
            AlertEvent::HedgeLockEngaged { net_lots } => {
                write!(f, "hedge lock engaged, net exposure was {net_lots:.2} lots")
            }
            AlertEvent::HedgeOrderFailed { error } => {
                write!(f, "hedge order failed: {error}")
            }
            AlertEvent::EmergencyEntered { drawdown_pct } => {
                write!(f, "emergency stop at {drawdown_pct:.2}% drawdown")
            }
            AlertEvent::RecoveryProgress { bucket, remaining_positions } => {
                write!(f, "recovery bucket {bucket:.2}, {remaining_positions} positions left")
            }
            AlertEvent::RecoveryComplete => write!(f, "recovery complete, lock released"),
            AlertEvent::SpacingDegraded => {
                write!(f, "volatility read failed, spacing degraded to fixed")
            }
            AlertEvent::FlattenFailed { ticket, error } => {
                write!(f, "failed to flatten {ticket}: {error}")
            }
        }
    }
}
