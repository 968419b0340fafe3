//! Per-cycle immutable snapshot of the outside world.
//!
//! Every evaluation cycle reads equity, positions and volatility exactly
//! once, up front, so that all layers within the cycle observe the same
//! consistent view. Nothing in the engine re-reads a collaborator
//! mid-cycle.

use chrono::{DateTime, Utc};

use crate::domain::position::{OpenPosition, PendingOrder, TradeDirection};

/// A completed price bar, used by the de-escalation momentum heuristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// Direction of the bar body. Flat bars lean long.
    pub fn momentum(&self) -> TradeDirection {
        if self.close >= self.open {
            TradeDirection::Buy
        } else {
            TradeDirection::Sell
        }
    }
}

/// Market reads taken at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketView {
    pub bid: f64,
    pub ask: f64,
    /// Current volatility reading in points. `None` when the indicator
    /// could not be read; the spacing engine degrades to fixed spacing.
    pub atr_points: Option<f64>,
    /// Most recently completed bar, if any.
    pub prior_bar: Option<Bar>,
}

/// Account reads taken at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountView {
    pub equity: f64,
    pub balance: f64,
}

/// Signed long/short volume held by the strategy, computed fresh from the
/// position list every cycle — never cached across cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureSnapshot {
    pub buy_lots: f64,
    pub sell_lots: f64,
    pub net_lots: f64,
    pub position_count: usize,
}

impl ExposureSnapshot {
    pub fn from_positions(positions: &[OpenPosition]) -> Self {
        let mut buy_lots = 0.0;
        let mut sell_lots = 0.0;
        for pos in positions {
            match pos.direction {
                TradeDirection::Buy => buy_lots += pos.volume,
                TradeDirection::Sell => sell_lots += pos.volume,
            }
        }
        Self {
            buy_lots,
            sell_lots,
            net_lots: buy_lots - sell_lots,
            position_count: positions.len(),
        }
    }
}

/// The complete immutable view of one evaluation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSnapshot {
    pub time: DateTime<Utc>,
    pub market: MarketView,
    pub account: AccountView,
    pub positions: Vec<OpenPosition>,
    pub pending: Vec<PendingOrder>,
}

impl CycleSnapshot {
    pub fn exposure(&self) -> ExposureSnapshot {
        ExposureSnapshot::from_positions(&self.positions)
    }

    /// Open positions that belong to the grid proper (not hedge, not scalp).
    pub fn grid_positions(&self) -> impl Iterator<Item = &OpenPosition> {
        self.positions.iter().filter(|p| p.is_grid())
    }
}
