use serde::{Deserialize, Serialize};

/// Broker-assigned ticket identifying a position or pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn opposite(self) -> Self {
        match self {
            TradeDirection::Buy => TradeDirection::Sell,
            TradeDirection::Sell => TradeDirection::Buy,
        }
    }

    /// +1 for long exposure, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            TradeDirection::Buy => 1.0,
            TradeDirection::Sell => -1.0,
        }
    }
}

/// Role a ticket plays in the strategy. Carried on every order request so
/// the ledger can classify positions without parsing comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionKind {
    /// A regular grid entry.
    Grid,
    /// The offsetting position opened by the exposure lock.
    Hedge,
    /// A small recovery trade opened while the book is locked.
    Scalp,
}

/// An open position as reported by the position ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub ticket: Ticket,
    pub kind: PositionKind,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    /// Mark-to-market profit at the snapshot price, in account currency.
    pub floating_profit: f64,
}

impl OpenPosition {
    pub fn is_grid(&self) -> bool {
        self.kind == PositionKind::Grid
    }
}

/// A pending (unfilled) order as reported by the position ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub ticket: Ticket,
    pub direction: TradeDirection,
    pub volume: f64,
    pub price: f64,
}
