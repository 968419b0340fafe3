//! Grid level book: a fixed-capacity array of levels per direction with an
//! explicit lifecycle state machine.
//!
//! Lifecycle: `Empty` → `Pending` (order placed) → `Active` (order filled)
//! → `Closed` (position closed), or any state back to `Empty` on a full
//! grid reset. Illegal transitions are errors, not silent no-ops: a failed
//! close attempt must never leave a level marked `Closed`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::position::{Ticket, TradeDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelStatus {
    Empty,
    Pending,
    Active,
    Closed,
}

/// One price level of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub direction: TradeDirection,
    pub price: f64,
    pub lot_size: f64,
    pub status: LevelStatus,
    pub ticket: Option<Ticket>,
}

impl GridLevel {
    fn empty(index: usize, direction: TradeDirection) -> Self {
        Self { index, direction, price: 0.0, lot_size: 0.0, status: LevelStatus::Empty, ticket: None }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("level index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("level {index} is {found:?}, expected {expected:?}")]
    IllegalTransition { index: usize, expected: LevelStatus, found: LevelStatus },
}

/// Fixed-capacity level array for one direction, sized at init.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridBook {
    direction: TradeDirection,
    levels: Vec<GridLevel>,
}

impl GridBook {
    pub fn new(direction: TradeDirection, capacity: usize) -> Self {
        let levels = (0..capacity).map(|i| GridLevel::empty(i, direction)).collect();
        Self { direction, levels }
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&GridLevel> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    /// Lowest-indexed level still `Empty`, if the grid has room.
    pub fn next_free(&self) -> Option<usize> {
        self.levels.iter().position(|l| l.status == LevelStatus::Empty)
    }

    pub fn active_count(&self) -> usize {
        self.levels.iter().filter(|l| l.status == LevelStatus::Active).count()
    }

    fn level_mut(&mut self, index: usize) -> Result<&mut GridLevel, GridError> {
        let capacity = self.levels.len();
        self.levels
            .get_mut(index)
            .ok_or(GridError::IndexOutOfRange { index, capacity })
    }

    /// Record an order placed for a level: `Empty` → `Pending`.
    pub fn mark_pending(
        &mut self,
        index: usize,
        price: f64,
        lot_size: f64,
        ticket: Ticket,
    ) -> Result<(), GridError> {
        let level = self.level_mut(index)?;
        if level.status != LevelStatus::Empty {
            return Err(GridError::IllegalTransition {
                index,
                expected: LevelStatus::Empty,
                found: level.status,
            });
        }
        level.price = price;
        level.lot_size = lot_size;
        level.ticket = Some(ticket);
        level.status = LevelStatus::Pending;
        Ok(())
    }

    /// Record a fill: `Pending` → `Active`.
    pub fn mark_active(&mut self, index: usize) -> Result<(), GridError> {
        let level = self.level_mut(index)?;
        if level.status != LevelStatus::Pending {
            return Err(GridError::IllegalTransition {
                index,
                expected: LevelStatus::Pending,
                found: level.status,
            });
        }
        level.status = LevelStatus::Active;
        Ok(())
    }

    /// Record a confirmed position close: `Active` → `Closed`.
    ///
    /// Call this only after the gateway reported success.
    pub fn mark_closed(&mut self, index: usize) -> Result<(), GridError> {
        let level = self.level_mut(index)?;
        if level.status != LevelStatus::Active {
            return Err(GridError::IllegalTransition {
                index,
                expected: LevelStatus::Active,
                found: level.status,
            });
        }
        level.status = LevelStatus::Closed;
        Ok(())
    }

    /// Full grid reset: every level back to `Empty`.
    pub fn reset(&mut self) {
        let direction = self.direction;
        for (i, level) in self.levels.iter_mut().enumerate() {
            *level = GridLevel::empty(i, direction);
        }
    }
}
