//! Core domain types: instruments, positions, exposure, grid levels, system state.

pub mod grid;
pub mod instrument;
pub mod position;
pub mod snapshot;
pub mod state;

pub use grid::{GridBook, GridError, GridLevel, LevelStatus};
pub use instrument::{Instrument, InstrumentError};
pub use position::{OpenPosition, PendingOrder, PositionKind, Ticket, TradeDirection};
pub use snapshot::{AccountView, Bar, CycleSnapshot, ExposureSnapshot, MarketView};
pub use state::{StateMachine, StateReason, SystemState, Transition};
