//! Drives the engine over a tick feed.
//!
//! The runner owns the broker and the engine context, takes one snapshot
//! per tick, and plays the role of the external trading logic: when the
//! engine hands back an entry plan, it ladders buy-side grid entries a
//! spacing apart.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, Utc};
use gridguard_core::config::ConfigError;
use gridguard_core::domain::grid::{GridBook, LevelStatus};
use gridguard_core::domain::instrument::{Instrument, InstrumentError};
use gridguard_core::domain::position::{PositionKind, TradeDirection};
use gridguard_core::domain::snapshot::MarketView;
use gridguard_core::domain::state::SystemState;
use gridguard_core::orchestrator::{CycleIo, EngineContext};
use gridguard_core::ports::{
    gather_snapshot, Clock, MarketData, NullAlertSink, OrderGateway, OrderRequest,
};
use serde::Serialize;
use thiserror::Error;

use crate::broker::{BrokerGateway, BrokerLedger, BrokerTelemetry, SimBroker};
use crate::config::SimConfig;
use crate::feed::{AtrIndicator, BarAggregator, TickFeed};

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub at: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub reason: String,
}

/// Everything the CLI prints about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub ticks: usize,
    pub final_equity: f64,
    pub final_balance: f64,
    pub max_dd_pct: f64,
    pub hard_stop_trips: u32,
    pub daily_trips: u32,
    pub hedge_locks: u32,
    pub emergency_trips: u32,
    pub orders_placed: usize,
    pub final_state: String,
    pub transitions: Vec<TransitionRecord>,
}

struct FrozenMarket {
    view: MarketView,
}

impl MarketData for FrozenMarket {
    fn view(&self) -> Option<MarketView> {
        Some(self.view)
    }
}

struct SimClock {
    now: Cell<DateTime<Utc>>,
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

pub struct SimRunner {
    cfg: SimConfig,
    instrument: Instrument,
    ctx: EngineContext,
    broker: RefCell<SimBroker>,
    grid: GridBook,
    base_price: Option<f64>,
}

impl SimRunner {
    pub fn new(cfg: SimConfig) -> Result<Self, SimError> {
        let instrument = cfg.instrument.build()?;
        let ctx = EngineContext::new(
            cfg.guard.clone(),
            instrument.clone(),
            cfg.start_balance,
            cfg.start_time,
        )?;
        let broker = RefCell::new(SimBroker::new(
            cfg.start_balance,
            cfg.instrument.point,
            cfg.instrument.point_value,
        ));
        let grid = GridBook::new(TradeDirection::Buy, cfg.guard.spacing.max_levels);
        Ok(Self { cfg, instrument, ctx, broker, grid, base_price: None })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn broker(&self) -> &RefCell<SimBroker> {
        &self.broker
    }

    pub fn run(&mut self, feed: &mut dyn TickFeed) -> RunReport {
        let mut bars = BarAggregator::new(self.cfg.bar_secs);
        let mut atr = AtrIndicator::new(self.cfg.atr_period);
        let clock = SimClock { now: Cell::new(self.cfg.start_time) };

        let mut ticks = 0;
        let mut peak_equity = self.cfg.start_balance;
        let mut max_dd_pct: f64 = 0.0;

        while let Some(tick) = feed.next_tick() {
            ticks += 1;
            self.broker.borrow_mut().mark(tick.bid, tick.ask);
            if let Some(bar) = bars.push(&tick) {
                atr.on_bar(&bar);
            }
            clock.now.set(tick.time);

            let market = FrozenMarket {
                view: MarketView {
                    bid: tick.bid,
                    ask: tick.ask,
                    atr_points: atr.value_points(self.cfg.instrument.point),
                    prior_bar: bars.prior_bar(),
                },
            };
            let telemetry = BrokerTelemetry(&self.broker);
            let ledger = BrokerLedger(&self.broker);
            let Some(snap) = gather_snapshot(&market, &telemetry, &ledger, &clock) else {
                continue;
            };

            peak_equity = peak_equity.max(snap.account.equity);
            if peak_equity > 0.0 {
                max_dd_pct = max_dd_pct.max((peak_equity - snap.account.equity) / peak_equity * 100.0);
            }

            let report = {
                let mut gateway = BrokerGateway(&self.broker);
                let mut io =
                    CycleIo { gateway: &mut gateway, ledger: &ledger, alerts: &NullAlertSink };
                self.ctx.evaluate_cycle(&snap, &mut io)
            };

            if let Some(entry) = report.entry {
                if matches!(report.state, SystemState::Idle | SystemState::Trading) {
                    self.maybe_extend_grid(tick.ask, entry.lot, entry.spacing_points);
                }
            }
        }

        self.report(ticks, max_dd_pct)
    }

    /// Buy-the-dip grid driver. Levels ladder down from the first entry's
    /// price; each fires once when the ask reaches its level price. The
    /// level book mirrors the broker so the lifecycle stays honest.
    fn maybe_extend_grid(&mut self, ask: f64, lot: f64, spacing_points: f64) {
        self.sync_grid_book();
        if lot <= 0.0 {
            return;
        }
        let Some(index) = self.grid.next_free() else { return };
        let base = *self.base_price.get_or_insert(ask);
        let target = self.ctx.spacing.level_price(
            base,
            spacing_points,
            index,
            TradeDirection::Buy,
            &self.instrument,
        );
        if ask > target + self.instrument.point / 2.0 {
            return;
        }
        let request = OrderRequest {
            kind: PositionKind::Grid,
            direction: TradeDirection::Buy,
            volume: lot,
            take_profit: None,
            stop_loss: None,
        };
        match BrokerGateway(&self.broker).place_market(&request) {
            Ok(ticket) => {
                // A market order fills immediately in the sim.
                let _ = self.grid.mark_pending(index, target, lot, ticket);
                let _ = self.grid.mark_active(index);
            }
            Err(error) => tracing::debug!(%error, "grid entry rejected"),
        }
    }

    /// Reconcile the level book against the broker: levels whose tickets
    /// have been closed out (recovery, hard stop) move to Closed, and a
    /// fully flat book resets the grid for the next episode.
    fn sync_grid_book(&mut self) {
        let broker = self.broker.borrow();
        let closed: Vec<usize> = self
            .grid
            .levels()
            .iter()
            .filter(|level| {
                level.status == LevelStatus::Active
                    && level
                        .ticket
                        .is_some_and(|t| broker.open_ticket(t).is_none())
            })
            .map(|level| level.index)
            .collect();
        let flat = broker.positions_of(PositionKind::Grid) == 0;
        drop(broker);

        for index in closed {
            let _ = self.grid.mark_closed(index);
        }
        if flat && self.grid.next_free() != Some(0) {
            self.grid.reset();
            self.base_price = None;
        }
    }

    fn report(&self, ticks: usize, max_dd_pct: f64) -> RunReport {
        let broker = self.broker.borrow();
        let transitions = self
            .ctx
            .state
            .transitions()
            .map(|t| TransitionRecord {
                at: t.at,
                from: t.from.to_string(),
                to: t.to.to_string(),
                reason: format!("{:?}", t.reason),
            })
            .collect();
        RunReport {
            run_id: self.cfg.run_id(),
            ticks,
            final_equity: broker.equity(),
            final_balance: broker.balance(),
            max_dd_pct,
            hard_stop_trips: self.ctx.cascade.hard_stop.trigger_count(),
            daily_trips: self.ctx.cascade.daily_loss.trigger_count(),
            hedge_locks: self.ctx.cascade.hedge_lock.lock_count(),
            emergency_trips: self.ctx.cascade.emergency.trigger_count(),
            orders_placed: broker.orders_placed,
            final_state: self.ctx.state.current().to_string(),
            transitions,
        }
    }
}
