//! Recovery procedure for a hedge-locked book.
//!
//! While the lock holds, the engine earns small scalp profits into a
//! ratcheting bucket and spends the bucket to shave down the worst losing
//! grid position, one increment at a time, until the book is clear. Scalp
//! losses are absorbed by their stop-loss and never debit the bucket; the
//! bucket is only ever debited on a partial close the gateway confirmed.

use chrono::{DateTime, Duration, Utc};

use crate::config::RecoveryConfig;
use crate::domain::instrument::Instrument;
use crate::domain::position::{OpenPosition, PositionKind, Ticket, TradeDirection};
use crate::domain::snapshot::CycleSnapshot;
use crate::ports::{AlertEvent, AlertSink, OrderGateway, OrderRequest, PositionLedger};
use crate::retry::RetryPolicy;

/// Profit pool funding the unwind. Grows on profitable scalp closes,
/// never decreases except when spent on a successful partial close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryBucket {
    accumulated: f64,
}

impl RecoveryBucket {
    pub fn new() -> Self {
        Self { accumulated: 0.0 }
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Credit a realized scalp profit. Losses are ignored: the ratchet
    /// only moves up.
    pub fn credit(&mut self, profit: f64) {
        if profit >= 0.0 {
            self.accumulated += profit;
        }
    }

    /// Spend from the bucket. Callers must have checked affordability;
    /// the balance still never goes below zero.
    pub fn debit(&mut self, cost: f64) {
        debug_assert!(cost <= self.accumulated + 1e-9, "bucket overdraw: {cost} > {}", self.accumulated);
        self.accumulated = (self.accumulated - cost).max(0.0);
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }
}

impl Default for RecoveryBucket {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one de-escalation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeEscalationOutcome {
    /// Still digging out; keep the lock.
    InProgress,
    /// No grid positions remain; the hedge is closed and the lock can be
    /// released.
    Completed,
}

pub struct DeEscalationEngine {
    cfg: RecoveryConfig,
    bucket: RecoveryBucket,
    open_scalp: Option<Ticket>,
    last_scalp_done: Option<DateTime<Utc>>,
}

impl DeEscalationEngine {
    pub fn new(cfg: &RecoveryConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            bucket: RecoveryBucket::new(),
            open_scalp: None,
            last_scalp_done: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    pub fn bucket(&self) -> &RecoveryBucket {
        &self.bucket
    }

    pub fn open_scalp(&self) -> Option<Ticket> {
        self.open_scalp
    }

    /// One recovery cycle. Runs only while the system is locked.
    #[allow(clippy::too_many_arguments)]
    pub fn run_cycle(
        &mut self,
        snap: &CycleSnapshot,
        hedge_ticket: Option<Ticket>,
        ledger: &dyn PositionLedger,
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        instrument: &Instrument,
        alerts: &dyn AlertSink,
        now: DateTime<Utc>,
    ) -> DeEscalationOutcome {
        self.settle_scalp(snap, ledger, now);

        let grid: Vec<&OpenPosition> = snap.grid_positions().collect();
        if grid.is_empty() {
            return self.finish(snap, hedge_ticket, gateway, retry, alerts);
        }

        self.unwind_worst(&grid, gateway, retry, instrument, alerts);
        self.maybe_open_scalp(snap, gateway, retry, instrument, now);
        DeEscalationOutcome::InProgress
    }

    /// Detect the outstanding scalp having closed and bank its profit.
    fn settle_scalp(&mut self, snap: &CycleSnapshot, ledger: &dyn PositionLedger, now: DateTime<Utc>) {
        let Some(ticket) = self.open_scalp else { return };
        if snap.positions.iter().any(|p| p.ticket == ticket) {
            return;
        }
        self.open_scalp = None;
        self.last_scalp_done = Some(now);
        match ledger.closed_profit(ticket) {
            Some(profit) if profit >= 0.0 => {
                self.bucket.credit(profit);
                tracing::info!(%ticket, profit, bucket = self.bucket.accumulated(), "scalp banked");
            }
            Some(profit) => {
                // Absorbed by the stop; the bucket is untouched.
                tracing::debug!(%ticket, profit, "scalp stopped out");
            }
            None => {
                tracing::debug!(%ticket, "scalp closed but ledger has no realized profit for it");
            }
        }
    }

    /// Book is clear: close the hedge (and any straggling scalp), reset
    /// the bucket and report completion. Close failures are retried on
    /// the next cycle rather than treated as fatal.
    fn finish(
        &mut self,
        snap: &CycleSnapshot,
        hedge_ticket: Option<Ticket>,
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        alerts: &dyn AlertSink,
    ) -> DeEscalationOutcome {
        for ticket in [hedge_ticket, self.open_scalp].into_iter().flatten() {
            if snap.positions.iter().any(|p| p.ticket == ticket) {
                if let Err(error) = retry.run(|| gateway.close_position(ticket)) {
                    tracing::warn!(%ticket, %error, "close failed during release, retrying next cycle");
                    return DeEscalationOutcome::InProgress;
                }
            }
        }
        self.open_scalp = None;
        self.bucket.reset();
        alerts.notify(&AlertEvent::RecoveryComplete);
        DeEscalationOutcome::Completed
    }

    /// Spend the bucket on the worst grid position, if affordable.
    fn unwind_worst(
        &mut self,
        grid: &[&OpenPosition],
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        instrument: &Instrument,
        alerts: &dyn AlertSink,
    ) {
        let Some(worst) = grid
            .iter()
            .min_by(|a, b| a.floating_profit.total_cmp(&b.floating_profit))
        else {
            return;
        };

        if worst.floating_profit >= 0.0 {
            // A non-losing position costs nothing to unwind.
            if retry.run(|| gateway.close_position(worst.ticket)).is_ok() {
                tracing::info!(ticket = %worst.ticket, "closed non-losing grid position for free");
            }
            return;
        }

        let full_close = worst.volume <= self.cfg.close_increment_lots + 1e-9;
        let increment = if full_close {
            worst.volume
        } else {
            instrument
                .quantize_lot(self.cfg.close_increment_lots)
                .min(worst.volume)
        };
        if increment <= 0.0 {
            return;
        }

        let cost = worst.floating_profit.abs() * increment / worst.volume;
        if self.bucket.accumulated() < cost {
            return;
        }

        let result = if full_close {
            retry.run(|| gateway.close_position(worst.ticket))
        } else {
            retry.run(|| gateway.close_partial(worst.ticket, increment))
        };
        match result {
            Ok(()) => {
                // Debit only after the gateway confirmed the close.
                self.bucket.debit(cost);
                tracing::info!(
                    ticket = %worst.ticket,
                    increment,
                    cost,
                    bucket = self.bucket.accumulated(),
                    "partial close funded from recovery bucket"
                );
                alerts.notify(&AlertEvent::RecoveryProgress {
                    bucket: self.bucket.accumulated(),
                    remaining_positions: grid.len(),
                });
            }
            Err(error) => {
                tracing::warn!(ticket = %worst.ticket, %error, "partial close failed, will retry");
            }
        }
    }

    /// Open one small directional scalp when none is outstanding and the
    /// cooldown has elapsed. Direction follows the prior bar's momentum.
    fn maybe_open_scalp(
        &mut self,
        snap: &CycleSnapshot,
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) {
        if self.open_scalp.is_some() {
            return;
        }
        let cooldown = Duration::seconds(self.cfg.scalp_cooldown_secs);
        if let Some(done) = self.last_scalp_done {
            if now - done < cooldown {
                return;
            }
        }
        let Some(bar) = snap.market.prior_bar else { return };

        let direction = bar.momentum();
        let volume = instrument.quantize_lot(self.cfg.scalp_lot);
        let tp = instrument.points_to_price(self.cfg.scalp_tp_points);
        let sl = instrument.points_to_price(self.cfg.scalp_sl_points);
        let request = match direction {
            TradeDirection::Buy => OrderRequest {
                kind: PositionKind::Scalp,
                direction,
                volume,
                take_profit: Some(snap.market.ask + tp),
                stop_loss: Some(snap.market.ask - sl),
            },
            TradeDirection::Sell => OrderRequest {
                kind: PositionKind::Scalp,
                direction,
                volume,
                take_profit: Some(snap.market.bid - tp),
                stop_loss: Some(snap.market.bid + sl),
            },
        };
        match retry.run(|| gateway.place_market(&request)) {
            Ok(ticket) => {
                self.open_scalp = Some(ticket);
                tracing::debug!(%ticket, ?direction, volume, "recovery scalp opened");
            }
            Err(error) => {
                tracing::warn!(%error, "scalp order failed, will retry next eligible cycle");
            }
        }
    }
}
