//! Top-level per-update decision function.
//!
//! All breaker and engine instances live in one explicit [`EngineContext`]
//! constructed once and passed by reference into the per-cycle evaluation;
//! there are no ambient singletons. Each cycle consumes one immutable
//! [`CycleSnapshot`] so every layer observes a consistent view.

use chrono::{DateTime, Utc};

use crate::breakers::{CascadeDecision, ProtectionCascade};
use crate::config::{ConfigError, GuardConfig};
use crate::deescalation::{DeEscalationEngine, DeEscalationOutcome};
use crate::domain::instrument::Instrument;
use crate::domain::snapshot::CycleSnapshot;
use crate::domain::state::{StateMachine, StateReason, SystemState};
use crate::drawdown::{DrawdownSnapshot, DrawdownTracker};
use crate::persist::{SavedState, STATE_VERSION};
use crate::ports::{AlertEvent, AlertSink, OrderGateway, PositionLedger};
use crate::retry::RetryPolicy;
use crate::schedule::poll_weekly;
use crate::sizing::AdaptiveSizingEngine;
use crate::spacing::GridSpacingEngine;

/// Side-effect and lookup channels for one cycle. Reads beyond the
/// snapshot are limited to realized-profit lookups.
pub struct CycleIo<'a> {
    pub gateway: &'a mut dyn OrderGateway,
    pub ledger: &'a dyn PositionLedger,
    pub alerts: &'a dyn AlertSink,
}

/// Sizing and spacing handed to the (external) trading logic when the
/// cascade permits new exposure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryPlan {
    pub lot: f64,
    pub size_multiplier: f64,
    pub spacing_points: f64,
    pub spacing_degraded: bool,
}

/// What one evaluation cycle concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub state: SystemState,
    pub decision: CascadeDecision,
    pub entry: Option<EntryPlan>,
    pub drawdown: DrawdownSnapshot,
}

/// The engine: every component bundled behind one evaluation entry point.
pub struct EngineContext {
    cfg: GuardConfig,
    instrument: Instrument,
    pub tracker: DrawdownTracker,
    pub cascade: ProtectionCascade,
    pub sizing: AdaptiveSizingEngine,
    pub spacing: GridSpacingEngine,
    pub deescalation: DeEscalationEngine,
    pub state: StateMachine,
    retry: RetryPolicy,
    next_weekly_reset: Option<DateTime<Utc>>,
    last_reset_time: DateTime<Utc>,
}

impl EngineContext {
    /// Construct and validate. An invalid configuration fails
    /// initialization outright.
    pub fn new(
        cfg: GuardConfig,
        instrument: Instrument,
        starting_balance: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let retry = RetryPolicy::new(
            cfg.retry.max_attempts,
            std::time::Duration::from_millis(cfg.retry.delay_ms),
        );
        Ok(Self {
            tracker: DrawdownTracker::new(
                starting_balance,
                now,
                cfg.schedule.daily_reset_hour,
                cfg.equity_history_len,
            ),
            cascade: ProtectionCascade::new(&cfg),
            sizing: AdaptiveSizingEngine::new(&cfg.sizing),
            spacing: GridSpacingEngine::new(&cfg.spacing),
            deescalation: DeEscalationEngine::new(&cfg.recovery),
            state: StateMachine::new(now, 64),
            retry,
            next_weekly_reset: None,
            last_reset_time: now,
            instrument,
            cfg,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// One full evaluation cycle against a fresh snapshot.
    pub fn evaluate_cycle(&mut self, snap: &CycleSnapshot, io: &mut CycleIo<'_>) -> CycleReport {
        let now = snap.time;

        let daily_rolled = self.tracker.update(snap.account.equity, snap.account.balance, now);
        if daily_rolled {
            self.cascade.on_daily_boundary();
        }
        self.poll_weekly_reset(now);

        let dd = *self.tracker.snapshot();
        let decision =
            self.cascade
                .evaluate(&dd, &snap.positions, io.gateway, &self.retry, io.alerts, now);

        let mut flatten_failed = false;
        let mut recovery_completed = false;

        match decision {
            CascadeDecision::HardStopped { just_tripped } => {
                if just_tripped {
                    flatten_failed = !self.flatten_book(snap, io);
                }
            }
            CascadeDecision::HedgeLocked => {
                if self.deescalation.enabled() {
                    let hedge_ticket = self
                        .cascade
                        .hedge_lock
                        .lock_state()
                        .and_then(|s| s.hedge_ticket);
                    let outcome = self.deescalation.run_cycle(
                        snap,
                        hedge_ticket,
                        io.ledger,
                        io.gateway,
                        &self.retry,
                        &self.instrument,
                        io.alerts,
                        now,
                    );
                    if outcome == DeEscalationOutcome::Completed {
                        self.cascade.hedge_lock.unlock();
                        // The episode's losses are realized now; re-base the
                        // mark or the freeze would re-engage on a flat book.
                        self.tracker.reset_high_water_mark(now);
                        recovery_completed = true;
                    }
                }
            }
            _ => {}
        }

        let entry = if decision.allows_new_entries() {
            let multiplier = self.sizing.multiplier(dd.dd_from_hwm);
            let lot = self.instrument.quantize_lot(self.cfg.base_lot * multiplier);
            let spacing = self.spacing.spacing(snap.market.atr_points, io.alerts);
            Some(EntryPlan {
                lot,
                size_multiplier: multiplier,
                spacing_points: spacing.points,
                spacing_degraded: spacing.degraded,
            })
        } else {
            None
        };

        self.resolve_state(&decision, snap, flatten_failed, recovery_completed, now);

        CycleReport { state: self.state.current(), decision, entry, drawdown: dd }
    }

    /// Close every open position and cancel every pending order, once, on
    /// the hard-stop transition. Returns whether everything succeeded.
    fn flatten_book(&mut self, snap: &CycleSnapshot, io: &mut CycleIo<'_>) -> bool {
        let mut clean = true;
        for position in &snap.positions {
            if let Err(error) = self.retry.run(|| io.gateway.close_position(position.ticket)) {
                tracing::error!(ticket = %position.ticket, %error, "hard stop flatten: close failed");
                io.alerts
                    .notify(&AlertEvent::FlattenFailed { ticket: position.ticket, error });
                clean = false;
            }
        }
        for order in &snap.pending {
            if let Err(error) = self.retry.run(|| io.gateway.cancel_pending(order.ticket)) {
                tracing::error!(ticket = %order.ticket, %error, "hard stop flatten: cancel failed");
                io.alerts
                    .notify(&AlertEvent::FlattenFailed { ticket: order.ticket, error });
                clean = false;
            }
        }
        clean
    }

    fn poll_weekly_reset(&mut self, now: DateTime<Utc>) {
        if !self.cfg.schedule.weekly_reset_enabled {
            return;
        }
        let weekday = self.cfg.schedule.weekly_reset_weekday;
        let hour = self.cfg.schedule.daily_reset_hour;
        let stored = self
            .next_weekly_reset
            .unwrap_or_else(|| crate::schedule::next_weekly_boundary(now, weekday, hour));
        let poll = poll_weekly(now, stored, weekday, hour);
        self.next_weekly_reset = Some(poll.next);
        if poll.fire {
            tracing::info!("scheduled weekly reset");
            self.cascade
                .admin_reset(self.cfg.schedule.weekly_reset_clears_hard_stop);
            self.tracker.rebase(now);
            self.last_reset_time = now;
        }
    }

    fn resolve_state(
        &mut self,
        decision: &CascadeDecision,
        snap: &CycleSnapshot,
        flatten_failed: bool,
        recovery_completed: bool,
        now: DateTime<Utc>,
    ) {
        let (target, reason) = match decision {
            CascadeDecision::HardStopped { .. } if flatten_failed => {
                (SystemState::Error, StateReason::FlattenFailed)
            }
            CascadeDecision::HardStopped { .. } => {
                if self.cascade.hard_stop.is_locked() {
                    (SystemState::Stopped, StateReason::HardStopTripped)
                } else {
                    // Post-reset settle window: blocked, but no longer latched.
                    (SystemState::Paused, StateReason::ManualReset)
                }
            }
            CascadeDecision::DailyStopped => (SystemState::Paused, StateReason::DailyLimitHit),
            CascadeDecision::HedgeLocked if recovery_completed => {
                (SystemState::Recovery, StateReason::RecoveryComplete)
            }
            CascadeDecision::HedgeLocked if self.deescalation.enabled() => {
                (SystemState::DeEscalating, StateReason::RecoveryStarted)
            }
            CascadeDecision::HedgeLocked => (SystemState::Locked, StateReason::HedgeLockEngaged),
            CascadeDecision::StopNew => (SystemState::Emergency, StateReason::EmergencyActive),
            CascadeDecision::ReduceSize | CascadeDecision::Clear => {
                if self.state.current() == SystemState::Recovery && !snap.positions.is_empty() {
                    // Hold Recovery until the book has settled flat.
                    (SystemState::Recovery, StateReason::RecoveryComplete)
                } else if snap.positions.is_empty() {
                    (SystemState::Idle, StateReason::MarketClear)
                } else {
                    (SystemState::Trading, StateReason::EntriesOpen)
                }
            }
        };
        self.state.set_state(target, reason, now);
    }

    /// Confirmed manual recovery from a latched hard stop.
    pub fn manual_hard_stop_reset(&mut self, confirmed: bool, now: DateTime<Utc>) -> bool {
        let applied = self.cascade.hard_stop.manual_reset(confirmed, now);
        if applied {
            self.state.set_state(SystemState::Paused, StateReason::ManualReset, now);
        }
        applied
    }

    /// Snapshot for the persistence collaborator.
    pub fn saved_state(&self, now: DateTime<Utc>) -> SavedState {
        let dd = self.tracker.snapshot();
        SavedState {
            version: STATE_VERSION,
            timestamp: now,
            equity: dd.current_equity,
            high_water_mark: dd.high_water_mark,
            daily_pl_pct: dd.daily_pl_pct,
            emergency_trigger_count: self.cascade.emergency.trigger_count(),
            hard_stop_trigger_count: self.cascade.hard_stop.trigger_count(),
            last_reset_time: self.last_reset_time,
        }
    }

    /// Apply a previously saved record. Stale or mismatched records are
    /// ignored (treated as no state). Returns whether anything was
    /// restored.
    pub fn restore(&mut self, saved: SavedState, now: DateTime<Utc>) -> bool {
        let Some(saved) = saved.accept(now) else {
            return false;
        };
        self.tracker.restore_high_water_mark(saved.high_water_mark);
        self.last_reset_time = saved.last_reset_time;
        tracing::info!(hwm = saved.high_water_mark, "state restored from saved record");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{OpenPosition, PositionKind, Ticket, TradeDirection};
    use crate::domain::snapshot::{AccountView, Bar, MarketView};
    use crate::ports::{NullAlertSink, OrderError, OrderRequest};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn instrument() -> Instrument {
        Instrument::new("EURUSD".into(), 0.00001, 0.01, 0.01, 100.0, 0.1).unwrap()
    }

    fn context() -> EngineContext {
        EngineContext::new(GuardConfig::default(), instrument(), 10_000.0, t0()).unwrap()
    }

    #[derive(Default)]
    struct FakeIo {
        closed: Vec<Ticket>,
        cancelled: Vec<Ticket>,
        placed: Vec<OrderRequest>,
        closed_profits: HashMap<u64, f64>,
        fail_all_orders: bool,
        next_ticket: u64,
    }

    impl OrderGateway for FakeIo {
        fn place_market(&mut self, request: &OrderRequest) -> Result<Ticket, OrderError> {
            if self.fail_all_orders {
                return Err(OrderError::Rejected("scripted".into()));
            }
            self.placed.push(request.clone());
            self.next_ticket += 1;
            Ok(Ticket(500 + self.next_ticket))
        }
        fn close_position(&mut self, ticket: Ticket) -> Result<(), OrderError> {
            if self.fail_all_orders {
                return Err(OrderError::Rejected("scripted".into()));
            }
            self.closed.push(ticket);
            Ok(())
        }
        fn close_partial(&mut self, ticket: Ticket, _volume: f64) -> Result<(), OrderError> {
            if self.fail_all_orders {
                return Err(OrderError::Rejected("scripted".into()));
            }
            self.closed.push(ticket);
            Ok(())
        }
        fn cancel_pending(&mut self, ticket: Ticket) -> Result<(), OrderError> {
            if self.fail_all_orders {
                return Err(OrderError::Rejected("scripted".into()));
            }
            self.cancelled.push(ticket);
            Ok(())
        }
    }

    fn snapshot(equity: f64, positions: Vec<OpenPosition>) -> CycleSnapshot {
        CycleSnapshot {
            time: t0(),
            market: MarketView {
                bid: 1.1000,
                ask: 1.1001,
                atr_points: Some(200.0),
                prior_bar: Some(Bar { open: 1.0990, high: 1.1010, low: 1.0985, close: 1.1005 }),
            },
            account: AccountView { equity, balance: 10_000.0 },
            positions,
            pending: Vec::new(),
        }
    }

    fn grid_position(ticket: u64, volume: f64, floating: f64) -> OpenPosition {
        OpenPosition {
            ticket: Ticket(ticket),
            kind: PositionKind::Grid,
            direction: TradeDirection::Buy,
            volume,
            open_price: 1.1,
            floating_profit: floating,
        }
    }

    fn run(ctx: &mut EngineContext, io: &mut FakeIo, snap: &CycleSnapshot) -> CycleReport {
        // Split borrows: the fake is both ledger and gateway.
        let ledger = FakeIoLedger { profits: io.closed_profits.clone() };
        let mut cio = CycleIo { gateway: io, ledger: &ledger, alerts: &NullAlertSink };
        ctx.evaluate_cycle(snap, &mut cio)
    }

    struct FakeIoLedger {
        profits: HashMap<u64, f64>,
    }

    impl PositionLedger for FakeIoLedger {
        fn open_positions(&self) -> Vec<OpenPosition> {
            Vec::new()
        }
        fn pending_orders(&self) -> Vec<crate::domain::position::PendingOrder> {
            Vec::new()
        }
        fn closed_profit(&self, ticket: Ticket) -> Option<f64> {
            self.profits.get(&ticket.0).copied()
        }
    }

    #[test]
    fn quiet_cycle_reports_idle_with_full_size() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        let report = run(&mut ctx, &mut io, &snapshot(10_000.0, vec![]));
        assert_eq!(report.state, SystemState::Idle);
        assert_eq!(report.decision, CascadeDecision::Clear);
        let entry = report.entry.unwrap();
        assert_eq!(entry.size_multiplier, 1.0);
        assert_eq!(entry.lot, 0.01);
        // atr 200 × 1.5 = 300 points.
        assert_eq!(entry.spacing_points, 300.0);
    }

    #[test]
    fn open_positions_report_trading() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        let report = run(&mut ctx, &mut io, &snapshot(9_900.0, vec![grid_position(1, 0.01, -10.0)]));
        assert_eq!(report.state, SystemState::Trading);
    }

    #[test]
    fn hard_stop_flattens_once_and_reports_stopped() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        let positions = vec![grid_position(1, 0.05, -900.0), grid_position(2, 0.05, -800.0)];
        // 30% below starting balance.
        let report = run(&mut ctx, &mut io, &snapshot(7_000.0, positions.clone()));
        assert_eq!(report.state, SystemState::Stopped);
        assert_eq!(report.decision, CascadeDecision::HardStopped { just_tripped: true });
        assert_eq!(io.closed.len(), 2);
        assert!(report.entry.is_none());

        // Next cycle: still stopped, but no further close attempts.
        let report = run(&mut ctx, &mut io, &snapshot(7_000.0, positions));
        assert_eq!(report.decision, CascadeDecision::HardStopped { just_tripped: false });
        assert_eq!(io.closed.len(), 2);
    }

    #[test]
    fn failed_flatten_reports_error_state() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        io.fail_all_orders = true;
        let report = run(&mut ctx, &mut io, &snapshot(7_000.0, vec![grid_position(1, 0.05, -900.0)]));
        assert_eq!(report.state, SystemState::Error);
    }

    #[test]
    fn daily_stop_pauses_trading() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        // -6% on the day, drawdown still small against balance/HWM.
        let report = run(&mut ctx, &mut io, &snapshot(9_400.0, vec![]));
        assert_eq!(report.state, SystemState::Paused);
        assert!(report.entry.is_none());
    }

    /// Grind equity down over several sessions so `dd_from_hwm` reaches
    /// the hedge threshold while each single day stays under the daily
    /// loss limit.
    #[test]
    fn hedge_lock_path_runs_deescalation() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        run(&mut ctx, &mut io, &snapshot(12_000.0, vec![])); // HWM = 12_000

        let days = [
            (5, 12_000.0), // boundary: day-start re-bases at the high
            (6, 11_500.0),
            (7, 11_000.0),
            (8, 10_500.0),
        ];
        for (day, equity) in days {
            let mut snap = snapshot(equity, vec![]);
            snap.time = Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 5).unwrap();
            run(&mut ctx, &mut io, &snap);
        }

        // 10_080 is 16% below the 12_000 mark but only -4% on the day.
        let mut snap = snapshot(10_080.0, vec![grid_position(1, 0.05, -1_920.0)]);
        snap.time = Utc.with_ymd_and_hms(2024, 3, 8, 1, 0, 0).unwrap();
        let report = run(&mut ctx, &mut io, &snap);
        assert_eq!(report.decision, CascadeDecision::HedgeLocked);
        assert_eq!(report.state, SystemState::DeEscalating);
        // A hedge sell for the 0.05 net lots was placed, plus a scalp.
        assert!(io
            .placed
            .iter()
            .any(|r| r.kind == PositionKind::Hedge && (r.volume - 0.05).abs() < 1e-9));
        assert!(io.placed.iter().any(|r| r.kind == PositionKind::Scalp));
    }

    #[test]
    fn emergency_band_reduces_size() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        // Raise the mark, then draw down 8.5% with daily under the limit.
        run(&mut ctx, &mut io, &snapshot(10_000.0, vec![]));
        let day2 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 5).unwrap();
        let mut snap = snapshot(9_600.0, vec![]);
        snap.time = day2;
        run(&mut ctx, &mut io, &snap);
        let mut snap = snapshot(9_150.0, vec![grid_position(1, 0.01, -5.0)]);
        snap.time = day2 + chrono::Duration::hours(2);
        let report = run(&mut ctx, &mut io, &snap);
        assert_eq!(report.decision, CascadeDecision::ReduceSize);
        let entry = report.entry.unwrap();
        assert!(entry.size_multiplier < 1.0);
        assert_eq!(report.state, SystemState::Trading);
    }

    #[test]
    fn weekly_reset_rebases_hwm_but_spares_hard_stop() {
        let mut cfg = GuardConfig::default();
        cfg.schedule.weekly_reset_enabled = true;
        cfg.schedule.weekly_reset_weekday = chrono::Weekday::Sun;
        let mut ctx = EngineContext::new(cfg, instrument(), 10_000.0, t0()).unwrap();
        let mut io = FakeIo::default();

        // Trip the hard stop on Monday.
        run(&mut ctx, &mut io, &snapshot(7_000.0, vec![]));
        assert!(ctx.cascade.hard_stop.is_locked());

        // Sunday boundary passes: HWM re-based, hard stop still latched.
        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 30).unwrap();
        let mut snap = snapshot(7_000.0, vec![]);
        snap.time = sunday;
        run(&mut ctx, &mut io, &snap);
        assert!(ctx.cascade.hard_stop.is_locked());
        assert_eq!(ctx.tracker.snapshot().high_water_mark, 7_000.0);
    }

    #[test]
    fn weekly_reset_clears_hard_stop_only_when_armed() {
        let mut cfg = GuardConfig::default();
        cfg.schedule.weekly_reset_enabled = true;
        cfg.schedule.weekly_reset_weekday = chrono::Weekday::Sun;
        cfg.schedule.weekly_reset_clears_hard_stop = true;
        let mut ctx = EngineContext::new(cfg, instrument(), 10_000.0, t0()).unwrap();
        let mut io = FakeIo::default();

        run(&mut ctx, &mut io, &snapshot(7_000.0, vec![]));
        assert!(ctx.cascade.hard_stop.is_locked());

        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 30).unwrap();
        let mut snap = snapshot(7_000.0, vec![]);
        snap.time = sunday;
        run(&mut ctx, &mut io, &snap);
        assert!(!ctx.cascade.hard_stop.is_locked());
    }

    #[test]
    fn manual_reset_moves_to_paused() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        run(&mut ctx, &mut io, &snapshot(7_000.0, vec![]));
        assert!(!ctx.manual_hard_stop_reset(false, t0()));
        assert!(ctx.manual_hard_stop_reset(true, t0()));
        assert_eq!(ctx.state.current(), SystemState::Paused);
    }

    #[test]
    fn saved_state_round_trip_restores_hwm() {
        let mut ctx = context();
        let mut io = FakeIo::default();
        run(&mut ctx, &mut io, &snapshot(11_000.0, vec![]));
        let saved = ctx.saved_state(t0());
        assert_eq!(saved.high_water_mark, 11_000.0);

        let mut fresh = context();
        assert!(fresh.restore(saved.clone(), t0() + chrono::Duration::hours(1)));
        assert_eq!(fresh.tracker.snapshot().high_water_mark, 11_000.0);

        // Stale copy is ignored.
        let mut fresh = context();
        assert!(!fresh.restore(saved, t0() + chrono::Duration::hours(30)));
        assert_eq!(fresh.tracker.snapshot().high_water_mark, 10_000.0);
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut cfg = GuardConfig::default();
        cfg.emergency.warning_pct = 50.0;
        assert!(EngineContext::new(cfg, instrument(), 10_000.0, t0()).is_err());
    }
}
