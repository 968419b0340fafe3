//! Exposure-freezing breaker.
//!
//! At the freeze threshold, one opposing order drives net exposure to
//! (approximately) zero and the book is locked. The lock is only set when
//! the hedge order actually succeeds — a failed hedge must not pretend to
//! be protected, so the layer falls through and leaves protection to the
//! next layer down.

use chrono::{DateTime, Utc};

use crate::config::HedgeConfig;
use crate::domain::position::{PositionKind, Ticket, TradeDirection};
use crate::domain::snapshot::ExposureSnapshot;
use crate::ports::{AlertEvent, AlertSink, OrderGateway, OrderRequest};
use crate::retry::RetryPolicy;

/// Lock bookkeeping. Owned exclusively by this layer; read-only elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeLockState {
    pub hedge_ticket: Option<Ticket>,
    pub locked_equity: f64,
    pub locked_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HedgeSoftLock {
    enabled: bool,
    trigger_pct: f64,
    epsilon_lots: f64,
    locked: Option<HedgeLockState>,
    lock_count: u32,
}

impl HedgeSoftLock {
    pub fn new(cfg: &HedgeConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            trigger_pct: cfg.trigger_pct,
            epsilon_lots: cfg.epsilon_lots,
            locked: None,
            lock_count: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn lock_state(&self) -> Option<&HedgeLockState> {
        self.locked.as_ref()
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    /// Evaluate the layer. Returns whether the book is (now) frozen.
    ///
    /// The exposure snapshot must be computed fresh for this cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        dd: f64,
        exposure: &ExposureSnapshot,
        equity: f64,
        gateway: &mut dyn OrderGateway,
        retry: &RetryPolicy,
        alerts: &dyn AlertSink,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if self.locked.is_some() {
            return true;
        }
        if dd < self.trigger_pct {
            return false;
        }

        let net = exposure.net_lots;
        if net.abs() < self.epsilon_lots {
            // Already flat: lock without spending margin on an order.
            self.engage(None, equity, net, alerts, now);
            return true;
        }

        let request = OrderRequest {
            kind: PositionKind::Hedge,
            direction: if net > 0.0 { TradeDirection::Sell } else { TradeDirection::Buy },
            volume: net.abs(),
            take_profit: None,
            stop_loss: None,
        };
        match retry.run(|| gateway.place_market(&request)) {
            Ok(ticket) => {
                self.engage(Some(ticket), equity, net, alerts, now);
                true
            }
            Err(error) => {
                // Fail closed: no lock, let the next layer down protect.
                tracing::error!(%error, net_lots = net, "hedge order failed, lock NOT set");
                alerts.notify(&AlertEvent::HedgeOrderFailed { error });
                false
            }
        }
    }

    fn engage(
        &mut self,
        ticket: Option<Ticket>,
        equity: f64,
        net: f64,
        alerts: &dyn AlertSink,
        now: DateTime<Utc>,
    ) {
        self.locked = Some(HedgeLockState { hedge_ticket: ticket, locked_equity: equity, locked_at: now });
        self.lock_count += 1;
        tracing::warn!(net_lots = net, equity, "exposure frozen by hedge lock");
        alerts.notify(&AlertEvent::HedgeLockEngaged { net_lots: net });
    }

    /// External release, issued by the de-escalation engine when the book
    /// is clear. Returns the hedge ticket that was held, if any.
    pub fn unlock(&mut self) -> Option<Ticket> {
        let state = self.locked.take();
        if state.is_some() {
            tracing::info!("hedge lock released");
        }
        state.and_then(|s| s.hedge_ticket)
    }

    /// Administrative full reset: drop the lock without recovery.
    pub fn admin_clear(&mut self) {
        self.locked = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{NullAlertSink, OrderError, TransientKind};
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()
    }

    fn exposure(buy: f64, sell: f64) -> ExposureSnapshot {
        ExposureSnapshot {
            buy_lots: buy,
            sell_lots: sell,
            net_lots: buy - sell,
            position_count: 2,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, StdDuration::ZERO)
    }

    /// Gateway that records requests and answers from a script.
    struct ScriptedGateway {
        requests: Vec<OrderRequest>,
        responses: Vec<Result<Ticket, OrderError>>,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<Result<Ticket, OrderError>>) -> Self {
            Self { requests: Vec::new(), responses }
        }
    }

    impl OrderGateway for ScriptedGateway {
        fn place_market(&mut self, request: &OrderRequest) -> Result<Ticket, OrderError> {
            self.requests.push(request.clone());
            self.responses.remove(0)
        }
        fn close_position(&mut self, _ticket: Ticket) -> Result<(), OrderError> {
            Ok(())
        }
        fn close_partial(&mut self, _ticket: Ticket, _volume: f64) -> Result<(), OrderError> {
            Ok(())
        }
        fn cancel_pending(&mut self, _ticket: Ticket) -> Result<(), OrderError> {
            Ok(())
        }
    }

    fn lock() -> HedgeSoftLock {
        HedgeSoftLock::new(&HedgeConfig { enabled: true, trigger_pct: 15.0, epsilon_lots: 0.001 })
    }

    #[test]
    fn below_threshold_does_nothing() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![]);
        let blocked = hl.check(10.0, &exposure(0.05, 0.02), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        assert!(!blocked);
        assert!(gw.requests.is_empty());
    }

    #[test]
    fn hedge_order_offsets_net_exposure_exactly() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![Ok(Ticket(99))]);
        let blocked = hl.check(16.0, &exposure(0.05, 0.02), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        assert!(blocked);
        assert!(hl.is_locked());

        let req = &gw.requests[0];
        assert_eq!(req.direction, TradeDirection::Sell);
        assert!((req.volume - 0.03).abs() < 1e-12);
        assert_eq!(req.kind, PositionKind::Hedge);
        assert_eq!(hl.lock_state().unwrap().hedge_ticket, Some(Ticket(99)));
        assert_eq!(hl.lock_state().unwrap().locked_equity, 9_000.0);
    }

    #[test]
    fn short_heavy_book_is_hedged_with_a_buy() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![Ok(Ticket(5))]);
        hl.check(16.0, &exposure(0.02, 0.10), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        assert_eq!(gw.requests[0].direction, TradeDirection::Buy);
        assert!((gw.requests[0].volume - 0.08).abs() < 1e-12);
    }

    #[test]
    fn flat_book_locks_without_an_order() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![]);
        let blocked =
            hl.check(16.0, &exposure(0.05, 0.0499999), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        assert!(blocked);
        assert!(gw.requests.is_empty());
        assert_eq!(hl.lock_state().unwrap().hedge_ticket, None);
    }

    #[test]
    fn failed_hedge_order_does_not_set_the_lock() {
        let mut hl = lock();
        // Both attempts fail with a transient error; the retry budget is 2.
        let mut gw = ScriptedGateway::new(vec![
            Err(OrderError::Transient(TransientKind::Requote)),
            Err(OrderError::Transient(TransientKind::Requote)),
        ]);
        let blocked = hl.check(16.0, &exposure(0.05, 0.02), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        assert!(!blocked);
        assert!(!hl.is_locked());
        assert_eq!(gw.requests.len(), 2);
    }

    #[test]
    fn transient_failure_then_success_locks() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![
            Err(OrderError::Transient(TransientKind::PriceOff)),
            Ok(Ticket(7)),
        ]);
        assert!(hl.check(16.0, &exposure(0.05, 0.02), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0()));
        assert!(hl.is_locked());
    }

    #[test]
    fn locked_layer_blocks_every_cycle_until_unlock() {
        let mut hl = lock();
        let mut gw = ScriptedGateway::new(vec![Ok(Ticket(1))]);
        hl.check(16.0, &exposure(0.05, 0.02), 9_000.0, &mut gw, &policy(), &NullAlertSink, t0());
        // Drawdown recovering does not release the lock.
        assert!(hl.check(1.0, &exposure(0.0, 0.0), 9_500.0, &mut gw, &policy(), &NullAlertSink, t0()));
        assert_eq!(hl.unlock(), Some(Ticket(1)));
        assert!(!hl.is_locked());
    }

    #[test]
    fn disabled_layer_never_engages() {
        let mut hl =
            HedgeSoftLock::new(&HedgeConfig { enabled: false, trigger_pct: 15.0, epsilon_lots: 0.001 });
        let mut gw = ScriptedGateway::new(vec![]);
        assert!(!hl.check(50.0, &exposure(0.1, 0.0), 5_000.0, &mut gw, &policy(), &NullAlertSink, t0()));
    }
}
