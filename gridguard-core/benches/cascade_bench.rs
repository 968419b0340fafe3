//! Benchmark the hot per-cycle path: tracker update plus a full cascade
//! evaluation on a quiet book.

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

use gridguard_core::config::GuardConfig;
use gridguard_core::domain::instrument::Instrument;
use gridguard_core::domain::position::{OpenPosition, PendingOrder, Ticket};
use gridguard_core::domain::snapshot::{AccountView, Bar, CycleSnapshot, MarketView};
use gridguard_core::orchestrator::{CycleIo, EngineContext};
use gridguard_core::ports::{NullAlertSink, OrderError, OrderGateway, OrderRequest, PositionLedger};

struct NoopBroker;

impl OrderGateway for NoopBroker {
    fn place_market(&mut self, _r: &OrderRequest) -> Result<Ticket, OrderError> {
        Ok(Ticket(1))
    }
    fn close_position(&mut self, _t: Ticket) -> Result<(), OrderError> {
        Ok(())
    }
    fn close_partial(&mut self, _t: Ticket, _v: f64) -> Result<(), OrderError> {
        Ok(())
    }
    fn cancel_pending(&mut self, _t: Ticket) -> Result<(), OrderError> {
        Ok(())
    }
}

struct EmptyLedger;

impl PositionLedger for EmptyLedger {
    fn open_positions(&self) -> Vec<OpenPosition> {
        Vec::new()
    }
    fn pending_orders(&self) -> Vec<PendingOrder> {
        Vec::new()
    }
    fn closed_profit(&self, _t: Ticket) -> Option<f64> {
        None
    }
}

fn bench_cycle(c: &mut Criterion) {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
    let instrument = Instrument::new("EURUSD".into(), 0.00001, 0.01, 0.01, 100.0, 0.1).unwrap();
    let mut ctx = EngineContext::new(GuardConfig::default(), instrument, 10_000.0, t0).unwrap();

    let snap = CycleSnapshot {
        time: t0,
        market: MarketView {
            bid: 1.1000,
            ask: 1.1001,
            atr_points: Some(200.0),
            prior_bar: Some(Bar { open: 1.0990, high: 1.1010, low: 1.0985, close: 1.1005 }),
        },
        account: AccountView { equity: 9_900.0, balance: 10_000.0 },
        positions: Vec::new(),
        pending: Vec::new(),
    };

    c.bench_function("quiet_cycle", |b| {
        b.iter(|| {
            let mut gateway = NoopBroker;
            let ledger = EmptyLedger;
            let mut io =
                CycleIo { gateway: &mut gateway, ledger: &ledger, alerts: &NullAlertSink };
            std::hint::black_box(ctx.evaluate_cycle(&snap, &mut io))
        })
    });
}

criterion_group!(benches, bench_cycle);
criterion_main!(benches);
