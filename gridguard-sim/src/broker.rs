//! In-memory broker: implements the engine's gateway and ledger ports
//! with take-profit/stop-loss fills on every mark and an injectable
//! failure queue for exercising retry and fail-closed paths.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use gridguard_core::domain::position::{
    OpenPosition, PendingOrder, PositionKind, Ticket, TradeDirection,
};
use gridguard_core::domain::snapshot::AccountView;
use gridguard_core::ports::{
    AccountTelemetry, OrderError, OrderGateway, OrderRequest, PositionLedger,
};

#[derive(Debug, Clone)]
struct SimPosition {
    ticket: Ticket,
    kind: PositionKind,
    direction: TradeDirection,
    volume: f64,
    open_price: f64,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
}

/// The broker proper. Wrap in a `RefCell` and hand out [`BrokerGateway`]
/// and [`BrokerLedger`] handles to satisfy the engine's split read/write
/// ports.
pub struct SimBroker {
    point: f64,
    point_value: f64,
    bid: f64,
    ask: f64,
    balance: f64,
    positions: Vec<SimPosition>,
    closed_profits: HashMap<u64, f64>,
    next_ticket: u64,
    fail_queue: VecDeque<OrderError>,
    pub orders_placed: usize,
}

impl SimBroker {
    pub fn new(balance: f64, point: f64, point_value: f64) -> Self {
        Self {
            point,
            point_value,
            bid: 0.0,
            ask: 0.0,
            balance,
            positions: Vec::new(),
            closed_profits: HashMap::new(),
            next_ticket: 0,
            fail_queue: VecDeque::new(),
            orders_placed: 0,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Mark to the new quotes and fill any take-profit/stop-loss levels
    /// that the move crossed.
    pub fn mark(&mut self, bid: f64, ask: f64) {
        self.bid = bid;
        self.ask = ask;

        let mut filled = Vec::new();
        for (idx, pos) in self.positions.iter().enumerate() {
            let exit = match pos.direction {
                TradeDirection::Buy => {
                    if pos.take_profit.is_some_and(|tp| bid >= tp) {
                        pos.take_profit
                    } else if pos.stop_loss.is_some_and(|sl| bid <= sl) {
                        pos.stop_loss
                    } else {
                        None
                    }
                }
                TradeDirection::Sell => {
                    if pos.take_profit.is_some_and(|tp| ask <= tp) {
                        pos.take_profit
                    } else if pos.stop_loss.is_some_and(|sl| ask >= sl) {
                        pos.stop_loss
                    } else {
                        None
                    }
                }
            };
            if let Some(price) = exit {
                filled.push((idx, price));
            }
        }
        // Realize from the back so indices stay valid.
        for (idx, price) in filled.into_iter().rev() {
            self.realize_at(idx, price, 1.0);
        }
    }

    fn profit_at(&self, pos: &SimPosition, exit_price: f64) -> f64 {
        let move_points = (exit_price - pos.open_price) / self.point * pos.direction.sign();
        move_points * self.point_value * pos.volume
    }

    fn exit_price(&self, direction: TradeDirection) -> f64 {
        match direction {
            TradeDirection::Buy => self.bid,
            TradeDirection::Sell => self.ask,
        }
    }

    fn floating(&self, pos: &SimPosition) -> f64 {
        self.profit_at(pos, self.exit_price(pos.direction))
    }

    /// Close `share` (0, 1] of the position at `price`, realizing the
    /// proportional profit into the balance.
    fn realize_at(&mut self, idx: usize, price: f64, share: f64) {
        let pos = self.positions[idx].clone();
        let profit = self.profit_at(&pos, price) * share;
        self.balance += profit;
        if share >= 1.0 {
            self.closed_profits.insert(pos.ticket.0, profit);
            self.positions.remove(idx);
        } else {
            self.positions[idx].volume = pos.volume * (1.0 - share);
        }
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.positions.iter().map(|p| self.floating(p)).sum::<f64>()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions_of(&self, kind: PositionKind) -> usize {
        self.positions.iter().filter(|p| p.kind == kind).count()
    }

    /// Kind of a still-open ticket, or `None` once it has closed.
    pub fn open_ticket(&self, ticket: Ticket) -> Option<PositionKind> {
        self.positions.iter().find(|p| p.ticket == ticket).map(|p| p.kind)
    }

    /// Number of tickets fully closed so far.
    pub fn closed_count(&self) -> usize {
        self.closed_profits.len()
    }

    /// Queue a failure for the next gateway operation.
    pub fn inject_failure(&mut self, error: OrderError) {
        self.fail_queue.push_back(error);
    }

    fn take_failure(&mut self) -> Option<OrderError> {
        self.fail_queue.pop_front()
    }

    fn snapshot_positions(&self) -> Vec<OpenPosition> {
        self.positions
            .iter()
            .map(|p| OpenPosition {
                ticket: p.ticket,
                kind: p.kind,
                direction: p.direction,
                volume: p.volume,
                open_price: p.open_price,
                floating_profit: self.floating(p),
            })
            .collect()
    }
}

/// Write handle: the engine's order gateway.
pub struct BrokerGateway<'a>(pub &'a RefCell<SimBroker>);

impl OrderGateway for BrokerGateway<'_> {
    fn place_market(&mut self, request: &OrderRequest) -> Result<Ticket, OrderError> {
        let mut broker = self.0.borrow_mut();
        if let Some(error) = broker.take_failure() {
            return Err(error);
        }
        if request.volume <= 0.0 {
            return Err(OrderError::Rejected(format!("invalid volume {}", request.volume)));
        }
        broker.next_ticket += 1;
        let ticket = Ticket(broker.next_ticket);
        let open_price = match request.direction {
            TradeDirection::Buy => broker.ask,
            TradeDirection::Sell => broker.bid,
        };
        broker.positions.push(SimPosition {
            ticket,
            kind: request.kind,
            direction: request.direction,
            volume: request.volume,
            open_price,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
        });
        broker.orders_placed += 1;
        Ok(ticket)
    }

    fn close_position(&mut self, ticket: Ticket) -> Result<(), OrderError> {
        let mut broker = self.0.borrow_mut();
        if let Some(error) = broker.take_failure() {
            return Err(error);
        }
        let Some(idx) = broker.positions.iter().position(|p| p.ticket == ticket) else {
            return Err(OrderError::Rejected(format!("unknown ticket {ticket}")));
        };
        let price = broker.exit_price(broker.positions[idx].direction);
        broker.realize_at(idx, price, 1.0);
        Ok(())
    }

    fn close_partial(&mut self, ticket: Ticket, volume: f64) -> Result<(), OrderError> {
        let mut broker = self.0.borrow_mut();
        if let Some(error) = broker.take_failure() {
            return Err(error);
        }
        let Some(idx) = broker.positions.iter().position(|p| p.ticket == ticket) else {
            return Err(OrderError::Rejected(format!("unknown ticket {ticket}")));
        };
        let pos_volume = broker.positions[idx].volume;
        if volume <= 0.0 || volume >= pos_volume {
            return Err(OrderError::Rejected(format!(
                "partial volume {volume} outside (0, {pos_volume})"
            )));
        }
        let price = broker.exit_price(broker.positions[idx].direction);
        let share = volume / pos_volume;
        broker.realize_at(idx, price, share);
        Ok(())
    }

    fn cancel_pending(&mut self, _ticket: Ticket) -> Result<(), OrderError> {
        // The sim trades market orders only.
        Ok(())
    }
}

/// Read handle: the engine's position ledger.
pub struct BrokerLedger<'a>(pub &'a RefCell<SimBroker>);

impl PositionLedger for BrokerLedger<'_> {
    fn open_positions(&self) -> Vec<OpenPosition> {
        self.0.borrow().snapshot_positions()
    }
    fn pending_orders(&self) -> Vec<PendingOrder> {
        Vec::new()
    }
    fn closed_profit(&self, ticket: Ticket) -> Option<f64> {
        self.0.borrow().closed_profits.get(&ticket.0).copied()
    }
}

/// Telemetry handle: equity and balance from the broker's books.
pub struct BrokerTelemetry<'a>(pub &'a RefCell<SimBroker>);

impl AccountTelemetry for BrokerTelemetry<'_> {
    fn sample(&self) -> Option<AccountView> {
        let broker = self.0.borrow();
        Some(AccountView { equity: broker.equity(), balance: broker.balance() })
    }
}
