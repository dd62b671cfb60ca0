// 3.0: everything that moves through the engine is an event. the EventPayload enum lists
// all event kinds. portfolio-scope events carry a symbol, fund-scope events don't.
// 3.1 has the priority table the channel orders by.

use crate::types::{Action, Direction, PortfolioId, Symbol, Timestamp, TradeKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventSequence(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: EventSequence,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(sequence: EventSequence, payload: EventPayload) -> Self {
        Self { sequence, payload }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.payload.timestamp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
    Rebalance(RebalanceEvent),
    Management(ManagementEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Market(_) => EventKind::Market,
            EventPayload::Signal(s) => EventKind::Signal(s.trade_kind),
            EventPayload::Order(_) => EventKind::Order,
            EventPayload::Fill(_) => EventKind::Fill,
            EventPayload::Rebalance(_) => EventKind::Rebalance,
            EventPayload::Management(_) => EventKind::Management,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            EventPayload::Market(e) => e.timestamp,
            EventPayload::Signal(e) => e.timestamp,
            EventPayload::Order(e) => e.timestamp,
            EventPayload::Fill(e) => e.timestamp,
            EventPayload::Rebalance(e) => e.timestamp,
            EventPayload::Management(e) => e.timestamp,
        }
    }

    // signals and orders are the only events a rebalance may throw away
    pub fn is_cancellable(&self) -> bool {
        matches!(self, EventPayload::Signal(_) | EventPayload::Order(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: Symbol,
    // fraction of equity for buys, fraction of held shares for sells. (0, 1]
    pub proportion: Decimal,
    pub trade_kind: TradeKind,
    pub direction: Direction,
    pub timestamp: Timestamp,
    pub portfolio_id: PortfolioId,
}

impl SignalEvent {
    pub fn action(&self) -> Option<Action> {
        Action::lookup(self.direction, self.trade_kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: Symbol,
    pub quantity: u64,
    pub trade_kind: TradeKind,
    pub direction: Direction,
    pub timestamp: Timestamp,
    pub portfolio_id: PortfolioId,
}

impl OrderEvent {
    pub fn from_signal(signal: &SignalEvent, quantity: u64) -> Self {
        Self {
            symbol: signal.symbol.clone(),
            quantity,
            trade_kind: signal.trade_kind,
            direction: signal.direction,
            timestamp: signal.timestamp,
            portfolio_id: signal.portfolio_id.clone(),
        }
    }

    pub fn action(&self) -> Option<Action> {
        Action::lookup(self.direction, self.trade_kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub symbol: Symbol,
    pub quantity: u64,
    pub trade_kind: TradeKind,
    pub direction: Direction,
    // signed total cash value of the fill. price = fill_cost / quantity
    pub fill_cost: Decimal,
    pub commission: Decimal,
    pub timestamp: Timestamp,
    pub portfolio_id: PortfolioId,
    pub is_live: bool,
}

impl FillEvent {
    pub fn from_order(
        order: &OrderEvent,
        fill_cost: Decimal,
        commission: Decimal,
        timestamp: Timestamp,
        is_live: bool,
    ) -> Self {
        Self {
            symbol: order.symbol.clone(),
            quantity: order.quantity,
            trade_kind: order.trade_kind,
            direction: order.direction,
            fill_cost,
            commission,
            timestamp,
            portfolio_id: order.portfolio_id.clone(),
            is_live,
        }
    }

    /// Per-share execution price. `None` for a zero-quantity fill, which the
    /// ledger rejects.
    pub fn price(&self) -> Option<Decimal> {
        if self.quantity == 0 {
            return None;
        }
        self.fill_cost.checked_div(Decimal::from(self.quantity))
    }

    pub fn action(&self) -> Option<Action> {
        Action::lookup(self.direction, self.trade_kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementEvent {
    pub timestamp: Timestamp,
}

// 3.1: lower number is dequeued first. fund-scope events outrank portfolio-scope ones,
// fills are absorbed before new orders, exits and sells free capacity before buys use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Management,
    Rebalance,
    Fill,
    Order,
    Signal(TradeKind),
    Market,
}

impl EventKind {
    pub fn priority(&self) -> u8 {
        match self {
            EventKind::Management => 1,
            EventKind::Rebalance => 2,
            EventKind::Fill => 3,
            EventKind::Order => 4,
            EventKind::Signal(TradeKind::Exit) => 5,
            EventKind::Signal(TradeKind::Sell) => 6,
            EventKind::Signal(TradeKind::Buy) => 7,
            EventKind::Market => 8,
        }
    }

    pub fn is_fund_scope(&self) -> bool {
        matches!(self, EventKind::Management | EventKind::Rebalance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts() -> Timestamp {
        Timestamp::from_ymd(2015, 1, 5).unwrap()
    }

    fn order() -> OrderEvent {
        OrderEvent {
            symbol: Symbol::from("SPY"),
            quantity: 100,
            trade_kind: TradeKind::Buy,
            direction: Direction::Long,
            timestamp: ts(),
            portfolio_id: PortfolioId::from("long"),
        }
    }

    #[test]
    fn fill_price_from_cost() {
        let fill = FillEvent::from_order(&order(), dec!(10050), dec!(1), ts(), false);
        assert_eq!(fill.price(), Some(dec!(100.50)));
        assert_eq!(fill.action(), Some(Action::Buy));
    }

    #[test]
    fn zero_quantity_fill_has_no_price() {
        let mut fill = FillEvent::from_order(&order(), dec!(10050), dec!(1), ts(), false);
        fill.quantity = 0;
        assert_eq!(fill.price(), None);
    }

    #[test]
    fn priorities_are_distinct_and_ordered() {
        let ordered = [
            EventKind::Management,
            EventKind::Rebalance,
            EventKind::Fill,
            EventKind::Order,
            EventKind::Signal(TradeKind::Exit),
            EventKind::Signal(TradeKind::Sell),
            EventKind::Signal(TradeKind::Buy),
            EventKind::Market,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].priority() < pair[1].priority());
        }
    }

    #[test]
    fn only_signals_and_orders_are_cancellable() {
        let fill = EventPayload::Fill(FillEvent::from_order(&order(), dec!(1), dec!(1), ts(), false));
        assert!(!fill.is_cancellable());
        assert!(EventPayload::Order(order()).is_cancellable());
        assert!(!EventPayload::Rebalance(RebalanceEvent { timestamp: ts() }).is_cancellable());
    }

    #[test]
    fn order_inherits_signal_fields() {
        let signal = SignalEvent {
            symbol: Symbol::from("QQQ"),
            proportion: dec!(0.5),
            trade_kind: TradeKind::Sell,
            direction: Direction::Short,
            timestamp: ts(),
            portfolio_id: PortfolioId::from("short"),
        };
        let order = OrderEvent::from_signal(&signal, 25);
        assert_eq!(order.quantity, 25);
        assert_eq!(order.symbol, signal.symbol);
        assert_eq!(order.action(), Some(Action::Buy));
    }
}
