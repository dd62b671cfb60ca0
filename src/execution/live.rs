// 6.3: live execution. orders go to a broker and come back later as BrokerFill
// notifications on a channel. the notifier may live on another thread, the ledger
// only ever sees the fills the engine polls on its own loop.

use super::{CommissionSchedule, Disposition, ExecutionError, ExecutionHandler};
use crate::events::{FillEvent, OrderEvent};
use crate::prices::PriceSource;
use crate::types::{Action, BrokerOrderId, Symbol, Timestamp};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub trait Broker: Send {
    fn submit_order(
        &mut self,
        symbol: &Symbol,
        quantity: u64,
        action: Action,
    ) -> Result<BrokerOrderId, BrokerError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    pub fn disposition(&self) -> Disposition {
        match self {
            BrokerError::Rejected(_) => Disposition::Drop,
            BrokerError::Unavailable(_) => Disposition::RetryNextTick,
        }
    }
}

/// Completion notice for one broker order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrokerFill {
    pub order_id: BrokerOrderId,
    pub filled_quantity: u64,
    pub avg_fill_price: Decimal,
}

/// Sending half of the fill channel. Cheap to clone and safe to hand to a
/// callback thread.
#[derive(Debug, Clone)]
pub struct FillNotifier {
    sender: Sender<BrokerFill>,
}

impl FillNotifier {
    /// Returns false once the receiving engine is gone.
    pub fn notify(&self, fill: BrokerFill) -> bool {
        self.sender.send(fill).is_ok()
    }
}

#[derive(Debug)]
pub struct FillReceiver {
    receiver: Receiver<BrokerFill>,
}

pub fn fill_channel() -> (FillNotifier, FillReceiver) {
    let (sender, receiver) = mpsc::channel();
    (FillNotifier { sender }, FillReceiver { receiver })
}

pub struct LiveExecution<B: Broker> {
    broker: B,
    commissions: CommissionSchedule,
    fills: FillReceiver,
    open: HashMap<BrokerOrderId, OrderEvent>,
    completed: HashSet<BrokerOrderId>,
}

impl<B: Broker> LiveExecution<B> {
    pub fn new(broker: B, commissions: CommissionSchedule, fills: FillReceiver) -> Self {
        Self {
            broker,
            commissions,
            fills,
            open: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn open_orders(&self) -> usize {
        self.open.len()
    }

    // 6.3.1: exactly one FillEvent per order id
    fn resolve(&mut self, notice: BrokerFill, now: Timestamp) -> Option<FillEvent> {
        if self.completed.contains(&notice.order_id) {
            warn!(order_id = notice.order_id.0, "duplicate fill notification ignored");
            return None;
        }
        if notice.filled_quantity == 0 {
            warn!(order_id = notice.order_id.0, "empty fill notification ignored");
            return None;
        }
        if !self.open.contains_key(&notice.order_id) {
            warn!(order_id = notice.order_id.0, "fill for unknown order ignored");
            return None;
        }
        let quantity = notice.filled_quantity;
        let Some(fill_cost) = notice.avg_fill_price.checked_mul(Decimal::from(quantity)) else {
            warn!(
                order_id = notice.order_id.0,
                quantity,
                price = %notice.avg_fill_price,
                "fill notional out of range, order left open"
            );
            return None;
        };
        let ticket = self.open.remove(&notice.order_id)?;
        self.completed.insert(notice.order_id);

        let commission = self.commissions.commission(quantity, notice.avg_fill_price);
        let mut fill = FillEvent::from_order(&ticket, fill_cost, commission, now, true);
        fill.quantity = quantity;

        info!(
            order_id = notice.order_id.0,
            symbol = %fill.symbol,
            quantity,
            price = %notice.avg_fill_price,
            "broker fill"
        );
        Some(fill)
    }
}

impl<B: Broker> ExecutionHandler for LiveExecution<B> {
    fn execute_order(
        &mut self,
        order: &OrderEvent,
        _prices: &dyn PriceSource,
        _now: Timestamp,
    ) -> Result<Option<FillEvent>, ExecutionError> {
        let action = order
            .action()
            .ok_or_else(|| ExecutionError::UnmappedAction(order.symbol.clone()))?;
        let order_id = self.broker.submit_order(&order.symbol, order.quantity, action)?;
        debug!(
            order_id = order_id.0,
            symbol = %order.symbol,
            quantity = order.quantity,
            %action,
            "order submitted"
        );
        self.open.insert(order_id, order.clone());
        Ok(None)
    }

    fn poll_fills(&mut self, now: Timestamp) -> Vec<FillEvent> {
        let mut fills = Vec::new();
        loop {
            match self.fills.receiver.try_recv() {
                Ok(notice) => fills.extend(self.resolve(notice, now)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        fills
    }

    fn is_live(&self) -> bool {
        true
    }
}

// 6.4: in-process broker. clones share one order book so a test or demo can keep a
// handle while the engine owns the execution handler.

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: BrokerOrderId,
    pub symbol: Symbol,
    pub quantity: u64,
    pub action: Action,
}

#[derive(Debug, Default)]
struct PaperBook {
    next_id: u64,
    open: Vec<PaperOrder>,
    submitted: usize,
    fail_next: Option<BrokerError>,
}

#[derive(Debug, Clone)]
pub struct PaperBroker {
    book: Arc<Mutex<PaperBook>>,
    notifier: FillNotifier,
}

impl PaperBroker {
    pub fn new(notifier: FillNotifier) -> Self {
        Self {
            book: Arc::new(Mutex::new(PaperBook {
                next_id: 1,
                ..PaperBook::default()
            })),
            notifier,
        }
    }

    fn with_book<T>(&self, f: impl FnOnce(&mut PaperBook) -> T) -> T {
        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut book)
    }

    /// The next submission fails with `error`.
    pub fn fail_next(&self, error: BrokerError) {
        self.with_book(|book| book.fail_next = Some(error));
    }

    pub fn open_orders(&self) -> Vec<PaperOrder> {
        self.with_book(|book| book.open.clone())
    }

    pub fn submitted(&self) -> usize {
        self.with_book(|book| book.submitted)
    }

    /// Fills every open order in full at the source's current price. Orders
    /// without a price stay open. Returns the number filled.
    pub fn fill_open_orders(&self, prices: &dyn PriceSource) -> usize {
        let notices: Vec<BrokerFill> = self.with_book(|book| {
            let mut notices = Vec::new();
            book.open.retain(|order| match prices.current_price(&order.symbol) {
                Some(price) => {
                    notices.push(BrokerFill {
                        order_id: order.order_id,
                        filled_quantity: order.quantity,
                        avg_fill_price: price,
                    });
                    false
                }
                None => true,
            });
            notices
        });
        notices
            .into_iter()
            .filter(|notice| self.notifier.notify(*notice))
            .count()
    }

    /// Sends a notification as-is, for replaying duplicates.
    pub fn send(&self, notice: BrokerFill) -> bool {
        self.notifier.notify(notice)
    }
}

impl Broker for PaperBroker {
    fn submit_order(
        &mut self,
        symbol: &Symbol,
        quantity: u64,
        action: Action,
    ) -> Result<BrokerOrderId, BrokerError> {
        self.with_book(|book| {
            if let Some(error) = book.fail_next.take() {
                return Err(error);
            }
            let order_id = BrokerOrderId(book.next_id);
            book.next_id += 1;
            book.submitted += 1;
            book.open.push(PaperOrder {
                order_id,
                symbol: symbol.clone(),
                quantity,
                action,
            });
            Ok(order_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::{Bar, BarSnapshot};
    use crate::types::{Direction, PortfolioId, TradeKind};
    use rust_decimal_macros::dec;

    fn ts() -> Timestamp {
        Timestamp::from_ymd(2015, 1, 5).unwrap()
    }

    fn order(symbol: &str) -> OrderEvent {
        OrderEvent {
            symbol: Symbol::from(symbol),
            quantity: 100,
            trade_kind: TradeKind::Buy,
            direction: Direction::Long,
            timestamp: ts(),
            portfolio_id: PortfolioId::from("live"),
        }
    }

    fn setup() -> (PaperBroker, LiveExecution<PaperBroker>) {
        let (notifier, fills) = fill_channel();
        let broker = PaperBroker::new(notifier);
        let exec = LiveExecution::new(broker.clone(), CommissionSchedule::default(), fills);
        (broker, exec)
    }

    #[test]
    fn fill_arrives_on_poll() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new().with_bar("SPY", Bar::flat(dec!(100)));

        assert!(exec.execute_order(&order("SPY"), &prices, ts()).unwrap().is_none());
        assert!(exec.poll_fills(ts()).is_empty());
        assert_eq!(exec.open_orders(), 1);

        assert_eq!(broker.fill_open_orders(&prices), 1);
        let fills = exec.poll_fills(ts());
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].fill_cost, dec!(10000));
        assert_eq!(fills[0].commission, dec!(1.0));
        assert!(fills[0].is_live);
        assert_eq!(exec.open_orders(), 0);
    }

    #[test]
    fn duplicate_notifications_emit_once() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new().with_bar("SPY", Bar::flat(dec!(100)));
        exec.execute_order(&order("SPY"), &prices, ts()).unwrap();

        let notice = BrokerFill {
            order_id: BrokerOrderId(1),
            filled_quantity: 100,
            avg_fill_price: dec!(100),
        };
        broker.send(notice);
        broker.send(notice);
        assert_eq!(exec.poll_fills(ts()).len(), 1);

        broker.send(notice);
        assert!(exec.poll_fills(ts()).is_empty());
    }

    #[test]
    fn unknown_and_empty_notices_ignored() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new().with_bar("SPY", Bar::flat(dec!(100)));
        exec.execute_order(&order("SPY"), &prices, ts()).unwrap();

        broker.send(BrokerFill {
            order_id: BrokerOrderId(99),
            filled_quantity: 100,
            avg_fill_price: dec!(100),
        });
        broker.send(BrokerFill {
            order_id: BrokerOrderId(1),
            filled_quantity: 0,
            avg_fill_price: dec!(100),
        });
        assert!(exec.poll_fills(ts()).is_empty());
        // the empty notice leaves the order open
        assert_eq!(exec.open_orders(), 1);
    }

    #[test]
    fn unrepresentable_fill_keeps_order_open() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new().with_bar("SPY", Bar::flat(dec!(100)));
        exec.execute_order(&order("SPY"), &prices, ts()).unwrap();

        broker.send(BrokerFill {
            order_id: BrokerOrderId(1),
            filled_quantity: 100,
            avg_fill_price: Decimal::MAX,
        });
        assert!(exec.poll_fills(ts()).is_empty());
        assert_eq!(exec.open_orders(), 1);

        // a sane notice for the same order still lands
        broker.send(BrokerFill {
            order_id: BrokerOrderId(1),
            filled_quantity: 100,
            avg_fill_price: dec!(100),
        });
        assert_eq!(exec.poll_fills(ts()).len(), 1);
    }

    #[test]
    fn rejections_classified() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new();

        broker.fail_next(BrokerError::Rejected("halted".into()));
        let err = exec.execute_order(&order("SPY"), &prices, ts()).unwrap_err();
        assert_eq!(err.disposition(), Disposition::Drop);

        broker.fail_next(BrokerError::Unavailable("disconnected".into()));
        let err = exec.execute_order(&order("SPY"), &prices, ts()).unwrap_err();
        assert_eq!(err.disposition(), Disposition::RetryNextTick);

        assert_eq!(broker.submitted(), 0);
        assert_eq!(exec.open_orders(), 0);
    }

    #[test]
    fn notifier_works_across_threads() {
        let (broker, mut exec) = setup();
        let prices = BarSnapshot::new().with_bar("SPY", Bar::flat(dec!(50)));
        exec.execute_order(&order("SPY"), &prices, ts()).unwrap();

        let handle = std::thread::spawn(move || broker.fill_open_orders(&prices));
        assert_eq!(handle.join().unwrap(), 1);
        assert_eq!(exec.poll_fills(ts()).len(), 1);
    }
}
