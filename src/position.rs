// 4.0: position ledger. a PendingPosition is an order in flight, a FilledPosition is shares
// actually held. 4.1 has the weighted-average-cost transaction logic, 4.2 the pnl queries,
// 4.3 the persistence record.

use crate::calendar::holding_period;
use crate::execution::CommissionSchedule;
use crate::types::{Action, Direction, PortfolioId, Symbol, Timestamp, TradeKind};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPosition {
    pub symbol: Symbol,
    pub quantity: u64,
    pub direction: Direction,
    pub trade_kind: TradeKind,
    pub portfolio_id: PortfolioId,
    action: Action,
}

impl PendingPosition {
    pub fn new(
        symbol: Symbol,
        quantity: u64,
        direction: Direction,
        trade_kind: TradeKind,
        portfolio_id: PortfolioId,
    ) -> Result<Self, LedgerError> {
        let action = Action::lookup(direction, trade_kind).ok_or(LedgerError::UnmappedAction {
            direction,
            trade_kind,
        })?;
        Ok(Self {
            symbol,
            quantity,
            direction,
            trade_kind,
            portfolio_id,
            action,
        })
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Shares held in one symbol by one portfolio, with a single blended average cost.
///
/// The derived fields (`net`, `cost_basis`, pnl) are recomputed after every trade
/// and are only reachable through accessors so they cannot drift from the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledPosition {
    symbol: Symbol,
    direction: Direction,
    trade_kind: TradeKind,
    portfolio_id: PortfolioId,
    date_entered: Timestamp,
    action: Action,

    buys: u64,
    sells: u64,
    avg_price: Decimal,
    avg_buys_price: Decimal,
    avg_sells_price: Decimal,
    tot_buys_price: Decimal,
    tot_sells_price: Decimal,
    tot_commission: Decimal,

    net: i64,
    cost_basis: Decimal,
    net_tot: Decimal,
    net_tot_incl_comm: Decimal,
    market_value: Decimal,
    unrealized_pnl: Decimal,
    realized_pnl: Decimal,
}

impl FilledPosition {
    /// Opens an empty position at `price` from the order that is being filled.
    /// The shares arrive with the first [`transact`](Self::transact).
    pub fn from_pending(pending: &PendingPosition, date_entered: Timestamp, price: Decimal) -> Self {
        let record = FilledPositionRecord {
            symbol: pending.symbol.clone(),
            direction: pending.direction,
            trade_kind: pending.trade_kind,
            portfolio_id: pending.portfolio_id.clone(),
            date_entered,
            avg_price: price,
            buys: 0,
            sells: 0,
            avg_buys_price: Decimal::ZERO,
            avg_sells_price: Decimal::ZERO,
            tot_commission: Decimal::ZERO,
        };
        Self::build(record, pending.action())
    }

    // 4.3: rebuild from the eleven persisted fields without replaying history
    pub fn restore(record: FilledPositionRecord) -> Result<Self, LedgerError> {
        let action = Action::lookup(record.direction, record.trade_kind).ok_or(
            LedgerError::UnmappedAction {
                direction: record.direction,
                trade_kind: record.trade_kind,
            },
        )?;
        Ok(Self::build(record, action))
    }

    fn build(record: FilledPositionRecord, action: Action) -> Self {
        let mut position = Self {
            symbol: record.symbol,
            direction: record.direction,
            trade_kind: record.trade_kind,
            portfolio_id: record.portfolio_id,
            date_entered: record.date_entered,
            action,
            buys: record.buys,
            sells: record.sells,
            avg_price: record.avg_price,
            avg_buys_price: record.avg_buys_price,
            avg_sells_price: record.avg_sells_price,
            tot_buys_price: Decimal::from(record.buys) * record.avg_buys_price,
            tot_sells_price: Decimal::from(record.sells) * record.avg_sells_price,
            tot_commission: record.tot_commission,
            net: 0,
            cost_basis: Decimal::ZERO,
            net_tot: Decimal::ZERO,
            net_tot_incl_comm: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        };
        position.recompute_totals();
        // marked at cost until the first price arrives
        position.update_market_value(position.avg_price);
        position
    }

    pub fn record(&self) -> FilledPositionRecord {
        FilledPositionRecord {
            symbol: self.symbol.clone(),
            direction: self.direction,
            trade_kind: self.trade_kind,
            portfolio_id: self.portfolio_id.clone(),
            date_entered: self.date_entered,
            avg_price: self.avg_price,
            buys: self.buys,
            sells: self.sells,
            avg_buys_price: self.avg_buys_price,
            avg_sells_price: self.avg_sells_price,
            tot_commission: self.tot_commission,
        }
    }

    // 4.1: one fill against the position. returns the commission charged.
    // nothing is touched when the trade cannot be represented.
    pub fn transact(
        &mut self,
        action: Action,
        quantity: u64,
        price: Decimal,
        commissions: &CommissionSchedule,
    ) -> Result<Decimal, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity(self.symbol.clone()));
        }

        let overflow = || LedgerError::NotionalOverflow(self.symbol.clone());
        let value = price.checked_mul(Decimal::from(quantity)).ok_or_else(overflow)?;
        let commission = commissions.commission(quantity, price);

        let (held, side_avg) = match action {
            Action::Buy => (self.buys, self.avg_buys_price),
            Action::Sell => (self.sells, self.avg_sells_price),
        };
        let total = held
            .checked_add(quantity)
            .filter(|total| i64::try_from(*total).is_ok())
            .ok_or_else(overflow)?;
        let n = Decimal::from(total);
        let held = Decimal::from(held);
        let side_avg = side_avg
            .checked_mul(held)
            .and_then(|spent| spent.checked_add(value))
            .ok_or_else(overflow)?
            / n;
        // avg_price only re-blends on the side that matches the position's own action
        let avg_price = if action == self.action {
            let spent = self
                .avg_price
                .checked_mul(held)
                .and_then(|spent| spent.checked_add(value))
                .ok_or_else(overflow)?;
            let spent = match action {
                Action::Buy => spent.checked_add(commission),
                Action::Sell => spent.checked_sub(commission),
            }
            .ok_or_else(overflow)?;
            spent / n
        } else {
            self.avg_price
        };
        let net = match action {
            Action::Buy => total as i64 - self.sells as i64,
            Action::Sell => self.buys as i64 - total as i64,
        };
        for mark in [price, avg_price] {
            Decimal::from(net).checked_mul(mark).ok_or_else(overflow)?;
        }

        self.tot_commission += commission;
        self.avg_price = avg_price;
        match action {
            Action::Buy => {
                self.avg_buys_price = side_avg;
                self.buys = total;
                self.tot_buys_price = n * side_avg;
            }
            Action::Sell => {
                self.avg_sells_price = side_avg;
                self.sells = total;
                self.tot_sells_price = n * side_avg;
            }
        }

        self.recompute_totals();
        self.update_market_value(price);
        Ok(commission)
    }

    fn recompute_totals(&mut self) {
        self.net = self.buys as i64 - self.sells as i64;
        self.cost_basis = Decimal::from(self.net) * self.avg_price;
        self.net_tot = self.tot_sells_price - self.tot_buys_price;
        self.net_tot_incl_comm = self.net_tot - self.tot_commission;
    }

    /// Marks the position to `price`. Market value is the cash a liquidation would
    /// inject, so it is negative for shorts.
    pub fn update_market_value(&mut self, price: Decimal) {
        self.market_value = Decimal::from(self.net) * price;
        self.unrealized_pnl = self.market_value - self.cost_basis;
        self.realized_pnl = self.market_value + self.net_tot_incl_comm;
    }

    // 4.2: 1 + sign(net) * unrealized / cost_basis. undefined with no shares held.
    pub fn percent_pnl(&self) -> Result<Decimal, LedgerError> {
        if self.net == 0 {
            return Err(LedgerError::UndefinedPnl(self.symbol.clone()));
        }
        let ret = self
            .unrealized_pnl
            .checked_div(self.cost_basis)
            .ok_or_else(|| LedgerError::DegenerateCostBasis(self.symbol.clone()))?;
        Ok(Decimal::ONE + self.net_sign() * ret)
    }

    /// `|cost_basis * percent_pnl|`, expanded to `|cost_basis + sign(net) * unrealized|`
    /// so no intermediate division rounds.
    pub fn relative_value(&self) -> Result<Decimal, LedgerError> {
        if self.net == 0 {
            return Err(LedgerError::UndefinedPnl(self.symbol.clone()));
        }
        Ok((self.cost_basis + self.net_sign() * self.unrealized_pnl).abs())
    }

    pub fn holding_period(&self, now: Timestamp) -> Duration {
        holding_period(self.date_entered, now)
    }

    fn net_sign(&self) -> Decimal {
        Decimal::from(self.net.signum())
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn trade_kind(&self) -> TradeKind {
        self.trade_kind
    }

    pub fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    pub fn date_entered(&self) -> Timestamp {
        self.date_entered
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn buys(&self) -> u64 {
        self.buys
    }

    pub fn sells(&self) -> u64 {
        self.sells
    }

    pub fn net(&self) -> i64 {
        self.net
    }

    pub fn quantity(&self) -> u64 {
        self.net.unsigned_abs()
    }

    pub fn is_closed(&self) -> bool {
        self.net == 0
    }

    pub fn avg_price(&self) -> Decimal {
        self.avg_price
    }

    pub fn avg_buys_price(&self) -> Decimal {
        self.avg_buys_price
    }

    pub fn avg_sells_price(&self) -> Decimal {
        self.avg_sells_price
    }

    pub fn tot_buys_price(&self) -> Decimal {
        self.tot_buys_price
    }

    pub fn tot_sells_price(&self) -> Decimal {
        self.tot_sells_price
    }

    pub fn tot_commission(&self) -> Decimal {
        self.tot_commission
    }

    pub fn cost_basis(&self) -> Decimal {
        self.cost_basis
    }

    pub fn net_tot(&self) -> Decimal {
        self.net_tot
    }

    pub fn net_tot_incl_comm(&self) -> Decimal {
        self.net_tot_incl_comm
    }

    pub fn market_value(&self) -> Decimal {
        self.market_value
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pnl
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }
}

/// Everything needed to resume a position in a later session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledPositionRecord {
    pub symbol: Symbol,
    pub direction: Direction,
    pub trade_kind: TradeKind,
    pub portfolio_id: PortfolioId,
    pub date_entered: Timestamp,
    pub avg_price: Decimal,
    pub buys: u64,
    pub sells: u64,
    pub avg_buys_price: Decimal,
    pub avg_sells_price: Decimal,
    pub tot_commission: Decimal,
}

/// Ledger invariant violations. None of these are recoverable: the tick that hit one
/// is aborted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("portfolio {portfolio_id} holds {occupied} positions, capacity is {maximum}")]
    CapacityExceeded {
        portfolio_id: PortfolioId,
        occupied: usize,
        maximum: usize,
    },

    #[error("fill for {symbol} in portfolio {portfolio_id} has no pending position")]
    NoPendingPosition { portfolio_id: PortfolioId, symbol: Symbol },

    #[error("portfolio {portfolio_id} already has an order in flight for {symbol}")]
    DuplicatePendingOrder { portfolio_id: PortfolioId, symbol: Symbol },

    #[error("percent pnl is undefined for {0}: no shares held")]
    UndefinedPnl(Symbol),

    #[error("cost basis of {0} is zero")]
    DegenerateCostBasis(Symbol),

    #[error("no action mapped for direction {direction} and trade kind {trade_kind}")]
    UnmappedAction {
        direction: Direction,
        trade_kind: TradeKind,
    },

    #[error("zero-quantity trade for {0}")]
    ZeroQuantity(Symbol),

    #[error("notional of the {0} trade is out of range")]
    NotionalOverflow(Symbol),

    #[error("event for portfolio {got} routed to portfolio {expected}")]
    PortfolioMismatch { expected: PortfolioId, got: PortfolioId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending(direction: Direction) -> PendingPosition {
        PendingPosition::new(
            Symbol::from("GOOG"),
            100,
            direction,
            TradeKind::Buy,
            PortfolioId::from("test"),
        )
        .unwrap()
    }

    fn opened(direction: Direction, price: Decimal) -> FilledPosition {
        let pending = pending(direction);
        let mut pos = FilledPosition::from_pending(&pending, Timestamp::from_ymd(2015, 1, 5).unwrap(), price);
        pos.transact(pending.action(), 100, price, &CommissionSchedule::default())
            .unwrap();
        pos
    }

    #[test]
    fn first_buy_without_commission_sets_avg_price() {
        let pending = pending(Direction::Long);
        let mut pos = FilledPosition::from_pending(&pending, Timestamp::from_ymd(2015, 1, 5).unwrap(), dec!(100.5));
        pos.transact(Action::Buy, 100, dec!(100.5), &CommissionSchedule::zero()).unwrap();

        assert_eq!(pos.avg_price(), dec!(100.5));
        assert_eq!(pos.cost_basis(), dec!(10050));
        assert_eq!(pos.quantity(), 100);
        assert_eq!(pos.percent_pnl().unwrap(), Decimal::ONE);
    }

    #[test]
    fn long_round_trip() {
        let mut pos = opened(Direction::Long, dec!(100));
        assert_eq!(pos.avg_price(), dec!(100.01)); // commission folded into cost
        pos.update_market_value(dec!(101));

        assert_eq!(pos.quantity(), 100);
        assert_eq!(pos.market_value(), dec!(10100));
        assert_eq!(pos.unrealized_pnl(), dec!(99));
        assert_eq!(pos.tot_commission(), dec!(1));
        assert_eq!(
            pos.percent_pnl().unwrap(),
            Decimal::ONE + pos.unrealized_pnl() / pos.cost_basis()
        );

        pos.transact(Action::Sell, 50, dec!(100.5), &CommissionSchedule::default()).unwrap();
        assert_eq!(pos.quantity(), 50);
        assert_eq!(pos.avg_price(), dec!(100.01)); // sells don't move a long's cost
        assert_eq!(pos.realized_pnl(), dec!(48));
        assert_eq!(pos.unrealized_pnl(), dec!(24.5));
        assert_eq!(pos.tot_commission(), dec!(2));

        pos.transact(Action::Sell, 50, dec!(101), &CommissionSchedule::default()).unwrap();
        assert_eq!(pos.quantity(), 0);
        assert!(pos.is_closed());
        assert_eq!(pos.realized_pnl(), dec!(72));
        assert_eq!(pos.unrealized_pnl(), dec!(0));
        assert_eq!(pos.tot_commission(), dec!(3));
    }

    #[test]
    fn short_round_trip() {
        let mut pos = opened(Direction::Short, dec!(100));
        assert_eq!(pos.action(), Action::Sell);
        assert_eq!(pos.avg_price(), dec!(99.99));
        pos.update_market_value(dec!(101));

        assert_eq!(pos.net(), -100);
        assert_eq!(pos.market_value(), dec!(-10100));
        assert_eq!(pos.unrealized_pnl(), dec!(-101));
        assert_eq!(
            pos.percent_pnl().unwrap(),
            Decimal::ONE - pos.unrealized_pnl() / pos.cost_basis()
        );

        pos.transact(Action::Buy, 50, dec!(100.5), &CommissionSchedule::default()).unwrap();
        assert_eq!(pos.quantity(), 50);
        assert_eq!(pos.realized_pnl(), dec!(-52));
        assert_eq!(pos.unrealized_pnl(), dec!(-25.5));

        pos.transact(Action::Buy, 50, dec!(101), &CommissionSchedule::default()).unwrap();
        assert_eq!(pos.quantity(), 0);
        assert_eq!(pos.realized_pnl(), dec!(-78));
        assert_eq!(pos.tot_commission(), dec!(3));
    }

    #[test]
    fn adding_to_a_long_blends_cost() {
        let mut pos = opened(Direction::Long, dec!(100));
        pos.transact(Action::Buy, 100, dec!(110), &CommissionSchedule::default()).unwrap();
        // (100.01 * 100 + 11000 + 1) / 200
        assert_eq!(pos.avg_price(), dec!(105.01));
        assert_eq!(pos.avg_buys_price(), dec!(105));
        assert_eq!(pos.quantity(), 200);
    }

    #[test]
    fn percent_pnl_fails_when_flat() {
        let mut pos = opened(Direction::Long, dec!(100));
        pos.transact(Action::Sell, 100, dec!(100), &CommissionSchedule::default()).unwrap();
        assert!(matches!(pos.percent_pnl(), Err(LedgerError::UndefinedPnl(_))));
        assert!(pos.relative_value().is_err());
    }

    #[test]
    fn relative_value_matches_definition() {
        let mut pos = opened(Direction::Long, dec!(100));
        pos.update_market_value(dec!(104));
        let literal = (pos.cost_basis() * pos.percent_pnl().unwrap()).abs();
        let diff = (literal - pos.relative_value().unwrap()).abs();
        assert!(diff < dec!(0.000000001));
        assert_eq!(pos.relative_value().unwrap(), dec!(10400));
    }

    #[test]
    fn zero_quantity_trade_rejected() {
        let mut pos = opened(Direction::Long, dec!(100));
        let result = pos.transact(Action::Buy, 0, dec!(100), &CommissionSchedule::default());
        assert!(matches!(result, Err(LedgerError::ZeroQuantity(_))));
        assert_eq!(pos.quantity(), 100);
    }

    #[test]
    fn oversized_notional_rejected_untouched() {
        let mut pos = opened(Direction::Long, dec!(100));
        let before = pos.clone();
        let result = pos.transact(
            Action::Buy,
            u64::MAX,
            dec!(10_000_000_000),
            &CommissionSchedule::default(),
        );
        assert_eq!(result, Err(LedgerError::NotionalOverflow(Symbol::from("GOOG"))));
        assert_eq!(pos, before);
    }

    #[test]
    fn restore_from_record() {
        let mut pos = opened(Direction::Long, dec!(100));
        pos.transact(Action::Sell, 30, dec!(102), &CommissionSchedule::default()).unwrap();

        let restored = FilledPosition::restore(pos.record()).unwrap();
        assert_eq!(restored.quantity(), 70);
        assert_eq!(restored.avg_price(), pos.avg_price());
        assert_eq!(restored.cost_basis(), pos.cost_basis());
        assert_eq!(restored.net_tot_incl_comm(), pos.net_tot_incl_comm());
        assert_eq!(restored.tot_commission(), dec!(2));
    }

    #[test]
    fn holding_period_counts_business_days() {
        let pos = opened(Direction::Long, dec!(100));
        // entered monday 2015-01-05, now the next monday
        let now = Timestamp::from_ymd(2015, 1, 12).unwrap();
        assert_eq!(pos.holding_period(now).num_days(), 5);
    }
}
