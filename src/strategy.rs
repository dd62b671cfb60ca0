//! Strategies.
//!
//! A strategy is a [`SignalRules`] value (the decisions) wrapped in the [`Strategy`]
//! adapter (the bookkeeping the engine relies on). The engine only sees the
//! object-safe [`SignalSource`].

use crate::events::SignalEvent;
use crate::portfolio::PortfolioLedger;
use crate::position::FilledPosition;
use crate::prices::PriceSource;
use crate::types::{Direction, PortfolioId, Symbol, Timestamp, TradeKind};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::trace;

/// Read-only view a strategy decides from.
pub struct StrategyContext<'a> {
    pub timestamp: Timestamp,
    pub ledger: &'a PortfolioLedger,
    pub prices: &'a dyn PriceSource,
}

impl<'a> StrategyContext<'a> {
    pub fn position(&self, symbol: &Symbol) -> Option<&'a FilledPosition> {
        self.ledger.filled(symbol)
    }
}

pub trait SignalSource: Send {
    fn portfolio_id(&self) -> &PortfolioId;

    /// Signals for this tick, in the order they should be acted on.
    fn generate_signals(&mut self, ctx: &StrategyContext<'_>) -> Vec<SignalEvent>;

    /// One Exit signal per held position.
    fn close(&self, ctx: &StrategyContext<'_>) -> Vec<SignalEvent>;
}

pub trait SignalRules: Send {
    type Features;

    fn generate_features(&self, ctx: &StrategyContext<'_>) -> Self::Features;

    /// Orders candidate symbols, most wanted first. Dropping a symbol skips it.
    fn generate_priority(&self, _features: &Self::Features, candidates: Vec<Symbol>) -> Vec<Symbol> {
        candidates
    }

    fn buy_indicator(&self, symbol: &Symbol, features: &Self::Features, ctx: &StrategyContext<'_>) -> bool;

    fn sell_indicator(
        &self,
        position: &FilledPosition,
        features: &Self::Features,
        ctx: &StrategyContext<'_>,
    ) -> bool;

    fn exit_indicator(
        &self,
        position: &FilledPosition,
        features: &Self::Features,
        ctx: &StrategyContext<'_>,
    ) -> bool;

    fn buy_proportion(&self, symbol: &Symbol, features: &Self::Features, ctx: &StrategyContext<'_>) -> Decimal;

    fn sell_proportion(&self, _position: &FilledPosition, _features: &Self::Features) -> Decimal {
        Decimal::ONE
    }
}

pub struct Strategy<R: SignalRules> {
    portfolio_id: PortfolioId,
    direction: Direction,
    // empty means every symbol the price source quotes
    universe: Vec<Symbol>,
    rules: R,
}

impl<R: SignalRules> Strategy<R> {
    pub fn new(portfolio_id: PortfolioId, direction: Direction, rules: R) -> Self {
        Self {
            portfolio_id,
            direction,
            universe: Vec::new(),
            rules,
        }
    }

    pub fn with_universe(mut self, universe: Vec<Symbol>) -> Self {
        self.universe = universe;
        self
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    fn signal(
        &self,
        symbol: Symbol,
        trade_kind: TradeKind,
        direction: Direction,
        proportion: Decimal,
        timestamp: Timestamp,
    ) -> SignalEvent {
        SignalEvent {
            symbol,
            proportion,
            trade_kind,
            direction,
            timestamp,
            portfolio_id: self.portfolio_id.clone(),
        }
    }

    fn candidates(&self, ctx: &StrategyContext<'_>) -> Vec<Symbol> {
        let mut seen = BTreeSet::new();
        let quoted = if self.universe.is_empty() {
            ctx.prices.symbols()
        } else {
            self.universe.clone()
        };
        quoted
            .into_iter()
            .chain(ctx.ledger.held_symbols())
            .filter(|symbol| seen.insert(symbol.clone()))
            .collect()
    }
}

impl<R: SignalRules> SignalSource for Strategy<R> {
    fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    fn generate_signals(&mut self, ctx: &StrategyContext<'_>) -> Vec<SignalEvent> {
        let features = self.rules.generate_features(ctx);
        let ordered = self.rules.generate_priority(&features, self.candidates(ctx));

        let mut signals = Vec::new();
        for symbol in ordered {
            if ctx.ledger.has_pending(&symbol) {
                continue;
            }
            match ctx.position(&symbol) {
                Some(position) => {
                    if self.rules.sell_indicator(position, &features, ctx) {
                        let proportion = self.rules.sell_proportion(position, &features);
                        signals.push(self.signal(
                            symbol,
                            TradeKind::Sell,
                            position.direction(),
                            proportion,
                            ctx.timestamp,
                        ));
                    } else if self.rules.exit_indicator(position, &features, ctx) {
                        signals.push(self.signal(
                            symbol,
                            TradeKind::Exit,
                            position.direction(),
                            Decimal::ONE,
                            ctx.timestamp,
                        ));
                    }
                }
                None => {
                    if self.rules.buy_indicator(&symbol, &features, ctx) {
                        let proportion = self.rules.buy_proportion(&symbol, &features, ctx);
                        signals.push(self.signal(
                            symbol,
                            TradeKind::Buy,
                            self.direction,
                            proportion,
                            ctx.timestamp,
                        ));
                    }
                }
            }
        }

        trace!(portfolio = %self.portfolio_id, count = signals.len(), "signals generated");
        signals
    }

    fn close(&self, ctx: &StrategyContext<'_>) -> Vec<SignalEvent> {
        ctx.ledger
            .filled_positions()
            .map(|position| {
                self.signal(
                    position.symbol().clone(),
                    TradeKind::Exit,
                    position.direction(),
                    Decimal::ONE,
                    ctx.timestamp,
                )
            })
            .collect()
    }
}

fn equal_weight(ctx: &StrategyContext<'_>) -> Decimal {
    match ctx.ledger.maximum_capacity() {
        0 => Decimal::ZERO,
        n => Decimal::ONE / Decimal::from(n),
    }
}

/// Buy whatever is quoted, never sell. Each position gets an equal share of equity.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl SignalRules for BuyAndHold {
    type Features = ();

    fn generate_features(&self, _ctx: &StrategyContext<'_>) {}

    fn buy_indicator(&self, _symbol: &Symbol, _features: &(), _ctx: &StrategyContext<'_>) -> bool {
        true
    }

    fn sell_indicator(&self, _position: &FilledPosition, _features: &(), _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn exit_indicator(&self, _position: &FilledPosition, _features: &(), _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn buy_proportion(&self, _symbol: &Symbol, _features: &(), ctx: &StrategyContext<'_>) -> Decimal {
        equal_weight(ctx)
    }
}

/// Buy and hold, but sell any position held longer than `max_days_held` business days.
#[derive(Debug, Clone, Copy)]
pub struct HoldingPeriodRules {
    pub max_days_held: i64,
}

impl SignalRules for HoldingPeriodRules {
    type Features = ();

    fn generate_features(&self, _ctx: &StrategyContext<'_>) {}

    fn buy_indicator(&self, _symbol: &Symbol, _features: &(), _ctx: &StrategyContext<'_>) -> bool {
        true
    }

    fn sell_indicator(&self, position: &FilledPosition, _features: &(), ctx: &StrategyContext<'_>) -> bool {
        position.holding_period(ctx.timestamp).num_days() > self.max_days_held
    }

    fn exit_indicator(&self, _position: &FilledPosition, _features: &(), _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn buy_proportion(&self, _symbol: &Symbol, _features: &(), ctx: &StrategyContext<'_>) -> Decimal {
        equal_weight(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FillEvent, OrderEvent};
    use crate::execution::CommissionSchedule;
    use crate::prices::{Bar, BarSnapshot};
    use rust_decimal_macros::dec;

    fn ledger() -> PortfolioLedger {
        PortfolioLedger::new(PortfolioId::from("p"), 4, dec!(10000), CommissionSchedule::zero())
    }

    fn order(symbol: &str, trade_kind: TradeKind, at: Timestamp) -> OrderEvent {
        OrderEvent {
            symbol: Symbol::from(symbol),
            quantity: 10,
            trade_kind,
            direction: Direction::Long,
            timestamp: at,
            portfolio_id: PortfolioId::from("p"),
        }
    }

    fn hold(ledger: &mut PortfolioLedger, symbol: &str, at: Timestamp) {
        let order = order(symbol, TradeKind::Buy, at);
        ledger.accept_order(&order).unwrap();
        ledger
            .accept_fill(&FillEvent::from_order(&order, dec!(1000), dec!(0), at, false))
            .unwrap();
    }

    fn prices() -> BarSnapshot {
        BarSnapshot::new()
            .with_bar("AAA", Bar::flat(dec!(100)))
            .with_bar("BBB", Bar::flat(dec!(100)))
    }

    #[test]
    fn buy_and_hold_buys_unheld_symbols() {
        let mut ledger = ledger();
        let monday = Timestamp::from_ymd(2015, 1, 5).unwrap();
        hold(&mut ledger, "AAA", monday);
        let prices = prices();
        let ctx = StrategyContext {
            timestamp: monday,
            ledger: &ledger,
            prices: &prices,
        };

        let mut strategy = Strategy::new(PortfolioId::from("p"), Direction::Long, BuyAndHold);
        let signals = strategy.generate_signals(&ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, Symbol::from("BBB"));
        assert_eq!(signals[0].trade_kind, TradeKind::Buy);
        assert_eq!(signals[0].proportion, dec!(0.25));
    }

    #[test]
    fn pending_symbols_are_skipped() {
        let mut ledger = ledger();
        let monday = Timestamp::from_ymd(2015, 1, 5).unwrap();
        ledger.accept_order(&order("AAA", TradeKind::Buy, monday)).unwrap();
        let prices = prices();
        let ctx = StrategyContext {
            timestamp: monday,
            ledger: &ledger,
            prices: &prices,
        };

        let mut strategy = Strategy::new(PortfolioId::from("p"), Direction::Long, BuyAndHold);
        let symbols: Vec<Symbol> = strategy.generate_signals(&ctx).into_iter().map(|s| s.symbol).collect();
        assert_eq!(symbols, vec![Symbol::from("BBB")]);
    }

    #[test]
    fn holding_period_sells_stale_positions() {
        let mut ledger = ledger();
        let entered = Timestamp::from_ymd(2015, 1, 5).unwrap();
        hold(&mut ledger, "AAA", entered);
        let prices = prices();
        let mut strategy = Strategy::new(
            PortfolioId::from("p"),
            Direction::Long,
            HoldingPeriodRules { max_days_held: 5 },
        )
        .with_universe(vec![Symbol::from("AAA")]);

        // five business days later: not yet
        let ctx = StrategyContext {
            timestamp: Timestamp::from_ymd(2015, 1, 12).unwrap(),
            ledger: &ledger,
            prices: &prices,
        };
        assert!(strategy.generate_signals(&ctx).is_empty());

        let ctx = StrategyContext {
            timestamp: Timestamp::from_ymd(2015, 1, 13).unwrap(),
            ledger: &ledger,
            prices: &prices,
        };
        let signals = strategy.generate_signals(&ctx);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].trade_kind, TradeKind::Sell);
        assert_eq!(signals[0].proportion, Decimal::ONE);
    }

    #[test]
    fn close_exits_every_position() {
        let mut ledger = ledger();
        let monday = Timestamp::from_ymd(2015, 1, 5).unwrap();
        hold(&mut ledger, "AAA", monday);
        hold(&mut ledger, "BBB", monday);
        let prices = prices();
        let ctx = StrategyContext {
            timestamp: monday,
            ledger: &ledger,
            prices: &prices,
        };

        let strategy = Strategy::new(PortfolioId::from("p"), Direction::Long, BuyAndHold);
        let exits = strategy.close(&ctx);
        assert_eq!(exits.len(), 2);
        assert!(exits.iter().all(|s| s.trade_kind == TradeKind::Exit));
    }
}
