// 7.0: price source seam. the engine never fetches data itself, it is handed something
// that answers these four questions for the current tick.

use crate::types::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait PriceSource {
    /// Latest tradeable price. `None` means "cannot act on this symbol now".
    fn current_price(&self, symbol: &Symbol) -> Option<Decimal>;
    fn session_high(&self, symbol: &Symbol) -> Option<Decimal>;
    fn session_low(&self, symbol: &Symbol) -> Option<Decimal>;
    /// Symbols priced this tick, in a stable order.
    fn symbols(&self) -> Vec<Symbol>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            open,
            high,
            low,
            close,
        }
    }

    /// A bar that traded at one price all session.
    pub fn flat(price: Decimal) -> Self {
        Self::new(price, price, price, price)
    }

    pub fn midpoint(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }
}

/// One session of bars keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarSnapshot {
    bars: BTreeMap<Symbol, Bar>,
}

impl BarSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bar(mut self, symbol: impl Into<Symbol>, bar: Bar) -> Self {
        self.insert(symbol.into(), bar);
        self
    }

    pub fn insert(&mut self, symbol: Symbol, bar: Bar) {
        self.bars.insert(symbol, bar);
    }

    pub fn remove(&mut self, symbol: &Symbol) -> Option<Bar> {
        self.bars.remove(symbol)
    }

    pub fn bar(&self, symbol: &Symbol) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl PriceSource for BarSnapshot {
    fn current_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.bars.get(symbol).map(|bar| bar.close)
    }

    fn session_high(&self, symbol: &Symbol) -> Option<Decimal> {
        self.bars.get(symbol).map(|bar| bar.high)
    }

    fn session_low(&self, symbol: &Symbol) -> Option<Decimal> {
        self.bars.get(symbol).map(|bar| bar.low)
    }

    fn symbols(&self) -> Vec<Symbol> {
        self.bars.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_answers_from_bars() {
        let prices = BarSnapshot::new()
            .with_bar("SPY", Bar::new(dec!(100), dec!(101), dec!(99), dec!(100.5)))
            .with_bar("AAPL", Bar::flat(dec!(150)));

        let spy = Symbol::from("SPY");
        assert_eq!(prices.current_price(&spy), Some(dec!(100.5)));
        assert_eq!(prices.session_high(&spy), Some(dec!(101)));
        assert_eq!(prices.session_low(&spy), Some(dec!(99)));
        assert_eq!(prices.bar(&spy).unwrap().midpoint(), dec!(100));
        assert_eq!(prices.symbols(), vec![Symbol::from("AAPL"), spy]);
    }

    #[test]
    fn unknown_symbol_has_no_price() {
        let prices = BarSnapshot::new();
        assert!(prices.current_price(&Symbol::from("XYZ")).is_none());
        assert!(prices.is_empty());
    }
}
