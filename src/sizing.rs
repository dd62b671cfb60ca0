// 5.0: position sizing. turns a signal into a whole number of shares. a missing price
// sizes to zero, which the engine treats as "nothing to do this tick".

use crate::events::SignalEvent;
use crate::portfolio::PortfolioLedger;
use crate::position::LedgerError;
use crate::prices::PriceSource;
use crate::types::TradeKind;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub trait PositionSizer: Send {
    fn buy_quantity(
        &self,
        signal: &SignalEvent,
        ledger: &PortfolioLedger,
        prices: &dyn PriceSource,
    ) -> Result<u64, LedgerError>;

    fn sell_quantity(&self, signal: &SignalEvent, ledger: &PortfolioLedger) -> u64;

    /// The whole position, or nothing when the symbol isn't held.
    fn exit_quantity(&self, signal: &SignalEvent, ledger: &PortfolioLedger) -> u64 {
        ledger
            .filled(&signal.symbol)
            .map(|position| position.quantity())
            .unwrap_or(0)
    }

    fn size(
        &self,
        signal: &SignalEvent,
        ledger: &PortfolioLedger,
        prices: &dyn PriceSource,
    ) -> Result<u64, LedgerError> {
        match signal.trade_kind {
            TradeKind::Buy => self.buy_quantity(signal, ledger, prices),
            TradeKind::Sell => Ok(self.sell_quantity(signal, ledger)),
            TradeKind::Exit => Ok(self.exit_quantity(signal, ledger)),
        }
    }
}

// floor(amount / price), 0 for a missing or non-positive price
fn shares_for(amount: Decimal, price: Option<Decimal>) -> u64 {
    let Some(price) = price.filter(|p| p.is_sign_positive() && !p.is_zero()) else {
        return 0;
    };
    if amount <= Decimal::ZERO {
        return 0;
    }
    amount
        .checked_div(price)
        .map(|shares| shares.floor())
        .and_then(|shares| shares.to_u64())
        .unwrap_or(0)
}

fn held_fraction(weight: Decimal, ledger: &PortfolioLedger, signal: &SignalEvent) -> u64 {
    let held = ledger
        .filled(&signal.symbol)
        .map(|position| position.quantity())
        .unwrap_or(0);
    (weight * Decimal::from(held)).floor().to_u64().unwrap_or(0)
}

/// Spends the signal's proportion of equity, capped by free capital.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestedProportionSizer;

impl PositionSizer for SuggestedProportionSizer {
    fn buy_quantity(
        &self,
        signal: &SignalEvent,
        ledger: &PortfolioLedger,
        prices: &dyn PriceSource,
    ) -> Result<u64, LedgerError> {
        let spend = (ledger.equity()? * signal.proportion).min(ledger.capital());
        Ok(shares_for(spend, prices.current_price(&signal.symbol)))
    }

    fn sell_quantity(&self, signal: &SignalEvent, ledger: &PortfolioLedger) -> u64 {
        held_fraction(signal.proportion, ledger, signal)
    }
}

/// Splits equity evenly over a fixed number of positions. Sells liquidate.
#[derive(Debug, Clone, Copy)]
pub struct EqualEquitySizer {
    pub n_positions: usize,
}

impl PositionSizer for EqualEquitySizer {
    fn buy_quantity(
        &self,
        signal: &SignalEvent,
        ledger: &PortfolioLedger,
        prices: &dyn PriceSource,
    ) -> Result<u64, LedgerError> {
        if self.n_positions == 0 {
            return Ok(0);
        }
        let slice = ledger.equity()? / Decimal::from(self.n_positions);
        let spend = slice.min(ledger.capital());
        Ok(shares_for(spend, prices.current_price(&signal.symbol)))
    }

    fn sell_quantity(&self, signal: &SignalEvent, ledger: &PortfolioLedger) -> u64 {
        self.exit_quantity(signal, ledger)
    }
}

/// Constant share counts. Sells never exceed the held quantity.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizer {
    pub buy_size: u64,
    pub sell_size: u64,
}

impl PositionSizer for FixedSizer {
    fn buy_quantity(
        &self,
        _signal: &SignalEvent,
        _ledger: &PortfolioLedger,
        _prices: &dyn PriceSource,
    ) -> Result<u64, LedgerError> {
        Ok(self.buy_size)
    }

    fn sell_quantity(&self, signal: &SignalEvent, ledger: &PortfolioLedger) -> u64 {
        self.sell_size.min(self.exit_quantity(signal, ledger))
    }
}
