//! Portfolio ledger.
//!
//! One ledger per portfolio: free capital, the positions it holds, and the orders it
//! has in flight. Every capital movement in the fund goes through `accept_fill`.

use crate::events::{FillEvent, OrderEvent};
use crate::execution::CommissionSchedule;
use crate::position::{FilledPosition, FilledPositionRecord, LedgerError, PendingPosition};
use crate::prices::PriceSource;
use crate::types::{Action, Direction, PortfolioId, Symbol, TradeKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    portfolio_id: PortfolioId,
    maximum_capacity: usize,
    capital: Decimal,
    filled: BTreeMap<Symbol, FilledPosition>,
    pending: BTreeMap<Symbol, PendingPosition>,
    commissions: CommissionSchedule,
}

/// What a fill did to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub symbol: Symbol,
    pub action: Action,
    pub quantity: u64,
    pub capital_change: Decimal,
    pub opened: bool,
    pub closed: bool,
}

impl PortfolioLedger {
    pub fn new(
        portfolio_id: PortfolioId,
        maximum_capacity: usize,
        capital: Decimal,
        commissions: CommissionSchedule,
    ) -> Self {
        Self {
            portfolio_id,
            maximum_capacity,
            capital,
            filled: BTreeMap::new(),
            pending: BTreeMap::new(),
            commissions,
        }
    }

    pub fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    pub fn maximum_capacity(&self) -> usize {
        self.maximum_capacity
    }

    pub fn capital(&self) -> Decimal {
        self.capital
    }

    pub(crate) fn set_capital(&mut self, capital: Decimal) {
        self.capital = capital;
    }

    // a held symbol with an order in flight still occupies one slot
    fn occupied(&self) -> usize {
        let pending_only = self
            .pending
            .keys()
            .filter(|symbol| !self.filled.contains_key(*symbol))
            .count();
        self.filled.len() + pending_only
    }

    pub fn available_capacity(&self) -> Result<usize, LedgerError> {
        let occupied = self.occupied();
        self.maximum_capacity
            .checked_sub(occupied)
            .ok_or_else(|| LedgerError::CapacityExceeded {
                portfolio_id: self.portfolio_id.clone(),
                occupied,
                maximum: self.maximum_capacity,
            })
    }

    pub fn is_tradeable(&self, trade_kind: TradeKind) -> Result<bool, LedgerError> {
        let available = self.available_capacity()?;
        Ok(match trade_kind {
            TradeKind::Sell | TradeKind::Exit => true,
            TradeKind::Buy => available > 0,
        })
    }

    fn check_owner(&self, portfolio_id: &PortfolioId) -> Result<(), LedgerError> {
        if portfolio_id != &self.portfolio_id {
            return Err(LedgerError::PortfolioMismatch {
                expected: self.portfolio_id.clone(),
                got: portfolio_id.clone(),
            });
        }
        Ok(())
    }

    /// Records an order as in flight. At most one in-flight order per symbol.
    pub fn accept_order(&mut self, order: &OrderEvent) -> Result<(), LedgerError> {
        self.check_owner(&order.portfolio_id)?;
        if order.quantity == 0 {
            return Err(LedgerError::ZeroQuantity(order.symbol.clone()));
        }
        if self.pending.contains_key(&order.symbol) {
            return Err(LedgerError::DuplicatePendingOrder {
                portfolio_id: self.portfolio_id.clone(),
                symbol: order.symbol.clone(),
            });
        }
        if !self.filled.contains_key(&order.symbol) && self.available_capacity()? == 0 {
            return Err(LedgerError::CapacityExceeded {
                portfolio_id: self.portfolio_id.clone(),
                occupied: self.occupied() + 1,
                maximum: self.maximum_capacity,
            });
        }

        let pending = PendingPosition::new(
            order.symbol.clone(),
            order.quantity,
            order.direction,
            order.trade_kind,
            order.portfolio_id.clone(),
        )?;
        debug!(
            portfolio = %self.portfolio_id,
            symbol = %order.symbol,
            quantity = order.quantity,
            action = %pending.action(),
            "order pending"
        );
        self.pending.insert(order.symbol.clone(), pending);
        Ok(())
    }

    /// Drops an in-flight order that never reached the broker.
    pub fn cancel_pending(&mut self, symbol: &Symbol) -> Option<PendingPosition> {
        let removed = self.pending.remove(symbol);
        if removed.is_some() {
            debug!(portfolio = %self.portfolio_id, symbol = %symbol, "pending order rolled back");
        }
        removed
    }

    // 4.4: resolve the pending entry, trade the position, move capital
    pub fn accept_fill(&mut self, fill: &FillEvent) -> Result<FillOutcome, LedgerError> {
        self.check_owner(&fill.portfolio_id)?;
        let price = fill
            .price()
            .ok_or_else(|| LedgerError::ZeroQuantity(fill.symbol.clone()))?;
        let action = fill.action().ok_or(LedgerError::UnmappedAction {
            direction: fill.direction,
            trade_kind: fill.trade_kind,
        })?;
        let pending = self
            .pending
            .remove(&fill.symbol)
            .ok_or_else(|| LedgerError::NoPendingPosition {
                portfolio_id: self.portfolio_id.clone(),
                symbol: fill.symbol.clone(),
            })?;

        let outcome = match self.filled.remove(&fill.symbol) {
            None => self.open_position(&pending, fill, action, price),
            Some(position) => self.modify_position(position, fill, action, price),
        };
        if outcome.is_err() {
            // leave the ledger as it was found
            self.pending.insert(fill.symbol.clone(), pending);
        }
        outcome
    }

    fn open_position(
        &mut self,
        pending: &PendingPosition,
        fill: &FillEvent,
        action: Action,
        price: Decimal,
    ) -> Result<FillOutcome, LedgerError> {
        let mut position = FilledPosition::from_pending(pending, fill.timestamp, price);
        position.transact(action, fill.quantity, price, &self.commissions)?;
        let cost = position.relative_value()?;

        let Some((capital_change, capital)) = cost
            .checked_add(fill.commission)
            .and_then(|outlay| self.capital.checked_sub(outlay).map(|capital| (-outlay, capital)))
        else {
            return Err(LedgerError::NotionalOverflow(fill.symbol.clone()));
        };
        self.capital = capital;
        info!(
            portfolio = %self.portfolio_id,
            symbol = %fill.symbol,
            quantity = fill.quantity,
            %price,
            capital = %self.capital,
            "position opened"
        );
        self.filled.insert(fill.symbol.clone(), position);

        Ok(FillOutcome {
            symbol: fill.symbol.clone(),
            action,
            quantity: fill.quantity,
            capital_change,
            opened: true,
            closed: false,
        })
    }

    fn modify_position(
        &mut self,
        mut position: FilledPosition,
        fill: &FillEvent,
        action: Action,
        price: Decimal,
    ) -> Result<FillOutcome, LedgerError> {
        let before = position.clone();
        if let Err(e) = position.transact(action, fill.quantity, price, &self.commissions) {
            self.filled.insert(fill.symbol.clone(), before);
            return Err(e);
        }

        // cash released is (1 +/- p_chng) * avg_price * q with p_chng the move away from
        // average cost. expanded so the division by avg_price never rounds.
        let capital_change = match fill.trade_kind {
            TradeKind::Sell | TradeKind::Exit => {
                let avg = position.avg_price();
                if avg.is_zero() {
                    self.filled.insert(fill.symbol.clone(), before);
                    return Err(LedgerError::DegenerateCostBasis(fill.symbol.clone()));
                }
                let q = Decimal::from(fill.quantity);
                let per_share = match fill.direction {
                    Direction::Long => avg.checked_add(price - avg),
                    Direction::Short => avg.checked_sub(price - avg),
                };
                per_share
                    .and_then(|p| p.checked_mul(q))
                    .and_then(|value| value.checked_sub(fill.commission))
            }
            TradeKind::Buy => fill.fill_cost.checked_add(fill.commission).map(|cost| -cost),
        };
        let Some((capital_change, capital)) = capital_change
            .and_then(|change| self.capital.checked_add(change).map(|capital| (change, capital)))
        else {
            self.filled.insert(fill.symbol.clone(), before);
            return Err(LedgerError::NotionalOverflow(fill.symbol.clone()));
        };
        self.capital = capital;

        let closed = position.is_closed();
        if closed {
            info!(
                portfolio = %self.portfolio_id,
                symbol = %fill.symbol,
                realized = %position.realized_pnl(),
                capital = %self.capital,
                "position closed"
            );
        } else {
            debug!(
                portfolio = %self.portfolio_id,
                symbol = %fill.symbol,
                quantity = position.quantity(),
                capital = %self.capital,
                "position modified"
            );
            self.filled.insert(fill.symbol.clone(), position);
        }

        Ok(FillOutcome {
            symbol: fill.symbol.clone(),
            action,
            quantity: fill.quantity,
            capital_change,
            opened: false,
            closed,
        })
    }

    /// Free capital plus the value of every held position.
    pub fn equity(&self) -> Result<Decimal, LedgerError> {
        self.filled
            .values()
            .try_fold(self.capital, |acc, position| Ok(acc + position.relative_value()?))
    }

    /// Marks every held position to the source's current price. Positions the
    /// source has no price for keep their last mark.
    pub fn mark_to_market(&mut self, prices: &dyn PriceSource) {
        for (symbol, position) in self.filled.iter_mut() {
            if let Some(price) = prices.current_price(symbol) {
                position.update_market_value(price);
            }
        }
    }

    pub fn filled(&self, symbol: &Symbol) -> Option<&FilledPosition> {
        self.filled.get(symbol)
    }

    pub fn pending(&self, symbol: &Symbol) -> Option<&PendingPosition> {
        self.pending.get(symbol)
    }

    pub fn has_pending(&self, symbol: &Symbol) -> bool {
        self.pending.contains_key(symbol)
    }

    pub fn has_any_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn filled_positions(&self) -> impl Iterator<Item = &FilledPosition> {
        self.filled.values()
    }

    pub fn pending_positions(&self) -> impl Iterator<Item = &PendingPosition> {
        self.pending.values()
    }

    pub fn held_symbols(&self) -> Vec<Symbol> {
        self.filled.keys().cloned().collect()
    }

    pub fn commissions(&self) -> &CommissionSchedule {
        &self.commissions
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: self.portfolio_id.clone(),
            maximum_capacity: self.maximum_capacity,
            capital: self.capital,
            filled: self.filled.values().map(FilledPosition::record).collect(),
            commissions: self.commissions.clone(),
        }
    }

    pub fn from_snapshot(snapshot: PortfolioSnapshot) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(
            snapshot.portfolio_id,
            snapshot.maximum_capacity,
            snapshot.capital,
            snapshot.commissions,
        );
        for record in snapshot.filled {
            ledger.check_owner(&record.portfolio_id)?;
            let position = FilledPosition::restore(record)?;
            ledger.filled.insert(position.symbol().clone(), position);
        }
        ledger.available_capacity()?;
        Ok(ledger)
    }
}

/// Serializable state of one ledger, enough to resume a session.
///
/// In-flight orders are not part of it: their broker ids live in the execution
/// handler, so a resumed ledger starts with no pending entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: PortfolioId,
    pub maximum_capacity: usize,
    pub capital: Decimal,
    pub filled: Vec<FilledPositionRecord>,
    pub commissions: CommissionSchedule,
}
