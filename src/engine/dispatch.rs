//! Event dispatch: signals become orders, orders become fills, fills hit the ledger.

use super::core::Engine;
use super::results::{EngineError, RejectedOrder, TickReport};
use crate::events::{Event, EventPayload, FillEvent, OrderEvent, SignalEvent};
use crate::prices::PriceSource;
use tracing::{debug, warn};

impl Engine {
    pub(super) fn dispatch(
        &mut self,
        event: Event,
        prices: &dyn PriceSource,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        match event.payload {
            EventPayload::Market(market) => {
                self.on_market(market.timestamp, prices, report);
                Ok(())
            }
            EventPayload::Signal(signal) => self.on_signal(signal, prices),
            EventPayload::Order(order) => self.on_order(order, prices, report),
            EventPayload::Fill(fill) => self.on_fill(fill, report),
            EventPayload::Management(_) => {
                if let Some(fee) = self.fund.manage(&mut self.portfolios)? {
                    report.fees_taken += fee;
                }
                Ok(())
            }
            EventPayload::Rebalance(_) => {
                self.fund.rebalance(&mut self.portfolios)?;
                report.rebalanced = true;
                Ok(())
            }
        }
    }

    // nothing to do is not an error: pending orders, full books and zero sizes skip
    fn on_signal(&mut self, signal: SignalEvent, prices: &dyn PriceSource) -> Result<(), EngineError> {
        let index = self.portfolio_index(&signal.portfolio_id)?;
        let ledger = &self.portfolios[index];

        if ledger.has_pending(&signal.symbol) {
            debug!(portfolio = %signal.portfolio_id, symbol = %signal.symbol, "order in flight, signal skipped");
            return Ok(());
        }
        if !ledger.is_tradeable(signal.trade_kind)? {
            debug!(portfolio = %signal.portfolio_id, symbol = %signal.symbol, "no capacity, signal skipped");
            return Ok(());
        }

        let quantity = self.sizers[index].size(&signal, ledger, prices)?;
        if quantity == 0 {
            debug!(portfolio = %signal.portfolio_id, symbol = %signal.symbol, "sized to zero");
            return Ok(());
        }

        debug!(
            portfolio = %signal.portfolio_id,
            symbol = %signal.symbol,
            trade_kind = %signal.trade_kind,
            quantity,
            "signal sized"
        );
        self.channel
            .push(EventPayload::Order(OrderEvent::from_signal(&signal, quantity)));
        Ok(())
    }

    fn on_order(
        &mut self,
        order: OrderEvent,
        prices: &dyn PriceSource,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        let index = self.portfolio_index(&order.portfolio_id)?;
        self.portfolios[index].accept_order(&order)?;

        match self.execution.execute_order(&order, prices, self.current_time) {
            Ok(Some(fill)) => {
                report.orders_submitted += 1;
                self.channel.push(EventPayload::Fill(fill));
            }
            Ok(None) => {
                report.orders_submitted += 1;
            }
            Err(error) => {
                self.portfolios[index].cancel_pending(&order.symbol);
                let disposition = error.disposition();
                warn!(
                    portfolio = %order.portfolio_id,
                    symbol = %order.symbol,
                    %error,
                    ?disposition,
                    "order rejected"
                );
                report.orders_rejected.push(RejectedOrder {
                    order,
                    error,
                    disposition,
                });
            }
        }
        Ok(())
    }

    fn on_fill(&mut self, fill: FillEvent, report: &mut TickReport) -> Result<(), EngineError> {
        let index = self.portfolio_index(&fill.portfolio_id)?;
        let outcome = self.portfolios[index].accept_fill(&fill)?;
        report.fills_applied += 1;
        if outcome.closed {
            report.positions_closed += 1;
        }
        Ok(())
    }
}
