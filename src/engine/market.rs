//! Market events: marking, signal collection and the fund schedule.

use super::core::Engine;
use super::results::TickReport;
use crate::events::{EventPayload, ManagementEvent, RebalanceEvent, SignalEvent};
use crate::fund::FundDecision;
use crate::prices::PriceSource;
use crate::strategy::StrategyContext;
use crate::types::Timestamp;
use tracing::{debug, info, warn};

impl Engine {
    pub(super) fn on_market(
        &mut self,
        timestamp: Timestamp,
        prices: &dyn PriceSource,
        report: &mut TickReport,
    ) {
        for portfolio in self.portfolios.iter_mut() {
            portfolio.mark_to_market(prices);
        }

        // no new risk while the fund is waiting to flatten
        if self.parked.is_due() {
            debug!("fund events parked, signals suppressed");
        } else {
            let signals = self.collect_signals(timestamp, prices);
            report.signals_generated += signals.len();
            for signal in signals {
                self.channel.push(EventPayload::Signal(signal));
            }
        }

        let decision = self.fund.check(timestamp);
        if decision.is_due() {
            self.prepare_fund_events(timestamp, prices, report);
            self.parked.manage |= decision.manage;
            self.parked.rebalance |= decision.rebalance;
            debug!(manage = decision.manage, rebalance = decision.rebalance, "fund events parked");
        }
    }

    fn collect_signals(&mut self, timestamp: Timestamp, prices: &dyn PriceSource) -> Vec<SignalEvent> {
        let mut signals = Vec::new();
        for strategy in self.strategies.iter_mut() {
            let Some(ledger) = self
                .portfolios
                .iter()
                .find(|p| p.portfolio_id() == strategy.portfolio_id())
            else {
                continue;
            };
            let ctx = StrategyContext {
                timestamp,
                ledger,
                prices,
            };
            signals.extend(strategy.generate_signals(&ctx));
        }
        signals
    }

    // queued signals and orders are void, every strategy flattens its book
    fn prepare_fund_events(&mut self, timestamp: Timestamp, prices: &dyn PriceSource, report: &mut TickReport) {
        let cancelled = self.channel.cancel_portfolio_events();
        report.signals_cancelled += cancelled.len();

        let exits = self.push_exits(timestamp, prices);
        info!(
            cancelled = cancelled.len(),
            exits,
            "closing positions ahead of fund events"
        );
    }

    fn push_exits(&mut self, timestamp: Timestamp, prices: &dyn PriceSource) -> usize {
        let mut exits = Vec::new();
        for strategy in self.strategies.iter() {
            let Some(ledger) = self
                .portfolios
                .iter()
                .find(|p| p.portfolio_id() == strategy.portfolio_id())
            else {
                continue;
            };
            let ctx = StrategyContext {
                timestamp,
                ledger,
                prices,
            };
            exits.extend(strategy.close(&ctx));
        }

        let count = exits.len();
        for exit in exits {
            self.channel.push(EventPayload::Signal(exit));
        }
        count
    }

    // 10.3: fund events go out only once nothing is queued, no order is in flight
    // and every book is flat, or once they have waited max_fund_delay ticks.
    // returns true when something new was queued.
    pub(super) fn release_fund_events(&mut self, prices: &dyn PriceSource) -> bool {
        if !self.parked.is_due() || !self.channel.is_empty() {
            return false;
        }
        let in_flight = self.portfolios.iter().any(|p| p.has_any_pending());
        let held = self.portfolios.iter().any(|p| p.filled_positions().next().is_some());

        if self.parked_ticks >= self.config.max_fund_delay {
            if in_flight || held {
                warn!(
                    ticks = self.parked_ticks,
                    in_flight,
                    held,
                    "fund events forced with books still open"
                );
            }
        } else if in_flight {
            debug!("fund events waiting on open orders");
            return false;
        } else if held {
            // a late fill or a failed exit leaves a book open after the close-out
            if self.flatten_retried {
                warn!("positions still open, fund events held to next tick");
                return false;
            }
            self.flatten_retried = true;
            let exits = self.push_exits(self.current_time, prices);
            if exits == 0 {
                warn!("positions open but no strategy closed them, fund events held");
                return false;
            }
            info!(exits, "positions still open while fund events parked, closing again");
            return true;
        }

        let timestamp = self.current_time;
        if self.parked.manage {
            self.channel.push(EventPayload::Management(ManagementEvent { timestamp }));
        }
        if self.parked.rebalance {
            self.channel.push(EventPayload::Rebalance(RebalanceEvent { timestamp }));
        }
        info!(
            manage = self.parked.manage,
            rebalance = self.parked.rebalance,
            "fund events released"
        );
        self.parked = FundDecision::default();
        self.parked_ticks = 0;
        true
    }
}
