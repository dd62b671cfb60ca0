// 10.0 engine/core.rs: main engine. holds the channel, ledgers, strategies and scheduler.

use super::results::{EngineError, TickReport};
use crate::channel::EventChannel;
use crate::config::{EngineConfig, SimulationConfig};
use crate::events::{Event, EventPayload, FillEvent, MarketEvent};
use crate::execution::{ExecutionHandler, SimulatedExecution};
use crate::fund::{FundDecision, FundScheduler, FundSnapshot};
use crate::portfolio::{PortfolioLedger, PortfolioSnapshot};
use crate::prices::PriceSource;
use crate::sizing::{PositionSizer, SuggestedProportionSizer};
use crate::strategy::SignalSource;
use crate::types::{validate_action_table, PortfolioId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/** 10.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) channel: EventChannel,
    pub(super) portfolios: Vec<PortfolioLedger>,
    // parallel to portfolios
    pub(super) sizers: Vec<Box<dyn PositionSizer>>,
    pub(super) strategies: Vec<Box<dyn SignalSource>>,
    pub(super) execution: Box<dyn ExecutionHandler>,
    pub(super) fund: FundScheduler,
    // fund events due but waiting for the portfolios to settle
    pub(super) parked: FundDecision,
    // one extra close-out per tick when positions reappear while parked
    pub(super) flatten_retried: bool,
    // ticks started with fund events parked, bounded by max_fund_delay
    pub(super) parked_ticks: u32,
    pub(super) journal: Vec<Event>,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(
        config: &SimulationConfig,
        execution: Box<dyn ExecutionHandler>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        validate_action_table().map_err(|(direction, trade_kind)| {
            EngineError::IncompleteActionTable {
                direction,
                trade_kind,
            }
        })?;

        let portfolios: Vec<PortfolioLedger> = config
            .portfolios
            .iter()
            .map(|p| {
                PortfolioLedger::new(
                    p.portfolio_id.clone(),
                    p.maximum_capacity,
                    p.capital,
                    config.commissions.clone(),
                )
            })
            .collect();
        let sizers = config
            .portfolios
            .iter()
            .map(|_| Box::new(SuggestedProportionSizer) as Box<dyn PositionSizer>)
            .collect();
        let fund = FundScheduler::new(config.fund.clone(), config.date_entered, &portfolios);

        info!(
            portfolios = portfolios.len(),
            aum = %fund.assets_under_management(),
            live = execution.is_live(),
            "engine started"
        );

        Ok(Self {
            config: config.engine.clone(),
            channel: EventChannel::new(),
            portfolios,
            sizers,
            strategies: Vec::new(),
            execution,
            fund,
            parked: FundDecision::default(),
            flatten_retried: false,
            parked_ticks: 0,
            journal: Vec::new(),
            current_time: Timestamp::from(config.date_entered),
        })
    }

    /// Backtest engine filling at the session midpoint with the configured costs.
    pub fn simulated(config: &SimulationConfig) -> Result<Self, EngineError> {
        let execution = SimulatedExecution::new(config.execution.clone(), config.commissions.clone());
        Self::new(config, Box::new(execution))
    }

    /// Resumes a session. Portfolio ids in the snapshot must match the config.
    pub fn restore(
        config: &SimulationConfig,
        execution: Box<dyn ExecutionHandler>,
        snapshot: EngineSnapshot,
    ) -> Result<Self, EngineError> {
        let mut engine = Self::new(config, execution)?;
        for saved in snapshot.portfolios {
            let index = engine.portfolio_index(&saved.portfolio_id)?;
            engine.portfolios[index] = PortfolioLedger::from_snapshot(saved)?;
        }
        engine.fund = FundScheduler::from_snapshot(snapshot.fund);
        Ok(engine)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            portfolios: self.portfolios.iter().map(PortfolioLedger::snapshot).collect(),
            fund: self.fund.snapshot(),
        }
    }

    /// Attaches the strategy that trades the portfolio it names. One per portfolio.
    pub fn add_strategy(&mut self, strategy: Box<dyn SignalSource>) -> Result<(), EngineError> {
        let portfolio_id = strategy.portfolio_id().clone();
        self.portfolio_index(&portfolio_id)?;
        if self.strategies.iter().any(|s| s.portfolio_id() == &portfolio_id) {
            return Err(EngineError::StrategyExists(portfolio_id));
        }
        debug!(portfolio = %portfolio_id, "strategy attached");
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn set_sizer(
        &mut self,
        portfolio_id: &PortfolioId,
        sizer: Box<dyn PositionSizer>,
    ) -> Result<(), EngineError> {
        let index = self.portfolio_index(portfolio_id)?;
        self.sizers[index] = sizer;
        Ok(())
    }

    pub(super) fn portfolio_index(&self, portfolio_id: &PortfolioId) -> Result<usize, EngineError> {
        self.portfolios
            .iter()
            .position(|p| p.portfolio_id() == portfolio_id)
            .ok_or_else(|| EngineError::PortfolioNotFound(portfolio_id.clone()))
    }

    pub fn portfolio(&self, portfolio_id: &PortfolioId) -> Option<&PortfolioLedger> {
        self.portfolios.iter().find(|p| p.portfolio_id() == portfolio_id)
    }

    pub fn portfolios(&self) -> &[PortfolioLedger] {
        &self.portfolios
    }

    pub fn fund(&self) -> &FundScheduler {
        &self.fund
    }

    pub fn total_equity(&self) -> Result<Decimal, EngineError> {
        let mut equity = Decimal::ZERO;
        for portfolio in &self.portfolios {
            equity += portfolio.equity()?;
        }
        Ok(equity)
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn is_live(&self) -> bool {
        self.execution.is_live()
    }

    pub fn has_parked_fund_events(&self) -> bool {
        self.parked.is_due()
    }

    pub fn queued_events(&self) -> usize {
        self.channel.len()
    }

    // 10.2: one market event plus everything it sets off
    pub fn run_tick(
        &mut self,
        timestamp: Timestamp,
        prices: &dyn PriceSource,
    ) -> Result<TickReport, EngineError> {
        self.current_time = timestamp;
        self.flatten_retried = false;
        if self.parked.is_due() {
            self.parked_ticks += 1;
        }
        let mut report = TickReport::new(timestamp);

        for fill in self.execution.poll_fills(timestamp) {
            self.channel.push(EventPayload::Fill(fill));
        }
        self.channel.push(EventPayload::Market(MarketEvent { timestamp }));

        self.run_to_quiescence(prices, &mut report)?;
        trace!(
            %timestamp,
            events = report.events_processed,
            fills = report.fills_applied,
            "tick complete"
        );
        Ok(report)
    }

    /// Queues a fill produced outside the engine. Applied on the next tick, in
    /// priority order with everything else.
    pub fn receive_fill(&mut self, fill: FillEvent) {
        debug!(portfolio = %fill.portfolio_id, symbol = %fill.symbol, "external fill queued");
        self.channel.push(EventPayload::Fill(fill));
    }

    fn run_to_quiescence(
        &mut self,
        prices: &dyn PriceSource,
        report: &mut TickReport,
    ) -> Result<(), EngineError> {
        loop {
            while let Some(event) = self.channel.pop() {
                self.record(&event);
                report.events_processed += 1;
                self.dispatch(event, prices, report)?;
            }
            if !self.release_fund_events(prices) {
                return Ok(());
            }
        }
    }

    pub fn journal(&self) -> &[Event] {
        &self.journal
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.journal.len().saturating_sub(count);
        &self.journal[start..]
    }

    fn record(&mut self, event: &Event) {
        if self.config.verbose {
            debug!(sequence = event.sequence.0, kind = ?event.kind(), "dispatch");
        } else {
            trace!(sequence = event.sequence.0, kind = ?event.kind(), "dispatch");
        }

        self.journal.push(event.clone());

        if self.journal.len() > self.config.max_journal {
            let drain_count = self.journal.len() - self.config.max_journal;
            self.journal.drain(0..drain_count);
        }
    }
}

/// Everything needed to resume an engine: ledgers and fund state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub portfolios: Vec<PortfolioSnapshot>,
    pub fund: FundSnapshot,
}
