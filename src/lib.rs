// fund-engine: event-driven fund simulation core.
// ledger-first architecture: every capital movement is a fill applied to a ledger.
// all computation is deterministic. the only asynchronous boundary is the live broker's
// fill channel, which the engine polls.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, PortfolioId, Direction, TradeKind, Action table
//   2.x  calendar.rs: business-day counting, holding periods
//   3.x  events.rs: event payloads, priority table
//   3.2  channel.rs: priority-ordered event channel
//   4.x  position.rs: pending/filled positions, weighted average cost, pnl
//   4.4  portfolio.rs: portfolio ledger: capacity, capital, fills
//   5.x  sizing.rs: signal to share quantity
//   6.x  execution/: commission, simulated fills, live broker fills
//   7.x  prices.rs: price source seam, bar snapshots
//   7.5  strategy.rs: signal rules and the engine-facing adapter
//   8.x  fund.rs: rebalance and management fee scheduling
//   9.x  config.rs: commissions, slippage, fund terms, portfolios, toml loading
//   10.x engine/: tick loop, dispatch, fund event release

// ledger modules
pub mod calendar;
pub mod events;
pub mod portfolio;
pub mod position;
pub mod types;

// event flow
pub mod channel;
pub mod engine;
pub mod execution;
pub mod sizing;

// collaborators and settings
pub mod config;
pub mod fund;
pub mod prices;
pub mod strategy;

// re exports for convenience
pub use calendar::*;
pub use channel::EventChannel;
pub use config::{ConfigError, EngineConfig, FundConfig, FundPeriod, PortfolioConfig, SimulationConfig};
pub use engine::{Engine, EngineError, EngineSnapshot, RejectedOrder, TickReport};
pub use events::*;
pub use execution::{
    fill_channel, Broker, BrokerError, BrokerFill, CommissionSchedule, Disposition, ExecutionConfig,
    ExecutionError, ExecutionHandler, FillNotifier, FillReceiver, LiveExecution, PaperBroker,
    SimulatedExecution,
};
pub use fund::{FundDecision, FundScheduler, FundSnapshot};
pub use portfolio::{FillOutcome, PortfolioLedger, PortfolioSnapshot};
pub use position::*;
pub use prices::{Bar, BarSnapshot, PriceSource};
pub use sizing::{EqualEquitySizer, FixedSizer, PositionSizer, SuggestedProportionSizer};
pub use strategy::{BuyAndHold, HoldingPeriodRules, SignalRules, SignalSource, Strategy, StrategyContext};
pub use types::*;
