// 10.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::events::OrderEvent;
use crate::execution::{Disposition, ExecutionError};
use crate::position::LedgerError;
use crate::types::{Direction, PortfolioId, Timestamp, TradeKind};
use rust_decimal::Decimal;

/// An order the execution handler refused. Its pending entry has already been
/// rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedOrder {
    pub order: OrderEvent,
    pub error: ExecutionError,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub timestamp: Timestamp,
    pub events_processed: usize,
    pub signals_generated: usize,
    pub signals_cancelled: usize,
    pub orders_submitted: usize,
    pub orders_rejected: Vec<RejectedOrder>,
    pub fills_applied: usize,
    pub positions_closed: usize,
    pub fees_taken: Decimal,
    pub rebalanced: bool,
}

impl TickReport {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            events_processed: 0,
            signals_generated: 0,
            signals_cancelled: 0,
            orders_submitted: 0,
            orders_rejected: Vec::new(),
            fills_applied: 0,
            positions_closed: 0,
            fees_taken: Decimal::ZERO,
            rebalanced: false,
        }
    }

    /// Rejected orders worth resubmitting on a later tick.
    pub fn retryable(&self) -> impl Iterator<Item = &RejectedOrder> {
        self.orders_rejected
            .iter()
            .filter(|r| r.disposition == Disposition::RetryNextTick)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Portfolio {0} not found")]
    PortfolioNotFound(PortfolioId),

    #[error("Portfolio {0} already has a strategy")]
    StrategyExists(PortfolioId),

    #[error("No action defined for {direction} {trade_kind}")]
    IncompleteActionTable {
        direction: Direction,
        trade_kind: TradeKind,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
