// 6.0: execution. an ExecutionHandler turns an accepted order into a fill, either right
// away (simulated) or later through a broker callback (live). failures are classified,
// never retried here.

mod commission;
mod live;
mod simulated;

pub use commission::CommissionSchedule;
pub use live::{
    fill_channel, Broker, BrokerError, BrokerFill, FillNotifier, FillReceiver, LiveExecution,
    PaperBroker,
};
pub use simulated::{ExecutionConfig, SimulatedExecution};

use crate::events::{FillEvent, OrderEvent};
use crate::prices::PriceSource;
use crate::types::{Symbol, Timestamp};

pub trait ExecutionHandler: Send {
    /// Executes or submits the order. `Ok(None)` means the fill will arrive
    /// through [`poll_fills`](Self::poll_fills) on a later tick.
    fn execute_order(
        &mut self,
        order: &OrderEvent,
        prices: &dyn PriceSource,
        now: Timestamp,
    ) -> Result<Option<FillEvent>, ExecutionError>;

    /// Fills completed since the last poll, at most one per submitted order.
    fn poll_fills(&mut self, now: Timestamp) -> Vec<FillEvent>;

    fn is_live(&self) -> bool;
}

/// What the caller should do with a signal whose order failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    RetryNextTick,
    Drop,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("no session range for {0}")]
    PriceUnavailable(Symbol),

    #[error("order for {0} has no buy/sell action")]
    UnmappedAction(Symbol),

    #[error("notional of the {0} order is out of range")]
    NotionalOverflow(Symbol),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl ExecutionError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ExecutionError::PriceUnavailable(_) => Disposition::RetryNextTick,
            ExecutionError::UnmappedAction(_) | ExecutionError::NotionalOverflow(_) => {
                Disposition::Drop
            }
            ExecutionError::Broker(e) => e.disposition(),
        }
    }
}
