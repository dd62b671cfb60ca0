// 6.2: simulated fills. every order fills in full at the session midpoint, with a
// proportional transaction cost pushed against the trader.

use super::{CommissionSchedule, ExecutionError, ExecutionHandler};
use crate::events::{FillEvent, OrderEvent};
use crate::prices::PriceSource;
use crate::types::{Action, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    // fraction of notional lost to slippage and spread
    pub transaction_cost: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            transaction_cost: dec!(0.0005),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedExecution {
    config: ExecutionConfig,
    commissions: CommissionSchedule,
}

impl SimulatedExecution {
    pub fn new(config: ExecutionConfig, commissions: CommissionSchedule) -> Self {
        Self { config, commissions }
    }

    pub fn frictionless() -> Self {
        Self::new(
            ExecutionConfig {
                transaction_cost: Decimal::ZERO,
            },
            CommissionSchedule::zero(),
        )
    }
}

impl ExecutionHandler for SimulatedExecution {
    fn execute_order(
        &mut self,
        order: &OrderEvent,
        prices: &dyn PriceSource,
        now: Timestamp,
    ) -> Result<Option<FillEvent>, ExecutionError> {
        let (Some(low), Some(high)) = (
            prices.session_low(&order.symbol),
            prices.session_high(&order.symbol),
        ) else {
            return Err(ExecutionError::PriceUnavailable(order.symbol.clone()));
        };

        let price = (low + high) / Decimal::TWO;
        let slippage = match order.action() {
            Some(Action::Buy) => Decimal::ONE + self.config.transaction_cost,
            Some(Action::Sell) => Decimal::ONE - self.config.transaction_cost,
            None => return Err(ExecutionError::UnmappedAction(order.symbol.clone())),
        };
        let fill_cost = price
            .checked_mul(Decimal::from(order.quantity))
            .and_then(|notional| notional.checked_mul(slippage))
            .ok_or_else(|| ExecutionError::NotionalOverflow(order.symbol.clone()))?;
        let commission = self.commissions.commission(order.quantity, price);

        debug!(
            symbol = %order.symbol,
            quantity = order.quantity,
            %price,
            %fill_cost,
            %commission,
            "simulated fill"
        );
        Ok(Some(FillEvent::from_order(order, fill_cost, commission, now, false)))
    }

    fn poll_fills(&mut self, _now: Timestamp) -> Vec<FillEvent> {
        Vec::new()
    }

    fn is_live(&self) -> bool {
        false
    }
}
