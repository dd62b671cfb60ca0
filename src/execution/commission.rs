// 6.1: broker commission. linear per-share rate, floored at a minimum ticket charge and
// capped at a fraction of notional.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSchedule {
    pub per_share: Decimal,
    pub minimum: Decimal,
    pub max_notional_fraction: Decimal,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self {
            per_share: dec!(0.005),
            minimum: dec!(1.0),
            max_notional_fraction: dec!(0.005),
        }
    }
}

impl CommissionSchedule {
    pub fn zero() -> Self {
        Self {
            per_share: Decimal::ZERO,
            minimum: Decimal::ZERO,
            max_notional_fraction: Decimal::ZERO,
        }
    }

    /// `max(minimum, min(per_share * q, max_fraction * q * price))`
    pub fn commission(&self, quantity: u64, price: Decimal) -> Decimal {
        let q = Decimal::from(quantity);
        let linear = self.per_share * q;
        // a notional too large to represent leaves the linear rate uncapped
        let cap = q
            .checked_mul(price)
            .and_then(|notional| notional.checked_mul(self.max_notional_fraction));
        match cap {
            Some(cap) => linear.min(cap).max(self.minimum),
            None => linear.max(self.minimum),
        }
    }
}
