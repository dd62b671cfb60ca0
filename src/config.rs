// 9.0 config.rs: all settings in one place. commissions, slippage, fund schedule, portfolios.
// 9.1 SimulationConfig loads from toml. periods of 0 or 1 switch the behaviour off, they
// are not errors.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::execution::{CommissionSchedule, ExecutionConfig};
use crate::types::{Direction, PortfolioId};

/// Common fund periods in business days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundPeriod {
    Never,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl FundPeriod {
    pub fn days(&self) -> u32 {
        match self {
            FundPeriod::Never => 0,
            FundPeriod::Weekly => 7,
            FundPeriod::Monthly => 21,
            FundPeriod::Quarterly => 63,
            FundPeriod::Annually => 252,
        }
    }
}

/** 9.2: fund-level schedule and fee terms. fees are fractions, 0.02 = 2% */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundConfig {
    // Business days between rebalances, <= 1 disables
    pub rebalance_period: u32,
    // Business days between management fee events, <= 1 disables
    pub manage_period: u32,
    // Fraction of AUM taken at each management event
    pub management_fee: Decimal,
    // Fraction of gains above the high-water mark
    pub performance_fee: Decimal,
}

impl Default for FundConfig {
    fn default() -> Self {
        Self {
            rebalance_period: FundPeriod::Monthly.days(),
            manage_period: FundPeriod::Annually.days(),
            management_fee: dec!(0.02),
            performance_fee: dec!(0.20),
        }
    }
}

impl FundConfig {
    pub fn with_periods(rebalance: FundPeriod, manage: FundPeriod) -> Self {
        Self {
            rebalance_period: rebalance.days(),
            manage_period: manage.days(),
            ..Self::default()
        }
    }

    // No rebalancing or fees at all
    pub fn passive() -> Self {
        Self::with_periods(FundPeriod::Never, FundPeriod::Never)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub portfolio_id: PortfolioId,
    // Side new positions are opened on
    pub direction: Direction,
    // Most symbols held or in flight at once
    pub maximum_capacity: usize,
    // Starting cash
    pub capital: Decimal,
}

impl PortfolioConfig {
    pub fn new(
        portfolio_id: impl Into<String>,
        direction: Direction,
        maximum_capacity: usize,
        capital: Decimal,
    ) -> Self {
        Self {
            portfolio_id: PortfolioId::new(portfolio_id),
            direction,
            maximum_capacity,
            capital,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Dispatched events kept for inspection, oldest dropped first
    pub max_journal: usize,
    // Trace every dispatched event at debug instead of trace
    pub verbose: bool,
    // Ticks a due fund event may wait for the books to flatten before it goes out anyway
    pub max_fund_delay: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_journal: 10_000,
            verbose: false,
            max_fund_delay: 3,
        }
    }
}

// The complete simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    // Fund inception, day zero for every period
    pub date_entered: NaiveDate,
    pub portfolios: Vec<PortfolioConfig>,
    #[serde(default)]
    pub fund: FundConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub commissions: CommissionSchedule,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SimulationConfig {
    pub fn new(date_entered: NaiveDate, portfolios: Vec<PortfolioConfig>) -> Self {
        Self {
            date_entered,
            portfolios,
            fund: FundConfig::default(),
            execution: ExecutionConfig::default(),
            commissions: CommissionSchedule::default(),
            engine: EngineConfig::default(),
        }
    }

    // Long and short book with equal capital, monthly rebalance, annual fees
    pub fn market_neutral(date_entered: NaiveDate, capital_each: Decimal, capacity: usize) -> Self {
        Self::new(
            date_entered,
            vec![
                PortfolioConfig::new("long", Direction::Long, capacity, capital_each),
                PortfolioConfig::new("short", Direction::Short, capacity, capital_each),
            ],
        )
    }

    // Zero costs and no fund events, for isolating ledger behaviour
    pub fn frictionless(date_entered: NaiveDate, portfolios: Vec<PortfolioConfig>) -> Self {
        let mut config = Self::new(date_entered, portfolios);
        config.fund = FundConfig::passive();
        config.execution.transaction_cost = Decimal::ZERO;
        config.commissions = CommissionSchedule::zero();
        config
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.portfolios.is_empty() {
            return Err(ConfigError::NoPortfolios);
        }

        let mut seen = BTreeSet::new();
        for portfolio in &self.portfolios {
            if !seen.insert(&portfolio.portfolio_id) {
                return Err(ConfigError::DuplicatePortfolio(portfolio.portfolio_id.clone()));
            }
            if portfolio.maximum_capacity == 0 {
                return Err(ConfigError::ZeroCapacity(portfolio.portfolio_id.clone()));
            }
            if portfolio.capital.is_sign_negative() {
                return Err(ConfigError::NegativeCapital(portfolio.portfolio_id.clone()));
            }
        }

        check_fraction("execution.transaction_cost", self.execution.transaction_cost)?;
        check_fraction("fund.management_fee", self.fund.management_fee)?;
        check_fraction("fund.performance_fee", self.fund.performance_fee)?;

        for (field, value) in [
            ("commissions.per_share", self.commissions.per_share),
            ("commissions.minimum", self.commissions.minimum),
            ("commissions.max_notional_fraction", self.commissions.max_notional_fraction),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(ConfigError::Negative { field, value });
            }
        }

        Ok(())
    }
}

// [0, 1)
fn check_fraction(field: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value >= Decimal::ONE {
        return Err(ConfigError::FractionOutOfRange { field, value });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one portfolio is required")]
    NoPortfolios,

    #[error("portfolio id {0} is used twice")]
    DuplicatePortfolio(PortfolioId),

    #[error("portfolio {0} has zero capacity")]
    ZeroCapacity(PortfolioId),

    #[error("portfolio {0} starts with negative capital")]
    NegativeCapital(PortfolioId),

    #[error("{field} must be in [0, 1), got {value}")]
    FractionOutOfRange { field: &'static str, value: Decimal },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: Decimal },

    #[error("could not parse config: {0}")]
    Parse(String),

    #[error("could not read {path}: {reason}")]
    Io { path: String, reason: String },
}
