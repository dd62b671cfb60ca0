// 8.0: fund scheduler. decides when the fund rebalances and when it takes fees, and
// does both across every portfolio. holds no positions of its own.
// 8.1 is the period check, 8.2 rebalance, 8.3 management.

use crate::calendar::business_days_elapsed;
use crate::config::FundConfig;
use crate::portfolio::PortfolioLedger;
use crate::position::LedgerError;
use crate::types::Timestamp;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FundDecision {
    pub manage: bool,
    pub rebalance: bool,
}

impl FundDecision {
    pub fn is_due(&self) -> bool {
        self.manage || self.rebalance
    }
}

#[derive(Debug, Clone)]
pub struct FundScheduler {
    config: FundConfig,
    date_entered: NaiveDate,
    assets_under_management: Decimal,
}

impl FundScheduler {
    /// AUM starts as the portfolios' combined capital.
    pub fn new(config: FundConfig, date_entered: NaiveDate, portfolios: &[PortfolioLedger]) -> Self {
        let assets_under_management = portfolios.iter().map(PortfolioLedger::capital).sum();
        Self {
            config,
            date_entered,
            assets_under_management,
        }
    }

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn date_entered(&self) -> NaiveDate {
        self.date_entered
    }

    pub fn assets_under_management(&self) -> Decimal {
        self.assets_under_management
    }

    // 8.1: day zero counts, so an enabled period fires on the first tick
    pub fn check(&self, timestamp: Timestamp) -> FundDecision {
        let elapsed = business_days_elapsed(self.date_entered, timestamp.date());
        FundDecision {
            manage: period_due(elapsed, self.config.manage_period),
            rebalance: period_due(elapsed, self.config.rebalance_period),
        }
    }

    // 8.2: every portfolio ends on the same equity. normally called once books are
    // flat, so that is the same capital. a book still holding keeps its shares and
    // takes the difference in cash.
    pub fn rebalance(&self, portfolios: &mut [PortfolioLedger]) -> Result<(), LedgerError> {
        if portfolios.is_empty() {
            return Ok(());
        }
        let equity = total_equity(portfolios)?;
        let share = equity / Decimal::from(portfolios.len());
        set_equity(portfolios, share)?;
        info!(%equity, %share, portfolios = portfolios.len(), "fund rebalanced");
        Ok(())
    }

    // 8.3: fees only above the high-water mark. returns the fee taken
    pub fn manage(&mut self, portfolios: &mut [PortfolioLedger]) -> Result<Option<Decimal>, LedgerError> {
        if portfolios.is_empty() {
            return Ok(None);
        }
        let equity = total_equity(portfolios)?;
        let aum = self.assets_under_management;
        if equity <= aum {
            debug!(%equity, %aum, "below high-water mark, no fee");
            return Ok(None);
        }

        let fee = self.config.management_fee * aum + self.config.performance_fee * (equity - aum);
        let post_equity = equity - fee;
        let share = post_equity / Decimal::from(portfolios.len());
        set_equity(portfolios, share)?;
        self.assets_under_management = post_equity;
        info!(%equity, %fee, aum = %post_equity, "management fee taken");
        Ok(Some(fee))
    }

    pub fn snapshot(&self) -> FundSnapshot {
        FundSnapshot {
            config: self.config.clone(),
            date_entered: self.date_entered,
            assets_under_management: self.assets_under_management,
        }
    }

    pub fn from_snapshot(snapshot: FundSnapshot) -> Self {
        Self {
            config: snapshot.config,
            date_entered: snapshot.date_entered,
            assets_under_management: snapshot.assets_under_management,
        }
    }
}

fn period_due(elapsed: i64, period: u32) -> bool {
    period > 1 && elapsed % i64::from(period) == 0
}

// capital moves so each book's equity lands on target, holdings untouched
fn set_equity(portfolios: &mut [PortfolioLedger], target: Decimal) -> Result<(), LedgerError> {
    for portfolio in portfolios.iter_mut() {
        let held = portfolio.equity()? - portfolio.capital();
        if !held.is_zero() {
            warn!(
                portfolio = %portfolio.portfolio_id(),
                %held,
                "fund event applied with positions open"
            );
        }
        portfolio.set_capital(target - held);
    }
    Ok(())
}

fn total_equity(portfolios: &[PortfolioLedger]) -> Result<Decimal, LedgerError> {
    portfolios
        .iter()
        .try_fold(Decimal::ZERO, |acc, portfolio| Ok(acc + portfolio.equity()?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundSnapshot {
    pub config: FundConfig,
    pub date_entered: NaiveDate,
    pub assets_under_management: Decimal,
}
