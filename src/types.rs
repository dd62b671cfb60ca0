// 1.0: all the primitives live here. nothing in the engine works without these types.
// symbols, portfolio ids, directions, trade kinds, timestamps. each is a newtype or a
// closed enum so the compiler catches mixups between a symbol and a portfolio id.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortfolioId(String);

impl PortfolioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortfolioId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// broker-assigned order identifier. only meaningful to the broker that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerOrderId(pub u64);

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => dec!(1),
            Direction::Short => dec!(-1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

// 1.1: what the strategy wants to do with a position. Buy enters or adds,
// Sell trims, Exit liquidates the whole thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
    Exit,
}

impl TradeKind {
    pub const ALL: [TradeKind; 3] = [TradeKind::Buy, TradeKind::Sell, TradeKind::Exit];

    // sells and exits free capacity, buys consume it
    pub fn is_reducing(&self) -> bool {
        matches!(self, TradeKind::Sell | TradeKind::Exit)
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Buy => f.write_str("BUY"),
            TradeKind::Sell => f.write_str("SELL"),
            TradeKind::Exit => f.write_str("EXIT"),
        }
    }
}

// 1.2: what actually hits the market. "buying" into a short is a sell action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

/// Every (direction, trade kind) pair and the market action it resolves to.
pub const ACTION_TABLE: [((Direction, TradeKind), Action); 6] = [
    ((Direction::Long, TradeKind::Buy), Action::Buy),
    ((Direction::Long, TradeKind::Sell), Action::Sell),
    ((Direction::Long, TradeKind::Exit), Action::Sell),
    ((Direction::Short, TradeKind::Buy), Action::Sell),
    ((Direction::Short, TradeKind::Sell), Action::Buy),
    ((Direction::Short, TradeKind::Exit), Action::Buy),
];

impl Action {
    /// Looks the pair up in [`ACTION_TABLE`]. `None` only if the table lost an entry,
    /// which [`validate_action_table`] rules out at engine construction.
    pub fn lookup(direction: Direction, trade_kind: TradeKind) -> Option<Action> {
        ACTION_TABLE
            .iter()
            .find(|(key, _)| *key == (direction, trade_kind))
            .map(|(_, action)| *action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => f.write_str("BUY"),
            Action::Sell => f.write_str("SELL"),
        }
    }
}

/// Checks that every direction/trade kind combination maps to exactly one action.
pub fn validate_action_table() -> Result<(), (Direction, TradeKind)> {
    for direction in [Direction::Long, Direction::Short] {
        for trade_kind in TradeKind::ALL {
            let hits = ACTION_TABLE
                .iter()
                .filter(|(key, _)| *key == (direction, trade_kind))
                .count();
            if hits != 1 {
                return Err((direction, trade_kind));
            }
        }
    }
    Ok(())
}

// 1.3: wall clock of the simulation. daily bars carry midnight, live ticks carry real time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(|d| Self(d.and_time(NaiveTime::MIN)))
    }

    #[must_use]
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .map(Self)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().naive_utc())
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.0.time()
    }

    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + chrono::Duration::days(days))
    }
}

impl From<NaiveDate> for Timestamp {
    fn from(date: NaiveDate) -> Self {
        Self(date.and_time(NaiveTime::MIN))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}
