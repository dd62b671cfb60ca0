//! Property-based tests for the ledger and scheduling math.
//!
//! These tests verify invariants hold under random inputs.

use chrono::{Duration, NaiveDate};
use fund_engine::{
    business_days_elapsed, compute_days_elapsed, Bar, BarSnapshot, BuyAndHold, CommissionSchedule,
    Direction, Engine, EventChannel, EventPayload, FillEvent, FundConfig, HoldingPeriodRules,
    MarketEvent, OrderEvent, PortfolioConfig, PortfolioId, PortfolioLedger, SignalEvent,
    SimulationConfig, Symbol, Timestamp, TradeKind,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..100_000i64).prop_map(|x| Decimal::new(x, 2)) // $1.00 to $1,000
}

fn quantity_strategy() -> impl Strategy<Value = u64> {
    1u64..5_000u64
}

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..3_000i64).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2010, 1, 1).unwrap() + Duration::days(offset)
    })
}

fn ts() -> Timestamp {
    Timestamp::from_ymd(2015, 1, 5).unwrap()
}

fn order(symbol: &str, quantity: u64, trade_kind: TradeKind, direction: Direction) -> OrderEvent {
    OrderEvent {
        symbol: Symbol::from(symbol),
        quantity,
        trade_kind,
        direction,
        timestamp: ts(),
        portfolio_id: PortfolioId::from("prop"),
    }
}

fn trade(ledger: &mut PortfolioLedger, order: &OrderEvent, price: Decimal) {
    ledger.accept_order(order).unwrap();
    let fill_cost = price * Decimal::from(order.quantity);
    let fill = FillEvent::from_order(order, fill_cost, Decimal::ZERO, ts(), false);
    ledger.accept_fill(&fill).unwrap();
}

fn payload(kind: u8, n: usize) -> EventPayload {
    let trade_kind = match kind % 3 {
        0 => TradeKind::Buy,
        1 => TradeKind::Sell,
        _ => TradeKind::Exit,
    };
    let symbol = format!("S{}", n);
    match kind {
        0 => EventPayload::Market(MarketEvent { timestamp: ts() }),
        1..=3 => EventPayload::Signal(SignalEvent {
            symbol: Symbol::new(symbol),
            proportion: Decimal::ONE,
            trade_kind,
            direction: Direction::Long,
            timestamp: ts(),
            portfolio_id: PortfolioId::from("prop"),
        }),
        4 => EventPayload::Order(order(&symbol, 1, trade_kind, Direction::Long)),
        _ => {
            let order = order(&symbol, 1, trade_kind, Direction::Long);
            EventPayload::Fill(FillEvent::from_order(&order, Decimal::ONE, Decimal::ZERO, ts(), false))
        }
    }
}

proptest! {
    /// Events leave by priority, ties in push order
    #[test]
    fn channel_orders_by_priority_then_sequence(
        kinds in proptest::collection::vec(0u8..6u8, 1..40),
    ) {
        let mut channel = EventChannel::new();
        for (n, kind) in kinds.iter().enumerate() {
            channel.push(payload(*kind, n));
        }

        let drained = channel.drain();
        prop_assert_eq!(drained.len(), kinds.len());
        for pair in drained.windows(2) {
            let a = (pair[0].kind().priority(), pair[0].sequence);
            let b = (pair[1].kind().priority(), pair[1].sequence);
            prop_assert!(a < b, "out of order: {:?} then {:?}", a, b);
        }
    }

    /// Cancelling leaves only fills, fund events and market events behind
    #[test]
    fn cancel_keeps_non_portfolio_events(
        kinds in proptest::collection::vec(0u8..6u8, 1..40),
    ) {
        let mut channel = EventChannel::new();
        for (n, kind) in kinds.iter().enumerate() {
            channel.push(payload(*kind, n));
        }
        let total = channel.len();

        let cancelled = channel.cancel_portfolio_events();
        prop_assert!(cancelled.iter().all(|e| e.payload.is_cancellable()));
        prop_assert_eq!(cancelled.len() + channel.len(), total);
        while let Some(event) = channel.pop() {
            prop_assert!(!event.payload.is_cancellable());
        }
    }

    /// First fill prices the position at the fill price, cost basis q * p
    #[test]
    fn first_fill_average_is_fill_price(
        price in price_strategy(),
        quantity in quantity_strategy(),
        direction in direction_strategy(),
    ) {
        let mut ledger = PortfolioLedger::new(PortfolioId::from("prop"), 1, Decimal::new(1, 0), CommissionSchedule::zero());
        trade(&mut ledger, &order("X", quantity, TradeKind::Buy, direction), price);

        let position = ledger.filled(&Symbol::from("X")).unwrap();
        let notional = price * Decimal::from(quantity);
        prop_assert_eq!(position.avg_price(), price);
        prop_assert_eq!(position.cost_basis().abs(), notional);
        prop_assert_eq!(position.relative_value().unwrap(), notional);
    }

    /// Round trip capital equals the cash-flow derivation: start + sign * q * (exit - entry)
    #[test]
    fn round_trip_capital_matches_cash_flows(
        entry in price_strategy(),
        exit in price_strategy(),
        quantity in quantity_strategy(),
        direction in direction_strategy(),
    ) {
        let start = Decimal::new(10_000_000, 0);
        let mut ledger = PortfolioLedger::new(PortfolioId::from("prop"), 1, start, CommissionSchedule::zero());
        trade(&mut ledger, &order("X", quantity, TradeKind::Buy, direction), entry);
        trade(&mut ledger, &order("X", quantity, TradeKind::Exit, direction), exit);

        let expected = start + direction.sign() * Decimal::from(quantity) * (exit - entry);
        prop_assert_eq!(ledger.capital(), expected);
        prop_assert!(ledger.filled(&Symbol::from("X")).is_none());
        prop_assert!(!ledger.has_any_pending());
    }

    /// Partial long sells release the cash the shares fetch
    #[test]
    fn long_partial_sell_matches_cash_flows(
        entry in price_strategy(),
        exit in price_strategy(),
        quantity in 2u64..5_000u64,
        sold_fraction in 1u64..100u64,
    ) {
        let sold = (quantity * sold_fraction / 100).max(1);
        let start = Decimal::new(10_000_000, 0);
        let mut ledger = PortfolioLedger::new(PortfolioId::from("prop"), 1, start, CommissionSchedule::zero());
        trade(&mut ledger, &order("X", quantity, TradeKind::Buy, Direction::Long), entry);
        trade(&mut ledger, &order("X", sold, TradeKind::Sell, Direction::Long), exit);

        let expected = start - entry * Decimal::from(quantity) + exit * Decimal::from(sold);
        prop_assert_eq!(ledger.capital(), expected);
        prop_assert_eq!(
            ledger.filled(&Symbol::from("X")).map(|p| p.quantity()),
            if sold == quantity { None } else { Some(quantity - sold) }
        );
    }

    /// Elapsed business days: zero on the same date, stable under repetition,
    /// additive across an intermediate weekday
    #[test]
    fn business_days_are_consistent(
        start in date_strategy(),
        first in 0i64..400i64,
        second in 0i64..400i64,
    ) {
        prop_assert_eq!(business_days_elapsed(start, start), 0);

        let end = start + Duration::days(first + second);
        let once = compute_days_elapsed(Timestamp::from(start), Timestamp::from(end));
        let again = compute_days_elapsed(Timestamp::from(start), Timestamp::from(end));
        prop_assert_eq!(once, again);
        prop_assert!(once <= first + second);

        let middle = start + Duration::days(first);
        if fund_engine::is_business_day(start) && fund_engine::is_business_day(middle) {
            prop_assert_eq!(
                once,
                business_days_elapsed(start, middle) + business_days_elapsed(middle, end)
            );
        }
    }

    /// However many symbols are quoted, a book never holds more than its capacity
    #[test]
    fn engine_never_exceeds_capacity(
        capacity in 1usize..5usize,
        symbols in 1usize..9usize,
        max_days_held in 1i64..4i64,
        closes in proptest::collection::vec(1i64..500i64, 10),
    ) {
        let config = SimulationConfig::frictionless(
            NaiveDate::from_ymd_opt(2015, 1, 5).unwrap(),
            vec![PortfolioConfig::new("prop", Direction::Long, capacity, Decimal::new(100_000, 0))],
        );
        let mut engine = Engine::simulated(&config).unwrap();
        engine.add_strategy(Box::new(fund_engine::Strategy::new(
            PortfolioId::from("prop"),
            Direction::Long,
            HoldingPeriodRules { max_days_held },
        ))).unwrap();

        let mut day = config.date_entered;
        for close in closes {
            let mut bars = BarSnapshot::new();
            for n in 0..symbols {
                let price = Decimal::new(close + 10 * n as i64, 1);
                bars.insert(Symbol::new(format!("S{}", n)), Bar::flat(price));
            }
            engine.run_tick(Timestamp::from(day), &bars).unwrap();

            let ledger = engine.portfolio(&PortfolioId::from("prop")).unwrap();
            prop_assert!(ledger.filled_positions().count() <= capacity);
            prop_assert!(ledger.available_capacity().is_ok());
            prop_assert!(ledger.capital() >= Decimal::ZERO);
            day = day.succ_opt().unwrap();
        }
    }

    /// Equity is conserved through a frictionless buy-and-hold tick at flat prices
    #[test]
    fn buy_and_hold_preserves_equity_at_entry(
        price in price_strategy(),
        capital in 1_000i64..1_000_000i64,
        direction in direction_strategy(),
    ) {
        let capital = Decimal::new(capital, 0);
        let config = SimulationConfig::frictionless(
            NaiveDate::from_ymd_opt(2015, 1, 5).unwrap(),
            vec![PortfolioConfig::new("prop", direction, 1, capital)],
        );
        let mut engine = Engine::simulated(&config).unwrap();
        engine.add_strategy(Box::new(fund_engine::Strategy::new(
            PortfolioId::from("prop"),
            direction,
            BuyAndHold,
        ))).unwrap();

        let bars = BarSnapshot::new().with_bar("X", Bar::flat(price));
        engine.run_tick(Timestamp::from(config.date_entered), &bars).unwrap();
        prop_assert_eq!(engine.total_equity().unwrap(), capital);
    }
}

#[test]
fn passive_fund_never_schedules() {
    let fund = fund_engine::FundScheduler::new(
        FundConfig::passive(),
        NaiveDate::from_ymd_opt(2015, 1, 5).unwrap(),
        &[],
    );
    let mut day = Timestamp::from_ymd(2015, 1, 5).unwrap();
    for _ in 0..300 {
        assert!(!fund.check(day).is_due());
        day = day.plus_days(1);
    }
}
