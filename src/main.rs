//! Fund Simulation.
//!
//! Runs the engine through scripted scenarios: a single fill, a market-neutral fund
//! with rebalancing and fees, a holding-period strategy, and a live session whose
//! broker fills arrive a tick late. Pass a toml config path to run the fund scenario
//! with your own settings.

use chrono::NaiveDate;
use fund_engine::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use std::path::Path;

type DemoResult = Result<(), Box<dyn Error>>;

const SYMBOLS: [&str; 3] = ["AAA", "BBB", "CCC"];

fn main() -> DemoResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Fund Engine Simulation");
    println!("Event-driven ledger, simulated and live execution\n");

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_file(Path::new(&path))?,
        None => SimulationConfig::market_neutral(inception()?, dec!(100000), 3),
    };

    scenario_1_single_fill()?;
    scenario_2_market_neutral_fund(&config)?;
    scenario_3_holding_period()?;
    scenario_4_live_session()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn inception() -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::from_ymd_opt(2015, 1, 5).ok_or_else(|| "bad inception date".into())
}

// the first `count` weekdays from `start`
fn business_days(start: NaiveDate, count: usize) -> Vec<Timestamp> {
    start
        .iter_days()
        .filter(|d| is_business_day(*d))
        .take(count)
        .map(Timestamp::from)
        .collect()
}

// deterministic path: drift per symbol plus a small repeating wave
fn synthetic_bars(day: usize) -> BarSnapshot {
    const WAVE: [i64; 8] = [0, 1, 2, 1, 0, -1, -2, -1];
    let mut bars = BarSnapshot::new();
    for (i, symbol) in SYMBOLS.iter().enumerate() {
        let base = Decimal::from(50 + 25 * i as i64);
        let drift = Decimal::new(5 * (i as i64 + 1), 2) * Decimal::from(day as i64);
        let wave = Decimal::from(WAVE[(day + i) % WAVE.len()]) / Decimal::TWO;
        let close = base + drift + wave;
        let bar = Bar::new(close - dec!(0.25), close + dec!(0.5), close - dec!(0.5), close);
        bars.insert(Symbol::from(*symbol), bar);
    }
    bars
}

fn print_portfolios(engine: &Engine) -> DemoResult {
    for portfolio in engine.portfolios() {
        println!(
            "    {:<6} capital ${:>12.2}  equity ${:>12.2}  positions {}",
            portfolio.portfolio_id().as_str(),
            portfolio.capital(),
            portfolio.equity()?,
            portfolio.filled_positions().count()
        );
    }
    Ok(())
}

/// One buy, checked against the ledger arithmetic by hand.
fn scenario_1_single_fill() -> DemoResult {
    println!("Scenario 1: Single Fill\n");

    let mut ledger = PortfolioLedger::new(
        PortfolioId::from("solo"),
        1,
        dec!(100000),
        CommissionSchedule::zero(),
    );

    let order = OrderEvent {
        symbol: Symbol::from("SPY"),
        quantity: 100,
        trade_kind: TradeKind::Buy,
        direction: Direction::Long,
        timestamp: Timestamp::from(inception()?),
        portfolio_id: PortfolioId::from("solo"),
    };
    ledger.accept_order(&order)?;
    let fill = FillEvent::from_order(&order, dec!(10050), dec!(1.0), order.timestamp, false);
    ledger.accept_fill(&fill)?;

    let position = ledger
        .filled(&order.symbol)
        .ok_or("position missing after fill")?;
    println!("  Bought 100 SPY for $10,050 plus $1 commission");
    println!("  Average price: ${}", position.avg_price());
    println!("  Capital left: ${}\n", ledger.capital());
    Ok(())
}

/// Long and short buy-and-hold books, monthly rebalance, annual fees.
fn scenario_2_market_neutral_fund(config: &SimulationConfig) -> DemoResult {
    println!("Scenario 2: Market-Neutral Fund\n");

    let mut engine = Engine::simulated(config)?;
    for portfolio in &config.portfolios {
        engine.add_strategy(Box::new(Strategy::new(
            portfolio.portfolio_id.clone(),
            portfolio.direction,
            BuyAndHold,
        )))?;
    }

    let days = business_days(config.date_entered, 260);
    let mut rebalances = 0;
    let mut fees = Decimal::ZERO;
    for (day, timestamp) in days.iter().enumerate() {
        let report = engine.run_tick(*timestamp, &synthetic_bars(day))?;
        if report.rebalanced {
            rebalances += 1;
        }
        fees += report.fees_taken;
        if day % 63 == 0 {
            println!("  {} (day {})", timestamp.date(), day);
            print_portfolios(&engine)?;
        }
    }

    println!("\n  Rebalances: {}", rebalances);
    println!("  Fees taken: ${:.2}", fees);
    println!("  Final equity: ${:.2}", engine.total_equity()?);
    println!("  AUM high-water mark: ${:.2}\n", engine.fund().assets_under_management());
    Ok(())
}

/// Positions are sold once they have been held longer than 20 business days.
fn scenario_3_holding_period() -> DemoResult {
    println!("Scenario 3: Holding Period Rules\n");

    let mut config = SimulationConfig::new(
        inception()?,
        vec![PortfolioConfig::new("rotate", Direction::Long, 2, dec!(50000))],
    );
    config.fund = FundConfig::passive();

    let mut engine = Engine::simulated(&config)?;
    engine.add_strategy(Box::new(Strategy::new(
        PortfolioId::from("rotate"),
        Direction::Long,
        HoldingPeriodRules { max_days_held: 20 },
    )))?;

    let mut closed = 0;
    for (day, timestamp) in business_days(config.date_entered, 90).iter().enumerate() {
        closed += engine.run_tick(*timestamp, &synthetic_bars(day))?.positions_closed;
    }

    println!("  Positions closed after their holding period: {}", closed);
    print_portfolios(&engine)?;
    println!();
    Ok(())
}

/// Orders go to a paper broker, fills come back on the next tick.
fn scenario_4_live_session() -> DemoResult {
    println!("Scenario 4: Live Session\n");

    let config = SimulationConfig::new(
        inception()?,
        vec![PortfolioConfig::new("live", Direction::Long, 3, dec!(30000))],
    );
    let (notifier, fills) = fill_channel();
    let broker = PaperBroker::new(notifier);
    let execution = LiveExecution::new(broker.clone(), config.commissions.clone(), fills);

    let mut engine = Engine::new(&config, Box::new(execution))?;
    engine.add_strategy(Box::new(Strategy::new(
        PortfolioId::from("live"),
        Direction::Long,
        BuyAndHold,
    )))?;

    for (day, timestamp) in business_days(config.date_entered, 5).iter().enumerate() {
        let prices = synthetic_bars(day);
        let report = engine.run_tick(*timestamp, &prices)?;
        println!(
            "  {}: submitted {}, fills applied {}, open at broker {}",
            timestamp.date(),
            report.orders_submitted,
            report.fills_applied,
            broker.open_orders().len()
        );
        // the broker reports back after the tick has finished
        broker.fill_open_orders(&prices);
    }

    print_portfolios(&engine)?;
    Ok(())
}
