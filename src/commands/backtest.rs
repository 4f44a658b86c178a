//! Backtest command implementation

use anyhow::{Context, Result};
use supertrend_strategies::backtest::Backtester;
use supertrend_strategies::data::{CsvSeriesProvider, SeriesProvider};
use supertrend_strategies::signal;
use supertrend_strategies::strategies::supertrend::{compute_bands, format_params};
use supertrend_strategies::{Config, StrategyMode, Symbol};
use tracing::{debug, info};

pub struct BacktestArgs {
    pub config_path: String,
    pub symbol: Option<String>,
    pub period: Option<usize>,
    pub multiplier: Option<f64>,
    pub capital: Option<f64>,
    pub fee: Option<f64>,
    pub mode: Option<StrategyMode>,
    pub trades: usize,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    if let Some(period) = args.period {
        info!("Overriding ATR period to: {}", period);
        config.strategy.period = period;
    }
    if let Some(multiplier) = args.multiplier {
        info!("Overriding multiplier to: {}", multiplier);
        config.strategy.multiplier = multiplier;
    }
    if let Some(capital) = args.capital {
        info!("Overriding initial capital to: {:.2}", capital);
        config.trading.initial_capital = capital;
    }
    if let Some(fee) = args.fee {
        info!("Overriding taker fee to: {}", fee);
        config.exchange.taker_fee = fee;
    }
    if let Some(mode) = args.mode {
        info!("Overriding mode to: {}", mode);
        config.trading.mode = mode;
    }
    config.validate()?;

    let provider = CsvSeriesProvider::new(
        &config.backtest.data_dir,
        config.trading.timeframe.clone(),
        config.trading.lookback_days,
    );
    let symbol = match args.symbol {
        Some(s) => Symbol::new(s),
        None => provider
            .resolve_symbols(config.trading.symbols())?
            .into_iter()
            .next()
            .context("No symbol configured")?,
    };
    info!("Loading data from: {}", provider.path_for(&symbol).display());
    let candles = provider.load(&symbol)?;

    let eval = config.evaluation(&symbol);
    debug!("Evaluation config: {:?}", eval);

    let backtester = Backtester::new(&eval)?;
    info!("Running backtest...");
    let result = backtester.run(&candles)?;
    let stats = &result.stats;

    // too-short series already degraded to an empty result above
    let bands = compute_bands(&candles, &eval.strategy()).unwrap_or_default();
    let flips = signal::trend_flips(&candles, &bands, eval.period);

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Symbol:             {}", symbol);
    println!("Mode:               {}", eval.mode);
    println!("Parameters:         {}", format_params(&eval.strategy()));
    println!("Bars:               {}", candles.len());
    println!("Initial Capital:    {:.2}", stats.initial_capital);
    println!("Final Profit:       {:.2}", stats.final_profit);
    println!("Final Equity:       {:.2}", stats.final_equity);
    println!("Max Drawdown:       {:.2}%", stats.max_drawdown);
    println!("Win Rate:           {:.2}%", stats.win_rate);
    println!("Total Trades:       {}", stats.trade_count);
    println!("Winning Trades:     {}", stats.win_count);
    println!("Total Fees:         {:.2}", stats.total_fees);
    println!("Trend Flips:        {}", flips.len());
    if let Some(pos) = &result.open_position {
        println!(
            "Open Position:      {} {:.6} @ {:.4} since {}",
            pos.side, pos.quantity, pos.entry_price, pos.entry_timestamp
        );
    }
    println!("{}", "=".repeat(60));

    if let (Some(flip), Some(pos)) = (flips.last(), &result.open_position) {
        println!("\nLAST SIGNAL ({} @ {:.4}, bar {})", flip.timestamp, flip.close, flip.index);
        for intent in signal::order_intents(flip, &symbol, pos.quantity, eval.mode) {
            println!(
                "  {:?} {:.6} {}{}",
                intent.side,
                intent.size,
                intent.symbol,
                if intent.reduce_only { " (reduce-only)" } else { "" }
            );
        }
    }

    if args.trades > 0 && !result.trades.is_empty() {
        let start = result.trades.len().saturating_sub(args.trades);
        println!("\nLAST {} TRADES", result.trades.len() - start);
        println!("{}", "-".repeat(100));
        println!(
            "{:<6} {:<20} {:<20} {:>12} {:>12} {:>10} {:>10}",
            "Side", "Entry", "Exit", "Entry Px", "Exit Px", "Net PnL", "Return%"
        );
        println!("{}", "-".repeat(100));
        for trade in &result.trades[start..] {
            println!(
                "{:<6} {:<20} {:<20} {:>12.4} {:>12.4} {:>10.2} {:>10.2}",
                trade.side.to_string(),
                trade.entry_timestamp.format("%Y-%m-%d %H:%M"),
                trade.exit_timestamp.format("%Y-%m-%d %H:%M"),
                trade.entry_price,
                trade.exit_price,
                trade.net_pnl,
                trade.return_pct()
            );
        }
        println!("{}", "-".repeat(100));
    }

    info!("Backtest completed successfully");

    Ok(())
}
