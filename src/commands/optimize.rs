//! Optimize command implementation with progress tracking and custom grids

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use supertrend_strategies::data::{CsvSeriesProvider, SeriesProvider};
use supertrend_strategies::optimizer::{
    best_per_symbol, rank_results, top_per_symbol, OptimizationResult, Optimizer, SeriesSet,
    SortBy,
};
use supertrend_strategies::{Config, Symbol};
use tracing::{info, warn};

use super::parse_list;

pub struct OptimizeArgs {
    pub config_path: String,
    pub symbols: Option<String>,
    pub all: bool,
    pub periods: Option<String>,
    pub multipliers: Option<String>,
    pub top: usize,
    pub sort_by: SortBy,
    pub workers: Option<usize>,
    pub sequential: bool,
}

pub fn run(args: OptimizeArgs) -> Result<()> {
    info!("Starting optimization");

    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    if let Some(workers) = args.workers {
        config.backtest.workers = workers;
    }
    if let Some(symbols) = &args.symbols {
        config.trading.symbols = parse_list::<String>(symbols)
            .into_iter()
            .map(|s| s.to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if args.all {
        info!("Sweeping every data file in {}", config.backtest.data_dir);
        config.trading.symbols.clear();
    }
    config.validate()?;

    let mut grid = config.grid();
    if let Some(periods) = &args.periods {
        grid.periods = parse_list(periods);
    }
    if let Some(multipliers) = &args.multipliers {
        grid.multipliers = parse_list(multipliers);
    }
    if grid.total_combinations() == 0 {
        bail!("Parameter grid is empty");
    }

    let provider = CsvSeriesProvider::new(
        &config.backtest.data_dir,
        config.trading.timeframe.clone(),
        config.trading.lookback_days,
    );
    let symbols = provider.resolve_symbols(config.trading.symbols())?;
    let data = load_series(&provider, &symbols)?;

    let optimizer = Optimizer::new(config.backtest.workers)?;
    let total_runs = Optimizer::job_count(&data, &grid);

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Symbols:       {}", data.len());
    println!("  Timeframe:     {}", config.trading.timeframe);
    println!("  Mode:          {}", config.trading.mode);
    println!("  Periods:       {:?}", grid.periods);
    println!("  Multipliers:   {:?}", grid.multipliers);
    println!("  Parameters:    {} combinations", grid.total_combinations());
    println!("  Total tests:   {}", total_runs);
    println!(
        "  Execution:     {}",
        if args.sequential {
            "sequential".to_string()
        } else {
            format!("parallel ({} workers)", optimizer.workers())
        }
    );
    println!("{}\n", "=".repeat(70));

    let base = config.evaluation(&Symbol::new(""));
    let results = if args.sequential {
        optimizer.optimize_sequential(&data, &base, &grid)
    } else {
        let pb = ProgressBar::new(total_runs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] ✓ {msg}",
                )?
                .progress_chars("█░ "),
        );
        optimizer.optimize_with_progress(&data, &base, &grid, &pb)
    };
    println!();

    if results.is_empty() {
        bail!("No valid results; see the log file for failed evaluations");
    }
    info!(
        "{} of {} evaluations succeeded",
        results.len(),
        total_runs
    );

    print_per_symbol(&results, args.sort_by);
    print_best(&results, args.top, args.sort_by);

    info!("Optimization completed successfully");
    Ok(())
}

fn load_series(provider: &CsvSeriesProvider, symbols: &[Symbol]) -> Result<SeriesSet> {
    let mut data = SeriesSet::new();
    for symbol in symbols {
        match provider.load(symbol) {
            Ok(candles) => {
                data.insert(symbol.clone(), candles);
            }
            Err(e) => warn!("Skipping {}: {:#}", symbol, e),
        }
    }
    if data.is_empty() {
        bail!("No data loaded for any symbol");
    }
    info!("Loaded data for {} symbols", data.len());
    Ok(data)
}

fn print_row(rank: usize, r: &OptimizationResult) {
    println!(
        "{:<4} {:<14} {:>6} {:>6.1} {:>12.2} {:>8.2} {:>9.2} {:>7}",
        rank,
        r.symbol.as_str(),
        r.period,
        r.multiplier,
        r.stats.final_profit,
        r.stats.win_rate,
        r.stats.max_drawdown,
        r.stats.trade_count
    );
}

fn print_header(width: usize) {
    println!(
        "{:<4} {:<14} {:>6} {:>6} {:>12} {:>8} {:>9} {:>7}",
        "#", "Symbol", "ATR", "Mult", "Profit", "Win%", "MaxDD%", "Trades"
    );
    println!("{}", "-".repeat(width));
}

fn print_per_symbol(results: &[OptimizationResult], sort_by: SortBy) {
    for (symbol, top) in top_per_symbol(results, 3, sort_by) {
        println!("\n{} - top 3 by {}", symbol, sort_by);
        print_header(72);
        for (i, r) in top.iter().enumerate() {
            print_row(i + 1, r);
        }
    }
}

fn print_best(results: &[OptimizationResult], top: usize, sort_by: SortBy) {
    let mut best = best_per_symbol(results, sort_by);
    rank_results(&mut best, sort_by);
    let display_count = top.min(best.len());

    println!("\n{}", "=".repeat(72));
    println!(
        "BEST PARAMETERS PER SYMBOL (top {}, sorted by {})",
        display_count, sort_by
    );
    println!("{}", "=".repeat(72));
    print_header(72);
    for (i, r) in best.iter().take(display_count).enumerate() {
        print_row(i + 1, r);
    }
    println!("{}", "=".repeat(72));
}
