//! SuperTrend strategies - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Evaluate one parameter pair on one symbol
//! - optimize: Sweep the parameter grid across symbols

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use supertrend_strategies::optimizer::SortBy;
use supertrend_strategies::StrategyMode;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "supertrend-strategies")]
#[command(about = "SuperTrend backtesting and parameter optimization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/supertrend_btc_5m.json")]
        config: String,

        /// Symbol to test (defaults to the first configured symbol)
        #[arg(short, long)]
        symbol: Option<String>,

        /// ATR period (overrides config file)
        #[arg(long)]
        period: Option<usize>,

        /// Band multiplier (overrides config file)
        #[arg(long)]
        multiplier: Option<f64>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Taker fee rate, e.g. 0.00042
        #[arg(long)]
        fee: Option<f64>,

        /// Position mode (swap or spot)
        #[arg(long)]
        mode: Option<StrategyMode>,

        /// Number of most recent trades to print
        #[arg(long, default_value = "10")]
        trades: usize,
    },

    /// Sweep SuperTrend parameters
    Optimize {
        /// Path to base configuration file
        #[arg(short, long, default_value = "configs/supertrend_btc_5m.json")]
        config: String,

        /// Symbols to test (comma-separated). E.g., "BTC/USDT,ETH/USDT"
        #[arg(long)]
        symbols: Option<String>,

        /// Sweep every data file for the timeframe, ignoring configured symbols
        #[arg(long, conflicts_with = "symbols")]
        all: bool,

        /// ATR periods to test (comma-separated). E.g., "7,10,14"
        #[arg(long)]
        periods: Option<String>,

        /// Band multipliers to test (comma-separated). E.g., "4.5,6.0"
        #[arg(long)]
        multipliers: Option<String>,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Sort results by metric (profit, win_rate, drawdown, trades)
        #[arg(long, default_value = "profit")]
        sort_by: SortBy,

        /// Worker threads (overrides config file)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // keep the console for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            period,
            multiplier,
            capital,
            fee,
            mode,
            trades,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: config,
            symbol,
            period,
            multiplier,
            capital,
            fee,
            mode,
            trades,
        }),

        Commands::Optimize {
            config,
            symbols,
            all,
            periods,
            multipliers,
            top,
            sort_by,
            workers,
            sequential,
        } => commands::optimize::run(commands::optimize::OptimizeArgs {
            config_path: config,
            symbols,
            all,
            periods,
            multipliers,
            top,
            sort_by,
            workers,
            sequential,
        }),
    }
}
