//! SuperTrend Strategies
//!
//! Backtesting and parameter sweeps for an ATR-band trend-following strategy
//! on crypto spot and perpetual-swap markets.
//!
//! One evaluation takes a candle series and an [`EvaluationConfig`], labels
//! every bar with the SuperTrend classifier, replays the labels through a
//! single-position simulator and returns the trade ledger, a cumulative
//! profit trace and summary statistics. The [`optimizer`] fans evaluations
//! out over a parameter grid.

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod optimizer;
pub mod signal;
pub mod strategies;
pub mod types;

pub use backtest::{evaluate, BacktestResult, Backtester, PositionSimulator, SimulationSettings};
pub use config::{Config, EvaluationConfig};
pub use error::{BacktestError, EvalResult};
pub use strategies::supertrend::{GridParams, SuperTrendConfig};
pub use strategies::StrategyMode;
pub use types::*;
