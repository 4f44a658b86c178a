//! Parameter sweep driver
//!
//! Evaluates every (symbol, period, multiplier) combination in a fixed-size
//! rayon pool. Each evaluation is independent and only borrows the shared
//! candle series. Failed evaluations are logged and dropped from the results
//! without affecting their siblings.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tracing::{info, warn};

use crate::backtest::evaluate;
use crate::config::EvaluationConfig;
use crate::strategies::supertrend::{GridParams, SuperTrendConfig};
use crate::{Candle, RunStatistics, Symbol};

/// Candle series keyed by symbol, iterated in symbol order
pub type SeriesSet = BTreeMap<Symbol, Vec<Candle>>;

/// Statistics for one parameter combination on one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub symbol: Symbol,
    pub period: usize,
    pub multiplier: f64,
    pub stats: RunStatistics,
}

impl OptimizationResult {
    pub fn params(&self) -> SuperTrendConfig {
        SuperTrendConfig::new(self.period, self.multiplier)
    }
}

/// Ranking key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Final profit, highest first
    #[default]
    Profit,
    WinRate,
    /// Max drawdown, least negative first
    Drawdown,
    Trades,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "profit" => Ok(SortBy::Profit),
            "win_rate" | "winrate" => Ok(SortBy::WinRate),
            "drawdown" => Ok(SortBy::Drawdown),
            "trades" => Ok(SortBy::Trades),
            _ => Err(format!(
                "Unknown sort key: {}. Use profit, win_rate, drawdown or trades",
                s
            )),
        }
    }
}

impl std::fmt::Display for SortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SortBy::Profit => "profit",
            SortBy::WinRate => "win_rate",
            SortBy::Drawdown => "drawdown",
            SortBy::Trades => "trades",
        };
        write!(f, "{}", name)
    }
}

/// Sweep driver backed by a dedicated worker pool
pub struct Optimizer {
    pool: rayon::ThreadPool,
}

struct Job<'a> {
    symbol: &'a Symbol,
    candles: &'a [Candle],
    params: SuperTrendConfig,
}

impl Optimizer {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("sweep-{}", i))
            .build()
            .context("Failed to build worker pool")?;
        Ok(Optimizer { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn jobs<'a>(data: &'a SeriesSet, grid: &GridParams) -> Vec<Job<'a>> {
        let combos = grid.combinations();
        data.iter()
            .cartesian_product(combos)
            .map(|((symbol, candles), params)| Job {
                symbol,
                candles,
                params,
            })
            .collect()
    }

    /// Total evaluations a sweep over `data` and `grid` performs
    pub fn job_count(data: &SeriesSet, grid: &GridParams) -> usize {
        data.len() * grid.total_combinations()
    }

    /// Run the sweep in the worker pool
    pub fn optimize(
        &self,
        data: &SeriesSet,
        base: &EvaluationConfig,
        grid: &GridParams,
    ) -> Vec<OptimizationResult> {
        let jobs = Self::jobs(data, grid);
        info!(
            "Testing {} combinations across {} symbols on {} workers",
            jobs.len(),
            data.len(),
            self.workers()
        );

        self.pool.install(|| {
            jobs.par_iter()
                .filter_map(|job| evaluate_job(job, base))
                .collect()
        })
    }

    /// Run the sweep, ticking `progress_bar` once per evaluation
    pub fn optimize_with_progress(
        &self,
        data: &SeriesSet,
        base: &EvaluationConfig,
        grid: &GridParams,
        progress_bar: &ProgressBar,
    ) -> Vec<OptimizationResult> {
        let jobs = Self::jobs(data, grid);
        info!(
            "Testing {} combinations with progress on {} workers",
            jobs.len(),
            self.workers()
        );
        let valid = AtomicUsize::new(0);

        let results = self.pool.install(|| {
            jobs.par_iter()
                .filter_map(|job| {
                    let result = evaluate_job(job, base);
                    if result.is_some() {
                        let n = valid.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                        progress_bar.set_message(format!("{} valid", n));
                    }
                    progress_bar.inc(1);
                    result
                })
                .collect()
        });

        progress_bar.finish_with_message(format!(
            "{} valid",
            valid.load(AtomicOrdering::Relaxed)
        ));
        results
    }

    /// Run the sweep on the calling thread (for debugging)
    pub fn optimize_sequential(
        &self,
        data: &SeriesSet,
        base: &EvaluationConfig,
        grid: &GridParams,
    ) -> Vec<OptimizationResult> {
        let jobs = Self::jobs(data, grid);
        info!("Testing {} combinations sequentially", jobs.len());

        jobs.iter()
            .filter_map(|job| evaluate_job(job, base))
            .collect()
    }
}

fn evaluate_job(job: &Job<'_>, base: &EvaluationConfig) -> Option<OptimizationResult> {
    let config = EvaluationConfig {
        symbol: job.symbol.clone(),
        ..base.with_params(&job.params)
    };

    match evaluate(job.candles, &config) {
        Ok(result) => Some(OptimizationResult {
            symbol: job.symbol.clone(),
            period: job.params.period,
            multiplier: job.params.multiplier,
            stats: result.stats,
        }),
        Err(e) => {
            warn!(
                symbol = %job.symbol,
                period = job.params.period,
                multiplier = job.params.multiplier,
                error = %e,
                "evaluation failed, excluded from results"
            );
            None
        }
    }
}

fn compare(a: &OptimizationResult, b: &OptimizationResult, sort_by: SortBy) -> Ordering {
    let primary = match sort_by {
        SortBy::Profit => {
            OrderedFloat(b.stats.final_profit).cmp(&OrderedFloat(a.stats.final_profit))
        }
        SortBy::WinRate => OrderedFloat(b.stats.win_rate).cmp(&OrderedFloat(a.stats.win_rate)),
        SortBy::Drawdown => {
            OrderedFloat(b.stats.max_drawdown).cmp(&OrderedFloat(a.stats.max_drawdown))
        }
        SortBy::Trades => b.stats.trade_count.cmp(&a.stats.trade_count),
    };

    primary
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.period.cmp(&b.period))
        .then_with(|| OrderedFloat(a.multiplier).cmp(&OrderedFloat(b.multiplier)))
}

/// Sort results best-first; ties fall back to (symbol, period, multiplier)
pub fn rank_results(results: &mut [OptimizationResult], sort_by: SortBy) {
    results.sort_by(|a, b| compare(a, b, sort_by));
}

/// Best combination of each symbol, ranked
pub fn best_per_symbol(results: &[OptimizationResult], sort_by: SortBy) -> Vec<OptimizationResult> {
    let mut ranked = results.to_vec();
    rank_results(&mut ranked, sort_by);

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|r| seen.insert(r.symbol.clone()))
        .collect()
}

/// Top `n` combinations of every symbol
pub fn top_per_symbol(
    results: &[OptimizationResult],
    n: usize,
    sort_by: SortBy,
) -> BTreeMap<Symbol, Vec<OptimizationResult>> {
    results
        .iter()
        .cloned()
        .into_group_map_by(|r| r.symbol.clone())
        .into_iter()
        .map(|(symbol, mut group)| {
            rank_results(&mut group, sort_by);
            group.truncate(n);
            (symbol, group)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn wave(n: usize, amplitude: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mid = 100.0 + (i as f64 * 0.3).sin() * amplitude;
                Candle::new_unchecked(
                    start + Duration::minutes(5 * i as i64),
                    mid,
                    mid + 1.0,
                    mid - 1.0,
                    mid,
                    10.0,
                )
            })
            .collect()
    }

    fn result(symbol: &str, period: usize, multiplier: f64, profit: f64) -> OptimizationResult {
        OptimizationResult {
            symbol: Symbol::new(symbol),
            period,
            multiplier,
            stats: RunStatistics {
                final_profit: profit,
                ..RunStatistics::default()
            },
        }
    }

    fn sample_data() -> SeriesSet {
        let mut data = SeriesSet::new();
        data.insert(Symbol::new("BTC/USDT"), wave(200, 20.0));
        data.insert(Symbol::new("ETH/USDT"), wave(200, 5.0));
        data
    }

    #[test]
    fn test_failed_evaluations_are_excluded() {
        let optimizer = Optimizer::new(2).unwrap();
        // period 0 is rejected by the classifier
        let grid = GridParams::custom(vec![0, 3, 5], vec![1.0]);
        let results = optimizer.optimize(&sample_data(), &EvaluationConfig::default(), &grid);

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.period != 0));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let optimizer = Optimizer::new(3).unwrap();
        let grid = GridParams::quick();
        let data = sample_data();
        let base = EvaluationConfig::default();

        let mut parallel = optimizer.optimize(&data, &base, &grid);
        let mut sequential = optimizer.optimize_sequential(&data, &base, &grid);
        rank_results(&mut parallel, SortBy::Profit);
        rank_results(&mut sequential, SortBy::Profit);

        assert_eq!(parallel.len(), Optimizer::job_count(&data, &grid));
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_progress_ticks_every_job() {
        let optimizer = Optimizer::new(2).unwrap();
        let grid = GridParams::custom(vec![0, 4], vec![2.0, 3.0]);
        let data = sample_data();
        let bar = ProgressBar::hidden();
        bar.set_length(Optimizer::job_count(&data, &grid) as u64);

        let results =
            optimizer.optimize_with_progress(&data, &EvaluationConfig::default(), &grid, &bar);
        assert_eq!(bar.position(), 8);
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_rank_ties_are_deterministic() {
        let mut results = vec![
            result("ETH/USDT", 7, 4.5, 10.0),
            result("BTC/USDT", 9, 4.5, 10.0),
            result("BTC/USDT", 7, 6.0, 10.0),
            result("BTC/USDT", 7, 4.5, 25.0),
        ];
        rank_results(&mut results, SortBy::Profit);

        let order: Vec<_> = results
            .iter()
            .map(|r| (r.symbol.as_str().to_string(), r.period, r.multiplier))
            .collect();
        assert_eq!(
            order,
            vec![
                ("BTC/USDT".to_string(), 7, 4.5),
                ("BTC/USDT".to_string(), 7, 6.0),
                ("BTC/USDT".to_string(), 9, 4.5),
                ("ETH/USDT".to_string(), 7, 4.5),
            ]
        );
    }

    #[test]
    fn test_drawdown_sort_prefers_shallow() {
        let mut deep = result("BTC/USDT", 7, 4.5, 0.0);
        deep.stats.max_drawdown = -30.0;
        let mut shallow = result("BTC/USDT", 8, 4.5, 0.0);
        shallow.stats.max_drawdown = -5.0;

        let mut results = vec![deep, shallow];
        rank_results(&mut results, SortBy::Drawdown);
        assert_eq!(results[0].period, 8);
    }

    #[test]
    fn test_best_and_top_per_symbol() {
        let results = vec![
            result("ETH/USDT", 7, 4.5, 3.0),
            result("BTC/USDT", 8, 4.5, 1.0),
            result("ETH/USDT", 8, 4.5, 9.0),
            result("BTC/USDT", 7, 4.5, 5.0),
            result("BTC/USDT", 9, 4.5, -2.0),
        ];

        let best = best_per_symbol(&results, SortBy::Profit);
        assert_eq!(best.len(), 2);
        assert_eq!((best[0].symbol.as_str(), best[0].period), ("ETH/USDT", 8));
        assert_eq!((best[1].symbol.as_str(), best[1].period), ("BTC/USDT", 7));

        let top = top_per_symbol(&results, 2, SortBy::Profit);
        let btc = &top[&Symbol::new("BTC/USDT")];
        assert_eq!(btc.len(), 2);
        assert_eq!(btc[1].period, 8);
    }

    #[test]
    fn test_sort_by_parsing() {
        assert_eq!("profit".parse::<SortBy>(), Ok(SortBy::Profit));
        assert_eq!("win_rate".parse::<SortBy>(), Ok(SortBy::WinRate));
        assert!("sharpe".parse::<SortBy>().is_err());
    }
}
