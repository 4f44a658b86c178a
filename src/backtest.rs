//! Backtesting engine
//!
//! Walks a SuperTrend-labelled series bar by bar holding at most one
//! position, realizing PnL net of taker fees on every exit, and derives
//! run statistics from the trade ledger and the cumulative-profit trace.
//!
//! Two sizing disciplines share the [`PositionSimulator`] interface:
//! - [`SwapSimulator`]: always in the market, reverses long/short on every
//!   trend flip with a fixed lot sized once from the first evaluated close
//! - [`SpotSimulator`]: long-only, moves the whole balance into the base
//!   asset on bullish labels and back to cash on bearish ones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EvaluationConfig;
use crate::error::{BacktestError, EvalResult};
use crate::strategies::supertrend::SuperTrendClassifier;
use crate::{BandState, Candle, EquityPoint, RunStatistics, Side, TradeRecord};

/// Capital and fee model for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub initial_capital: f64,
    /// Fraction of notional charged per fill
    pub taker_fee_rate: f64,
}

impl SimulationSettings {
    pub fn new(initial_capital: f64, taker_fee_rate: f64) -> EvalResult<Self> {
        let settings = Self {
            initial_capital,
            taker_fee_rate,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> EvalResult<()> {
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(BacktestError::invalid(
                "initial_capital",
                format!("must be finite and > 0, got {}", self.initial_capital),
            ));
        }
        if !(self.taker_fee_rate >= 0.0 && self.taker_fee_rate.is_finite()) {
            return Err(BacktestError::invalid(
                "taker_fee_rate",
                format!("must be finite and >= 0, got {}", self.taker_fee_rate),
            ));
        }
        Ok(())
    }
}

/// Position still open when the series ends (never realized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: f64,
}

/// Output of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    /// One point per evaluated bar
    pub equity_trace: Vec<EquityPoint>,
    pub stats: RunStatistics,
    pub open_position: Option<OpenPosition>,
}

impl BacktestResult {
    /// No-signal result: empty ledger and zero statistics
    pub fn empty(settings: &SimulationSettings) -> Self {
        Self {
            trades: Vec::new(),
            equity_trace: Vec::new(),
            stats: calculate_statistics(settings.initial_capital, &[], &[]),
            open_position: None,
        }
    }
}

/// Consumes a labelled series and produces a ledger plus statistics
pub trait PositionSimulator: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Simulate bars `first_bar..candles.len()`
    ///
    /// Fewer than `first_bar + 1` bars is not an error; it yields
    /// [`BacktestResult::empty`].
    fn simulate(
        &self,
        candles: &[Candle],
        bands: &[BandState],
        first_bar: usize,
        settings: &SimulationSettings,
    ) -> EvalResult<BacktestResult>;
}

/// Shared preconditions; `Ok(false)` means there is nothing to evaluate
fn check_inputs(
    candles: &[Candle],
    bands: &[BandState],
    first_bar: usize,
    settings: &SimulationSettings,
) -> EvalResult<bool> {
    settings.validate()?;
    if bands.len() != candles.len() {
        return Err(BacktestError::invalid(
            "bands",
            format!(
                "length {} does not match series length {}",
                bands.len(),
                candles.len()
            ),
        ));
    }
    Ok(candles.len() > first_bar)
}

fn checked_close(candles: &[Candle], i: usize) -> EvalResult<f64> {
    let close = candles[i].close;
    if close.is_finite() && close > 0.0 {
        Ok(close)
    } else {
        Err(BacktestError::computation(
            i,
            format!("close must be finite and > 0, got {}", close),
        ))
    }
}

/// Perpetual-swap style: one reversible position with a fixed lot
///
/// The lot is `initial_capital / close[first_bar]` and never changes, so
/// PnL does not compound. Each flip charges `(entry + exit) × lot × fee`,
/// covering both the closing fill and the reopening fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapSimulator;

impl PositionSimulator for SwapSimulator {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn simulate(
        &self,
        candles: &[Candle],
        bands: &[BandState],
        first_bar: usize,
        settings: &SimulationSettings,
    ) -> EvalResult<BacktestResult> {
        if !check_inputs(candles, bands, first_bar, settings)? {
            return Ok(BacktestResult::empty(settings));
        }

        let fee_rate = settings.taker_fee_rate;
        let lot_size = settings.initial_capital / checked_close(candles, first_bar)?;

        let mut position: Option<OpenPosition> = None;
        let mut realized_profit = 0.0;
        let mut trades = Vec::new();
        let mut equity_trace = Vec::with_capacity(candles.len() - first_bar);

        for i in first_bar..candles.len() {
            let close = checked_close(candles, i)?;
            let timestamp = candles[i].timestamp;
            let wanted = Side::from_trend(bands[i].trend);

            match position.as_mut() {
                None => {
                    position = Some(OpenPosition {
                        side: wanted,
                        entry_timestamp: timestamp,
                        entry_price: close,
                        quantity: lot_size,
                    });
                }
                Some(pos) if pos.side != wanted => {
                    let gross_pnl = match pos.side {
                        Side::Long => (close - pos.entry_price) * lot_size,
                        Side::Short => (pos.entry_price - close) * lot_size,
                    };
                    let fee = (pos.entry_price + close) * lot_size * fee_rate;
                    let net_pnl = gross_pnl - fee;

                    trades.push(TradeRecord {
                        side: pos.side,
                        entry_timestamp: pos.entry_timestamp,
                        exit_timestamp: timestamp,
                        entry_price: pos.entry_price,
                        exit_price: close,
                        quantity: lot_size,
                        gross_pnl,
                        fee,
                        net_pnl,
                        is_win: net_pnl > 0.0,
                    });
                    realized_profit += net_pnl;

                    *pos = OpenPosition {
                        side: wanted,
                        entry_timestamp: timestamp,
                        entry_price: close,
                        quantity: lot_size,
                    };
                }
                Some(_) => {}
            }

            equity_trace.push(EquityPoint {
                timestamp,
                cumulative_profit: realized_profit,
            });
        }

        let stats = calculate_statistics(settings.initial_capital, &trades, &equity_trace);
        debug!(
            simulator = self.name(),
            trades = stats.trade_count,
            final_profit = stats.final_profit,
            "simulation finished"
        );

        Ok(BacktestResult {
            trades,
            equity_trace,
            stats,
            open_position: position,
        })
    }
}

/// Spot style: all-in long on bullish labels, cash on bearish labels
///
/// Entry spends the whole balance (`initial_capital + realized profit`)
/// after deducting the entry fee; exit sells the full quantity and pays the
/// exit fee on the proceeds. Never shorts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpotSimulator;

struct Holding {
    position: OpenPosition,
    entry_fee: f64,
}

impl PositionSimulator for SpotSimulator {
    fn name(&self) -> &'static str {
        "spot"
    }

    fn simulate(
        &self,
        candles: &[Candle],
        bands: &[BandState],
        first_bar: usize,
        settings: &SimulationSettings,
    ) -> EvalResult<BacktestResult> {
        if !check_inputs(candles, bands, first_bar, settings)? {
            return Ok(BacktestResult::empty(settings));
        }

        let fee_rate = settings.taker_fee_rate;
        let mut holding: Option<Holding> = None;
        let mut realized_profit = 0.0;
        let mut trades = Vec::new();
        let mut equity_trace = Vec::with_capacity(candles.len() - first_bar);

        for i in first_bar..candles.len() {
            let close = checked_close(candles, i)?;
            let timestamp = candles[i].timestamp;
            let bullish = bands[i].trend;

            match (holding.take(), bullish) {
                (None, true) => {
                    let balance = settings.initial_capital + realized_profit;
                    let entry_fee = balance * fee_rate;
                    holding = Some(Holding {
                        position: OpenPosition {
                            side: Side::Long,
                            entry_timestamp: timestamp,
                            entry_price: close,
                            quantity: (balance - entry_fee) / close,
                        },
                        entry_fee,
                    });
                }
                (Some(h), false) => {
                    let pos = h.position;
                    let exit_fee = pos.quantity * close * fee_rate;
                    let gross_pnl = (close - pos.entry_price) * pos.quantity;
                    let fee = h.entry_fee + exit_fee;
                    let net_pnl = gross_pnl - fee;

                    trades.push(TradeRecord {
                        side: Side::Long,
                        entry_timestamp: pos.entry_timestamp,
                        exit_timestamp: timestamp,
                        entry_price: pos.entry_price,
                        exit_price: close,
                        quantity: pos.quantity,
                        gross_pnl,
                        fee,
                        net_pnl,
                        is_win: net_pnl > 0.0,
                    });
                    realized_profit += net_pnl;
                }
                (state, _) => holding = state,
            }

            equity_trace.push(EquityPoint {
                timestamp,
                cumulative_profit: realized_profit,
            });
        }

        let stats = calculate_statistics(settings.initial_capital, &trades, &equity_trace);
        debug!(
            simulator = self.name(),
            trades = stats.trade_count,
            final_profit = stats.final_profit,
            "simulation finished"
        );

        Ok(BacktestResult {
            trades,
            equity_trace,
            stats,
            open_position: holding.map(|h| h.position),
        })
    }
}

/// Derive run statistics from a ledger and its cumulative-profit trace
///
/// Drawdown is measured on `initial_capital + cumulative_profit`; an empty
/// trace is treated as the single point `[initial_capital]`.
pub fn calculate_statistics(
    initial_capital: f64,
    trades: &[TradeRecord],
    equity_trace: &[EquityPoint],
) -> RunStatistics {
    let final_profit = equity_trace
        .last()
        .map(|p| p.cumulative_profit)
        .unwrap_or(0.0);

    let trade_count = trades.len();
    let win_count = trades.iter().filter(|t| t.is_win).count();
    let win_rate = if trade_count > 0 {
        win_count as f64 / trade_count as f64 * 100.0
    } else {
        0.0
    };

    RunStatistics {
        initial_capital,
        final_profit,
        final_equity: initial_capital + final_profit,
        trade_count,
        win_count,
        win_rate,
        max_drawdown: max_drawdown_pct(initial_capital, equity_trace),
        total_fees: trades.iter().map(|t| t.fee).sum(),
    }
}

/// Most negative `(equity - running_peak) / running_peak`, in percent
fn max_drawdown_pct(initial_capital: f64, equity_trace: &[EquityPoint]) -> f64 {
    let equity: Vec<f64> = if equity_trace.is_empty() {
        vec![initial_capital]
    } else {
        equity_trace
            .iter()
            .map(|p| initial_capital + p.cumulative_profit)
            .collect()
    };

    let mut peak = f64::NEG_INFINITY;
    let mut max_dd: f64 = 0.0;
    for value in equity {
        peak = peak.max(value);
        let dd = (value - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
    }

    max_dd * 100.0
}

/// Backtest engine for one evaluation configuration
pub struct Backtester {
    classifier: SuperTrendClassifier,
    simulator: Box<dyn PositionSimulator>,
    settings: SimulationSettings,
}

impl Backtester {
    pub fn new(config: &EvaluationConfig) -> EvalResult<Self> {
        Ok(Backtester {
            classifier: SuperTrendClassifier::new(config.strategy())?,
            simulator: config.mode.simulator(),
            settings: SimulationSettings::new(config.initial_capital, config.fee_rate)?,
        })
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Classify and simulate one series
    ///
    /// A series too short to classify degrades to the empty result.
    pub fn run(&self, candles: &[Candle]) -> EvalResult<BacktestResult> {
        let bands = match self.classifier.compute(candles) {
            Ok(bands) => bands,
            Err(BacktestError::InsufficientData {
                required,
                available,
            }) => {
                debug!(required, available, "not enough bars, returning empty result");
                return Ok(BacktestResult::empty(&self.settings));
            }
            Err(e) => return Err(e),
        };

        self.simulator.simulate(
            candles,
            &bands,
            self.classifier.first_evaluated_bar(),
            &self.settings,
        )
    }
}

/// Evaluation entry point: one configuration, one series, one result
pub fn evaluate(candles: &[Candle], config: &EvaluationConfig) -> EvalResult<BacktestResult> {
    Backtester::new(config)?.run(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::supertrend::{compute_bands, SuperTrendConfig};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new_unchecked(start + Duration::minutes(5 * i as i64), c, c, c, c, 1.0)
            })
            .collect()
    }

    /// Hand-built labels so simulator tests do not depend on the classifier
    fn labels(trend: &[bool]) -> Vec<BandState> {
        trend
            .iter()
            .map(|&t| BandState {
                hl2: 0.0,
                atr: Some(0.0),
                upper: 0.0,
                lower: 0.0,
                trend: t,
            })
            .collect()
    }

    fn settings(capital: f64, fee: f64) -> SimulationSettings {
        SimulationSettings::new(capital, fee).unwrap()
    }

    #[test]
    fn test_settings_validation() {
        assert!(SimulationSettings::new(1000.0, 0.0).is_ok());
        assert!(matches!(
            SimulationSettings::new(0.0, 0.001),
            Err(BacktestError::InvalidParameter {
                name: "initial_capital",
                ..
            })
        ));
        assert!(matches!(
            SimulationSettings::new(1000.0, -0.001),
            Err(BacktestError::InvalidParameter {
                name: "taker_fee_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_swap_reverses_on_each_flip() {
        let candles = candles_from_closes(&[100.0, 100.0, 110.0, 120.0, 90.0, 80.0, 100.0]);
        let bands = labels(&[true, true, true, true, false, false, true]);
        let result = SwapSimulator
            .simulate(&candles, &bands, 2, &settings(1100.0, 0.0))
            .unwrap();

        // lot sized from close[2] = 110
        assert_eq!(result.trades.len(), 2);
        let long = &result.trades[0];
        assert_eq!(long.side, Side::Long);
        assert_eq!(long.entry_price, 110.0);
        assert_eq!(long.exit_price, 90.0);
        assert_relative_eq!(long.gross_pnl, -200.0, epsilon = 1e-9);
        let short = &result.trades[1];
        assert_eq!(short.side, Side::Short);
        assert_relative_eq!(short.gross_pnl, -100.0, epsilon = 1e-9);
        assert_relative_eq!(short.quantity, 10.0, epsilon = 1e-9);

        assert_eq!(result.equity_trace.len(), 5);
        assert_eq!(result.equity_trace[0].cumulative_profit, 0.0);
        assert_relative_eq!(result.stats.final_profit, -300.0, epsilon = 1e-9);
        assert_eq!(result.open_position.map(|p| p.side), Some(Side::Long));
        assert_eq!(result.open_position.map(|p| p.entry_price), Some(100.0));
    }

    #[test]
    fn test_swap_fee_covers_both_legs() {
        let candles = candles_from_closes(&[100.0, 100.0, 150.0]);
        let bands = labels(&[false, false, true]);
        let result = SwapSimulator
            .simulate(&candles, &bands, 1, &settings(1000.0, 0.001))
            .unwrap();

        let trade = &result.trades[0];
        assert_eq!(trade.side, Side::Short);
        assert_relative_eq!(trade.gross_pnl, -500.0, epsilon = 1e-9);
        assert_relative_eq!(trade.fee, (100.0 + 150.0) * 10.0 * 0.001, epsilon = 1e-9);
        assert_relative_eq!(trade.net_pnl, -502.5, epsilon = 1e-9);
        assert!(!trade.is_win);
        assert_relative_eq!(result.stats.total_fees, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_first_evaluated_bar_opens_without_trade() {
        let candles = candles_from_closes(&[100.0, 101.0, 102.0]);
        let bands = labels(&[false, true, true]);
        let result = SwapSimulator
            .simulate(&candles, &bands, 1, &settings(1000.0, 0.0))
            .unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.stats, calculate_statistics(1000.0, &[], &result.equity_trace));
        assert_eq!(result.open_position.map(|p| p.side), Some(Side::Long));
    }

    #[test]
    fn test_short_series_is_empty_not_error() {
        let candles = candles_from_closes(&[100.0, 101.0, 102.0]);
        let bands = labels(&[true, true, false]);
        let result = SwapSimulator
            .simulate(&candles, &bands, 3, &settings(1000.0, 0.001))
            .unwrap();

        assert!(result.trades.is_empty());
        assert!(result.equity_trace.is_empty());
        assert_eq!(result.stats.final_profit, 0.0);
        assert_eq!(result.stats.final_equity, 1000.0);
        assert_eq!(result.stats.max_drawdown, 0.0);
        assert_eq!(result.stats.win_rate, 0.0);
    }

    #[test]
    fn test_mismatched_bands_rejected() {
        let candles = candles_from_closes(&[100.0, 101.0, 102.0]);
        let bands = labels(&[true, true]);
        assert!(matches!(
            SwapSimulator.simulate(&candles, &bands, 1, &settings(1000.0, 0.0)),
            Err(BacktestError::InvalidParameter { name: "bands", .. })
        ));
    }

    #[test]
    fn test_nan_close_is_computation_error() {
        let mut candles = candles_from_closes(&[100.0, 101.0, 102.0, 103.0]);
        candles[2].close = f64::NAN;
        let bands = labels(&[true, true, true, true]);
        assert!(matches!(
            SwapSimulator.simulate(&candles, &bands, 1, &settings(1000.0, 0.0)),
            Err(BacktestError::ComputationError { index: 2, .. })
        ));
    }

    #[test]
    fn test_spot_round_trip_compounds_balance() {
        let candles = candles_from_closes(&[100.0, 100.0, 200.0, 200.0, 100.0, 150.0]);
        let bands = labels(&[true, true, false, true, false, false]);
        let result = SpotSimulator
            .simulate(&candles, &bands, 1, &settings(1000.0, 0.0))
            .unwrap();

        // buy 10 @ 100, sell @ 200 -> +1000; buy 10 @ 200 with 2000, sell @ 100 -> -1000
        assert_eq!(result.trades.len(), 2);
        assert_relative_eq!(result.trades[0].net_pnl, 1000.0, epsilon = 1e-9);
        assert_relative_eq!(result.trades[1].quantity, 10.0, epsilon = 1e-9);
        assert_relative_eq!(result.trades[1].net_pnl, -1000.0, epsilon = 1e-9);
        assert_relative_eq!(result.stats.final_profit, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.stats.win_rate, 50.0, epsilon = 1e-9);
        assert_relative_eq!(result.stats.max_drawdown, -50.0, epsilon = 1e-9);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn test_spot_fees_on_entry_and_exit() {
        let candles = candles_from_closes(&[100.0, 100.0, 110.0]);
        let bands = labels(&[true, true, false]);
        let result = SpotSimulator
            .simulate(&candles, &bands, 1, &settings(1000.0, 0.01))
            .unwrap();

        let trade = &result.trades[0];
        // entry fee 10, quantity 9.9, exit fee 9.9 * 110 * 0.01
        assert_relative_eq!(trade.quantity, 9.9, epsilon = 1e-9);
        assert_relative_eq!(trade.fee, 10.0 + 10.89, epsilon = 1e-9);
        assert_relative_eq!(trade.gross_pnl, 99.0, epsilon = 1e-9);
        assert_relative_eq!(trade.net_pnl, 99.0 - 20.89, epsilon = 1e-9);
    }

    #[test]
    fn test_spot_stays_flat_when_bearish() {
        let candles = candles_from_closes(&[100.0, 90.0, 80.0, 70.0]);
        let bands = labels(&[false, false, false, false]);
        let result = SpotSimulator
            .simulate(&candles, &bands, 1, &settings(1000.0, 0.001))
            .unwrap();

        assert!(result.trades.is_empty());
        assert!(result.open_position.is_none());
        assert!(result.equity_trace.iter().all(|p| p.cumulative_profit == 0.0));
    }

    #[test]
    fn test_drawdown_uses_running_peak() {
        let ts = Utc::now();
        let trace: Vec<EquityPoint> = [0.0, 100.0, -100.0, 50.0]
            .iter()
            .map(|&p| EquityPoint {
                timestamp: ts,
                cumulative_profit: p,
            })
            .collect();
        let stats = calculate_statistics(1000.0, &[], &trace);

        // peak 1100, trough 900
        assert_relative_eq!(stats.max_drawdown, -200.0 / 1100.0 * 100.0, epsilon = 1e-9);
        assert_relative_eq!(stats.final_equity, 1050.0, epsilon = 1e-9);
    }

    #[test]
    fn test_evaluate_drop_scenario() {
        let mut closes = vec![200.0; 10];
        closes.extend(vec![100.0; 10]);
        let candles = candles_from_closes(&closes);
        let config = EvaluationConfig {
            period: 3,
            multiplier: 1.0,
            initial_capital: 1000.0,
            fee_rate: 0.001,
            ..EvaluationConfig::default()
        };
        let result = evaluate(&candles, &config).unwrap();

        assert_eq!(result.stats.trade_count, 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_timestamp, candles[10].timestamp);
        assert_relative_eq!(trade.quantity, 5.0, epsilon = 1e-9);
        assert_relative_eq!(trade.gross_pnl, -500.0, epsilon = 1e-9);
        assert_relative_eq!(trade.fee, 1.5, epsilon = 1e-9);
        assert_relative_eq!(result.stats.final_profit, -501.5, epsilon = 1e-9);
        assert_relative_eq!(result.stats.max_drawdown, -50.15, epsilon = 1e-9);
        assert_eq!(result.equity_trace.len(), 17);
    }

    #[test]
    fn test_evaluate_single_bar_degrades_to_empty() {
        let candles = candles_from_closes(&[100.0]);
        let config = EvaluationConfig::default();
        let result = evaluate(&candles, &config).unwrap();
        assert_eq!(result, BacktestResult::empty(&SimulationSettings::new(
            config.initial_capital,
            config.fee_rate
        ).unwrap()));
    }

    #[test]
    fn test_huge_period_degrades_to_empty() {
        let candles = candles_from_closes(&[100.0; 50]);
        let config = EvaluationConfig {
            period: usize::MAX / 16,
            ..EvaluationConfig::default()
        };
        let result = evaluate(&candles, &config).unwrap();

        assert_eq!(
            result,
            BacktestResult::empty(&settings(config.initial_capital, config.fee_rate))
        );
        assert_eq!(result.stats.final_equity, config.initial_capital);
    }

    #[test]
    fn test_evaluate_matches_manual_pipeline() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i as f64) * 0.7).sin() * 15.0).collect();
        let candles = candles_from_closes(&closes);
        let config = EvaluationConfig {
            period: 5,
            multiplier: 0.5,
            ..EvaluationConfig::default()
        };
        let bands = compute_bands(&candles, &SuperTrendConfig::new(5, 0.5)).unwrap();
        let manual = SwapSimulator
            .simulate(&candles, &bands, 5, &settings(config.initial_capital, config.fee_rate))
            .unwrap();

        assert_eq!(evaluate(&candles, &config).unwrap(), manual);
    }
}
