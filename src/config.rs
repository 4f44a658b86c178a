//! Configuration management
//!
//! Handles loading and validating the JSON configuration file and turning
//! it into the explicit [`EvaluationConfig`] each evaluation receives.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::strategies::supertrend::{GridParams, SuperTrendConfig};
use crate::strategies::StrategyMode;
use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub strategy: SuperTrendConfig,
    /// Sweep grid for `optimize`; the reference grid is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridParams>,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Reject values no evaluation could run with
    pub fn validate(&self) -> Result<()> {
        if !(self.trading.initial_capital > 0.0 && self.trading.initial_capital.is_finite()) {
            bail!(
                "trading.initial_capital must be > 0, got {}",
                self.trading.initial_capital
            );
        }
        if !(self.exchange.taker_fee >= 0.0 && self.exchange.taker_fee.is_finite()) {
            bail!(
                "exchange.taker_fee must be >= 0, got {}",
                self.exchange.taker_fee
            );
        }
        if self.backtest.workers == 0 {
            bail!("backtest.workers must be >= 1");
        }
        self.strategy
            .validate()
            .context("Invalid strategy section")?;
        Ok(())
    }

    /// Sweep grid, falling back to the reference grid
    pub fn grid(&self) -> GridParams {
        self.grid.clone().unwrap_or_default()
    }

    /// Explicit configuration for one evaluation of `symbol`
    pub fn evaluation(&self, symbol: &Symbol) -> EvaluationConfig {
        EvaluationConfig {
            symbol: symbol.clone(),
            timeframe: self.trading.timeframe.clone(),
            lookback_days: self.trading.lookback_days,
            initial_capital: self.trading.initial_capital,
            fee_rate: self.exchange.taker_fee,
            period: self.strategy.period,
            multiplier: self.strategy.multiplier,
            mode: self.trading.mode,
        }
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Fraction of notional charged per taker fill
    pub taker_fee: f64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            taker_fee: 0.00042, // 0.042%
        }
    }
}

/// Trading configuration
///
/// `initial_capital` must be in the quote currency of the price data; no
/// conversion is performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Empty means every data file matching the timeframe and lookback
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    pub initial_capital: f64,
    #[serde(default)]
    pub mode: StrategyMode,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

fn default_lookback_days() -> u32 {
    100
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            timeframe: default_timeframe(),
            lookback_days: default_lookback_days(),
            initial_capital: 1000.0,
            mode: StrategyMode::Swap,
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Size of the sweep worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: default_data_dir(),
            workers: default_workers(),
        }
    }
}

/// Everything one evaluation needs, passed explicitly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub symbol: Symbol,
    pub timeframe: String,
    pub lookback_days: u32,
    pub initial_capital: f64,
    pub fee_rate: f64,
    pub period: usize,
    pub multiplier: f64,
    pub mode: StrategyMode,
}

impl EvaluationConfig {
    pub fn strategy(&self) -> SuperTrendConfig {
        SuperTrendConfig::new(self.period, self.multiplier)
    }

    /// Same evaluation with a different parameter pair
    pub fn with_params(&self, params: &SuperTrendConfig) -> Self {
        EvaluationConfig {
            period: params.period,
            multiplier: params.multiplier,
            ..self.clone()
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Config::default().evaluation(&Symbol::new("BTC/USDT"))
    }
}
