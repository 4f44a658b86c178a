//! Trading Strategies Module
//!
//! The SuperTrend classifier plus the position-sizing disciplines that can
//! consume its labels.

pub mod supertrend;

use serde::{Deserialize, Serialize};

use crate::backtest::{PositionSimulator, SpotSimulator, SwapSimulator};

/// How trend labels are turned into positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyMode {
    /// Always in the market, reversing long/short with a fixed lot
    #[default]
    Swap,
    /// Long-only, all-in on bullish labels, flat on bearish ones
    Spot,
}

impl StrategyMode {
    /// Simulator implementing this mode
    pub fn simulator(self) -> Box<dyn PositionSimulator> {
        match self {
            StrategyMode::Swap => Box::new(SwapSimulator),
            StrategyMode::Spot => Box::new(SpotSimulator),
        }
    }
}

impl std::str::FromStr for StrategyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "swap" => Ok(StrategyMode::Swap),
            "spot" => Ok(StrategyMode::Spot),
            _ => Err(format!("Unknown mode: {}. Use 'swap' or 'spot'", s)),
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyMode::Swap => write!(f, "swap"),
            StrategyMode::Spot => write!(f, "spot"),
        }
    }
}
