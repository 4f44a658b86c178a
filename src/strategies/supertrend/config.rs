//! SuperTrend Configuration

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, EvalResult};

/// Configuration for the SuperTrend classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperTrendConfig {
    /// ATR window in bars (default: 14)
    #[serde(default = "default_period")]
    pub period: usize,

    /// Band width as an ATR multiple (default: 3.5)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_period() -> usize { 14 }
fn default_multiplier() -> f64 { 3.5 }

impl Default for SuperTrendConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            multiplier: default_multiplier(),
        }
    }
}

impl SuperTrendConfig {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self { period, multiplier }
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.period < 1 {
            return Err(BacktestError::invalid(
                "period",
                format!("must be >= 1, got {}", self.period),
            ));
        }
        // NaN fails this comparison too
        if !(self.multiplier > 0.0 && self.multiplier.is_finite()) {
            return Err(BacktestError::invalid(
                "multiplier",
                format!("must be finite and > 0, got {}", self.multiplier),
            ));
        }
        Ok(())
    }
}
