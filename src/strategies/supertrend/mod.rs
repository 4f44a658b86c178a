//! SuperTrend Strategy
//!
//! ATR-band trend flip indicator used as an always-in-the-market signal.
//!
//! ## Signal
//! - Bullish while price has not closed below the ratcheted lower band
//! - Bearish while price has not closed above the ratcheted upper band
//!
//! ## Parameters
//! - `period`: ATR window (rolling mean of true range)
//! - `multiplier`: band distance from `hl2` in ATRs

mod classifier;
mod config;
mod grid_params;

pub use classifier::{SuperTrendClassifier, MIN_BARS};
pub use config::SuperTrendConfig;
pub use grid_params::GridParams;

use crate::error::EvalResult;
use crate::{BandState, Candle};

/// Classify a series with one parameter pair
pub fn compute_bands(candles: &[Candle], config: &SuperTrendConfig) -> EvalResult<Vec<BandState>> {
    SuperTrendClassifier::new(*config)?.compute(candles)
}

/// Format params for display
pub fn format_params(config: &SuperTrendConfig) -> String {
    format!("ATR={} Mult={:.1}", config.period, config.multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_params() {
        assert_eq!(format_params(&SuperTrendConfig::new(14, 3.5)), "ATR=14 Mult=3.5");
    }
}
