//! SuperTrend trend classifier
//!
//! Labels every bar bullish or bearish with an ATR-banded flip-and-hold rule:
//! 1. Raw bands: `hl2 ± multiplier × ATR`
//! 2. Close above the previous upper band → bullish; below the previous
//!    lower band → bearish; otherwise the previous label holds
//! 3. While bullish the lower band may only rise; while bearish the upper
//!    band may only fall. The other band always takes its raw value.

use tracing::debug;

use crate::error::{BacktestError, EvalResult};
use crate::indicators::atr_from_candles;
use crate::types::validate_series;
use crate::{BandState, Candle};

use super::config::SuperTrendConfig;

/// Fewest bars for which a trend transition is possible
pub const MIN_BARS: usize = 2;

/// SuperTrend classifier for one (period, multiplier) pair
#[derive(Debug, Clone, Copy)]
pub struct SuperTrendClassifier {
    config: SuperTrendConfig,
}

impl SuperTrendClassifier {
    pub fn new(config: SuperTrendConfig) -> EvalResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SuperTrendConfig {
        &self.config
    }

    /// First bar whose label the simulators act on
    pub fn first_evaluated_bar(&self) -> usize {
        self.config.period
    }

    /// Compute per-bar band state for the whole series
    ///
    /// Series shorter than `period + 1` bars still classify; the leading bars
    /// simply stay in warm-up with NaN bands.
    pub fn compute(&self, candles: &[Candle]) -> EvalResult<Vec<BandState>> {
        if candles.len() < MIN_BARS {
            return Err(BacktestError::InsufficientData {
                required: MIN_BARS,
                available: candles.len(),
            });
        }
        validate_series(candles)?;

        let multiplier = self.config.multiplier;
        let atr = atr_from_candles(candles, self.config.period);
        let mut states: Vec<BandState> = Vec::with_capacity(candles.len());

        for (i, candle) in candles.iter().enumerate() {
            let hl2 = candle.hl2();
            let (raw_upper, raw_lower) = match atr[i] {
                Some(a) => (hl2 + multiplier * a, hl2 - multiplier * a),
                None => (f64::NAN, f64::NAN),
            };

            let Some(prev) = states.last().copied() else {
                states.push(BandState {
                    hl2,
                    atr: atr[i],
                    upper: raw_upper,
                    lower: raw_lower,
                    trend: true,
                });
                continue;
            };

            let trend = if !prev.is_warm() {
                // previous bands undefined: nothing to cross yet
                prev.trend
            } else {
                if !(prev.upper.is_finite() && prev.lower.is_finite()) {
                    return Err(BacktestError::computation(
                        i,
                        format!(
                            "non-finite band at bar {}: upper={}, lower={}",
                            i - 1,
                            prev.upper,
                            prev.lower
                        ),
                    ));
                }
                if candle.close > prev.upper {
                    true
                } else if candle.close < prev.lower {
                    false
                } else {
                    prev.trend
                }
            };

            // NaN comparisons are false, so warm-up bars fall through to raw
            let lower = if trend && raw_lower < prev.lower {
                prev.lower
            } else {
                raw_lower
            };
            let upper = if !trend && raw_upper > prev.upper {
                prev.upper
            } else {
                raw_upper
            };

            states.push(BandState {
                hl2,
                atr: atr[i],
                upper,
                lower,
                trend,
            });
        }

        debug!(
            period = self.config.period,
            multiplier,
            bars = candles.len(),
            "supertrend computed"
        );

        Ok(states)
    }
}
