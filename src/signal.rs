//! Trend-flip events and the order instructions they imply
//!
//! Nothing here talks to an exchange. A live gateway would receive the
//! [`OrderIntent`]s produced for each [`TrendFlip`], and the backtest
//! simulators act on exactly the same flips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategies::StrategyMode;
use crate::{BandState, Candle, Symbol};

/// Bar on which the trend label changed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendFlip {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// New direction: true = bullish
    pub bullish: bool,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Market order instruction for an execution gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub size: f64,
    /// Only shrink or close an existing position, never open one
    pub reduce_only: bool,
}

/// Flips inside the evaluated region `first_bar..`
///
/// The label on `first_bar` itself is the initial entry, not a flip.
pub fn trend_flips(candles: &[Candle], bands: &[BandState], first_bar: usize) -> Vec<TrendFlip> {
    let n = candles.len().min(bands.len());
    if n <= first_bar + 1 {
        return Vec::new();
    }

    (first_bar + 1..n)
        .filter(|&i| bands[i].trend != bands[i - 1].trend)
        .map(|i| TrendFlip {
            index: i,
            timestamp: candles[i].timestamp,
            bullish: bands[i].trend,
            close: candles[i].close,
        })
        .collect()
}

/// Orders a gateway would place for one flip
///
/// Swap: reduce-only close of the old side, then open the new side.
/// Spot: buy on bullish flips, reduce-only sell on bearish flips.
pub fn order_intents(
    flip: &TrendFlip,
    symbol: &Symbol,
    size: f64,
    mode: StrategyMode,
) -> Vec<OrderIntent> {
    let side = if flip.bullish {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };

    match mode {
        StrategyMode::Swap => vec![
            OrderIntent {
                symbol: symbol.clone(),
                side,
                size,
                reduce_only: true,
            },
            OrderIntent {
                symbol: symbol.clone(),
                side,
                size,
                reduce_only: false,
            },
        ],
        StrategyMode::Spot => vec![OrderIntent {
            symbol: symbol.clone(),
            side,
            size,
            reduce_only: !flip.bullish,
        }],
    }
}
