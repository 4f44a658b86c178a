//! Core data types used across the backtesting system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BacktestError;

/// Validation errors for candle data
#[derive(Debug, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("prices must be finite: open={open}, high={high}, low={low}, close={close}")]
    NonFinitePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be finite and >= 0")]
    InvalidVolume(f64),
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(timestamp, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    ///
    /// Exchange feeds occasionally print a close a tick outside the bar's
    /// range, so open/close are not required to sit inside [low, high].
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        let prices = [self.open, self.high, self.low, self.close];

        if prices.iter().any(|p| !p.is_finite()) {
            return Err(CandleValidationError::NonFinitePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if prices.iter().any(|&p| p <= 0.0) {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(CandleValidationError::InvalidVolume(self.volume));
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Midpoint of the bar's range
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Check that a series is usable by the core: every bar valid and
/// timestamps strictly increasing.
pub fn validate_series(candles: &[Candle]) -> Result<(), BacktestError> {
    for (index, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            return Err(BacktestError::InvalidSeries {
                index,
                reason: e.to_string(),
            });
        }
    }

    if let Some(index) = candles
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(BacktestError::InvalidSeries {
            index: index + 1,
            reason: format!(
                "timestamp {} is not after {}",
                candles[index + 1].timestamp,
                candles[index].timestamp
            ),
        });
    }

    Ok(())
}

/// Trading pair symbol using Arc<str> for cheap cloning
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset: "BTC/USDT" -> "BTC"
    pub fn base(&self) -> &str {
        self.0.split(['/', '_']).next().unwrap_or(&self.0)
    }

    /// File-system safe form: "BTC/USDT" -> "BTC_USDT"
    pub fn file_stem(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Side a bullish/bearish trend label favours
    pub fn from_trend(bullish: bool) -> Self {
        if bullish {
            Side::Long
        } else {
            Side::Short
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Per-bar SuperTrend output
///
/// Bands are NaN and `atr` is `None` while the ATR window is still filling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandState {
    pub hl2: f64,
    pub atr: Option<f64>,
    pub upper: f64,
    pub lower: f64,
    /// true = bullish (long-favouring), false = bearish
    pub trend: bool,
}

impl BandState {
    pub fn is_warm(&self) -> bool {
        self.atr.is_some()
    }
}

/// Closed position, emitted each time a flip (or spot exit) realizes PnL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub gross_pnl: f64,
    pub fee: f64,
    pub net_pnl: f64,
    pub is_win: bool,
}

impl TradeRecord {
    /// Price move in the position's favour, in percent of entry
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let pct = match self.side {
            Side::Long => (self.exit_price - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - self.exit_price) / self.entry_price,
        };
        pct * 100.0
    }
}

/// Cumulative realized profit after an evaluated bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cumulative_profit: f64,
}

/// Summary of a completed simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub initial_capital: f64,
    pub final_profit: f64,
    pub final_equity: f64,
    pub trade_count: usize,
    pub win_count: usize,
    /// Percent of closed trades with positive net PnL
    pub win_rate: f64,
    /// Worst peak-to-trough decline in percent (<= 0)
    pub max_drawdown: f64,
    pub total_fees: f64,
}
