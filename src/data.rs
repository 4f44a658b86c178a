//! Data loading
//!
//! Supplies candle series to the backtester. Only the CSV-backed provider
//! lives here; downloading candles from an exchange is someone else's job.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::validate_series;
use crate::{Candle, Symbol};

/// Source of candle series, one per symbol
///
/// Implementations must return bars sorted ascending by timestamp.
pub trait SeriesProvider: Send + Sync {
    fn load(&self, symbol: &Symbol) -> Result<Vec<Candle>>;
}

/// Reads `{BASE}_{QUOTE}_{timeframe}_{lookback_days}d.csv` files
#[derive(Debug, Clone)]
pub struct CsvSeriesProvider {
    pub data_dir: PathBuf,
    pub timeframe: String,
    pub lookback_days: u32,
}

impl CsvSeriesProvider {
    pub fn new(data_dir: impl AsRef<Path>, timeframe: impl Into<String>, lookback_days: u32) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            timeframe: timeframe.into(),
            lookback_days,
        }
    }

    fn suffix(&self) -> String {
        format!("_{}_{}d.csv", self.timeframe, self.lookback_days)
    }

    /// Path of the CSV file backing `symbol`
    pub fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.data_dir
            .join(format!("{}{}", symbol.file_stem(), self.suffix()))
    }

    /// Symbols with a data file for this timeframe and lookback
    pub fn available_symbols(&self) -> Result<Vec<Symbol>> {
        let suffix = self.suffix();
        let entries = std::fs::read_dir(&self.data_dir)
            .with_context(|| format!("Failed to read data dir {}", self.data_dir.display()))?;

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(&suffix) {
                // BTC_USDT -> BTC/USDT
                symbols.push(Symbol::new(stem.replacen('_', "/", 1)));
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// The configured symbols, or every available data file when none are given
    pub fn resolve_symbols(&self, configured: Vec<Symbol>) -> Result<Vec<Symbol>> {
        if !configured.is_empty() {
            return Ok(configured);
        }
        let symbols = self.available_symbols()?;
        if symbols.is_empty() {
            bail!(
                "No *{} files found in {}",
                self.suffix(),
                self.data_dir.display()
            );
        }
        info!("Discovered {} symbols in {}", symbols.len(), self.data_dir.display());
        Ok(symbols)
    }
}

impl SeriesProvider for CsvSeriesProvider {
    fn load(&self, symbol: &Symbol) -> Result<Vec<Candle>> {
        let path = self.path_for(symbol);
        let candles =
            load_csv(&path).with_context(|| format!("Failed to load data for {}", symbol))?;
        info!("Loaded {} candles for {}", candles.len(), symbol);
        Ok(candles)
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S` or epoch milliseconds
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }
    s.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

fn parse_row(record: &csv::StringRecord) -> Result<Candle> {
    let dt_str = record.get(0).context("Missing timestamp column")?;
    let timestamp =
        parse_timestamp(dt_str).with_context(|| format!("Failed to parse timestamp: {}", dt_str))?;

    let field = |idx: usize, name: &str| -> Result<f64> {
        record
            .get(idx)
            .with_context(|| format!("Missing {} column", name))?
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}", name))
    };

    let candle = Candle::new(
        timestamp,
        field(1, "open")?,
        field(2, "high")?,
        field(3, "low")?,
        field(4, "close")?,
        field(5, "volume")?,
    )?;
    Ok(candle)
}

/// Load OHLCV data from a CSV file with a header row
///
/// Rows that fail to parse or validate are skipped with a warning; the
/// remaining series must be in strictly increasing timestamp order.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();
    let mut skipped = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        match parse_row(&record) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                skipped += 1;
                warn!("Skipping row {} of {}: {:#}", row_idx + 1, path.display(), e);
            }
        }
    }

    if skipped > 0 {
        debug!("{} rows skipped in {}", skipped, path.display());
    }

    validate_series(&candles).with_context(|| format!("Invalid series in {}", path.display()))?;
    Ok(candles)
}
