//! Technical indicators
//!
//! Rolling averages are computed with the `ta` crate; everything else is
//! plain slice arithmetic. Warm-up values are `None`.

use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::Candle;

/// Midpoint `(high + low) / 2` of every bar
pub fn hl2(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(Candle::hl2).collect()
}

/// Calculate True Range
///
/// `TR[0] = high[0] - low[0]`; afterwards the largest of the bar range and
/// the gaps to the previous close.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Calculate Simple Moving Average
///
/// The first `period - 1` entries are `None`.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }
    // never warms up; skip the period-sized buffer `ta` would allocate
    if period > values.len() {
        return vec![None; values.len()];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let sma_val = indicator.next(value);
            (i + 1 >= period).then_some(sma_val)
        })
        .collect()
}

/// Calculate Average True Range as the simple rolling mean of true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    sma(&tr, period)
}

/// ATR straight from a candle series
pub fn atr_from_candles(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    atr(&high, &low, &close, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hl2_series() {
        let ts = chrono::Utc::now();
        let candles = vec![
            Candle::new_unchecked(ts, 10.0, 12.0, 8.0, 11.0, 1.0),
            Candle::new_unchecked(ts, 11.0, 15.0, 11.0, 14.0, 1.0),
        ];
        assert_eq!(hl2(&candles), vec![10.0, 13.0]);
    }

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
    }

    #[test]
    fn test_sma_degenerate_inputs() {
        assert!(sma(&[], 3).is_empty());
        assert!(sma(&[1.0, 2.0], 0).is_empty());
        assert_eq!(sma(&[1.0, 2.0], 5), vec![None, None]);
    }

    #[test]
    fn test_huge_period_stays_in_warmup() {
        let values = vec![1.0; 50];
        let result = sma(&values, usize::MAX / 16);
        assert_eq!(result.len(), 50);
        assert!(result.iter().all(Option::is_none));

        let result = sma(&values, 51);
        assert!(result.iter().all(Option::is_none));
        assert_eq!(sma(&values, 50)[49], Some(1.0));
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let high = vec![10.0, 12.0, 11.0];
        let low = vec![8.0, 11.0, 7.0];
        let close = vec![9.0, 11.5, 8.0];
        let tr = true_range(&high, &low, &close);

        assert_eq!(tr[0], 2.0);
        // gap up: |12 - 9| beats the 1.0 range
        assert_eq!(tr[1], 3.0);
        // wide bar: 11 - 7
        assert_eq!(tr[2], 4.0);
    }

    /// Golden values: ATR is a plain rolling mean with `period - 1` undefined
    /// leading entries.
    #[test]
    fn test_atr_golden_warmup() {
        let high = vec![11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        let low = vec![9.0, 10.0, 11.0, 12.0, 13.0, 14.0];
        let close = vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        // TR = [2, 2, 2, 2, 2, 2]
        let result = atr(&high, &low, &close, 3);

        assert_eq!(result.len(), 6);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[5], Some(2.0));
    }

    #[test]
    fn test_atr_tracks_range_change() {
        let high = vec![101.0, 101.0, 101.0, 104.0, 104.0];
        let low = vec![99.0, 99.0, 99.0, 96.0, 96.0];
        let close = vec![100.0; 5];
        // TR = [2, 2, 2, 8, 8]
        let result = atr(&high, &low, &close, 2);

        assert_eq!(result[0], None);
        assert_eq!(result[1], Some(2.0));
        assert_eq!(result[2], Some(2.0));
        assert_relative_eq!(result[3].unwrap(), 5.0);
        assert_relative_eq!(result[4].unwrap(), 8.0);
    }

    #[test]
    fn test_period_one_has_no_warmup() {
        let high = vec![3.0, 4.0];
        let low = vec![1.0, 3.0];
        let close = vec![2.0, 3.5];
        let result = atr(&high, &low, &close, 1);
        assert_eq!(result, vec![Some(2.0), Some(2.0)]);
    }
}
