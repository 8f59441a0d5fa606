//! Technical indicators powered by the `ta` crate
//!
//! The EMA/RSI scalper strategy only needs four series: SMA, EMA, RSI, and
//! ATR. Everything here wraps the `ta` crate's incremental indicators into
//! the whole-series `&[f64] -> Vec<Option<f64>>` shape the strategy layer
//! consumes.

use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage};
use ta::Next;

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let ema_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(ema_val));
        } else {
            result.push(None);
        }
    }

    result
}

// =============================================================================
// Volatility
// =============================================================================

/// Calculate True Range
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

/// Calculate Average True Range (ATR) using Wilder's smoothing
///
/// This uses Wilder's smoothing method (same as backtrader) where:
/// ATR = (prev_ATR * (period - 1) + current_TR) / period
///
/// This is equivalent to EMA with smoothing factor = 1/period instead of 2/(period+1)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    let tr = true_range(high, low, close);
    let mut result = Vec::with_capacity(high.len());

    // Wilder's smoothing: ATR = (prev_ATR * (period - 1) + current_TR) / period
    let mut atr_value: Option<f64> = None;

    for i in 0..tr.len() {
        if i + 1 < period {
            // Not enough data yet
            result.push(None);
        } else if i + 1 == period {
            // First ATR value is SMA of first `period` TR values
            let sum: f64 = tr[0..period].iter().sum();
            atr_value = Some(sum / period as f64);
            result.push(atr_value);
        } else {
            // Wilder's smoothing for subsequent values
            if let Some(prev_atr) = atr_value {
                let new_atr = (prev_atr * (period - 1) as f64 + tr[i]) / period as f64;
                atr_value = Some(new_atr);
                result.push(atr_value);
            } else {
                result.push(None);
            }
        }
    }

    result
}

// =============================================================================
// Momentum
// =============================================================================

/// Calculate RSI (Relative Strength Index) using ta crate
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let rsi_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(rsi_val));
        } else {
            result.push(None);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        // SMA of [1,2,3] = 2.0
        assert!((result[2].unwrap() - 2.0).abs() < 0.001);
        // SMA of [2,3,4] = 3.0
        assert!((result[3].unwrap() - 3.0).abs() < 0.001);
        // SMA of [3,4,5] = 4.0
        assert!((result[4].unwrap() - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_ema() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        // EMA values should be reasonable
        let ema_val = result[4].unwrap();
        assert!(ema_val > 3.0 && ema_val < 5.0);
    }

    #[test]
    fn test_rsi() {
        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75,
        ];
        let result = rsi(&values, 14);

        // RSI should have values after period warmup
        assert!(result.last().unwrap().is_some());
        let rsi_val = result.last().unwrap().unwrap();
        // RSI should be between 0 and 100
        assert!((0.0..=100.0).contains(&rsi_val));
    }

    #[test]
    fn test_atr() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.0];
        let low = vec![9.0, 10.0, 11.0, 10.5, 11.0];
        let close = vec![9.5, 10.5, 11.5, 11.0, 11.5];

        let result = atr(&high, &low, &close, 3);

        assert!(result[2].is_some());
        let atr_val = result[2].unwrap();
        assert!(atr_val > 0.0);
    }
}
