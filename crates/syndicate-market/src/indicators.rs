//! Stateless indicator math applied to a symbol's bars when a context
//! snapshot is assembled.
//!
//! RSI uses Wilder's smoothing: the first average is a simple mean over the
//! first `period` changes, then avg = (prev * (period - 1) + current) / period.
//! MACD is EMA(12) - EMA(26) with an EMA(9) signal line.

use syndicate_models::market::{Bar, IndicatorSet};

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Compute the full indicator set for one symbol's bars. Fields stay `None`
/// when there are not enough bars to warm the calculation up.
pub fn compute(bars: &[Bar]) -> IndicatorSet {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let (macd_line, macd_signal, macd_histogram) = macd(&closes);
    IndicatorSet {
        rsi_14: rsi(&closes, 14),
        sma_20: sma(&closes, 20),
        ema_20: ema(&closes, 20),
        macd_line,
        macd_signal,
        macd_histogram,
    }
}

/// Latest RSI over `period`, or None during warmup.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}

/// Simple moving average of the last `period` closes.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let sum: f64 = closes[closes.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// Latest EMA over `period`, seeded with the SMA of the first `period`
/// closes.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    ema_series(closes, period).and_then(|s| s.last().copied())
}

fn ema_series(closes: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(closes.len() - period + 1);
    series.push(seed);
    let mut current = seed;
    for close in &closes[period..] {
        current = close * k + current * (1.0 - k);
        series.push(current);
    }
    Some(series)
}

/// Latest (line, signal, histogram) for MACD(12, 26, 9).
pub fn macd(closes: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    let warmup = MACD_SLOW - 1 + MACD_SIGNAL - 1;
    if closes.len() <= warmup {
        return (None, None, None);
    }

    let fast = match ema_full(closes, MACD_FAST) {
        Some(v) => v,
        None => return (None, None, None),
    };
    let slow = match ema_full(closes, MACD_SLOW) {
        Some(v) => v,
        None => return (None, None, None),
    };

    // MACD line only exists once the slow EMA is warm.
    let macd_line: Vec<f64> = (MACD_SLOW - 1..closes.len())
        .map(|i| fast[i] - slow[i])
        .collect();
    let signal = match ema_series(&macd_line, MACD_SIGNAL) {
        Some(v) => v,
        None => return (None, None, None),
    };

    match (macd_line.last(), signal.last()) {
        (Some(&line), Some(&sig)) => (Some(line), Some(sig), Some(line - sig)),
        _ => (None, None, None),
    }
}

/// EMA aligned to the input length; values before warmup repeat the seed's
/// index position as 0.0 and are never read past `period - 1`.
fn ema_full(closes: &[f64], period: usize) -> Option<Vec<f64>> {
    let series = ema_series(closes, period)?;
    let mut full = vec![0.0; period - 1];
    full.extend(series);
    Some(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use syndicate_models::market::Bar;

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .map(|&close| Bar {
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn rsi_warmup_returns_none() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), None);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!((value - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value.abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes: Vec<f64> = (1..=30)
            .map(|i| 100.0 + ((i % 7) as f64 - 3.0) * 2.0)
            .collect();
        let value = rsi(&closes, 14).unwrap();
        assert!((0.0..=100.0).contains(&value), "RSI {value} out of range");
    }

    #[test]
    fn sma_of_constant_series() {
        let closes = vec![50.0; 25];
        assert_eq!(sma(&closes, 20), Some(50.0));
        assert_eq!(sma(&closes[..10], 20), None);
    }

    #[test]
    fn sma_uses_most_recent_window() {
        let mut closes = vec![10.0; 20];
        closes.extend(vec![20.0; 20]);
        assert_eq!(sma(&closes, 20), Some(20.0));
    }

    #[test]
    fn ema_converges_toward_recent_prices() {
        let mut closes = vec![100.0; 20];
        closes.extend(vec![110.0; 30]);
        let value = ema(&closes, 20).unwrap();
        assert!(value > 108.0, "EMA should be pulled up, got {value}");
    }

    #[test]
    fn macd_warmup_returns_none() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let (line, signal, hist) = macd(&closes);
        assert!(line.is_none() && signal.is_none() && hist.is_none());
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let (line, signal, hist) = macd(&closes);
        let (line, signal, hist) = (line.unwrap(), signal.unwrap(), hist.unwrap());
        assert!((hist - (line - signal)).abs() < 1e-9);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let (line, _, _) = macd(&closes);
        assert!(line.unwrap() > 0.0);
    }

    #[test]
    fn compute_fills_what_data_allows() {
        let bars = make_bars(&(0..60).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let set = compute(&bars);
        assert!(set.rsi_14.is_some());
        assert!(set.sma_20.is_some());
        assert!(set.ema_20.is_some());
        assert!(set.macd_line.is_some());

        let short = make_bars(&[100.0, 101.0, 102.0]);
        let set = compute(&short);
        assert!(set.rsi_14.is_none());
        assert!(set.sma_20.is_none());
        assert!(set.macd_line.is_none());
    }
}
