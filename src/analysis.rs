//! Pure numeric building blocks shared by the pipeline stages, the market
//! monitor and the trackers: moving averages, Wilder RSI, pivot detection.

use crate::model::Candle;

/// Simple arithmetic mean of the last `period` closes (ascending input,
/// most recent last). `None` if there isn't enough history.
pub fn moving_average(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period == 0 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder's RSI with exponential smoothing, returned for every index from
/// `period` onward (ascending, aligned to `closes`). Index `i` in the
/// result corresponds to `closes[i + period]`.
pub fn rsi_wilder(closes: &[f64], period: usize) -> Vec<f64> {
    if closes.len() <= period || period == 0 {
        return Vec::new();
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let mut out = Vec::with_capacity(closes.len() - period);
    out.push(rsi_from_avg(avg_gain, avg_loss));

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_from_avg(avg_gain, avg_loss));
    }
    out
}

fn rsi_from_avg(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Indices (into `candles`) of local minima found with a `window`-bar
/// lookaround (a bar is a local minimum if its low is `<=` every other
/// low within `window` bars on each side).
pub fn local_minima(candles: &[Candle], window: usize) -> Vec<usize> {
    let mut out = Vec::new();
    if candles.len() < 2 * window + 1 {
        return out;
    }
    for i in window..candles.len() - window {
        let this_low = candles[i].low;
        let is_min = (i - window..=i + window)
            .filter(|&j| j != i)
            .all(|j| candles[j].low >= this_low);
        if is_min {
            out.push(i);
        }
    }
    out
}

/// `true` if `b` is greater than `a` within `tolerance_pct` percent (i.e.
/// `b >= a * (1 - tolerance_pct/100)`), used for "strictly increasing with
/// tolerance" sequences.
pub fn increasing_within_tolerance(a: f64, b: f64, tolerance_pct: f64) -> bool {
    b >= a * (1.0 - tolerance_pct / 100.0)
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `stddev / |mean + 1|`, the "stability" metric for accumulation
/// analysis: low variance relative to a typical daily net size.
pub fn stability(values: &[f64]) -> f64 {
    let m = mean(values);
    stddev(values) / (m + 1.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candle(d: &str, low: f64) -> Candle {
        Candle {
            date: NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(),
            open: low,
            high: low,
            low,
            close: low,
            volume: 0.0,
        }
    }

    #[test]
    fn moving_average_needs_full_window() {
        assert_eq!(moving_average(&[1.0, 2.0], 3), None);
        assert_eq!(moving_average(&[1.0, 2.0, 3.0], 3), Some(2.0));
    }

    #[test]
    fn rsi_is_bounded_and_zero_on_monotone_decline() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let rsi = rsi_wilder(&closes, 14);
        assert!(!rsi.is_empty());
        for v in &rsi {
            assert!(*v >= 0.0 && *v <= 100.0);
        }
        assert!(rsi.last().unwrap() < &5.0);
    }

    #[test]
    fn local_minima_detects_single_dip() {
        let candles = vec![
            candle("2024-01-01", 10.0),
            candle("2024-01-02", 9.0),
            candle("2024-01-03", 5.0),
            candle("2024-01-04", 9.0),
            candle("2024-01-05", 10.0),
        ];
        let minima = local_minima(&candles, 2);
        assert_eq!(minima, vec![2]);
    }

    #[test]
    fn stability_is_low_variance_over_typical_size() {
        let s = stability(&[10.0, 10.0, 10.0]);
        assert!(s.abs() < 1e-9);
    }
}
