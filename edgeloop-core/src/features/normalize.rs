//! Scale-free transforms applied before columns reach the model.
//!
//! - price-like: `value / prev_close - 1`, where `prev_close` is the previous
//!   close of the same cadence series the value was computed on
//! - volume-like: `ln(1 + value)`
//! - oscillators: unchanged
//!
//! Row 0 of every price-like column is NaN (no previous close) and is later
//! dropped as warm-up.

use super::indicator::{ColumnKind, IndicatorColumn};
use crate::domain::Bar;

/// `values[i] / closes[i-1] - 1`; NaN at 0 and wherever the previous close is
/// not a positive finite number.
pub fn relative_to_prev_close(values: &[f64], closes: &[f64]) -> Vec<f64> {
    debug_assert_eq!(values.len(), closes.len());
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        let prev = closes[i - 1];
        if prev.is_finite() && prev > 0.0 {
            out[i] = values[i] / prev - 1.0;
        }
    }
    out
}

/// `ln(1 + v)`; NaN for negative input.
pub fn log1p_volume(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v >= 0.0 { v.ln_1p() } else { f64::NAN })
        .collect()
}

/// Normalize one indicator column. Transformed columns gain an `n_` prefix.
pub fn normalize_column(column: IndicatorColumn, closes: &[f64]) -> (String, Vec<f64>) {
    match column.kind {
        ColumnKind::PriceLike => (
            format!("n_{}", column.name),
            relative_to_prev_close(&column.values, closes),
        ),
        ColumnKind::VolumeLike => (format!("n_{}", column.name), log1p_volume(&column.values)),
        ColumnKind::Oscillator => (column.name, column.values),
    }
}

/// Normalized OHLCV: `n_open`, `n_high`, `n_low`, `n_close`, `n_volume`.
pub fn ohlcv_columns(bars: &[Bar]) -> Vec<(String, Vec<f64>)> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let field = |f: fn(&Bar) -> f64| bars.iter().map(f).collect::<Vec<f64>>();

    vec![
        ("n_open".to_string(), relative_to_prev_close(&field(|b| b.open), &closes)),
        ("n_high".to_string(), relative_to_prev_close(&field(|b| b.high), &closes)),
        ("n_low".to_string(), relative_to_prev_close(&field(|b| b.low), &closes)),
        ("n_close".to_string(), relative_to_prev_close(&closes, &closes)),
        ("n_volume".to_string(), log1p_volume(&field(|b| b.volume))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn relative_change_from_prev_close() {
        let out = relative_to_prev_close(&[100.0, 110.0, 99.0], &[100.0, 110.0, 99.0]);
        assert!(out[0].is_nan());
        assert_approx(out[1], 0.1, DEFAULT_EPSILON);
        assert_approx(out[2], -0.1, DEFAULT_EPSILON);
    }

    #[test]
    fn zero_prev_close_is_nan() {
        let out = relative_to_prev_close(&[1.0, 1.0], &[0.0, 1.0]);
        assert!(out[1].is_nan());
    }

    #[test]
    fn volume_is_log1p() {
        let out = log1p_volume(&[0.0, std::f64::consts::E - 1.0, -1.0]);
        assert_approx(out[0], 0.0, DEFAULT_EPSILON);
        assert_approx(out[1], 1.0, DEFAULT_EPSILON);
        assert!(out[2].is_nan());
    }

    #[test]
    fn oscillators_pass_through() {
        let col = IndicatorColumn::new("rsi_14", ColumnKind::Oscillator, vec![30.0, 70.0]);
        let (name, values) = normalize_column(col, &[1.0, 1.0]);
        assert_eq!(name, "rsi_14");
        assert_eq!(values, vec![30.0, 70.0]);
    }

    #[test]
    fn price_like_gets_prefix() {
        let col = IndicatorColumn::new("ema_5", ColumnKind::PriceLike, vec![100.0, 105.0]);
        let (name, values) = normalize_column(col, &[100.0, 104.0]);
        assert_eq!(name, "n_ema_5");
        assert_approx(values[1], 0.05, DEFAULT_EPSILON);
    }

    #[test]
    fn ohlcv_names_and_values() {
        let bars = make_bars(&[100.0, 102.0]);
        let cols = ohlcv_columns(&bars);
        let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["n_open", "n_high", "n_low", "n_close", "n_volume"]);
        // bar 1: open 100, high 103, close 102 against prev close 100
        assert_approx(cols[0].1[1], 0.0, DEFAULT_EPSILON);
        assert_approx(cols[1].1[1], 0.03, DEFAULT_EPSILON);
        assert_approx(cols[3].1[1], 0.02, DEFAULT_EPSILON);
        assert_approx(cols[4].1[0], 11f64.ln(), DEFAULT_EPSILON);
    }
}
