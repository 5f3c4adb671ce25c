//! Exponential Moving Average (EMA) of close.
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: EMA[period-1] = SMA of first `period` close values.
//! Lookback: period - 1. Price-like: normalized against the previous close.

use super::indicator::{ColumnKind, Indicator, IndicatorColumn};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }

    pub fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        let alpha = 2.0 / (self.period as f64 + 1.0);

        let mut sum = 0.0;
        for bar in bars.iter().take(self.period) {
            if bar.close.is_nan() {
                return result;
            }
            sum += bar.close;
        }
        let seed = sum / self.period as f64;
        result[self.period - 1] = seed;

        let mut prev = seed;
        for i in self.period..n {
            if bars[i].close.is_nan() {
                for val in result.iter_mut().skip(i) {
                    *val = f64::NAN;
                }
                return result;
            }
            let ema = alpha * bars[i].close + (1.0 - alpha) * prev;
            result[i] = ema;
            prev = ema;
        }

        result
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn apply(&self, bars: &[Bar]) -> Vec<IndicatorColumn> {
        vec![IndicatorColumn::new(
            self.name.clone(),
            ColumnKind::PriceLike,
            self.compute(bars),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn ema_seed_is_sma() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let result = Ema::new(3).compute(&bars);
        assert!(result[1].is_nan());
        assert_approx(result[2], 20.0, DEFAULT_EPSILON);
        // alpha = 0.5 → 0.5*40 + 0.5*20 = 30
        assert_approx(result[3], 30.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_period_one_tracks_close() {
        let bars = make_bars(&[5.0, 7.0, 9.0]);
        let result = Ema::new(1).compute(&bars);
        assert_approx(result[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_is_price_like() {
        let cols = Ema::new(2).apply(&make_bars(&[1.0, 2.0]));
        assert_eq!(cols[0].kind, ColumnKind::PriceLike);
    }
}
