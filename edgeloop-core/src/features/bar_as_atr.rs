//! Bar anatomy in ATR units.
//!
//! Three columns per bar, each divided by Wilder ATR(period):
//! - `{name}_top_wick`    = high - max(open, close)
//! - `{name}_body`        = close - open
//! - `{name}_bottom_wick` = min(open, close) - low
//!
//! A zero ATR yields NaN rather than infinity.

use super::atr::atr;
use super::indicator::{ColumnKind, Indicator, IndicatorColumn};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct BarAsAtr {
    period: usize,
    name: String,
}

impl BarAsAtr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("bar_atr_{period}"),
        }
    }
}

impl Indicator for BarAsAtr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn apply(&self, bars: &[Bar]) -> Vec<IndicatorColumn> {
        let atr = atr(bars, self.period);
        let per_atr = |x: f64, a: f64| if a > 0.0 { x / a } else { f64::NAN };

        let mut top = Vec::with_capacity(bars.len());
        let mut body = Vec::with_capacity(bars.len());
        let mut bottom = Vec::with_capacity(bars.len());
        for (bar, &a) in bars.iter().zip(&atr) {
            top.push(per_atr(bar.high - bar.open.max(bar.close), a));
            body.push(per_atr(bar.close - bar.open, a));
            bottom.push(per_atr(bar.open.min(bar.close) - bar.low, a));
        }

        vec![
            IndicatorColumn::new(format!("{}_top_wick", self.name), ColumnKind::Oscillator, top),
            IndicatorColumn::new(format!("{}_body", self.name), ColumnKind::Oscillator, body),
            IndicatorColumn::new(
                format!("{}_bottom_wick", self.name),
                ColumnKind::Oscillator,
                bottom,
            ),
        ]
    }
}
