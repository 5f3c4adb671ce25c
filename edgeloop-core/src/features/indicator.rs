//! Indicator trait and the static indicator registry.
//!
//! Indicators are pure functions: one cadence's bar history in, one or more
//! named numeric columns out, each the same length as the input. Value `t` may
//! only depend on bars `0..=t`.

use crate::domain::Bar;

/// How a column is normalized before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Lives on the price scale; becomes `value / prev_close - 1`.
    PriceLike,
    /// Already scale-free; passed through.
    Oscillator,
    /// Non-negative and heavy-tailed; becomes `ln(1 + value)`.
    VolumeLike,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<f64>,
}

impl IndicatorColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }
}

pub trait Indicator: Send + Sync {
    /// Stable column stem, e.g. `rsi_14`.
    fn name(&self) -> &str;

    /// Bars needed before the first valid (non-NaN) output.
    fn lookback(&self) -> usize;

    fn apply(&self, bars: &[Bar]) -> Vec<IndicatorColumn>;
}

/// Indicators composed explicitly at startup.
#[derive(Default)]
pub struct IndicatorSet {
    indicators: Vec<Box<dyn Indicator>>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicators.push(Box::new(indicator));
        self
    }

    /// RSI, bar anatomy over ATR, and an EMA of close.
    pub fn standard(rsi_period: usize, atr_period: usize, ema_period: usize) -> Self {
        Self::new()
            .with(super::Rsi::new(rsi_period))
            .with(super::BarAsAtr::new(atr_period))
            .with(super::Ema::new(ema_period))
    }

    pub fn names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }

    pub fn max_lookback(&self) -> usize {
        self.indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn apply_all(&self, bars: &[Bar]) -> Vec<IndicatorColumn> {
        self.indicators
            .iter()
            .flat_map(|i| i.apply(bars))
            .collect()
    }
}
