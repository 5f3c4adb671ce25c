//! Leakage-safe multi-cadence feature view.
//!
//! Each cadence series is transformed independently by a static
//! [`IndicatorSet`], normalized, then every higher cadence is attached to the
//! base timeline with a backward as-of join on bar *close* time. Rows that
//! lack any higher-cadence context, or carry warm-up NaNs, are dropped.

pub mod asof;
pub mod atr;
pub mod bar_as_atr;
pub mod builder;
pub mod ema;
pub mod error;
pub mod expiry;
pub mod export;
pub mod indicator;
pub mod normalize;
pub mod resample;
pub mod rsi;

pub use asof::asof_backward;
pub use bar_as_atr::BarAsAtr;
pub use builder::{FeatureFrame, FeatureRow, FeatureViewBuilder, SourceRef};
pub use ema::Ema;
pub use error::FeatureError;
pub use expiry::ExpiryFeatures;
pub use export::{export_parquet, FeatureMeta};
pub use indicator::{ColumnKind, Indicator, IndicatorColumn, IndicatorSet};
pub use resample::resample;
pub use rsi::Rsi;

/// Synthetic 1m bars from close prices, starting 2023-11-15 12:00 UTC.
///
/// open = prev close (or close for the first bar),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0, volume = 10.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::{Bar, Cadence, Venue};
    const NOON: i64 = 1_700_049_600_000;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                venue: Venue::Synthetic,
                instrument: "TEST".to_string(),
                cadence: Cadence::ONE_MINUTE,
                start_ms: NOON + i as i64 * 60_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
