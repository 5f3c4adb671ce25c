//! Look-ahead contamination tests for indicators and the joined feature view.
//!
//! Invariant: no feature value in the row for base bar t may depend on data
//! that was not closed by t.
//!
//! Method: compute on a truncated history and on the full history, and assert
//! the overlapping rows are identical. Any difference means a value was
//! computed from later bars.

use edgeloop_core::domain::{Bar, Cadence, Venue};
use edgeloop_core::features::{
    resample, BarAsAtr, Ema, ExpiryFeatures, FeatureViewBuilder, Indicator, IndicatorSet, Rsi,
};
use proptest::prelude::*;

const NOON: i64 = 1_700_049_600_000;

/// Deterministic pseudo-random 1m walk.
fn make_test_bars(n: usize) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(n);
    let mut price = 40_000.0;
    for i in 0..n {
        let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
        let change = ((seed % 200) as f64 - 100.0) * 0.8;
        let open = price;
        price = (price + change).max(1_000.0);
        bars.push(Bar {
            venue: Venue::Synthetic,
            instrument: "BTC".to_string(),
            cadence: Cadence::ONE_MINUTE,
            start_ms: NOON + i as i64 * 60_000,
            open,
            high: open.max(price) + 5.0,
            low: open.min(price) - 5.0,
            close: price,
            volume: 1.0 + (i % 17) as f64,
        });
    }
    bars
}

fn bars_from_steps(steps: &[f64]) -> Vec<Bar> {
    let mut price = 100.0;
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let open = price;
            price = (price * (1.0 + step)).max(1.0);
            Bar {
                venue: Venue::Synthetic,
                instrument: "BTC".to_string(),
                cadence: Cadence::ONE_MINUTE,
                start_ms: NOON + i as i64 * 60_000,
                open,
                high: open.max(price) * 1.001,
                low: open.min(price) * 0.999,
                close: price,
                volume: 10.0 + i as f64,
            }
        })
        .collect()
}

fn assert_no_lookahead(indicator: &dyn Indicator, full: &[Bar], truncated_len: usize) {
    let full_cols = indicator.apply(full);
    let trunc_cols = indicator.apply(&full[..truncated_len]);
    assert_eq!(full_cols.len(), trunc_cols.len(), "{}: column count", indicator.name());

    for (f, t) in full_cols.iter().zip(&trunc_cols) {
        assert_eq!(f.name, t.name);
        assert_eq!(t.values.len(), truncated_len, "{}: truncated length", t.name);
        for i in 0..truncated_len {
            let (a, b) = (t.values[i], f.values[i]);
            if a.is_nan() && b.is_nan() {
                continue;
            }
            assert!(
                a == b,
                "{}: look-ahead at bar {i} (truncated={a}, full={b})",
                t.name
            );
        }
    }
}

#[test]
fn rsi_no_lookahead() {
    assert_no_lookahead(&Rsi::new(14), &make_test_bars(200), 100);
}

#[test]
fn ema_no_lookahead() {
    assert_no_lookahead(&Ema::new(20), &make_test_bars(200), 100);
}

#[test]
fn bar_as_atr_no_lookahead() {
    assert_no_lookahead(&BarAsAtr::new(14), &make_test_bars(200), 100);
}

fn builder() -> FeatureViewBuilder {
    FeatureViewBuilder::new(IndicatorSet::standard(14, 14, 9))
        .with_expiry(ExpiryFeatures::new(Cadence::minutes(5).unwrap()))
}

fn higher_of(base: &[Bar]) -> Vec<Vec<Bar>> {
    [3, 5, 15]
        .iter()
        .map(|m| resample(base, Cadence::minutes(*m).unwrap()))
        .collect()
}

#[test]
fn joined_rows_only_see_closed_buckets() {
    let base = make_test_bars(240);
    let frame = builder().build(&base, &higher_of(&base)).unwrap();
    assert!(!frame.is_empty());

    for row in &frame.rows {
        assert_eq!(row.sources.len(), 3);
        for src in &row.sources {
            assert!(
                src.bucket_end_ms() <= row.timestamp_ms,
                "row {} joined {} bucket ending {}",
                row.timestamp_ms,
                src.cadence,
                src.bucket_end_ms()
            );
        }
    }
}

#[test]
fn joined_rows_use_most_recent_closed_bucket() {
    let base = make_test_bars(240);
    let frame = builder().build(&base, &higher_of(&base)).unwrap();

    for row in &frame.rows {
        for src in &row.sources {
            let newest_closed = src.cadence.bucket_start(row.timestamp_ms) - src.cadence.ms();
            assert_eq!(src.bucket_start_ms, newest_closed);
        }
    }
}

#[test]
fn higher_cadence_columns_are_prefixed() {
    let base = make_test_bars(120);
    let frame = builder().build(&base, &higher_of(&base)).unwrap();
    for name in ["n_close", "3m_n_close", "5m_rsi_14", "15m_n_volume", "minutes_to_expiry"] {
        assert!(frame.column_index(name).is_some(), "missing column {name}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rows built from a prefix of history equal the same rows built from the
    /// full history.
    #[test]
    fn feature_rows_stable_under_truncation(
        steps in prop::collection::vec(-0.01..0.01_f64, 150..240),
        cut in 100usize..150,
    ) {
        let full = bars_from_steps(&steps);
        let cut = cut.min(full.len());
        let truncated = &full[..cut];

        let b = FeatureViewBuilder::new(IndicatorSet::standard(5, 5, 4))
            .with_expiry(ExpiryFeatures::new(Cadence::minutes(5).unwrap()));
        let full_frame = b.build(&full, &higher_of(&full)).unwrap();
        let trunc_frame = b.build(truncated, &higher_of(truncated)).unwrap();

        prop_assert_eq!(&full_frame.columns, &trunc_frame.columns);
        let last_ts = truncated[cut - 1].start_ms;
        let overlapping: Vec<_> = full_frame
            .rows
            .iter()
            .filter(|r| r.timestamp_ms <= last_ts)
            .cloned()
            .collect();
        prop_assert_eq!(overlapping, trunc_frame.rows);
    }
}
