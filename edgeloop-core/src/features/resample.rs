//! Derive a higher cadence from base bars when storage has none.

use std::collections::BTreeMap;

use crate::domain::{Bar, Cadence};

/// Left-labelled, left-closed resample of `base` into `target`.
///
/// Only complete buckets (every base slot present) are returned, so a bucket
/// missing data at the start of history never stands in for a closed bar.
pub fn resample(base: &[Bar], target: Cadence) -> Vec<Bar> {
    let Some(first) = base.first() else {
        return Vec::new();
    };
    let base_cadence = first.cadence;
    if !target.is_multiple_of(base_cadence) || target <= base_cadence {
        return Vec::new();
    }
    let slots = (target.as_minutes() / base_cadence.as_minutes()) as usize;

    let mut buckets: BTreeMap<i64, (Bar, usize)> = BTreeMap::new();
    for bar in base {
        let start = target.bucket_start(bar.start_ms);
        buckets
            .entry(start)
            .and_modify(|(agg, n)| {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                *n += 1;
            })
            .or_insert_with(|| {
                (
                    Bar {
                        cadence: target,
                        start_ms: start,
                        ..bar.clone()
                    },
                    1,
                )
            });
    }

    buckets
        .into_values()
        .filter(|(_, n)| *n == slots)
        .map(|(bar, _)| bar)
        .collect()
}
