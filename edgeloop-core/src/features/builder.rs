//! FeatureViewBuilder: one feature row per base-cadence bar.
//!
//! A higher-cadence bar covering `[t, t + c)` is only knowable at `t + c`, so
//! each higher series is keyed by its bar *end* before the backward as-of join
//! against base bar starts. A base row at `t'` therefore only ever sees
//! higher-cadence buckets whose interval ended at or before `t'`.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::asof::asof_backward;
use super::error::FeatureError;
use super::expiry::ExpiryFeatures;
use super::indicator::IndicatorSet;
use super::normalize::{normalize_column, ohlcv_columns};
use crate::domain::{Bar, Cadence};

/// Which higher-cadence bucket fed a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub cadence: Cadence,
    pub bucket_start_ms: i64,
}

impl SourceRef {
    pub fn bucket_end_ms(&self) -> i64 {
        self.bucket_start_ms + self.cadence.ms()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    /// Start of the base bar this row describes.
    pub timestamp_ms: i64,
    pub values: Vec<f64>,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r.values[col])
    }

    /// Column name → value for one row.
    pub fn record(&self, row: &FeatureRow) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .cloned()
            .zip(row.values.iter().copied())
            .collect()
    }
}

type Table = Vec<(String, Vec<f64>)>;

pub struct FeatureViewBuilder {
    indicators: IndicatorSet,
    expiry: Option<ExpiryFeatures>,
    tolerance_ms: Option<i64>,
}

impl FeatureViewBuilder {
    pub fn new(indicators: IndicatorSet) -> Self {
        Self {
            indicators,
            expiry: None,
            tolerance_ms: None,
        }
    }

    pub fn with_expiry(mut self, expiry: ExpiryFeatures) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Reject joined buckets that ended more than `ms` before the row.
    pub fn with_tolerance(mut self, ms: i64) -> Self {
        self.tolerance_ms = Some(ms);
        self
    }

    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    /// Build the joined view. `higher` holds one ascending series per cadence.
    pub fn build(&self, base: &[Bar], higher: &[Vec<Bar>]) -> Result<FeatureFrame, FeatureError> {
        let base_cadence = series_cadence(base)?.ok_or(FeatureError::EmptyBase)?;
        let mut seen: Vec<Cadence> = Vec::with_capacity(higher.len());
        for series in higher {
            if let Some(c) = series_cadence(series)? {
                if c <= base_cadence {
                    return Err(FeatureError::NotHigher {
                        cadence: c,
                        base: base_cadence,
                    });
                }
                if seen.contains(&c) {
                    return Err(FeatureError::DuplicateCadence(c));
                }
                seen.push(c);
            }
        }

        let all: Vec<&[Bar]> = std::iter::once(base)
            .chain(higher.iter().map(|s| s.as_slice()))
            .collect();
        let tables: Vec<Table> = all
            .par_iter()
            .enumerate()
            .map(|(k, bars)| self.cadence_table(bars, k == 0))
            .collect();

        let mut columns: Vec<String> = tables[0].iter().map(|(n, _)| n.clone()).collect();
        for (series, table) in higher.iter().zip(&tables[1..]) {
            let prefix = series.first().map(|b| b.cadence.label()).unwrap_or_default();
            columns.extend(table.iter().map(|(n, _)| format!("{prefix}_{n}")));
        }

        let left: Vec<i64> = base.iter().map(|b| b.start_ms).collect();
        let matches: Vec<Vec<Option<usize>>> = higher
            .iter()
            .map(|series| {
                let right: Vec<i64> = series.iter().map(Bar::end_ms).collect();
                asof_backward(&left, &right, self.tolerance_ms)
            })
            .collect();

        let mut rows = Vec::with_capacity(base.len());
        let mut dropped = 0usize;
        'rows: for i in 0..base.len() {
            let mut values = Vec::with_capacity(columns.len());
            let mut sources = Vec::with_capacity(higher.len());
            values.extend(tables[0].iter().map(|(_, v)| v[i]));

            for (k, series) in higher.iter().enumerate() {
                let Some(j) = matches[k][i] else {
                    dropped += 1;
                    continue 'rows;
                };
                values.extend(tables[k + 1].iter().map(|(_, v)| v[j]));
                sources.push(SourceRef {
                    cadence: series[j].cadence,
                    bucket_start_ms: series[j].start_ms,
                });
            }

            if values.iter().any(|v| !v.is_finite()) {
                dropped += 1;
                continue;
            }
            rows.push(FeatureRow {
                timestamp_ms: base[i].start_ms,
                values,
                sources,
            });
        }

        debug!(
            base = base.len(),
            higher = higher.len(),
            rows = rows.len(),
            dropped,
            "feature view built"
        );
        Ok(FeatureFrame { columns, rows })
    }

    /// Normalized OHLCV and indicator columns for one cadence series.
    fn cadence_table(&self, bars: &[Bar], is_base: bool) -> Table {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut table = ohlcv_columns(bars);
        table.extend(
            self.indicators
                .apply_all(bars)
                .into_iter()
                .map(|col| normalize_column(col, &closes)),
        );
        if is_base {
            if let Some(expiry) = &self.expiry {
                table.extend(expiry.columns(bars));
            }
        }
        table
    }
}

/// Cadence of a strictly ascending, single-cadence series (`None` if empty).
fn series_cadence(bars: &[Bar]) -> Result<Option<Cadence>, FeatureError> {
    let Some(first) = bars.first() else {
        return Ok(None);
    };
    let cadence = first.cadence;
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].cadence != cadence {
            return Err(FeatureError::MixedCadence {
                expected: cadence,
                found: pair[1].cadence,
            });
        }
        if pair[1].start_ms <= pair[0].start_ms {
            return Err(FeatureError::Unsorted {
                cadence,
                index: i + 1,
            });
        }
    }
    Ok(Some(cadence))
}
