//! Parquet export of a feature frame, for offline model training.
//!
//! Writes are atomic (`.tmp` then rename) and accompanied by a
//! `<name>.meta.json` sidecar holding a blake3 hash of the written file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::builder::FeatureFrame;
use super::error::FeatureError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMeta {
    pub rows: usize,
    pub columns: Vec<String>,
    pub first_ms: Option<i64>,
    pub last_ms: Option<i64>,
    pub data_hash: String,
    pub exported_at: DateTime<Utc>,
}

pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

/// Write `frame` to `path` as parquet: `timestamp_ms` then one f64 column per feature.
pub fn export_parquet(frame: &FeatureFrame, path: &Path) -> Result<FeatureMeta, FeatureError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut df = frame_to_dataframe(frame)?;
    let tmp_path = path.with_extension("parquet.tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| FeatureError::Parquet(format!("write parquet: {e}")))?;
    }
    let bytes = fs::read(&tmp_path)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    let meta = FeatureMeta {
        rows: frame.len(),
        columns: frame.columns.clone(),
        first_ms: frame.rows.first().map(|r| r.timestamp_ms),
        last_ms: frame.rows.last().map(|r| r.timestamp_ms),
        data_hash: blake3::hash(&bytes).to_hex().to_string(),
        exported_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&meta)
        .map_err(|e| FeatureError::Parquet(format!("meta serialization: {e}")))?;
    fs::write(meta_path(path), json)?;
    Ok(meta)
}

/// Read back a sidecar written by [`export_parquet`].
pub fn read_meta(path: &Path) -> Result<FeatureMeta, FeatureError> {
    let raw = fs::read_to_string(meta_path(path))?;
    serde_json::from_str(&raw).map_err(|e| FeatureError::Parquet(format!("meta parse: {e}")))
}

fn frame_to_dataframe(frame: &FeatureFrame) -> Result<DataFrame, FeatureError> {
    let mut columns = Vec::with_capacity(frame.columns.len() + 1);
    let ts: Vec<i64> = frame.rows.iter().map(|r| r.timestamp_ms).collect();
    columns.push(Column::new("timestamp_ms".into(), ts));
    for (idx, name) in frame.columns.iter().enumerate() {
        let values: Vec<f64> = frame.rows.iter().map(|r| r.values[idx]).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    DataFrame::new(columns).map_err(|e| FeatureError::Parquet(format!("dataframe creation: {e}")))
}
