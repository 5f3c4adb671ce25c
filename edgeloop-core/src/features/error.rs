use thiserror::Error;

use crate::domain::Cadence;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("base series is empty")]
    EmptyBase,

    #[error("{cadence} series is not strictly ascending at index {index}")]
    Unsorted { cadence: Cadence, index: usize },

    #[error("series mixes cadences: expected {expected}, found {found}")]
    MixedCadence { expected: Cadence, found: Cadence },

    #[error("{cadence} is not a higher cadence than the base {base}")]
    NotHigher { cadence: Cadence, base: Cadence },

    #[error("{0} appears more than once among higher cadences")]
    DuplicateCadence(Cadence),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
