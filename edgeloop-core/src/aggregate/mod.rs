//! Incremental roll-up of base-cadence bars into derived cadences.

pub mod aggregator;

pub use aggregator::{AggregateError, BarAggregator, BarSink};
