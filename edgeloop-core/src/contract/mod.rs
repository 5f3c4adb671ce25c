//! Active-contract discovery and quote refresh.

pub mod tracker;

pub use tracker::{ContractTracker, TrackerUpdate};
