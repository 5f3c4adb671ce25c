//! EdgeLoop Core: bar aggregation, feature views, and the simulated trading loop.
//!
//! This crate contains everything that does not touch the network:
//! - Domain types (bars, cadences, contracts, predictions, trades)
//! - Incremental multi-cadence bar aggregation with a durable sink
//! - SQLite bar store and trade ledger
//! - Leakage-free multi-cadence feature views and parquet export
//! - Strategy state machine, settlement auditor, contract tracker
//! - Collaborator traits for venues, the model, and the settlement market

pub mod aggregate;
pub mod clock;
pub mod contract;
pub mod domain;
pub mod features;
pub mod ports;
pub mod settlement;
pub mod state;
pub mod store;
pub mod strategy;
