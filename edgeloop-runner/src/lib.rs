//! EdgeLoop Runner: the long-running service around `edgeloop-core`.
//!
//! This crate provides:
//! - TOML service configuration with validation
//! - Venue feeds (Binance, HyperLiquid, synthetic) with retry and circuit breaking
//! - Polymarket contract discovery, quotes and resolutions
//! - HTTP client for the external predictive model
//! - History ingestion and trade-ledger export
//! - Named polling loops with a shared shutdown signal

pub mod config;
pub mod dataset;
pub mod export;
pub mod http;
pub mod ingest;
pub mod model;
pub mod polymarket;
pub mod service;
pub mod shutdown;
pub mod venues;

pub use config::{ConfigError, ServiceConfig};
pub use dataset::{DatasetError, FeatureDataset};
pub use export::{export_trades_csv, save_report, save_trades};
pub use ingest::{ingest_history, IngestError, IngestOptions, IngestSummary};
pub use model::HttpModel;
pub use polymarket::PolymarketClient;
pub use service::{Collaborators, Service, ServiceError, ServiceHandle};
pub use shutdown::{Shutdown, ShutdownListener};
