//! Collaborator traits and their structured error types.
//!
//! The core never talks to the network. Venue feeds, the predictive model and
//! the settlement market are consumed through these traits so the runner can
//! supply HTTP clients and tests can supply fakes.

use thiserror::Error;

use crate::domain::{Bar, BarEvent, Cadence, MarketContract, Prediction, Venue};

/// Failures from a venue feed (history fetch or bar polling).
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by venue (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("instrument not found: {instrument}")]
    InstrumentNotFound { instrument: String },

    #[error("circuit breaker open for {venue}")]
    CircuitOpen { venue: String },

    #[error("feed error: {0}")]
    Other(String),
}

/// Failures from the predictive model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model unreachable: {0}")]
    Unreachable(String),

    #[error("not enough history to build a feature row ({rows} rows after warm-up)")]
    InsufficientHistory { rows: usize },

    #[error("model returned an invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("model response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("feature build failed: {0}")]
    Features(String),
}

/// Failures from the settlement-market API.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market API unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by market API (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("contract not found: {id}")]
    ContractNotFound { id: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("market error: {0}")]
    Other(String),
}

/// A source of bars for one venue.
pub trait VenueFeed: Send + Sync {
    fn venue(&self) -> Venue;

    /// Most recent `limit` bars of `cadence`, oldest first.
    fn fetch_history(
        &self,
        instrument: &str,
        cadence: Cadence,
        limit: usize,
    ) -> Result<Vec<Bar>, FeedError>;

    /// Bars observed since the previous poll, each tagged with whether it has
    /// closed. Stands in for a streaming `onBar` callback.
    fn poll(&self, instrument: &str, cadence: Cadence) -> Result<Vec<BarEvent>, FeedError>;
}

/// The external predictive model.
pub trait Predictor: Send + Sync {
    fn predict_latest(&self) -> Result<Prediction, ModelError>;
}

/// The settlement-market API.
pub trait SettlementMarket: Send + Sync {
    /// The contract currently accepting positions, if any.
    fn find_active_contract(&self) -> Result<Option<MarketContract>, MarketError>;

    /// Live prices for both outcomes, index 0 = Up/Yes.
    fn get_live_quote(&self, contract: &MarketContract) -> Result<[f64; 2], MarketError>;

    /// The winning outcome label, or `None` while unresolved.
    fn get_resolution(&self, contract_id: &str) -> Result<Option<String>, MarketError>;
}
