//! Domain types for edgeloop

pub mod bar;
pub mod contract;
pub mod prediction;
pub mod trade;

pub use bar::{Bar, BarError, BarEvent, Cadence, Venue};
pub use contract::MarketContract;
pub use prediction::Prediction;
pub use trade::{CloseReason, NewTrade, Side, Trade, TradeClose, TradeStatus};
