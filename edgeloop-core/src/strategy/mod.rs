//! Entry/exit decisions for positions on the active contract.

pub mod engine;
pub mod params;

pub use engine::{decide, Decision, SkipReason, StrategyEngine, StrategyError};
pub use params::StrategyParams;
