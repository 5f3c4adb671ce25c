//! Service configuration loaded from a single TOML file.
//!
//! Every section carries `#[serde(default)]`, so a partial file (or an empty
//! one) yields a runnable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edgeloop_core::domain::{Cadence, Venue};
use edgeloop_core::strategy::StrategyParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub aggregation: AggregationConfig,
    pub features: FeaturesConfig,
    pub model: ModelConfig,
    pub market: MarketConfig,
    pub strategy: StrategyParams,
    pub schedule: ScheduleConfig,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bar_db: PathBuf,
    pub trade_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bar_db: PathBuf::from("data/bars.db"),
            trade_db: PathBuf::from("data/trades.db"),
        }
    }
}

/// One venue stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    pub venue: Venue,
    pub instrument: String,
    /// Overrides the venue's public REST endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub venues: Vec<VenueConfig>,
    /// Base cadence in minutes.
    pub base_cadence: Cadence,
    /// Bars fetched per cadence on ingest.
    pub history_limit: usize,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// Seed for the synthetic venue.
    pub synthetic_seed: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            venues: vec![VenueConfig {
                venue: Venue::Binance,
                instrument: "BTCUSDT".to_string(),
                base_url: None,
            }],
            base_cadence: Cadence::ONE_MINUTE,
            history_limit: 1000,
            poll_interval_ms: 2_000,
            timeout_secs: 10,
            synthetic_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Derived cadences in minutes; each must be a multiple of the base.
    pub cadences: Vec<Cadence>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            cadences: [3, 5, 15]
                .iter()
                .filter_map(|m| Cadence::minutes(*m).ok())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Higher cadences joined onto the base timeline.
    pub cadences: Vec<Cadence>,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub ema_period: usize,
    /// Settlement block for the expiry features, in minutes.
    pub expiry_block: Cadence,
    /// Drop joined buckets that ended more than this long before the row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_tolerance_ms: Option<i64>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            cadences: AggregationConfig::default().cadences,
            rsi_period: 14,
            atr_period: 14,
            ema_period: 9,
            expiry_block: Cadence::minutes(5).unwrap_or(Cadence::ONE_MINUTE),
            join_tolerance_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Endpoint that accepts a feature row and returns `{"prob_up": p}`.
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Base bars loaded per prediction.
    pub history_limit: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/predict".to_string(),
            timeout_secs: 5,
            history_limit: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub gamma_url: String,
    pub clob_url: String,
    /// Contract slugs are `{slug_prefix}-{window_start_epoch}`.
    pub slug_prefix: String,
    pub window_secs: i64,
    /// Extra windows probed after the current one.
    pub lookahead_windows: u32,
    pub timeout_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            slug_prefix: "btc-updown-5m".to_string(),
            window_secs: 300,
            lookahead_windows: 2,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub strategy_ms: u64,
    pub quote_ms: u64,
    pub discovery_ms: u64,
    pub audit_ms: u64,
    pub prediction_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            strategy_ms: 500,
            quote_ms: 1_000,
            discovery_ms: 5_000,
            audit_ms: 60_000,
            prediction_ms: 10_000,
        }
    }
}

impl ScheduleConfig {
    pub fn strategy(&self) -> Duration {
        Duration::from_millis(self.strategy_ms)
    }

    pub fn quote(&self) -> Duration {
        Duration::from_millis(self.quote_ms)
    }

    pub fn discovery(&self) -> Duration {
        Duration::from_millis(self.discovery_ms)
    }

    pub fn audit(&self) -> Duration {
        Duration::from_millis(self.audit_ms)
    }

    pub fn prediction(&self) -> Duration {
        Duration::from_millis(self.prediction_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub expiry_buffer_secs: u64,
    /// Close still-unresolved trades as EXPIRED after this many hours.
    /// Unset keeps retrying forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_resolution_age_hours: Option<u64>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            expiry_buffer_secs: 60,
            max_resolution_age_hours: None,
        }
    }
}

impl SettlementConfig {
    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.expiry_buffer_secs)
    }

    pub fn max_resolution_age(&self) -> Option<Duration> {
        self.max_resolution_age_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600)))
    }
}

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.feed.venues.is_empty() {
            return Err(ConfigError::Invalid("feed.venues is empty".into()));
        }
        let base = self.feed.base_cadence;
        if self.aggregation.cadences.is_empty() {
            return Err(ConfigError::Invalid("aggregation.cadences is empty".into()));
        }
        for c in self.aggregation.cadences.iter().chain(&self.features.cadences) {
            if *c <= base || !c.is_multiple_of(base) {
                return Err(ConfigError::Invalid(format!(
                    "cadence {c} is not a higher multiple of base cadence {base}"
                )));
            }
        }
        if self.features.rsi_period == 0
            || self.features.atr_period == 0
            || self.features.ema_period == 0
        {
            return Err(ConfigError::Invalid("indicator periods must be >= 1".into()));
        }
        if self.market.window_secs <= 0 {
            return Err(ConfigError::Invalid("market.window_secs must be positive".into()));
        }

        let s = &self.schedule;
        let intervals = [
            ("strategy_ms", s.strategy_ms),
            ("quote_ms", s.quote_ms),
            ("discovery_ms", s.discovery_ms),
            ("audit_ms", s.audit_ms),
            ("prediction_ms", s.prediction_ms),
            ("feed.poll_interval_ms", self.feed.poll_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let cfg = ServiceConfig::from_toml("").unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.aggregation.cadences.len(), 3);
        assert_eq!(cfg.schedule.strategy(), Duration::from_millis(500));
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg = ServiceConfig::from_toml(
            r#"
            [feed]
            venues = [{ venue = "hyperliquid", instrument = "BTC" }]

            [strategy]
            entry_threshold = 0.7

            [settlement]
            max_resolution_age_hours = 24
            "#,
        )
        .unwrap();
        assert_eq!(cfg.feed.venues[0].venue, Venue::HyperLiquid);
        assert_eq!(cfg.feed.history_limit, 1000);
        assert_eq!(cfg.strategy.entry_threshold, 0.7);
        assert_eq!(cfg.strategy.unwind_threshold, 0.60);
        assert_eq!(
            cfg.settlement.max_resolution_age(),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn rejects_unwind_above_entry() {
        let err = ServiceConfig::from_toml(
            "[strategy]\nentry_threshold = 0.65\nunwind_threshold = 0.7\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_cadences_and_zero_intervals() {
        assert!(ServiceConfig::from_toml("[aggregation]\ncadences = []\n").is_err());
        assert!(ServiceConfig::from_toml("[aggregation]\ncadences = [1]\n").is_err());
        assert!(ServiceConfig::from_toml("[feed]\nbase_cadence = 2\n[aggregation]\ncadences = [5]\n[features]\ncadences = []\n").is_err());
        assert!(ServiceConfig::from_toml("[schedule]\naudit_ms = 0\n").is_err());
        assert!(ServiceConfig::from_toml("[aggregation]\ncadences = [0]\n").is_err());
    }

    #[test]
    fn toml_round_trip() {
        let cfg = ServiceConfig::default();
        let text = cfg.to_toml().unwrap();
        assert_eq!(ServiceConfig::from_toml(&text).unwrap(), cfg);
    }
}
