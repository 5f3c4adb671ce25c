//! Polymarket client: Gamma for contract metadata and resolution, CLOB for
//! live prices.
//!
//! Short-window contracts are addressed by slug `{prefix}-{window_start}`,
//! where `window_start` is a Unix epoch aligned to the window length.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use edgeloop_core::clock::Clock;
use edgeloop_core::domain::{MarketContract, Side};
use edgeloop_core::ports::{MarketError, SettlementMarket};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MarketConfig;
use crate::http::{build_client, CircuitBreaker, HttpError, Retrying};

/// A resolved outcome trades at (or within rounding of) 1.
const WINNER_PRICE: f64 = 0.99;

/// Gamma returns several list fields as JSON-encoded strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Listish {
    Encoded(String),
    List(Vec<Value>),
    #[default]
    Missing,
}

impl Listish {
    fn values(&self) -> Vec<Value> {
        match self {
            Listish::Encoded(s) => serde_json::from_str(s).unwrap_or_default(),
            Listish::List(v) => v.clone(),
            Listish::Missing => Vec::new(),
        }
    }

    fn strings(&self) -> Vec<String> {
        self.values()
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()
    }

    fn numbers(&self) -> Vec<Option<f64>> {
        self.values().iter().map(value_f64).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GammaToken {
    #[serde(default)]
    outcome: String,
    #[serde(default)]
    winner: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    id: Value,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    outcomes: Listish,
    #[serde(default)]
    outcome_prices: Listish,
    #[serde(default)]
    clob_token_ids: Listish,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    tokens: Vec<GammaToken>,
}

impl GammaMarket {
    fn id(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn into_contract(self, fallback_end: Option<DateTime<Utc>>) -> Result<MarketContract, MarketError> {
        let id = self.id();
        let outcomes = pair(self.outcomes.strings(), "outcomes")?;
        let token_ids = pair(self.clob_token_ids.strings(), "clobTokenIds")?;
        let prices = self.outcome_prices.numbers();
        let outcome_prices = [
            prices.first().copied().flatten().unwrap_or(0.5),
            prices.get(1).copied().flatten().unwrap_or(0.5),
        ];

        let end_time = self
            .end_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .or(fallback_end)
            .ok_or_else(|| MarketError::ResponseFormatChanged(format!("market {id}: no endDate")))?;

        // Index 0 must be the Up/Yes side.
        let (outcomes, token_ids, outcome_prices) = match Side::from_outcome_label(&outcomes[0]) {
            Some(Side::Down) => (
                [outcomes[1].clone(), outcomes[0].clone()],
                [token_ids[1].clone(), token_ids[0].clone()],
                [outcome_prices[1], outcome_prices[0]],
            ),
            _ => (outcomes, token_ids, outcome_prices),
        };

        Ok(MarketContract {
            id,
            slug: self.slug,
            question: self.question,
            end_time,
            outcomes,
            token_ids,
            outcome_prices,
            closed: self.closed,
            resolved: false,
            quoted_at: None,
        })
    }

    /// Winning outcome label once the market has closed.
    fn winner(&self) -> Option<String> {
        if !self.closed {
            return None;
        }
        if let Some(t) = self.tokens.iter().find(|t| t.winner) {
            return Some(t.outcome.clone());
        }
        let outcomes = self.outcomes.strings();
        let prices = self.outcome_prices.numbers();
        if outcomes.len() != prices.len() {
            return None;
        }
        outcomes
            .into_iter()
            .zip(prices)
            .find(|(_, p)| p.is_some_and(|p| p >= WINNER_PRICE))
            .map(|(o, _)| o)
    }
}

#[derive(Debug, Deserialize)]
struct ClobPrice {
    price: Value,
}

fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn pair(v: Vec<String>, field: &str) -> Result<[String; 2], MarketError> {
    <[String; 2]>::try_from(v).map_err(|v| {
        MarketError::ResponseFormatChanged(format!("{field}: expected 2 entries, got {}", v.len()))
    })
}

pub struct PolymarketClient {
    client: Client,
    config: MarketConfig,
    clock: Arc<dyn Clock>,
    gamma: Retrying,
    clob: Retrying,
}

impl PolymarketClient {
    pub fn new(config: MarketConfig, clock: Arc<dyn Clock>) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            config,
            clock,
            gamma: Retrying::new(CircuitBreaker::for_polling()),
            clob: Retrying::new(CircuitBreaker::for_polling()),
        })
    }

    /// Slugs to probe, current window first.
    pub fn candidate_slugs(&self, now: DateTime<Utc>) -> Vec<(String, i64)> {
        let window = self.config.window_secs;
        let current = now.timestamp().div_euclid(window) * window;
        (0..=i64::from(self.config.lookahead_windows))
            .map(|k| {
                let epoch = current + k * window;
                (format!("{}-{epoch}", self.config.slug_prefix), epoch)
            })
            .collect()
    }

    fn market_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>, MarketError> {
        let url = format!("{}/markets", self.config.gamma_url);
        let found: Vec<GammaMarket> = match self
            .gamma
            .send_json("gamma markets", || self.client.get(&url).query(&[("slug", slug)]))
        {
            Ok(v) => v,
            Err(HttpError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(found.into_iter().next())
    }

    fn market_by_id(&self, id: &str) -> Result<Option<GammaMarket>, MarketError> {
        let url = format!("{}/markets/{id}", self.config.gamma_url);
        match self.gamma.send_json("gamma market", || self.client.get(&url)) {
            Ok(m) => Ok(Some(m)),
            Err(HttpError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn token_price(&self, token_id: &str) -> Result<f64, MarketError> {
        let url = format!("{}/price", self.config.clob_url);
        let body: ClobPrice = self.clob.send_json("clob price", || {
            self.client
                .get(&url)
                .query(&[("token_id", token_id), ("side", "buy")])
        })?;
        value_f64(&body.price)
            .ok_or_else(|| MarketError::ResponseFormatChanged(format!("clob price: {}", body.price)))
    }
}

impl SettlementMarket for PolymarketClient {
    fn find_active_contract(&self) -> Result<Option<MarketContract>, MarketError> {
        let window = chrono::Duration::seconds(self.config.window_secs);
        for (slug, epoch) in self.candidate_slugs(self.clock.now()) {
            let Some(market) = self.market_by_slug(&slug)? else {
                debug!(slug = %slug, "no market for slug");
                continue;
            };
            if market.closed {
                continue;
            }
            let fallback_end = DateTime::from_timestamp(epoch, 0).map(|t| t + window);
            return market.into_contract(fallback_end).map(Some);
        }
        Ok(None)
    }

    /// Buy-side CLOB price per outcome. A side with no book keeps its last
    /// known price; fails only if neither side could be priced.
    fn get_live_quote(&self, contract: &MarketContract) -> Result<[f64; 2], MarketError> {
        let mut prices = contract.outcome_prices;
        let mut last_err = None;
        let mut priced = 0;
        for (i, token) in contract.token_ids.iter().enumerate() {
            match self.token_price(token) {
                Ok(p) => {
                    prices[i] = p;
                    priced += 1;
                }
                Err(e) => {
                    warn!(contract = %contract.id, token = %token, error = %e, "no live price");
                    last_err = Some(e);
                }
            }
        }
        match (priced, last_err) {
            (0, Some(e)) => Err(e),
            _ => Ok(prices),
        }
    }

    fn get_resolution(&self, contract_id: &str) -> Result<Option<String>, MarketError> {
        // Older ledgers keyed trades by slug; Gamma resolves by numeric id.
        let id = if contract_id.chars().all(|c| c.is_ascii_digit()) {
            contract_id.to_string()
        } else {
            match self.market_by_slug(contract_id)? {
                Some(m) => m.id(),
                None => {
                    return Err(MarketError::ContractNotFound {
                        id: contract_id.to_string(),
                    })
                }
            }
        };
        Ok(self.market_by_id(&id)?.and_then(|m| m.winner()))
    }
}
