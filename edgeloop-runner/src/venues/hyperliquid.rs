//! HyperLiquid candles over REST (`POST /info`, `candleSnapshot`).

use std::time::Duration;

use edgeloop_core::domain::{Bar, BarEvent, Cadence, Venue};
use edgeloop_core::ports::{FeedError, VenueFeed};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{interval_label, now_ms, parse_num, PollCursor};
use crate::http::{build_client, CircuitBreaker, HttpError, Retrying};

pub const DEFAULT_BASE_URL: &str = "https://api.hyperliquid.xyz";

#[derive(Debug, Deserialize)]
pub struct Candle {
    /// Open time in ms.
    t: i64,
    o: Value,
    h: Value,
    l: Value,
    c: Value,
    v: Value,
}

pub struct HyperliquidFeed {
    client: Client,
    base_url: String,
    retrying: Retrying,
    cursor: PollCursor,
}

impl HyperliquidFeed {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retrying: Retrying::new(CircuitBreaker::for_polling()),
            cursor: PollCursor::default(),
        })
    }

    fn snapshot(&self, coin: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
        let end = now_ms();
        let start = end - limit.max(1) as i64 * cadence.ms();
        let body = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval_label(cadence)?,
                "startTime": start,
                "endTime": end,
            }
        });
        let url = format!("{}/info", self.base_url);
        let candles: Vec<Candle> = self
            .retrying
            .send_json("hyperliquid candleSnapshot", || self.client.post(&url).json(&body))
            .map_err(|e| match e {
                HttpError::CircuitOpen => FeedError::CircuitOpen {
                    venue: Venue::HyperLiquid.to_string(),
                },
                other => other.into(),
            })?;
        parse_candles(coin, cadence, &candles)
    }
}

pub fn parse_candles(coin: &str, cadence: Cadence, candles: &[Candle]) -> Result<Vec<Bar>, FeedError> {
    let mut bars = candles
        .iter()
        .map(|k| {
            Ok(Bar {
                venue: Venue::HyperLiquid,
                instrument: coin.to_string(),
                cadence,
                start_ms: k.t,
                open: parse_num(&k.o, "o")?,
                high: parse_num(&k.h, "h")?,
                low: parse_num(&k.l, "l")?,
                close: parse_num(&k.c, "c")?,
                volume: parse_num(&k.v, "v")?,
            })
        })
        .collect::<Result<Vec<_>, FeedError>>()?;
    bars.sort_by_key(|b| b.start_ms);
    bars.dedup_by_key(|b| b.start_ms);
    Ok(bars)
}

impl VenueFeed for HyperliquidFeed {
    fn venue(&self) -> Venue {
        Venue::HyperLiquid
    }

    fn fetch_history(&self, instrument: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
        let mut bars = self.snapshot(instrument, cadence, limit)?;
        if bars.len() > limit {
            bars.drain(..bars.len() - limit);
        }
        debug!(instrument, cadence = %cadence, bars = bars.len(), "hyperliquid history");
        Ok(bars)
    }

    fn poll(&self, instrument: &str, cadence: Cadence) -> Result<Vec<BarEvent>, FeedError> {
        let bars = self.snapshot(instrument, cadence, 5)?;
        Ok(self.cursor.events(bars, now_ms()))
    }
}
