//! Binance spot klines over REST (`GET /api/v3/klines`).

use std::time::Duration;

use edgeloop_core::domain::{Bar, BarEvent, Cadence, Venue};
use edgeloop_core::ports::{FeedError, VenueFeed};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use super::{interval_label, now_ms, parse_num, PollCursor};
use crate::http::{build_client, CircuitBreaker, Retrying};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance caps a klines request at 1000 rows.
const MAX_LIMIT: usize = 1000;

pub struct BinanceFeed {
    client: Client,
    base_url: String,
    retrying: Retrying,
    cursor: PollCursor,
}

impl BinanceFeed {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retrying: Retrying::new(CircuitBreaker::for_polling()),
            cursor: PollCursor::default(),
        })
    }

    fn klines(&self, instrument: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
        let interval = interval_label(cadence)?;
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();
        let rows: Vec<Vec<Value>> = self
            .retrying
            .send_json("binance klines", || {
                self.client.get(&url).query(&[
                    ("symbol", instrument),
                    ("interval", interval.as_str()),
                    ("limit", limit.as_str()),
                ])
            })
            .map_err(|e| match e {
                crate::http::HttpError::Status(400) => FeedError::InstrumentNotFound {
                    instrument: instrument.to_string(),
                },
                crate::http::HttpError::CircuitOpen => FeedError::CircuitOpen {
                    venue: Venue::Binance.to_string(),
                },
                other => other.into(),
            })?;
        parse_klines(instrument, cadence, &rows)
    }
}

/// `[open_time, open, high, low, close, volume, close_time, ...]`, prices as strings.
pub fn parse_klines(instrument: &str, cadence: Cadence, rows: &[Vec<Value>]) -> Result<Vec<Bar>, FeedError> {
    rows.iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(FeedError::ResponseFormatChanged(format!(
                    "kline row has {} fields",
                    row.len()
                )));
            }
            let start_ms = row[0].as_i64().ok_or_else(|| {
                FeedError::ResponseFormatChanged(format!("kline open time: {}", row[0]))
            })?;
            Ok(Bar {
                venue: Venue::Binance,
                instrument: instrument.to_string(),
                cadence,
                start_ms,
                open: parse_num(&row[1], "open")?,
                high: parse_num(&row[2], "high")?,
                low: parse_num(&row[3], "low")?,
                close: parse_num(&row[4], "close")?,
                volume: parse_num(&row[5], "volume")?,
            })
        })
        .collect()
}

impl VenueFeed for BinanceFeed {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn fetch_history(&self, instrument: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
        let bars = self.klines(instrument, cadence, limit)?;
        debug!(instrument, cadence = %cadence, bars = bars.len(), "binance history");
        Ok(bars)
    }

    fn poll(&self, instrument: &str, cadence: Cadence) -> Result<Vec<BarEvent>, FeedError> {
        let bars = self.klines(instrument, cadence, 5)?;
        Ok(self.cursor.events(bars, now_ms()))
    }
}
