//! Concrete venue feeds.
//!
//! REST venues are polled: each poll fetches the last few bars and a
//! [`PollCursor`] turns them into bar events, emitting each closed bar once
//! and the still-forming bar as an open event.

pub mod binance;
pub mod hyperliquid;
pub mod synthetic;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use edgeloop_core::domain::{Bar, BarEvent, Cadence, Venue};
use edgeloop_core::ports::{FeedError, VenueFeed};
use parking_lot::Mutex;

pub use binance::BinanceFeed;
pub use hyperliquid::HyperliquidFeed;
pub use synthetic::SyntheticFeed;

use crate::config::VenueConfig;

/// Exchange interval string for a cadence (`1m`, `15m`, `1h`, `4h`).
pub fn interval_label(cadence: Cadence) -> Result<String, FeedError> {
    let m = cadence.as_minutes();
    let label = match m {
        1 | 3 | 5 | 15 | 30 => format!("{m}m"),
        60 | 120 | 240 | 480 | 720 => format!("{}h", m / 60),
        1440 => "1d".to_string(),
        _ => {
            return Err(FeedError::Other(format!(
                "cadence {cadence} has no exchange interval"
            )))
        }
    };
    Ok(label)
}

/// Remembers the newest closed bar emitted per series.
#[derive(Debug, Default)]
pub struct PollCursor {
    last_closed: Mutex<HashMap<(String, Cadence), i64>>,
}

impl PollCursor {
    /// Events for `bars` (ascending) as of `now_ms`. Closed bars already
    /// emitted are skipped. On the first poll only the newest closed bar is
    /// emitted; history is the ingest path's job.
    pub fn events(&self, bars: Vec<Bar>, now_ms: i64) -> Vec<BarEvent> {
        let Some(first) = bars.first() else {
            return Vec::new();
        };
        let key = (first.instrument.clone(), first.cadence);
        let mut cursor = self.last_closed.lock();
        let newest_closed = bars
            .iter()
            .filter(|b| b.end_ms() <= now_ms)
            .map(|b| b.start_ms)
            .max();
        let after = match cursor.get(&key) {
            Some(ms) => *ms,
            None => newest_closed.map_or(i64::MIN, |ms| ms - 1),
        };

        let mut out = Vec::new();
        for bar in bars {
            let closed = bar.end_ms() <= now_ms;
            if closed && bar.start_ms <= after {
                continue;
            }
            out.push(BarEvent { bar, closed });
        }
        if let Some(ms) = newest_closed {
            let entry = cursor.entry(key).or_insert(ms);
            *entry = (*entry).max(ms);
        }
        out
    }
}

/// Build the feed for one configured venue.
pub fn build_feed(
    venue: &VenueConfig,
    timeout: Duration,
    synthetic_seed: u64,
) -> Result<Arc<dyn VenueFeed>, FeedError> {
    let feed: Arc<dyn VenueFeed> = match venue.venue {
        Venue::Binance => Arc::new(BinanceFeed::new(venue.base_url.clone(), timeout)?),
        Venue::HyperLiquid => Arc::new(HyperliquidFeed::new(venue.base_url.clone(), timeout)?),
        Venue::Synthetic => Arc::new(SyntheticFeed::new(synthetic_seed)),
    };
    Ok(feed)
}

pub(crate) fn parse_num(v: &serde_json::Value, field: &str) -> Result<f64, FeedError> {
    let n = match v {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    };
    n.ok_or_else(|| FeedError::ResponseFormatChanged(format!("{field}: expected number, got {v}")))
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOON: i64 = 1_700_049_600_000;

    fn bar(minute: i64) -> Bar {
        Bar {
            venue: Venue::Binance,
            instrument: "BTCUSDT".into(),
            cadence: Cadence::ONE_MINUTE,
            start_ms: NOON + minute * 60_000,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    #[test]
    fn labels() {
        assert_eq!(interval_label(Cadence::ONE_MINUTE).unwrap(), "1m");
        assert_eq!(interval_label(Cadence::minutes(15).unwrap()).unwrap(), "15m");
        assert_eq!(interval_label(Cadence::minutes(60).unwrap()).unwrap(), "1h");
        assert!(interval_label(Cadence::minutes(7).unwrap()).is_err());
    }

    #[test]
    fn emits_each_closed_bar_once() {
        let cursor = PollCursor::default();
        // 12:02:30: bars 12:00 and 12:01 closed, 12:02 forming.
        let now = NOON + 150_000;
        let ev = cursor.events(vec![bar(0), bar(1), bar(2)], now);
        assert_eq!(ev.len(), 2);
        assert!(ev[0].closed && ev[0].bar.start_ms == NOON + 60_000);
        assert!(!ev[1].closed);

        // Same window again: only the open bar.
        let ev = cursor.events(vec![bar(0), bar(1), bar(2)], now + 10_000);
        assert_eq!(ev.len(), 1);
        assert!(!ev[0].closed);

        // 12:03:05: 12:02 has closed.
        let ev = cursor.events(vec![bar(1), bar(2), bar(3)], NOON + 185_000);
        let closed: Vec<_> = ev.iter().filter(|e| e.closed).map(|e| e.bar.start_ms).collect();
        assert_eq!(closed, vec![NOON + 120_000]);
    }

    #[test]
    fn catches_up_after_missed_polls() {
        let cursor = PollCursor::default();
        cursor.events(vec![bar(0), bar(1)], NOON + 90_000);
        let ev = cursor.events(vec![bar(1), bar(2), bar(3), bar(4)], NOON + 270_000);
        let closed = ev.iter().filter(|e| e.closed).count();
        assert_eq!(closed, 3);
    }
}
