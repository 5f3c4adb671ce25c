//! Seeded random-walk venue for offline runs and tests.

use std::collections::HashMap;

use edgeloop_core::domain::{Bar, BarEvent, Cadence, Venue};
use edgeloop_core::ports::{FeedError, VenueFeed};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{now_ms, PollCursor};

const START_PRICE: f64 = 40_000.0;

/// Generates base-cadence bars only; higher cadences are derived from them the
/// same way a live venue stream is rolled up. The walk for a given seed is
/// identical across runs.
pub struct SyntheticFeed {
    seed: u64,
    /// Last generated close per series, keyed by its bar start.
    series: Mutex<HashMap<(String, Cadence), (i64, f64, StdRng)>>,
    cursor: PollCursor,
}

impl SyntheticFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            series: Mutex::new(HashMap::new()),
            cursor: PollCursor::default(),
        }
    }

    /// Bars for every slot in `[from_ms, to_ms)` after the last one generated.
    fn generate(&self, instrument: &str, cadence: Cadence, from_ms: i64, to_ms: i64) -> Vec<Bar> {
        let mut series = self.series.lock();
        let (last_ms, price, rng) = series
            .entry((instrument.to_string(), cadence))
            .or_insert_with(|| {
                (
                    i64::MIN,
                    START_PRICE,
                    StdRng::seed_from_u64(self.seed ^ u64::from(cadence.as_minutes())),
                )
            });

        let step = cadence.ms();
        let mut start = cadence.bucket_start(from_ms).max(last_ms.saturating_add(step));
        let mut bars = Vec::new();
        while start < to_ms {
            let open = *price;
            let drift: f64 = rng.gen_range(-0.002..0.002);
            let close = (open * (1.0 + drift)).max(1.0);
            let wick_up: f64 = rng.gen_range(0.0..0.0008);
            let wick_down: f64 = rng.gen_range(0.0..0.0008);
            bars.push(Bar {
                venue: Venue::Synthetic,
                instrument: instrument.to_string(),
                cadence,
                start_ms: start,
                open,
                high: open.max(close) * (1.0 + wick_up),
                low: open.min(close) * (1.0 - wick_down),
                close,
                volume: rng.gen_range(0.5..25.0),
            });
            *price = close;
            *last_ms = start;
            start += step;
        }
        bars
    }
}

fn base_only(cadence: Cadence) -> Result<(), FeedError> {
    if cadence == Cadence::ONE_MINUTE {
        Ok(())
    } else {
        Err(FeedError::Other(format!(
            "synthetic venue only generates 1m bars, not {cadence}"
        )))
    }
}

impl VenueFeed for SyntheticFeed {
    fn venue(&self) -> Venue {
        Venue::Synthetic
    }

    fn fetch_history(&self, instrument: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
        base_only(cadence)?;
        let now = now_ms();
        let end = cadence.bucket_start(now);
        let from = end - limit as i64 * cadence.ms();
        Ok(self.generate(instrument, cadence, from, end))
    }

    fn poll(&self, instrument: &str, cadence: Cadence) -> Result<Vec<BarEvent>, FeedError> {
        base_only(cadence)?;
        let now = now_ms();
        let end = cadence.bucket_start(now);
        let bars = self.generate(instrument, cadence, end - 3 * cadence.ms(), end);
        Ok(self.cursor.events(bars, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_closed_contiguous_and_sane() {
        let feed = SyntheticFeed::new(7);
        let bars = feed.fetch_history("BTC", Cadence::ONE_MINUTE, 50).unwrap();
        assert_eq!(bars.len(), 50);
        assert!(bars.windows(2).all(|w| w[1].start_ms - w[0].start_ms == 60_000));
        assert!(bars.iter().all(|b| b.is_sane()));
        assert!(bars.last().unwrap().end_ms() <= now_ms());
    }

    #[test]
    fn higher_cadences_are_not_served() {
        let feed = SyntheticFeed::new(7);
        let five = Cadence::minutes(5).unwrap();
        assert!(feed.fetch_history("BTC", five, 10).is_err());
        assert!(feed.poll("BTC", five).is_err());
    }

    #[test]
    fn same_seed_same_walk() {
        let a = SyntheticFeed::new(3);
        let b = SyntheticFeed::new(3);
        let x = a.generate("BTC", Cadence::ONE_MINUTE, 0, 10 * 60_000);
        let y = b.generate("BTC", Cadence::ONE_MINUTE, 0, 10 * 60_000);
        assert_eq!(x, y);
    }

    #[test]
    fn never_regenerates_a_slot() {
        let feed = SyntheticFeed::new(1);
        let first = feed.generate("BTC", Cadence::ONE_MINUTE, 0, 5 * 60_000);
        let again = feed.generate("BTC", Cadence::ONE_MINUTE, 0, 8 * 60_000);
        assert_eq!(first.len(), 5);
        assert_eq!(again.len(), 3);
        assert_eq!(again[0].open, first[4].close);
    }
}
