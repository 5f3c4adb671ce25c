//! End-to-end aggregation into the SQLite bar store.

use std::sync::Arc;

use edgeloop_core::aggregate::BarAggregator;
use edgeloop_core::domain::{Bar, Cadence, Venue};
use edgeloop_core::store::SqliteBarStore;

const NOON: i64 = 1_700_049_600_000;
const MIN: i64 = 60_000;

fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar {
        venue: Venue::Binance,
        instrument: "BTCUSDT".to_string(),
        cadence: Cadence::ONE_MINUTE,
        start_ms: NOON + minute * MIN,
        open,
        high,
        low,
        close,
        volume,
    }
}

fn flat(minute: i64, close: f64) -> Bar {
    bar(minute, close, close, close, close, 1.0)
}

fn c(m: u32) -> Cadence {
    Cadence::minutes(m).unwrap()
}

fn aggregator(store: &Arc<SqliteBarStore>) -> BarAggregator {
    BarAggregator::new(
        Venue::Binance,
        "BTCUSDT",
        Cadence::ONE_MINUTE,
        &[c(3), c(5), c(15)],
        store.clone(),
    )
    .unwrap()
}

#[test]
fn three_minute_bucket_written_on_rollover() {
    let store = Arc::new(SqliteBarStore::open_in_memory().unwrap());
    let mut agg = aggregator(&store);

    for (m, close) in [(0, 100.0), (1, 101.0), (2, 99.0)] {
        agg.on_base_bar(&flat(m, close)).unwrap();
    }
    assert!(store.get(Venue::Binance, "BTCUSDT", c(3), NOON).unwrap().is_none());
    assert_eq!(store.count(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE).unwrap(), 3);

    agg.on_base_bar(&flat(3, 98.0)).unwrap();
    let b = store
        .get(Venue::Binance, "BTCUSDT", c(3), NOON)
        .unwrap()
        .expect("3m bucket persisted at 12:03");
    assert_eq!(b.open, 100.0);
    assert_eq!(b.high, 101.0);
    assert_eq!(b.low, 99.0);
    assert_eq!(b.close, 99.0);
    assert_eq!(b.volume, 3.0);
    assert!(store.get(Venue::Binance, "BTCUSDT", c(3), NOON + 3 * MIN).unwrap().is_none());
}

#[test]
fn one_record_per_closed_bucket_across_an_hour() {
    let store = Arc::new(SqliteBarStore::open_in_memory().unwrap());
    let mut agg = aggregator(&store);

    // 12:00 .. 13:00 inclusive; 13:00 closes the last 12:xx buckets.
    for m in 0..=60 {
        agg.on_base_bar(&flat(m, 100.0 + m as f64)).unwrap();
    }
    assert_eq!(store.count(Venue::Binance, "BTCUSDT", c(3)).unwrap(), 20);
    assert_eq!(store.count(Venue::Binance, "BTCUSDT", c(5)).unwrap(), 12);
    assert_eq!(store.count(Venue::Binance, "BTCUSDT", c(15)).unwrap(), 4);

    let quarter = store
        .range(Venue::Binance, "BTCUSDT", c(15), NOON, NOON + 60 * MIN)
        .unwrap();
    let starts: Vec<i64> = quarter.iter().map(|b| (b.start_ms - NOON) / MIN).collect();
    assert_eq!(starts, vec![0, 15, 30, 45]);
    assert_eq!(quarter[1].open, 115.0);
    assert_eq!(quarter[1].close, 129.0);
}

#[test]
fn replayed_history_is_idempotent() {
    let store = Arc::new(SqliteBarStore::open_in_memory().unwrap());
    let mut agg = aggregator(&store);

    for m in 0..7 {
        agg.on_base_bar(&bar(m, 100.0, 102.0, 98.0, 101.0, 2.0)).unwrap();
    }
    // A reconnecting feed re-delivers the last few bars.
    for m in 4..7 {
        agg.on_base_bar(&bar(m, 100.0, 102.0, 98.0, 101.0, 2.0)).unwrap();
    }
    agg.on_base_bar(&bar(9, 100.0, 102.0, 98.0, 101.0, 2.0)).unwrap();

    let three = store.range(Venue::Binance, "BTCUSDT", c(3), NOON, NOON + 9 * MIN).unwrap();
    assert_eq!(three.len(), 3);
    assert_eq!(three[1].volume, 6.0);
    // 12:06 bucket only ever saw 12:06.
    assert_eq!(three[2].volume, 2.0);
}

#[test]
fn restart_rewrites_partial_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bars.db");

    {
        let store = Arc::new(SqliteBarStore::open(&path).unwrap());
        let mut agg = aggregator(&store);
        for m in 0..5 {
            agg.on_base_bar(&flat(m, 100.0)).unwrap();
        }
    }

    // After a restart the 12:03 bucket starts from 12:04 only; once 12:05
    // arrives it is written with what this process saw.
    let store = Arc::new(SqliteBarStore::open(&path).unwrap());
    let mut agg = aggregator(&store);
    agg.on_base_bar(&flat(4, 100.0)).unwrap();
    agg.on_base_bar(&flat(6, 100.0)).unwrap();

    let b = store.get(Venue::Binance, "BTCUSDT", c(3), NOON + 3 * MIN).unwrap().unwrap();
    assert_eq!(b.volume, 1.0);
    assert_eq!(store.count(Venue::Binance, "BTCUSDT", c(3)).unwrap(), 2);
}
