//! Closed-bar store keyed by (venue, instrument, cadence, start_ms).
//!
//! Writes are upserts so a replayed closed bucket replaces its own row rather
//! than duplicating it. Reads come back in ascending time order.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::error::StoreError;
use crate::domain::{Bar, Cadence, Venue};

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS bars (
        venue       TEXT    NOT NULL,
        instrument  TEXT    NOT NULL,
        cadence     INTEGER NOT NULL,
        start_ms    INTEGER NOT NULL,
        open        REAL    NOT NULL,
        high        REAL    NOT NULL,
        low         REAL    NOT NULL,
        close       REAL    NOT NULL,
        volume      REAL    NOT NULL,
        PRIMARY KEY (venue, instrument, cadence, start_ms)
    ) WITHOUT ROWID;
";

const UPSERT: &str = "
    INSERT INTO bars (venue, instrument, cadence, start_ms, open, high, low, close, volume)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT (venue, instrument, cadence, start_ms) DO UPDATE SET
        open = excluded.open,
        high = excluded.high,
        low = excluded.low,
        close = excluded.close,
        volume = excluded.volume
";

/// SQLite-backed store of closed bars.
pub struct SqliteBarStore {
    conn: Mutex<Connection>,
}

impl SqliteBarStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = super::open_connection(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace one closed bar.
    pub fn upsert(&self, bar: &Bar) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached(UPSERT)?.execute(params![
            bar.venue.as_str(),
            bar.instrument,
            bar.cadence.as_minutes(),
            bar.start_ms,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume,
        ])?;
        Ok(())
    }

    /// Insert or replace many bars in one transaction. Returns rows written.
    pub fn upsert_many(&self, bars: &[Bar]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT)?;
            for bar in bars {
                stmt.execute(params![
                    bar.venue.as_str(),
                    bar.instrument,
                    bar.cadence.as_minutes(),
                    bar.start_ms,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(bars.len())
    }

    pub fn get(
        &self,
        venue: Venue,
        instrument: &str,
        cadence: Cadence,
        start_ms: i64,
    ) -> Result<Option<Bar>, StoreError> {
        let conn = self.conn.lock();
        let bar = conn
            .query_row(
                "SELECT start_ms, open, high, low, close, volume FROM bars
                 WHERE venue = ?1 AND instrument = ?2 AND cadence = ?3 AND start_ms = ?4",
                params![venue.as_str(), instrument, cadence.as_minutes(), start_ms],
                |row| row_to_bar(row, venue, instrument, cadence),
            )
            .optional()?;
        Ok(bar)
    }

    /// Bars with `from_ms <= start_ms < to_ms`, ascending.
    pub fn range(
        &self,
        venue: Venue,
        instrument: &str,
        cadence: Cadence,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Bar>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT start_ms, open, high, low, close, volume FROM bars
             WHERE venue = ?1 AND instrument = ?2 AND cadence = ?3
               AND start_ms >= ?4 AND start_ms < ?5
             ORDER BY start_ms ASC",
        )?;
        let bars = stmt
            .query_map(
                params![venue.as_str(), instrument, cadence.as_minutes(), from_ms, to_ms],
                |row| row_to_bar(row, venue, instrument, cadence),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }

    /// The most recent `limit` bars, returned oldest first.
    pub fn latest(
        &self,
        venue: Venue,
        instrument: &str,
        cadence: Cadence,
        limit: usize,
    ) -> Result<Vec<Bar>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT start_ms, open, high, low, close, volume FROM bars
             WHERE venue = ?1 AND instrument = ?2 AND cadence = ?3
             ORDER BY start_ms DESC
             LIMIT ?4",
        )?;
        let mut bars = stmt
            .query_map(
                params![venue.as_str(), instrument, cadence.as_minutes(), limit as i64],
                |row| row_to_bar(row, venue, instrument, cadence),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        bars.reverse();
        Ok(bars)
    }

    pub fn count(&self, venue: Venue, instrument: &str, cadence: Cadence) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM bars WHERE venue = ?1 AND instrument = ?2 AND cadence = ?3",
            params![venue.as_str(), instrument, cadence.as_minutes()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Delete every stored bar for an instrument on a venue. Returns rows removed.
    pub fn clear(&self, venue: Venue, instrument: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM bars WHERE venue = ?1 AND instrument = ?2",
            params![venue.as_str(), instrument],
        )?;
        Ok(n)
    }
}

fn row_to_bar(
    row: &rusqlite::Row<'_>,
    venue: Venue,
    instrument: &str,
    cadence: Cadence,
) -> rusqlite::Result<Bar> {
    Ok(Bar {
        venue,
        instrument: instrument.to_string(),
        cadence,
        start_ms: row.get(0)?,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(cadence: u32, start_ms: i64, close: f64) -> Bar {
        Bar {
            venue: Venue::Binance,
            instrument: "BTCUSDT".into(),
            cadence: Cadence::minutes(cadence).unwrap(),
            start_ms,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 2.0,
        }
    }

    #[test]
    fn upsert_replaces_same_key() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        store.upsert(&bar(3, 0, 100.0)).unwrap();
        store.upsert(&bar(3, 0, 105.0)).unwrap();
        let c3 = Cadence::minutes(3).unwrap();
        assert_eq!(store.count(Venue::Binance, "BTCUSDT", c3).unwrap(), 1);
        let got = store.get(Venue::Binance, "BTCUSDT", c3, 0).unwrap().unwrap();
        assert_eq!(got.close, 105.0);
    }

    #[test]
    fn cadences_are_separate_series() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        store.upsert(&bar(1, 0, 100.0)).unwrap();
        store.upsert(&bar(3, 0, 100.0)).unwrap();
        assert_eq!(store.count(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE).unwrap(), 1);
        assert!(store
            .get(Venue::HyperLiquid, "BTCUSDT", Cadence::ONE_MINUTE, 0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn latest_returns_ascending_tail() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        let bars: Vec<Bar> = (0..10).map(|i| bar(1, i * 60_000, 100.0 + i as f64)).collect();
        assert_eq!(store.upsert_many(&bars).unwrap(), 10);
        let tail = store.latest(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE, 3).unwrap();
        let starts: Vec<i64> = tail.iter().map(|b| b.start_ms).collect();
        assert_eq!(starts, vec![420_000, 480_000, 540_000]);
    }

    #[test]
    fn range_is_half_open() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        let bars: Vec<Bar> = (0..5).map(|i| bar(1, i * 60_000, 100.0)).collect();
        store.upsert_many(&bars).unwrap();
        let got = store
            .range(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE, 60_000, 180_000)
            .unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].start_ms, 60_000);
    }

    #[test]
    fn clear_removes_instrument() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        store.upsert(&bar(1, 0, 100.0)).unwrap();
        store.upsert(&bar(5, 0, 100.0)).unwrap();
        assert_eq!(store.clear(Venue::Binance, "BTCUSDT").unwrap(), 2);
        assert_eq!(store.count(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE).unwrap(), 0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bars.db");
        {
            let store = SqliteBarStore::open(&path).unwrap();
            store.upsert(&bar(15, 900_000, 101.0)).unwrap();
        }
        let store = SqliteBarStore::open(&path).unwrap();
        let c15 = Cadence::minutes(15).unwrap();
        assert!(store.get(Venue::Binance, "BTCUSDT", c15, 900_000).unwrap().is_some());
    }
}
