//! Trade ledger.
//!
//! One row per contract instance. `log_trade` is idempotent on the trade id and
//! `close_trade` only ever moves a row from OPEN to CLOSED, so two loops racing
//! to close the same trade cannot double-book its pnl. Every call commits
//! before returning (`synchronous = FULL`).

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::error::StoreError;
use crate::domain::{CloseReason, NewTrade, Side, Trade, TradeClose, TradeStatus};

const BASE_SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = FULL;
    CREATE TABLE IF NOT EXISTS trades (
        id          TEXT PRIMARY KEY,
        market_id   TEXT NOT NULL,
        label       TEXT NOT NULL,
        end_time    TEXT NOT NULL,
        side        TEXT NOT NULL,
        prob        REAL NOT NULL,
        entry_time  TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'OPEN'
    );
    CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);
";

/// Columns added after the first release. Migration only ever appends these
/// as nullable columns; existing rows stay readable.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("result_side", "TEXT"),
    ("pnl", "REAL"),
    ("entry_price", "REAL"),
    ("profit_target", "REAL"),
    ("close_reason", "TEXT"),
    ("exit_price", "REAL"),
    ("closed_at", "TEXT"),
];

const SELECT_COLUMNS: &str = "id, market_id, label, end_time, side, prob, entry_time, status,
     result_side, pnl, entry_price, profit_target, close_reason, exit_price, closed_at";

/// Result of a close attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call performed the OPEN→CLOSED transition.
    Closed,
    /// Another caller closed the trade first; nothing changed.
    AlreadyClosed,
    /// No trade with that id exists; nothing changed.
    Unknown,
}

pub struct TradeStore {
    conn: Mutex<Connection>,
}

impl TradeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = super::open_connection(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(BASE_SCHEMA)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a new OPEN trade. Returns false if the id was already logged.
    pub fn log_trade(&self, trade: &NewTrade) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO trades
                (id, market_id, label, end_time, side, prob, entry_time, status,
                 entry_price, profit_target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'OPEN', ?8, ?9)",
            params![
                trade.id,
                trade.contract_id,
                trade.label,
                trade.contract_end.to_rfc3339(),
                trade.side.as_str(),
                trade.entry_probability,
                trade.entry_time.to_rfc3339(),
                trade.entry_price,
                trade.profit_target,
            ],
        )? == 1;

        if inserted {
            info!(
                trade_id = %trade.id,
                side = %trade.side,
                prob = trade.entry_probability,
                entry_price = ?trade.entry_price,
                target = ?trade.profit_target,
                "trade logged"
            );
        } else {
            debug!(trade_id = %trade.id, "trade already logged");
        }
        Ok(inserted)
    }

    /// Move a trade from OPEN to CLOSED.
    ///
    /// The status check and the update are one statement, so at most one
    /// caller ever observes `CloseOutcome::Closed` for a given id.
    pub fn close_trade(&self, id: &str, close: &TradeClose) -> Result<CloseOutcome, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE trades
             SET status = 'CLOSED', pnl = ?2, close_reason = ?3, result_side = ?4,
                 exit_price = ?5, closed_at = ?6
             WHERE id = ?1 AND status = 'OPEN'",
            params![
                id,
                close.pnl,
                close.reason.as_str(),
                close.result_side.map(|s| s.as_str()),
                close.exit_price,
                close.closed_at.to_rfc3339(),
            ],
        )?;

        if changed == 1 {
            info!(trade_id = %id, reason = %close.reason, pnl = ?close.pnl, "trade closed");
            return Ok(CloseOutcome::Closed);
        }

        let status: Option<String> = conn
            .query_row("SELECT status FROM trades WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let outcome = match status {
            Some(_) => CloseOutcome::AlreadyClosed,
            None => CloseOutcome::Unknown,
        };
        warn!(trade_id = %id, reason = %close.reason, outcome = ?outcome, "close ignored");
        Ok(outcome)
    }

    pub fn get(&self, id: &str) -> Result<Option<Trade>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {SELECT_COLUMNS} FROM trades WHERE id = ?1");
        let trade = conn.query_row(&sql, params![id], row_to_trade).optional()?;
        Ok(trade)
    }

    pub fn has_trade(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn get_open_trades(&self) -> Result<Vec<Trade>, StoreError> {
        self.query(&format!(
            "SELECT {SELECT_COLUMNS} FROM trades WHERE status = 'OPEN' ORDER BY entry_time ASC"
        ))
    }

    /// Every trade, oldest entry first.
    pub fn all(&self) -> Result<Vec<Trade>, StoreError> {
        self.query(&format!(
            "SELECT {SELECT_COLUMNS} FROM trades ORDER BY entry_time ASC"
        ))
    }

    fn query(&self, sql: &str) -> Result<Vec<Trade>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let trades = stmt
            .query_map([], row_to_trade)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trades)
    }
}

/// Append any missing nullable columns. Never drops or rewrites a column.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(trades)")?;
    let existing = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    if existing.is_empty() {
        return Err(StoreError::CorruptRow {
            table: "trades",
            detail: "table missing after schema init".into(),
        });
    }

    for (name, ty) in ADDITIVE_COLUMNS {
        if !existing.iter().any(|c| c == name) {
            conn.execute_batch(&format!("ALTER TABLE trades ADD COLUMN {name} {ty}"))?;
            info!(column = *name, "trade ledger migrated");
        }
    }
    Ok(())
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{raw}': {e}")))
}

fn parse_side(idx: usize, raw: &str) -> rusqlite::Result<Side> {
    raw.parse::<Side>().map_err(|e| conversion_error(idx, e))
}

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
    let end_time: String = row.get(3)?;
    let side: String = row.get(4)?;
    let entry_time: String = row.get(6)?;
    let status: String = row.get(7)?;
    let result_side: Option<String> = row.get(8)?;
    let close_reason: Option<String> = row.get(12)?;
    let closed_at: Option<String> = row.get(14)?;

    Ok(Trade {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        label: row.get(2)?,
        contract_end: parse_time(3, &end_time)?,
        side: parse_side(4, &side)?,
        entry_probability: row.get(5)?,
        entry_price: row.get(10)?,
        profit_target: row.get(11)?,
        entry_time: parse_time(6, &entry_time)?,
        status: status
            .parse::<TradeStatus>()
            .map_err(|e| conversion_error(7, e))?,
        close_reason: close_reason
            .map(|r| r.parse::<CloseReason>().map_err(|e| conversion_error(12, e)))
            .transpose()?,
        result_side: result_side.map(|s| parse_side(8, &s)).transpose()?,
        exit_price: row.get(13)?,
        pnl: row.get(9)?,
        closed_at: closed_at.map(|t| parse_time(14, &t)).transpose()?,
    })
}
