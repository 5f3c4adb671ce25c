//! Durable storage: closed bars and the trade ledger, both on SQLite.

pub mod bars;
pub mod error;
pub mod trades;

pub use bars::SqliteBarStore;
pub use error::StoreError;
pub use trades::{CloseOutcome, TradeStore};

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

/// Open a SQLite file, creating its parent directory if needed.
pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}
