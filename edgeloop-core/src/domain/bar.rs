//! Bar: OHLCV record for one cadence bucket of an instrument on a venue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BarError {
    #[error("unknown venue '{0}'")]
    UnknownVenue(String),

    #[error("invalid cadence '{0}': expected whole minutes such as 1, 5m or 1h")]
    InvalidCadence(String),
}

/// Market data source a bar came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    HyperLiquid,
    Synthetic,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::HyperLiquid => "hyperliquid",
            Venue::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = BarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "hyperliquid" => Ok(Venue::HyperLiquid),
            "synthetic" => Ok(Venue::Synthetic),
            other => Err(BarError::UnknownVenue(other.to_string())),
        }
    }
}

/// Bucketing interval of a bar series, in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Cadence(u32);

impl Cadence {
    pub const ONE_MINUTE: Cadence = Cadence(1);

    pub const MS_PER_MINUTE: i64 = 60_000;

    pub fn minutes(minutes: u32) -> Result<Self, BarError> {
        if minutes == 0 {
            return Err(BarError::InvalidCadence("0".into()));
        }
        Ok(Cadence(minutes))
    }

    pub fn as_minutes(&self) -> u32 {
        self.0
    }

    pub fn ms(&self) -> i64 {
        self.0 as i64 * Self::MS_PER_MINUTE
    }

    /// Column/table label, e.g. `1m`, `15m`.
    pub fn label(&self) -> String {
        format!("{}m", self.0)
    }

    /// Start of the bucket containing `ts_ms`: `floor(ts / ms) * ms`.
    pub fn bucket_start(&self, ts_ms: i64) -> i64 {
        ts_ms.div_euclid(self.ms()) * self.ms()
    }

    /// True if this cadence is a whole multiple of `base`.
    pub fn is_multiple_of(&self, base: Cadence) -> bool {
        self.0 % base.0 == 0
    }
}

impl TryFrom<u32> for Cadence {
    type Error = BarError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Cadence::minutes(minutes)
    }
}

impl From<Cadence> for u32 {
    fn from(c: Cadence) -> u32 {
        c.0
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl FromStr for Cadence {
    type Err = BarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        let invalid = || BarError::InvalidCadence(s.to_string());
        let (digits, scale) = if let Some(d) = t.strip_suffix('h') {
            (d, 60)
        } else if let Some(d) = t.strip_suffix('m') {
            (d, 1)
        } else {
            (t.as_str(), 1)
        };
        let n: u32 = digits.parse().map_err(|_| invalid())?;
        Cadence::minutes(n.checked_mul(scale).ok_or_else(invalid)?).map_err(|_| invalid())
    }
}

/// OHLCV bar covering `[start_ms, start_ms + cadence)`.
///
/// Immutable once closed. The durable key is
/// `(venue, instrument, cadence, start_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub venue: Venue,
    pub instrument: String,
    pub cadence: Cadence,
    pub start_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Exclusive end of the covered interval; the instant the bar becomes knowable.
    pub fn end_ms(&self) -> i64 {
        self.start_ms + self.cadence.ms()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_ms)
    }

    /// Returns true if any OHLCV field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high bounds open/close from above, low from below.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }
}

/// One bar delivered by a venue feed, tagged with whether its interval has closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub bar: Bar,
    pub closed: bool,
}
