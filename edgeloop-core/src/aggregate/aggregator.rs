//! BarAggregator: one in-memory bucket per derived cadence.
//!
//! Each closed base bar either extends the current bucket of a cadence or, when
//! it floors to a later bucket start, closes the current bucket. A closed bucket
//! is handed to the [`BarSink`] exactly once; an open bucket is never written.
//!
//! Invariants per bucket:
//! - `open` is fixed at creation
//! - `high`/`low` are the running max/min of contributing highs/lows
//! - `close` is the latest contributing close
//! - `volume` is the sum of contributing volumes
//!
//! In-memory state is not reloaded on restart, so the first bucket after a
//! restart may be partial; the next rollover replaces it in storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Bar, Cadence, Venue};
use crate::store::{SqliteBarStore, StoreError};

/// Durable destination for closed bars.
pub trait BarSink: Send + Sync {
    fn write_closed(&self, bar: &Bar) -> Result<(), StoreError>;
}

impl BarSink for SqliteBarStore {
    fn write_closed(&self, bar: &Bar) -> Result<(), StoreError> {
        self.upsert(bar)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("bar for {venue}/{instrument} fed to aggregator for {expected_venue}/{expected_instrument}")]
    WrongSeries {
        venue: Venue,
        instrument: String,
        expected_venue: Venue,
        expected_instrument: String,
    },

    #[error("bar cadence {got} is not the base cadence {base}")]
    NotBaseCadence { got: Cadence, base: Cadence },

    #[error("target cadence {target} is not a multiple of base cadence {base}")]
    InvalidTarget { target: Cadence, base: Cadence },
}

#[derive(Debug, Clone)]
struct Bucket {
    bar: Bar,
    /// Start of the most recent base bar folded into this bucket.
    last_base_ms: i64,
}

impl Bucket {
    fn seed(base: &Bar, cadence: Cadence, start_ms: i64) -> Self {
        Self {
            bar: Bar {
                cadence,
                start_ms,
                ..base.clone()
            },
            last_base_ms: base.start_ms,
        }
    }

    fn absorb(&mut self, base: &Bar) {
        self.bar.high = self.bar.high.max(base.high);
        self.bar.low = self.bar.low.min(base.low);
        self.bar.close = base.close;
        self.bar.volume += base.volume;
        self.last_base_ms = base.start_ms;
    }
}

/// Rolls one (venue, instrument) base series into a fixed set of cadences.
pub struct BarAggregator {
    venue: Venue,
    instrument: String,
    base: Cadence,
    targets: Vec<Cadence>,
    buckets: BTreeMap<Cadence, Bucket>,
    sink: Arc<dyn BarSink>,
    /// Closed buckets whose write failed; retried before the next bar.
    pending: Vec<Bar>,
    persist_base: bool,
}

impl BarAggregator {
    pub fn new(
        venue: Venue,
        instrument: impl Into<String>,
        base: Cadence,
        targets: &[Cadence],
        sink: Arc<dyn BarSink>,
    ) -> Result<Self, AggregateError> {
        let mut sorted: Vec<Cadence> = Vec::with_capacity(targets.len());
        for &t in targets {
            if t == base || !t.is_multiple_of(base) {
                return Err(AggregateError::InvalidTarget { target: t, base });
            }
            if !sorted.contains(&t) {
                sorted.push(t);
            }
        }
        sorted.sort();

        Ok(Self {
            venue,
            instrument: instrument.into(),
            base,
            targets: sorted,
            buckets: BTreeMap::new(),
            sink,
            pending: Vec::new(),
            persist_base: true,
        })
    }

    /// Skip writing the base bar itself (when the caller already stored it).
    pub fn without_base_persistence(mut self) -> Self {
        self.persist_base = false;
        self
    }

    pub fn targets(&self) -> &[Cadence] {
        &self.targets
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Fold one closed base bar into every derived cadence.
    ///
    /// Returns the current (possibly still open) bucket per cadence, for live
    /// display. Persistence happens only for buckets this bar closed.
    pub fn on_base_bar(&mut self, bar: &Bar) -> Result<BTreeMap<Cadence, Bar>, AggregateError> {
        self.check_series(bar)?;
        self.retry_pending();

        if self.persist_base {
            self.write(bar.clone());
        }

        for i in 0..self.targets.len() {
            let cadence = self.targets[i];
            let start = cadence.bucket_start(bar.start_ms);
            let closed = match self.buckets.get_mut(&cadence) {
                None => {
                    self.buckets.insert(cadence, Bucket::seed(bar, cadence, start));
                    None
                }
                Some(bucket) if bucket.bar.start_ms == start => {
                    if bar.start_ms > bucket.last_base_ms {
                        bucket.absorb(bar);
                    } else {
                        debug!(cadence = %cadence, start_ms = bar.start_ms, "replayed base bar skipped");
                    }
                    None
                }
                Some(bucket) if start < bucket.bar.start_ms => {
                    debug!(
                        cadence = %cadence,
                        start_ms = bar.start_ms,
                        bucket_ms = bucket.bar.start_ms,
                        "late base bar ignored"
                    );
                    None
                }
                Some(bucket) => {
                    let fresh = Bucket::seed(bar, cadence, start);
                    Some(std::mem::replace(bucket, fresh).bar)
                }
            };
            if let Some(done) = closed {
                self.write(done);
            }
        }

        Ok(self.snapshot())
    }

    /// What each bucket would look like if `open_bar` (a still-forming base
    /// bar) were folded in. Does not mutate state or touch storage.
    pub fn peek(&self, open_bar: &Bar) -> Result<BTreeMap<Cadence, Bar>, AggregateError> {
        self.check_series(open_bar)?;
        let mut out = BTreeMap::new();
        for &cadence in &self.targets {
            let start = cadence.bucket_start(open_bar.start_ms);
            let preview = match self.buckets.get(&cadence) {
                Some(bucket) if bucket.bar.start_ms == start => {
                    let mut b = bucket.clone();
                    if open_bar.start_ms > b.last_base_ms {
                        b.absorb(open_bar);
                    }
                    b.bar
                }
                Some(bucket) if start < bucket.bar.start_ms => bucket.bar.clone(),
                _ => Bucket::seed(open_bar, cadence, start).bar,
            };
            out.insert(cadence, preview);
        }
        Ok(out)
    }

    /// Current bucket per cadence.
    pub fn snapshot(&self) -> BTreeMap<Cadence, Bar> {
        self.buckets
            .iter()
            .map(|(c, b)| (*c, b.bar.clone()))
            .collect()
    }

    fn check_series(&self, bar: &Bar) -> Result<(), AggregateError> {
        if bar.venue != self.venue || bar.instrument != self.instrument {
            return Err(AggregateError::WrongSeries {
                venue: bar.venue,
                instrument: bar.instrument.clone(),
                expected_venue: self.venue,
                expected_instrument: self.instrument.clone(),
            });
        }
        if bar.cadence != self.base {
            return Err(AggregateError::NotBaseCadence {
                got: bar.cadence,
                base: self.base,
            });
        }
        Ok(())
    }

    fn write(&mut self, bar: Bar) {
        match self.sink.write_closed(&bar) {
            Ok(()) => debug!(
                venue = %bar.venue,
                cadence = %bar.cadence,
                start_ms = bar.start_ms,
                "bar persisted"
            ),
            Err(e) => {
                warn!(
                    venue = %bar.venue,
                    cadence = %bar.cadence,
                    start_ms = bar.start_ms,
                    error = %e,
                    "bar write failed, queued for retry"
                );
                self.pending.push(bar);
            }
        }
    }

    fn retry_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let queued = std::mem::take(&mut self.pending);
        for bar in queued {
            self.write(bar);
        }
    }
}
