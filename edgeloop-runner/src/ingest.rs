//! History ingestion into the bar store.
//!
//! For each configured venue stream:
//! 1. Optionally clear everything stored for the stream (`fresh`)
//! 2. Fetch base-cadence history; only closed bars are kept
//! 3. Fetch each derived cadence natively from the venue, or, when the venue
//!    cannot serve it, resample it from the base history just fetched
//!
//! The live aggregator takes over from the newest stored bucket; the first
//! live rollover rewrites any bucket ingest saw partially.

use std::fmt;
use std::sync::Arc;

use edgeloop_core::domain::{Bar, Cadence, Venue};
use edgeloop_core::features::resample;
use edgeloop_core::ports::{FeedError, VenueFeed};
use edgeloop_core::store::{SqliteBarStore, StoreError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::VenueConfig;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("history fetch failed for {venue}/{instrument} {cadence}: {source}")]
    Fetch {
        venue: Venue,
        instrument: String,
        cadence: Cadence,
        #[source]
        source: FeedError,
    },

    #[error("no closed {cadence} bars returned for {venue}/{instrument}")]
    EmptyHistory {
        venue: Venue,
        instrument: String,
        cadence: Cadence,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub base: Cadence,
    pub cadences: Vec<Cadence>,
    /// Base bars requested per stream; derived requests scale down by ratio.
    pub limit: usize,
    /// Clear the stream before writing.
    pub fresh: bool,
}

/// Where a derived series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSource {
    Venue,
    Resampled,
}

impl fmt::Display for SeriesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesSource::Venue => f.write_str("venue"),
            SeriesSource::Resampled => f.write_str("resampled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesIngest {
    pub venue: Venue,
    pub instrument: String,
    pub cadence: Cadence,
    pub source: SeriesSource,
    pub written: usize,
    pub first_ms: Option<i64>,
    pub last_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
    /// Rows removed by `fresh`.
    pub cleared: usize,
    pub series: Vec<SeriesIngest>,
}

impl IngestSummary {
    pub fn total_written(&self) -> usize {
        self.series.iter().map(|s| s.written).sum()
    }
}

/// Ingest history for every `(stream, feed)` pair as of `now_ms`.
pub fn ingest_history(
    store: &SqliteBarStore,
    streams: &[(VenueConfig, Arc<dyn VenueFeed>)],
    opts: &IngestOptions,
    now_ms: i64,
) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();

    for (stream, feed) in streams {
        if opts.fresh {
            let removed = store.clear(stream.venue, &stream.instrument)?;
            info!(venue = %stream.venue, instrument = %stream.instrument, removed, "cleared stored bars");
            summary.cleared += removed;
        }

        let base = closed_only(
            fetch(feed.as_ref(), stream, opts.base, opts.limit)?,
            now_ms,
        );
        if base.is_empty() {
            return Err(IngestError::EmptyHistory {
                venue: stream.venue,
                instrument: stream.instrument.clone(),
                cadence: opts.base,
            });
        }
        summary
            .series
            .push(write(store, stream, opts.base, SeriesSource::Venue, &base)?);

        for &cadence in &opts.cadences {
            let ratio = (cadence.as_minutes() / opts.base.as_minutes()).max(1) as usize;
            let want = (opts.limit / ratio).max(1);
            let (source, bars) = match fetch(feed.as_ref(), stream, cadence, want) {
                Ok(bars) if !bars.is_empty() => (SeriesSource::Venue, closed_only(bars, now_ms)),
                Ok(_) => (SeriesSource::Resampled, resample(&base, cadence)),
                Err(e) => {
                    warn!(
                        venue = %stream.venue,
                        cadence = %cadence,
                        error = %e,
                        "derived history unavailable, resampling base bars"
                    );
                    (SeriesSource::Resampled, resample(&base, cadence))
                }
            };
            summary
                .series
                .push(write(store, stream, cadence, source, &bars)?);
        }
    }

    Ok(summary)
}

fn fetch(
    feed: &dyn VenueFeed,
    stream: &VenueConfig,
    cadence: Cadence,
    limit: usize,
) -> Result<Vec<Bar>, IngestError> {
    feed.fetch_history(&stream.instrument, cadence, limit)
        .map_err(|source| IngestError::Fetch {
            venue: stream.venue,
            instrument: stream.instrument.clone(),
            cadence,
            source,
        })
}

fn closed_only(mut bars: Vec<Bar>, now_ms: i64) -> Vec<Bar> {
    bars.retain(|b| b.end_ms() <= now_ms && b.is_sane());
    bars
}

fn write(
    store: &SqliteBarStore,
    stream: &VenueConfig,
    cadence: Cadence,
    source: SeriesSource,
    bars: &[Bar],
) -> Result<SeriesIngest, IngestError> {
    let written = store.upsert_many(bars)?;
    info!(
        venue = %stream.venue,
        instrument = %stream.instrument,
        cadence = %cadence,
        source = %source,
        written,
        "ingested"
    );
    Ok(SeriesIngest {
        venue: stream.venue,
        instrument: stream.instrument.clone(),
        cadence,
        source,
        written,
        first_ms: bars.first().map(|b| b.start_ms),
        last_ms: bars.last().map(|b| b.start_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeloop_core::domain::BarEvent;

    const NOON: i64 = 1_700_049_600_000;

    fn bar(cadence: Cadence, i: i64) -> Bar {
        Bar {
            venue: Venue::Binance,
            instrument: "BTCUSDT".into(),
            cadence,
            start_ms: NOON + i * cadence.ms(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 2.0,
        }
    }

    /// Serves `n` bars of any cadence ending at NOON + n minutes of base.
    struct FixedFeed {
        native: bool,
    }

    impl VenueFeed for FixedFeed {
        fn venue(&self) -> Venue {
            Venue::Binance
        }

        fn fetch_history(&self, _: &str, cadence: Cadence, limit: usize) -> Result<Vec<Bar>, FeedError> {
            if !self.native && cadence != Cadence::ONE_MINUTE {
                return Err(FeedError::Other("unsupported".into()));
            }
            Ok((0..limit as i64).map(|i| bar(cadence, i)).collect())
        }

        fn poll(&self, _: &str, _: Cadence) -> Result<Vec<BarEvent>, FeedError> {
            Ok(Vec::new())
        }
    }

    fn stream(native: bool) -> Vec<(VenueConfig, Arc<dyn VenueFeed>)> {
        vec![(
            VenueConfig {
                venue: Venue::Binance,
                instrument: "BTCUSDT".into(),
                base_url: None,
            },
            Arc::new(FixedFeed { native }) as Arc<dyn VenueFeed>,
        )]
    }

    fn opts(fresh: bool) -> IngestOptions {
        IngestOptions {
            base: Cadence::ONE_MINUTE,
            cadences: vec![Cadence::minutes(5).unwrap(), Cadence::minutes(15).unwrap()],
            limit: 60,
            fresh,
        }
    }

    #[test]
    fn native_derived_history_is_stored() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        let now = NOON + 24 * 3_600_000;
        let summary = ingest_history(&store, &stream(true), &opts(false), now).unwrap();
        assert_eq!(summary.series.len(), 3);
        assert!(summary.series.iter().all(|s| s.source == SeriesSource::Venue));
        assert_eq!(summary.series[1].written, 12);
        assert_eq!(summary.series[2].written, 4);
    }

    #[test]
    fn unsupported_cadence_falls_back_to_resample() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        let now = NOON + 24 * 3_600_000;
        let summary = ingest_history(&store, &stream(false), &opts(false), now).unwrap();
        assert_eq!(summary.series[1].source, SeriesSource::Resampled);
        assert_eq!(summary.series[1].written, 12);
        let five = store
            .latest(Venue::Binance, "BTCUSDT", Cadence::minutes(5).unwrap(), 100)
            .unwrap();
        assert_eq!(five.len(), 12);
        assert_eq!(five[0].volume, 10.0);
    }

    #[test]
    fn open_bars_are_not_written() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        // 60 base bars; only the first 30 have closed.
        let now = NOON + 30 * 60_000;
        let summary = ingest_history(&store, &stream(false), &opts(false), now).unwrap();
        assert_eq!(summary.series[0].written, 30);
        assert_eq!(summary.series[0].last_ms, Some(NOON + 29 * 60_000));
        // 5m buckets resampled from 30 closed minutes.
        assert_eq!(summary.series[1].written, 6);
    }

    #[test]
    fn fresh_clears_before_writing() {
        let store = SqliteBarStore::open_in_memory().unwrap();
        let now = NOON + 24 * 3_600_000;
        ingest_history(&store, &stream(true), &opts(false), now).unwrap();
        let again = ingest_history(&store, &stream(true), &opts(true), now).unwrap();
        assert_eq!(again.cleared, 60 + 12 + 4);
        assert_eq!(
            store.count(Venue::Binance, "BTCUSDT", Cadence::ONE_MINUTE).unwrap(),
            60
        );
    }
}
