//! Service orchestration: one named thread per polling loop.
//!
//! | Thread          | Work per tick                                   |
//! |-----------------|-------------------------------------------------|
//! | `feed-<venue>`  | poll bar events, roll closed bars into buckets  |
//! | `predict`       | ask each predictor for a fresh probability      |
//! | `discovery`     | look up the active contract                     |
//! | `quotes`        | refresh the held contract's live quote          |
//! | `strategy`      | evaluate entry/exit against the trade ledger    |
//! | `audit`         | reconcile expired trades against resolutions    |
//!
//! Loops share nothing but [`SharedState`] and the two stores. A failed tick
//! is logged once at `warn` and the loop carries on; every loop sleeps on the
//! same [`ShutdownListener`] so `stop()` wakes them all at once.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use edgeloop_core::aggregate::{AggregateError, BarAggregator};
use edgeloop_core::clock::Clock;
use edgeloop_core::contract::{ContractTracker, TrackerUpdate};
use edgeloop_core::domain::{Cadence, Venue};
use edgeloop_core::ports::{Predictor, SettlementMarket, VenueFeed};
use edgeloop_core::settlement::SettlementAuditor;
use edgeloop_core::state::SharedState;
use edgeloop_core::store::{SqliteBarStore, TradeStore};
use edgeloop_core::strategy::{Decision, StrategyEngine, StrategyError};
use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, VenueConfig};
use crate::dataset::FeatureDataset;
use crate::model::HttpModel;
use crate::polymarket::PolymarketClient;
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::venues::build_feed;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("aggregator for {venue}: {source}")]
    Aggregator {
        venue: Venue,
        #[source]
        source: AggregateError,
    },

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Concrete collaborators the loops drive.
pub struct Collaborators {
    pub feeds: Vec<(VenueConfig, Arc<dyn VenueFeed>)>,
    pub predictors: Vec<(Venue, Arc<dyn Predictor>)>,
    pub market: Arc<dyn SettlementMarket>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Live HTTP collaborators for every configured venue stream.
    pub fn from_config(
        config: &ServiceConfig,
        bars: Arc<SqliteBarStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.feed.timeout_secs);
        let mut feeds = Vec::with_capacity(config.feed.venues.len());
        let mut predictors: Vec<(Venue, Arc<dyn Predictor>)> = Vec::new();
        for stream in &config.feed.venues {
            let feed = build_feed(stream, timeout, config.feed.synthetic_seed)
                .with_context(|| format!("building {} feed", stream.venue))?;
            feeds.push((stream.clone(), feed));

            let dataset = FeatureDataset::new(
                bars.clone(),
                stream,
                config.feed.base_cadence,
                &config.features,
                config.model.history_limit,
            );
            let model: Arc<dyn Predictor> = Arc::new(
                HttpModel::new(&config.model, dataset, clock.clone())
                    .with_context(|| format!("building model client for {}", stream.venue))?,
            );
            predictors.push((stream.venue, model));
        }
        let market = PolymarketClient::new(config.market.clone(), clock.clone())
            .context("building market client")?;

        Ok(Self {
            feeds,
            predictors,
            market: Arc::new(market),
            clock,
        })
    }
}

pub struct Service;

impl Service {
    /// Spawn every loop. Each loop runs its first tick immediately.
    pub fn start(
        config: &ServiceConfig,
        bars: Arc<SqliteBarStore>,
        trades: Arc<TradeStore>,
        collaborators: Collaborators,
    ) -> Result<ServiceHandle, ServiceError> {
        let Collaborators {
            feeds,
            predictors,
            market,
            clock,
        } = collaborators;
        let state = Arc::new(SharedState::new());
        let shutdown = Shutdown::new();
        let mut threads = Vec::new();

        // Build everything fallible before the first spawn.
        let mut aggregators = Vec::with_capacity(feeds.len());
        for (stream, feed) in feeds {
            let aggregator = BarAggregator::new(
                stream.venue,
                stream.instrument.clone(),
                config.feed.base_cadence,
                &config.aggregation.cadences,
                bars.clone(),
            )
            .map_err(|source| ServiceError::Aggregator {
                venue: stream.venue,
                source,
            })?;
            aggregators.push((stream, feed, aggregator));
        }
        let engine = StrategyEngine::new(
            config.strategy.clone(),
            state.clone(),
            trades.clone(),
            clock.clone(),
        )?;
        let tracker = Arc::new(ContractTracker::new(market.clone(), state.clone(), clock.clone()));
        let auditor = SettlementAuditor::new(trades, market)
            .with_expiry_buffer(config.settlement.expiry_buffer())
            .with_max_resolution_age(config.settlement.max_resolution_age());

        let base = config.feed.base_cadence;
        let poll = Duration::from_millis(config.feed.poll_interval_ms);
        for (stream, feed, mut aggregator) in aggregators {
            let name = format!("feed-{}", stream.venue);
            threads.push(spawn(&name, shutdown.listener(), poll, move || {
                feed_tick(&stream, feed.as_ref(), base, &mut aggregator)
            })?);
        }

        {
            let state = state.clone();
            threads.push(spawn(
                "predict",
                shutdown.listener(),
                config.schedule.prediction(),
                move || predict_tick(&predictors, &state),
            )?);
        }

        {
            let tracker = tracker.clone();
            threads.push(spawn(
                "discovery",
                shutdown.listener(),
                config.schedule.discovery(),
                move || match tracker.refresh() {
                    Ok(TrackerUpdate::Replaced { previous, current }) => {
                        debug!(previous = ?previous, current = %current, "contract swapped");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "contract discovery failed"),
                },
            )?);
        }

        threads.push(spawn(
            "quotes",
            shutdown.listener(),
            config.schedule.quote(),
            move || {
                if let Err(e) = tracker.refresh_quote() {
                    warn!(error = %e, "quote refresh failed");
                }
            },
        )?);

        threads.push(spawn(
            "strategy",
            shutdown.listener(),
            config.schedule.strategy(),
            move || match engine.tick() {
                Ok(Decision::Skip(reason)) => debug!(?reason, "strategy skip"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "strategy tick failed"),
            },
        )?);

        {
            let clock = clock.clone();
            threads.push(spawn(
                "audit",
                shutdown.listener(),
                config.schedule.audit(),
                move || match auditor.audit_once(clock.now()) {
                    Ok(summary) if summary.checked > 0 => info!(
                        checked = summary.checked,
                        resolved = summary.resolved,
                        pending = summary.pending,
                        expired = summary.expired,
                        "audit pass"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "audit pass failed"),
                },
            )?);
        }

        info!(threads = threads.len(), "service started");
        Ok(ServiceHandle {
            shutdown,
            threads,
            state,
        })
    }
}

/// Running loops. Dropping the handle without `stop()` leaves them running.
pub struct ServiceHandle {
    shutdown: Shutdown,
    threads: Vec<JoinHandle<()>>,
    state: Arc<SharedState>,
}

impl ServiceHandle {
    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads
            .iter()
            .filter_map(|t| t.thread().name().map(str::to_string))
            .collect()
    }

    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.shutdown.listener()
    }

    /// Signal every loop and wait for each to finish its current tick.
    pub fn stop(self) {
        self.shutdown.trigger();
        for t in self.threads {
            let name = t.thread().name().unwrap_or("?").to_string();
            if t.join().is_err() {
                warn!(thread = %name, "loop panicked");
            }
        }
        info!("service stopped");
    }
}

fn spawn<F>(
    name: &str,
    shutdown: ShutdownListener,
    interval: Duration,
    mut tick: F,
) -> Result<JoinHandle<()>, ServiceError>
where
    F: FnMut() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            tick();
            if shutdown.wait(interval) {
                break;
            }
        })
        .map_err(|source| ServiceError::Spawn {
            name: name.to_string(),
            source,
        })
}

fn feed_tick(
    stream: &VenueConfig,
    feed: &dyn VenueFeed,
    base: Cadence,
    aggregator: &mut BarAggregator,
) {
    let events = match feed.poll(&stream.instrument, base) {
        Ok(events) => events,
        Err(e) => {
            warn!(venue = %stream.venue, error = %e, "bar poll failed");
            return;
        }
    };
    for event in events {
        let result = if event.closed {
            aggregator.on_base_bar(&event.bar)
        } else {
            aggregator.peek(&event.bar)
        };
        match result {
            Ok(buckets) if event.closed => debug!(
                venue = %stream.venue,
                start_ms = event.bar.start_ms,
                close = event.bar.close,
                buckets = buckets.len(),
                "closed bar"
            ),
            Ok(_) => {}
            Err(e) => warn!(venue = %stream.venue, error = %e, "bar rejected"),
        }
    }
}

fn predict_tick(predictors: &[(Venue, Arc<dyn Predictor>)], state: &SharedState) {
    for (venue, predictor) in predictors {
        match predictor.predict_latest() {
            Ok(p) if p.is_valid() => {
                debug!(venue = %venue, prob_up = p.prob_up, "prediction");
                state.set_prediction(*venue, p);
            }
            Ok(p) => warn!(venue = %venue, prob_up = p.prob_up, "discarding invalid prediction"),
            Err(e) => warn!(venue = %venue, error = %e, "prediction failed"),
        }
    }
}
