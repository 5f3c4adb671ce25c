//! Assembles a feature frame for one venue stream from the bar store.

use std::sync::Arc;

use edgeloop_core::domain::{Bar, Cadence, Venue};
use edgeloop_core::features::{
    resample, ExpiryFeatures, FeatureError, FeatureFrame, FeatureViewBuilder, IndicatorSet,
};
use edgeloop_core::store::{SqliteBarStore, StoreError};
use thiserror::Error;
use tracing::debug;

use crate::config::{FeaturesConfig, VenueConfig};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Features(#[from] FeatureError),
}

pub struct FeatureDataset {
    store: Arc<SqliteBarStore>,
    venue: Venue,
    instrument: String,
    base: Cadence,
    cadences: Vec<Cadence>,
    builder: FeatureViewBuilder,
    limit: usize,
}

impl FeatureDataset {
    pub fn new(
        store: Arc<SqliteBarStore>,
        venue: &VenueConfig,
        base: Cadence,
        features: &FeaturesConfig,
        limit: usize,
    ) -> Self {
        let mut builder = FeatureViewBuilder::new(IndicatorSet::standard(
            features.rsi_period,
            features.atr_period,
            features.ema_period,
        ))
        .with_expiry(ExpiryFeatures::new(features.expiry_block));
        if let Some(ms) = features.join_tolerance_ms {
            builder = builder.with_tolerance(ms);
        }
        Self {
            store,
            venue: venue.venue,
            instrument: venue.instrument.clone(),
            base,
            cadences: features.cadences.clone(),
            builder,
            limit,
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Latest `limit` base bars joined with every configured higher cadence.
    /// A cadence the store does not cover is derived from the base bars.
    pub fn load(&self) -> Result<FeatureFrame, DatasetError> {
        let base = self
            .store
            .latest(self.venue, &self.instrument, self.base, self.limit)?;
        let higher = self
            .cadences
            .iter()
            .map(|c| self.higher_series(&base, *c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.builder.build(&base, &higher)?)
    }

    fn higher_series(&self, base: &[Bar], cadence: Cadence) -> Result<Vec<Bar>, DatasetError> {
        let ratio = (cadence.as_minutes() / self.base.as_minutes()).max(1) as usize;
        let want = base.len() / ratio;
        let stored = self
            .store
            .latest(self.venue, &self.instrument, cadence, want + 1)?;
        // The newest bucket is only stored on rollover, so one short is complete.
        if want > 0 && stored.len() + 1 >= want {
            return Ok(stored);
        }
        debug!(
            venue = %self.venue,
            cadence = %cadence,
            stored = stored.len(),
            want,
            "resampling from base bars"
        );
        Ok(resample(base, cadence))
    }
}
