//! HTTP client for the external predictive model.
//!
//! The newest feature row is posted as a flat JSON object of named columns;
//! the model answers with `{"prob_up": p}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use edgeloop_core::clock::Clock;
use edgeloop_core::domain::Prediction;
use edgeloop_core::features::FeatureError;
use edgeloop_core::ports::{ModelError, Predictor};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::dataset::{DatasetError, FeatureDataset};
use crate::http::{build_client, CircuitBreaker, Retrying};

#[derive(Debug, Serialize)]
pub struct ModelRequest<'a> {
    pub venue: &'a str,
    pub timestamp_ms: i64,
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct ModelResponse {
    pub prob_up: f64,
}

pub struct HttpModel {
    client: Client,
    endpoint: String,
    dataset: FeatureDataset,
    clock: Arc<dyn Clock>,
    retrying: Retrying,
}

impl HttpModel {
    pub fn new(
        config: &ModelConfig,
        dataset: FeatureDataset,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: config.endpoint.clone(),
            dataset,
            clock,
            retrying: Retrying::new(CircuitBreaker::for_polling()),
        })
    }
}

impl Predictor for HttpModel {
    fn predict_latest(&self) -> Result<Prediction, ModelError> {
        let frame = self.dataset.load().map_err(|e| match e {
            DatasetError::Features(FeatureError::EmptyBase) => {
                ModelError::InsufficientHistory { rows: 0 }
            }
            other => ModelError::Features(other.to_string()),
        })?;
        let row = frame
            .last()
            .ok_or(ModelError::InsufficientHistory { rows: frame.len() })?;

        let request = ModelRequest {
            venue: self.dataset.venue().as_str(),
            timestamp_ms: row.timestamp_ms,
            features: frame.record(row),
        };
        let response: ModelResponse = self
            .retrying
            .send_json("model predict", || self.client.post(&self.endpoint).json(&request))?;

        let prediction = Prediction::new(self.clock.now(), response.prob_up);
        if !prediction.is_valid() {
            return Err(ModelError::InvalidProbability(response.prob_up));
        }
        debug!(
            venue = request.venue,
            row_ms = row.timestamp_ms,
            prob_up = prediction.prob_up,
            "prediction"
        );
        Ok(prediction)
    }
}
