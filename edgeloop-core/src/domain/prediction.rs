//! Prediction: the model's latest probability that the next move is up.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: DateTime<Utc>,
    pub prob_up: f64,
}

impl Prediction {
    pub fn new(timestamp: DateTime<Utc>, prob_up: f64) -> Self {
        Self { timestamp, prob_up }
    }

    /// A probability in `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        self.prob_up.is_finite() && (0.0..=1.0).contains(&self.prob_up)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}
