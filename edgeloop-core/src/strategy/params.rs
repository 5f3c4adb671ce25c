use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::engine::StrategyError;

/// Thresholds for the per-contract NONE → OPEN → CLOSED machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Enter Up when `prob_up >= entry_threshold`, Down when `prob_up <= 1 - entry_threshold`.
    pub entry_threshold: f64,
    /// Stop out when the held side's confidence drops below this. Must not exceed the entry threshold.
    pub unwind_threshold: f64,
    /// Required `confidence - quote` before entering.
    pub min_edge: f64,
    /// Predictions older than this are ignored.
    #[serde(with = "secs")]
    pub max_prediction_age: Duration,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            entry_threshold: 0.65,
            unwind_threshold: 0.60,
            min_edge: 0.05,
            max_prediction_age: Duration::from_secs(90),
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), StrategyError> {
        let bad = |msg: String| Err(StrategyError::InvalidParams(msg));
        if !(self.entry_threshold > 0.5 && self.entry_threshold < 1.0) {
            return bad(format!(
                "entry_threshold must be in (0.5, 1), got {}",
                self.entry_threshold
            ));
        }
        if !(self.unwind_threshold > 0.0 && self.unwind_threshold <= self.entry_threshold) {
            return bad(format!(
                "unwind_threshold must be in (0, entry_threshold={}], got {}",
                self.entry_threshold, self.unwind_threshold
            ));
        }
        if !(self.min_edge >= 0.0 && self.min_edge < 1.0) {
            return bad(format!("min_edge must be in [0, 1), got {}", self.min_edge));
        }
        if self.max_prediction_age.is_zero() {
            return bad("max_prediction_age must be positive".into());
        }
        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
