//! Shared read-mostly state: the active contract and the latest predictions.
//!
//! Writers always replace a whole value; readers clone an `Arc` and never see
//! a partially updated contract or prediction.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::{MarketContract, Prediction, Venue};

#[derive(Debug, Default)]
pub struct SharedState {
    contract: RwLock<Option<Arc<MarketContract>>>,
    predictions: RwLock<HashMap<Venue, Prediction>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(&self) -> Option<Arc<MarketContract>> {
        self.contract.read().clone()
    }

    pub fn contract_id(&self) -> Option<String> {
        self.contract.read().as_ref().map(|c| c.id.clone())
    }

    /// Unconditionally install `contract`, returning the previous value.
    pub fn replace_contract(&self, contract: MarketContract) -> Option<Arc<MarketContract>> {
        self.contract.write().replace(Arc::new(contract))
    }

    /// Install `contract` only while the held contract still has id `expected_id`.
    ///
    /// Returns false (and leaves state untouched) if the contract was swapped
    /// in the meantime.
    pub fn replace_contract_if(&self, expected_id: &str, contract: MarketContract) -> bool {
        let mut slot = self.contract.write();
        match slot.as_ref() {
            Some(held) if held.id == expected_id => {
                *slot = Some(Arc::new(contract));
                true
            }
            _ => false,
        }
    }

    pub fn prediction(&self, venue: Venue) -> Option<Prediction> {
        self.predictions.read().get(&venue).copied()
    }

    pub fn set_prediction(&self, venue: Venue, prediction: Prediction) {
        self.predictions.write().insert(venue, prediction);
    }

    /// Freshest prediction across all venues.
    pub fn latest_prediction(&self) -> Option<(Venue, Prediction)> {
        self.predictions
            .read()
            .iter()
            .max_by_key(|(_, p)| p.timestamp)
            .map(|(v, p)| (*v, *p))
    }
}
