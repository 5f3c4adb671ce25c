//! ContractTracker: keeps the shared active contract current.
//!
//! Discovery swaps the contract only when the market reports a different id.
//! Quote refresh enriches the held contract with live prices and installs it
//! only if nothing swapped the contract while the quote was in flight.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::ports::{MarketError, SettlementMarket};
use crate::state::SharedState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerUpdate {
    /// The active contract id is the one already held.
    Unchanged,
    /// A different contract was installed.
    Replaced { previous: Option<String>, current: String },
    /// No active contract; the held one (if any) is kept.
    NotFound,
}

pub struct ContractTracker {
    market: Arc<dyn SettlementMarket>,
    state: Arc<SharedState>,
    clock: Arc<dyn Clock>,
}

impl ContractTracker {
    pub fn new(
        market: Arc<dyn SettlementMarket>,
        state: Arc<SharedState>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            market,
            state,
            clock,
        }
    }

    /// Look up the active contract. A failed or empty lookup never clears
    /// the held contract.
    pub fn refresh(&self) -> Result<TrackerUpdate, MarketError> {
        let Some(found) = self.market.find_active_contract()? else {
            debug!("no active contract");
            return Ok(TrackerUpdate::NotFound);
        };

        let held = self.state.contract_id();
        if held.as_deref() == Some(found.id.as_str()) {
            return Ok(TrackerUpdate::Unchanged);
        }

        let current = found.id.clone();
        info!(
            previous = ?held,
            contract = %current,
            slug = %found.slug,
            end_time = %found.end_time,
            "active contract changed"
        );
        self.state.replace_contract(found);
        Ok(TrackerUpdate::Replaced {
            previous: held,
            current,
        })
    }

    /// Fetch a live quote for the held contract. Returns false when there is
    /// no contract or it was replaced before the quote landed.
    pub fn refresh_quote(&self) -> Result<bool, MarketError> {
        let Some(held) = self.state.contract() else {
            return Ok(false);
        };
        let prices = self.market.get_live_quote(&held)?;
        let quoted = held.with_quote(prices, self.clock.now());
        let installed = self.state.replace_contract_if(&held.id, quoted);
        if !installed {
            debug!(contract = %held.id, "contract swapped during quote; dropped");
        }
        Ok(installed)
    }
}
