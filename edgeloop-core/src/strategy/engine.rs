//! StrategyEngine: per-contract state machine NONE → OPEN → CLOSED.
//!
//! Entry fires when the model clears the entry threshold on either side *and*
//! its confidence beats the live quote for that side by more than `min_edge`.
//! The profit target is the quote plus half the edge.
//!
//! Exits, first match wins:
//! 1. STOP_LOSS: the held side's confidence drops below the unwind threshold;
//!    closes at the live quote.
//! 2. TAKE_PROFIT: the live quote reaches the target; closes at the target.
//!
//! Expiry is left to the settlement auditor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use super::params::StrategyParams;
use crate::clock::Clock;
use crate::domain::{
    CloseReason, MarketContract, NewTrade, Prediction, Side, Trade, TradeClose, Venue,
};
use crate::state::SharedState;
use crate::store::{CloseOutcome, StoreError, TradeStore};

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoContract,
    ContractNotTradeable,
    NoPrediction,
    InvalidPrediction,
    StalePrediction,
    BelowThreshold,
    InvalidQuote,
    InsufficientEdge,
    AlreadyTraded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// An open position stays open.
    Hold,
    /// No position and no entry.
    Skip(SkipReason),
    Enter {
        side: Side,
        price: f64,
        target: f64,
        edge: f64,
        prob_up: f64,
    },
    Exit {
        trade_id: String,
        reason: CloseReason,
        price: f64,
        pnl: f64,
    },
}

/// Pure decision for one evaluation.
///
/// `open` is the OPEN trade on `contract`, if any. `already_traded` is true
/// when a trade for this contract exists in any state, which blocks re-entry.
pub fn decide(
    prediction: Option<&Prediction>,
    contract: &MarketContract,
    open: Option<&Trade>,
    already_traded: bool,
    params: &StrategyParams,
    now: DateTime<Utc>,
) -> Decision {
    let fresh = prediction.filter(|p| {
        p.is_valid()
            && p.age(now)
                .to_std()
                .map(|age| age <= params.max_prediction_age)
                .unwrap_or(true)
    });

    if let Some(trade) = open {
        return manage_open(trade, fresh, contract, params, now);
    }
    if already_traded {
        return Decision::Skip(SkipReason::AlreadyTraded);
    }

    let p = match prediction {
        None => return Decision::Skip(SkipReason::NoPrediction),
        Some(p) if !p.is_valid() => return Decision::Skip(SkipReason::InvalidPrediction),
        Some(_) => match fresh {
            Some(p) => p,
            None => return Decision::Skip(SkipReason::StalePrediction),
        },
    };
    if !contract.is_tradeable(now) {
        return Decision::Skip(SkipReason::ContractNotTradeable);
    }

    let side = if p.prob_up >= params.entry_threshold {
        Side::Up
    } else if p.prob_up <= 1.0 - params.entry_threshold {
        Side::Down
    } else {
        return Decision::Skip(SkipReason::BelowThreshold);
    };

    let quote = contract.price_for(side);
    if !is_valid_quote(quote) {
        return Decision::Skip(SkipReason::InvalidQuote);
    }

    let edge = side.confidence(p.prob_up) - quote;
    if edge <= params.min_edge {
        return Decision::Skip(SkipReason::InsufficientEdge);
    }

    Decision::Enter {
        side,
        price: quote,
        target: quote + edge / 2.0,
        edge,
        prob_up: p.prob_up,
    }
}

fn manage_open(
    trade: &Trade,
    prediction: Option<&Prediction>,
    contract: &MarketContract,
    params: &StrategyParams,
    now: DateTime<Utc>,
) -> Decision {
    if contract.has_ended(now) {
        return Decision::Hold;
    }
    let quote = contract.price_for(trade.side);
    if !is_valid_quote(quote) {
        return Decision::Hold;
    }
    let cost = trade.cost_basis();

    if let Some(p) = prediction {
        if trade.side.confidence(p.prob_up) < params.unwind_threshold {
            return Decision::Exit {
                trade_id: trade.id.clone(),
                reason: CloseReason::StopLoss,
                price: quote,
                pnl: quote - cost,
            };
        }
    }

    if let Some(target) = trade.profit_target {
        if quote >= target {
            return Decision::Exit {
                trade_id: trade.id.clone(),
                reason: CloseReason::TakeProfit,
                price: target,
                pnl: target - cost,
            };
        }
    }

    Decision::Hold
}

fn is_valid_quote(q: f64) -> bool {
    q.is_finite() && q > 0.0 && q < 1.0
}

/// Applies [`decide`] against shared state and the trade ledger.
pub struct StrategyEngine {
    params: StrategyParams,
    state: Arc<SharedState>,
    trades: Arc<TradeStore>,
    clock: Arc<dyn Clock>,
    prediction_venue: Option<Venue>,
}

impl StrategyEngine {
    pub fn new(
        params: StrategyParams,
        state: Arc<SharedState>,
        trades: Arc<TradeStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StrategyError> {
        params.validate()?;
        Ok(Self {
            params,
            state,
            trades,
            clock,
            prediction_venue: None,
        })
    }

    /// Drive decisions from one venue's prediction instead of the freshest.
    pub fn with_prediction_venue(mut self, venue: Venue) -> Self {
        self.prediction_venue = Some(venue);
        self
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// One evaluation. Store failures propagate; the caller logs and retries
    /// on its next tick.
    pub fn tick(&self) -> Result<Decision, StrategyError> {
        let now = self.clock.now();
        let Some(contract) = self.state.contract() else {
            return Ok(Decision::Skip(SkipReason::NoContract));
        };
        let prediction = match self.prediction_venue {
            Some(v) => self.state.prediction(v),
            None => self.state.latest_prediction().map(|(_, p)| p),
        };

        let open = self
            .trades
            .get_open_trades()?
            .into_iter()
            .find(|t| t.contract_id == contract.id);
        let already_traded = open.is_none() && self.trades.has_trade(&contract.id)?;

        let decision = decide(
            prediction.as_ref(),
            &contract,
            open.as_ref(),
            already_traded,
            &self.params,
            now,
        );

        match &decision {
            Decision::Enter {
                side,
                price,
                target,
                edge,
                prob_up,
            } => {
                let trade = NewTrade::for_contract(&contract, *side, *prob_up, *price, *target, now);
                if self.trades.log_trade(&trade)? {
                    info!(
                        contract = %contract.id,
                        side = %side,
                        price,
                        target,
                        edge,
                        "entered position"
                    );
                }
            }
            Decision::Exit {
                trade_id,
                reason,
                price,
                pnl,
            } => {
                let close = TradeClose {
                    pnl: Some(*pnl),
                    reason: *reason,
                    result_side: None,
                    exit_price: Some(*price),
                    closed_at: now,
                };
                if self.trades.close_trade(trade_id, &close)? == CloseOutcome::Closed {
                    info!(trade_id = %trade_id, reason = %reason, price, pnl, "exited position");
                }
            }
            Decision::Hold => {}
            Decision::Skip(reason) => debug!(contract = %contract.id, reason = ?reason, "no entry"),
        }
        Ok(decision)
    }
}
