//! Trade: a simulated position on one settlement contract instance.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contract::MarketContract;

/// Outcome side of a binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Up => "UP",
            Side::Down => "DOWN",
        }
    }

    /// Index into a contract's two-element price array (0 = Up/Yes).
    pub fn index(&self) -> usize {
        match self {
            Side::Up => 0,
            Side::Down => 1,
        }
    }

    /// Model confidence in this side given a probability of up.
    pub fn confidence(&self, prob_up: f64) -> f64 {
        match self {
            Side::Up => prob_up,
            Side::Down => 1.0 - prob_up,
        }
    }

    /// Map an external outcome label (`Yes`/`Up`, `No`/`Down`) to a side.
    pub fn from_outcome_label(label: &str) -> Option<Side> {
        match label.trim().to_ascii_lowercase().as_str() {
            "yes" | "up" => Some(Side::Up),
            "no" | "down" => Some(Side::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Side::from_outcome_label(s).ok_or_else(|| format!("unknown side '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(TradeStatus::Open),
            "CLOSED" => Ok(TradeStatus::Closed),
            other => Err(format!("unknown trade status '{other}'")),
        }
    }
}

/// Why a trade left the OPEN state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    /// Closed by the settlement auditor against the external resolution.
    Resolved,
    /// Closed by the max-age escape hatch without a resolution.
    Expired,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::Resolved => "RESOLVED",
            CloseReason::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOP_LOSS" => Ok(CloseReason::StopLoss),
            "TAKE_PROFIT" => Ok(CloseReason::TakeProfit),
            "RESOLVED" => Ok(CloseReason::Resolved),
            "EXPIRED" => Ok(CloseReason::Expired),
            other => Err(format!("unknown close reason '{other}'")),
        }
    }
}

/// Fields recorded when a position is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub id: String,
    pub contract_id: String,
    pub label: String,
    pub contract_end: DateTime<Utc>,
    pub side: Side,
    pub entry_probability: f64,
    pub entry_price: Option<f64>,
    pub profit_target: Option<f64>,
    pub entry_time: DateTime<Utc>,
}

impl NewTrade {
    /// A trade keyed by the contract id, so each contract instance holds at most one.
    pub fn for_contract(
        contract: &MarketContract,
        side: Side,
        entry_probability: f64,
        entry_price: f64,
        profit_target: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: contract.id.clone(),
            contract_id: contract.id.clone(),
            label: contract.question.clone(),
            contract_end: contract.end_time,
            side,
            entry_probability,
            entry_price: Some(entry_price),
            profit_target: Some(profit_target),
            entry_time,
        }
    }
}

/// Terminal fields written by the single OPEN→CLOSED transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeClose {
    pub pnl: Option<f64>,
    pub reason: CloseReason,
    pub result_side: Option<Side>,
    pub exit_price: Option<f64>,
    pub closed_at: DateTime<Utc>,
}

/// A row of the trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub id: String,
    pub contract_id: String,
    pub label: String,
    pub contract_end: DateTime<Utc>,

    // ── Entry ──
    pub side: Side,
    pub entry_probability: f64,
    pub entry_price: Option<f64>,
    pub profit_target: Option<f64>,
    pub entry_time: DateTime<Utc>,

    // ── Lifecycle ──
    pub status: TradeStatus,
    pub close_reason: Option<CloseReason>,
    pub result_side: Option<Side>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Cost of the position: the recorded entry price, or the
    /// probability-implied price when none was captured.
    pub fn cost_basis(&self) -> f64 {
        match self.entry_price {
            Some(p) if p > 0.0 => p,
            _ => self.side.confidence(self.entry_probability),
        }
    }

    /// Win/loss once a result side is known.
    pub fn is_win(&self) -> Option<bool> {
        self.result_side.map(|r| r == self.side)
    }
}
