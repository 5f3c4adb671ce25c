//! SettlementAuditor: closes OPEN trades whose contract has ended.
//!
//! A trade is only closed once the market reports a winning outcome. Until
//! then it stays OPEN and is retried on every pass, unless a maximum
//! resolution age is configured, in which case it is eventually closed as
//! `EXPIRED` with no pnl.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{CloseReason, Side, Trade, TradeClose};
use crate::ports::SettlementMarket;
use crate::store::{CloseOutcome, StoreError, TradeStore};

/// Counts from one audit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    /// OPEN trades past their end time (plus buffer).
    pub checked: usize,
    /// Closed with a resolved outcome.
    pub resolved: usize,
    /// Left OPEN for the next pass.
    pub pending: usize,
    /// Closed as `EXPIRED` after the maximum resolution age.
    pub expired: usize,
}

pub struct SettlementAuditor {
    trades: Arc<TradeStore>,
    market: Arc<dyn SettlementMarket>,
    expiry_buffer: Duration,
    max_resolution_age: Option<Duration>,
}

impl SettlementAuditor {
    pub fn new(trades: Arc<TradeStore>, market: Arc<dyn SettlementMarket>) -> Self {
        Self {
            trades,
            market,
            expiry_buffer: Duration::from_secs(60),
            max_resolution_age: None,
        }
    }

    /// Wait this long past a contract's end before asking for its resolution.
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Close trades still unresolved this long after their contract ended.
    pub fn with_max_resolution_age(mut self, age: Option<Duration>) -> Self {
        self.max_resolution_age = age;
        self
    }

    /// One pass over the OPEN book.
    ///
    /// Market failures leave the trade pending; only store failures abort
    /// the pass.
    pub fn audit_once(&self, now: DateTime<Utc>) -> Result<AuditSummary, StoreError> {
        let mut summary = AuditSummary::default();

        for trade in self.trades.get_open_trades()? {
            if !past(trade.contract_end, self.expiry_buffer, now) {
                continue;
            }
            summary.checked += 1;

            let winner = match self.market.get_resolution(&trade.contract_id) {
                Ok(Some(label)) => match Side::from_outcome_label(&label) {
                    Some(side) => Some(side),
                    None => {
                        warn!(trade_id = %trade.id, label = %label, "unrecognized resolution label");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(trade_id = %trade.id, error = %e, "resolution lookup failed");
                    None
                }
            };

            match winner {
                Some(side) => {
                    if self.close(&trade, resolved_close(&trade, side, now))? {
                        summary.resolved += 1;
                    }
                }
                None => match self.max_resolution_age {
                    Some(age) if past(trade.contract_end, age, now) => {
                        let close = TradeClose {
                            pnl: None,
                            reason: CloseReason::Expired,
                            result_side: None,
                            exit_price: None,
                            closed_at: now,
                        };
                        if self.close(&trade, close)? {
                            warn!(trade_id = %trade.id, "closed unresolved trade as expired");
                            summary.expired += 1;
                        }
                    }
                    _ => {
                        debug!(trade_id = %trade.id, "not yet resolved");
                        summary.pending += 1;
                    }
                },
            }
        }

        if summary.checked > 0 {
            info!(
                checked = summary.checked,
                resolved = summary.resolved,
                pending = summary.pending,
                expired = summary.expired,
                "audit pass complete"
            );
        }
        Ok(summary)
    }

    fn close(&self, trade: &Trade, close: TradeClose) -> Result<bool, StoreError> {
        let outcome = self.trades.close_trade(&trade.id, &close)?;
        if outcome == CloseOutcome::Closed {
            info!(
                trade_id = %trade.id,
                reason = %close.reason,
                pnl = ?close.pnl,
                "trade settled"
            );
        }
        Ok(outcome == CloseOutcome::Closed)
    }
}

fn past(end: DateTime<Utc>, by: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(by) {
        Ok(by) => now > end + by,
        Err(_) => false,
    }
}

/// Payout is 1 when the held side won, else 0; pnl is payout minus cost.
fn resolved_close(trade: &Trade, winner: Side, now: DateTime<Utc>) -> TradeClose {
    let payout = if trade.side == winner { 1.0 } else { 0.0 };
    TradeClose {
        pnl: Some(payout - trade.cost_basis()),
        reason: CloseReason::Resolved,
        result_side: Some(winner),
        exit_price: Some(payout),
        closed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketContract, NewTrade, TradeStatus};
    use crate::ports::MarketError;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeMarket {
        resolutions: Mutex<HashMap<String, String>>,
        fail: Mutex<bool>,
    }

    impl FakeMarket {
        fn resolve(&self, id: &str, label: &str) {
            self.resolutions.lock().insert(id.into(), label.into());
        }
    }

    impl SettlementMarket for FakeMarket {
        fn find_active_contract(&self) -> Result<Option<MarketContract>, MarketError> {
            Ok(None)
        }

        fn get_live_quote(&self, _: &MarketContract) -> Result<[f64; 2], MarketError> {
            Ok([0.5, 0.5])
        }

        fn get_resolution(&self, id: &str) -> Result<Option<String>, MarketError> {
            if *self.fail.lock() {
                return Err(MarketError::NetworkUnreachable("down".into()));
            }
            Ok(self.resolutions.lock().get(id).cloned())
        }
    }

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap()
    }

    fn trade(id: &str, side: Side, prob: f64, entry_price: Option<f64>) -> NewTrade {
        NewTrade {
            id: id.into(),
            contract_id: id.into(),
            label: "Bitcoin Up or Down".into(),
            contract_end: end(),
            side,
            entry_probability: prob,
            entry_price,
            profit_target: entry_price.map(|p| p + 0.03),
            entry_time: end() - chrono::Duration::minutes(4),
        }
    }

    fn setup() -> (Arc<TradeStore>, Arc<FakeMarket>) {
        (
            Arc::new(TradeStore::open_in_memory().unwrap()),
            Arc::new(FakeMarket::default()),
        )
    }

    #[test]
    fn losing_up_trade_loses_entry_price() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();
        market.resolve("m1", "Down");

        let auditor = SettlementAuditor::new(store.clone(), market);
        let s = auditor.audit_once(end() + chrono::Duration::minutes(2)).unwrap();
        assert_eq!(s.resolved, 1);

        let t = store.get("m1").unwrap().unwrap();
        assert_eq!(t.status, TradeStatus::Closed);
        assert_eq!(t.close_reason, Some(CloseReason::Resolved));
        assert_eq!(t.result_side, Some(Side::Down));
        assert!((t.pnl.unwrap() + 0.60).abs() < 1e-9);
    }

    #[test]
    fn winning_down_trade_uses_probability_fallback() {
        let (store, market) = setup();
        store.log_trade(&trade("m2", Side::Down, 0.30, None)).unwrap();
        market.resolve("m2", "No");

        let auditor = SettlementAuditor::new(store.clone(), market);
        auditor.audit_once(end() + chrono::Duration::minutes(2)).unwrap();

        let t = store.get("m2").unwrap().unwrap();
        // cost = 1 - 0.30
        assert!((t.pnl.unwrap() - 0.30).abs() < 1e-9);
        assert_eq!(t.is_win(), Some(true));
    }

    #[test]
    fn respects_expiry_buffer() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();
        market.resolve("m1", "Up");

        let auditor = SettlementAuditor::new(store.clone(), market);
        let s = auditor.audit_once(end() + chrono::Duration::seconds(30)).unwrap();
        assert_eq!(s, AuditSummary::default());
        assert!(store.get("m1").unwrap().unwrap().is_open());
    }

    #[test]
    fn unresolved_stays_open_indefinitely_by_default() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();

        let auditor = SettlementAuditor::new(store.clone(), market);
        let s = auditor.audit_once(end() + chrono::Duration::days(30)).unwrap();
        assert_eq!(s.pending, 1);
        assert!(store.get("m1").unwrap().unwrap().is_open());
    }

    #[test]
    fn market_failure_leaves_trade_pending() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();
        market.resolve("m1", "Up");
        *market.fail.lock() = true;

        let auditor = SettlementAuditor::new(store.clone(), market.clone());
        let s = auditor.audit_once(end() + chrono::Duration::minutes(5)).unwrap();
        assert_eq!(s.pending, 1);

        *market.fail.lock() = false;
        let s = auditor.audit_once(end() + chrono::Duration::minutes(6)).unwrap();
        assert_eq!(s.resolved, 1);
    }

    #[test]
    fn max_age_closes_as_expired_without_pnl() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();

        let auditor = SettlementAuditor::new(store.clone(), market)
            .with_max_resolution_age(Some(Duration::from_secs(3600)));
        let s = auditor.audit_once(end() + chrono::Duration::minutes(30)).unwrap();
        assert_eq!(s.pending, 1);

        let s = auditor.audit_once(end() + chrono::Duration::hours(2)).unwrap();
        assert_eq!(s.expired, 1);
        let t = store.get("m1").unwrap().unwrap();
        assert_eq!(t.close_reason, Some(CloseReason::Expired));
        assert_eq!(t.pnl, None);
    }

    #[test]
    fn already_closed_trades_are_not_rechecked() {
        let (store, market) = setup();
        store.log_trade(&trade("m1", Side::Up, 0.72, Some(0.60))).unwrap();
        store
            .close_trade(
                "m1",
                &TradeClose {
                    pnl: Some(0.06),
                    reason: CloseReason::TakeProfit,
                    result_side: None,
                    exit_price: Some(0.66),
                    closed_at: end() - chrono::Duration::minutes(1),
                },
            )
            .unwrap();
        market.resolve("m1", "Down");

        let auditor = SettlementAuditor::new(store.clone(), market);
        let s = auditor.audit_once(end() + chrono::Duration::minutes(5)).unwrap();
        assert_eq!(s.checked, 0);
        let t = store.get("m1").unwrap().unwrap();
        assert_eq!(t.close_reason, Some(CloseReason::TakeProfit));
        assert!((t.pnl.unwrap() - 0.06).abs() < 1e-9);
    }
}
