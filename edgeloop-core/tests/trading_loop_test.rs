//! Strategy, tracker, and auditor driven together over shared state and an
//! in-memory ledger, the way the service loops run them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use edgeloop_core::clock::{Clock, ManualClock};
use edgeloop_core::contract::ContractTracker;
use edgeloop_core::domain::{CloseReason, MarketContract, Prediction, Side, Venue};
use edgeloop_core::ports::{MarketError, SettlementMarket};
use edgeloop_core::settlement::{PerformanceReport, SettlementAuditor};
use edgeloop_core::state::SharedState;
use edgeloop_core::store::TradeStore;
use edgeloop_core::strategy::{Decision, SkipReason, StrategyEngine, StrategyParams};
use parking_lot::Mutex;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 10).unwrap()
}

fn contract(id: &str, end: DateTime<Utc>) -> MarketContract {
    MarketContract {
        id: id.to_string(),
        slug: format!("btc-updown-5m-{}", end.timestamp() - 300),
        question: "Bitcoin Up or Down".to_string(),
        end_time: end,
        outcomes: ["Up".to_string(), "Down".to_string()],
        token_ids: ["111".to_string(), "222".to_string()],
        outcome_prices: [0.5, 0.5],
        closed: false,
        resolved: false,
        quoted_at: None,
    }
}

#[derive(Default)]
struct ScriptedMarket {
    active: Mutex<Option<MarketContract>>,
    quote: Mutex<[f64; 2]>,
    resolutions: Mutex<HashMap<String, String>>,
}

impl SettlementMarket for ScriptedMarket {
    fn find_active_contract(&self) -> Result<Option<MarketContract>, MarketError> {
        Ok(self.active.lock().clone())
    }

    fn get_live_quote(&self, _: &MarketContract) -> Result<[f64; 2], MarketError> {
        Ok(*self.quote.lock())
    }

    fn get_resolution(&self, id: &str) -> Result<Option<String>, MarketError> {
        Ok(self.resolutions.lock().get(id).cloned())
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    state: Arc<SharedState>,
    trades: Arc<TradeStore>,
    market: Arc<ScriptedMarket>,
    tracker: ContractTracker,
    engine: StrategyEngine,
    auditor: SettlementAuditor,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let state = Arc::new(SharedState::new());
        let trades = Arc::new(TradeStore::open_in_memory().unwrap());
        let market = Arc::new(ScriptedMarket::default());
        let params = StrategyParams {
            entry_threshold: 0.65,
            unwind_threshold: 0.65,
            min_edge: 0.05,
            ..StrategyParams::default()
        };
        let tracker = ContractTracker::new(market.clone(), state.clone(), clock.clone());
        let engine =
            StrategyEngine::new(params, state.clone(), trades.clone(), clock.clone()).unwrap();
        let auditor = SettlementAuditor::new(trades.clone(), market.clone());
        Self {
            clock,
            state,
            trades,
            market,
            tracker,
            engine,
            auditor,
        }
    }

    fn list(&self, id: &str, quote: [f64; 2]) {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
        *self.market.active.lock() = Some(contract(id, end));
        *self.market.quote.lock() = quote;
        self.tracker.refresh().unwrap();
        self.tracker.refresh_quote().unwrap();
    }

    fn quote(&self, quote: [f64; 2]) {
        *self.market.quote.lock() = quote;
        self.tracker.refresh_quote().unwrap();
    }

    fn predict(&self, prob_up: f64) {
        self.state
            .set_prediction(Venue::Binance, Prediction::new(self.clock.now(), prob_up));
    }
}

#[test]
fn entry_then_stop_loss_at_live_quote() {
    let h = Harness::new();
    h.list("m1", [0.60, 0.41]);
    h.predict(0.72);

    let d = h.engine.tick().unwrap();
    assert!(matches!(d, Decision::Enter { side: Side::Up, .. }));
    let t = h.trades.get("m1").unwrap().unwrap();
    assert!(t.is_open());
    assert_eq!(t.entry_price, Some(0.60));
    assert!((t.profit_target.unwrap() - 0.66).abs() < 1e-9);

    // Quote already above target, but conviction faded: stop-loss wins.
    h.clock.advance(Duration::seconds(20));
    h.quote([0.67, 0.34]);
    h.predict(0.64);
    let d = h.engine.tick().unwrap();
    assert!(matches!(
        d,
        Decision::Exit {
            reason: CloseReason::StopLoss,
            ..
        }
    ));

    let t = h.trades.get("m1").unwrap().unwrap();
    assert_eq!(t.close_reason, Some(CloseReason::StopLoss));
    assert_eq!(t.exit_price, Some(0.67));
    assert!((t.pnl.unwrap() - 0.07).abs() < 1e-9);
}

#[test]
fn take_profit_then_no_reentry() {
    let h = Harness::new();
    h.list("m1", [0.60, 0.41]);
    h.predict(0.72);
    h.engine.tick().unwrap();

    h.clock.advance(Duration::seconds(5));
    h.quote([0.68, 0.33]);
    h.predict(0.74);
    let d = h.engine.tick().unwrap();
    assert!(matches!(
        d,
        Decision::Exit {
            reason: CloseReason::TakeProfit,
            ..
        }
    ));

    h.clock.advance(Duration::seconds(5));
    h.quote([0.55, 0.46]);
    h.predict(0.90);
    assert_eq!(
        h.engine.tick().unwrap(),
        Decision::Skip(SkipReason::AlreadyTraded)
    );
    assert_eq!(h.trades.all().unwrap().len(), 1);
}

#[test]
fn expired_position_settles_against_resolution() {
    let h = Harness::new();
    h.list("m1", [0.60, 0.41]);
    h.predict(0.72);
    h.engine.tick().unwrap();

    // Past the end: the strategy holds, the auditor settles.
    h.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 30).unwrap());
    h.predict(0.10);
    assert_eq!(h.engine.tick().unwrap(), Decision::Hold);

    h.market.resolutions.lock().insert("m1".to_string(), "Down".to_string());
    let early = h.auditor.audit_once(h.clock.now()).unwrap();
    assert_eq!(early.checked, 0);

    h.clock.advance(Duration::minutes(2));
    let summary = h.auditor.audit_once(h.clock.now()).unwrap();
    assert_eq!(summary.resolved, 1);

    let t = h.trades.get("m1").unwrap().unwrap();
    assert_eq!(t.close_reason, Some(CloseReason::Resolved));
    assert_eq!(t.result_side, Some(Side::Down));
    assert!((t.pnl.unwrap() + 0.60).abs() < 1e-9);

    let report = PerformanceReport::from_trades(&h.trades.all().unwrap());
    assert_eq!(report.losses, 1);
    assert_eq!(report.open, 0);
}

#[test]
fn new_contract_allows_new_entry() {
    let h = Harness::new();
    h.list("m1", [0.60, 0.41]);
    h.predict(0.72);
    h.engine.tick().unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 5).unwrap());
    let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();
    *h.market.active.lock() = Some(contract("m2", end));
    h.tracker.refresh().unwrap();
    h.quote([0.45, 0.56]);
    h.predict(0.25);

    let d = h.engine.tick().unwrap();
    assert!(matches!(d, Decision::Enter { side: Side::Down, .. }));
    assert_eq!(h.trades.get_open_trades().unwrap().len(), 2);
}
