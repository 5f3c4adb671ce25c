//! MarketContract: cached view of a short-lived binary settlement contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// A binary contract with two complementary outcomes.
///
/// Index 0 of every pair is the Up/Yes outcome, index 1 the Down/No outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContract {
    pub id: String,
    pub slug: String,
    pub question: String,
    pub end_time: DateTime<Utc>,
    pub outcomes: [String; 2],
    pub token_ids: [String; 2],
    pub outcome_prices: [f64; 2],
    pub closed: bool,
    pub resolved: bool,
    /// When `outcome_prices` were last refreshed from the live book.
    pub quoted_at: Option<DateTime<Utc>>,
}

impl MarketContract {
    pub fn price_for(&self, side: Side) -> f64 {
        self.outcome_prices[side.index()]
    }

    pub fn token_for(&self, side: Side) -> &str {
        &self.token_ids[side.index()]
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Open for new positions: not closed, not resolved, not past its end.
    pub fn is_tradeable(&self, now: DateTime<Utc>) -> bool {
        !self.closed && !self.resolved && !self.has_ended(now)
    }

    /// A copy of this contract carrying a fresh live quote.
    pub fn with_quote(&self, prices: [f64; 2], at: DateTime<Utc>) -> Self {
        Self {
            outcome_prices: prices,
            quoted_at: Some(at),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_contract() -> MarketContract {
        MarketContract {
            id: "512345".into(),
            slug: "btc-updown-5m-1709294400".into(),
            question: "Bitcoin Up or Down - 12:00PM-12:05PM ET".into(),
            end_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap(),
            outcomes: ["Up".into(), "Down".into()],
            token_ids: ["111".into(), "222".into()],
            outcome_prices: [0.5, 0.5],
            closed: false,
            resolved: false,
            quoted_at: None,
        }
    }

    #[test]
    fn price_for_uses_side_index() {
        let c = sample_contract().with_quote([0.6, 0.41], Utc::now());
        assert!((c.price_for(Side::Up) - 0.6).abs() < 1e-12);
        assert!((c.price_for(Side::Down) - 0.41).abs() < 1e-12);
        assert_eq!(c.token_for(Side::Down), "222");
    }

    #[test]
    fn with_quote_keeps_identity() {
        let c = sample_contract();
        let q = c.with_quote([0.7, 0.3], c.end_time);
        assert_eq!(q.id, c.id);
        assert_eq!(q.quoted_at, Some(c.end_time));
    }

    #[test]
    fn not_tradeable_after_end() {
        let c = sample_contract();
        assert!(c.is_tradeable(c.end_time - chrono::Duration::seconds(1)));
        assert!(!c.is_tradeable(c.end_time));
    }
}
