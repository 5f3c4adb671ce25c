//! Performance summary over the trade ledger.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::Trade;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    /// Closed trades with a realized pnl above zero.
    pub wins: usize,
    /// Closed trades with a realized pnl at or below zero.
    pub losses: usize,
    /// `wins / (wins + losses)`; zero when nothing has a realized pnl.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub best: Option<f64>,
    pub worst: Option<f64>,
    /// Closed trades by close reason.
    pub by_reason: BTreeMap<String, usize>,
}

impl PerformanceReport {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut report = Self {
            total: trades.len(),
            ..Self::default()
        };

        let mut realized = Vec::new();
        for trade in trades {
            if trade.is_open() {
                report.open += 1;
                continue;
            }
            report.closed += 1;
            if let Some(reason) = trade.close_reason {
                *report.by_reason.entry(reason.to_string()).or_default() += 1;
            }
            if let Some(pnl) = trade.pnl.filter(|p| p.is_finite()) {
                realized.push(pnl);
            }
        }

        report.wins = realized.iter().filter(|p| **p > 0.0).count();
        report.losses = realized.len() - report.wins;
        if !realized.is_empty() {
            report.win_rate = report.wins as f64 / realized.len() as f64;
            report.total_pnl = realized.iter().sum();
            report.avg_pnl = report.total_pnl / realized.len() as f64;
            report.best = realized.iter().copied().reduce(f64::max);
            report.worst = realized.iter().copied().reduce(f64::min);
        }
        report
    }

    pub fn to_markdown(&self) -> String {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:+.4}"));
        let mut out = format!(
            "# Trade Performance\n\n\
- Trades: {} ({} open, {} closed)\n\
- Wins / Losses: {} / {}\n\
- Win Rate: {:.1}%\n\
- Total PnL: {:+.4}\n\
- Avg PnL: {:+.4}\n\
- Best: {}\n\
- Worst: {}\n",
            self.total,
            self.open,
            self.closed,
            self.wins,
            self.losses,
            self.win_rate * 100.0,
            self.total_pnl,
            self.avg_pnl,
            fmt_opt(self.best),
            fmt_opt(self.worst),
        );
        if !self.by_reason.is_empty() {
            out.push_str("\n## Close Reasons\n\n| Reason | Count |\n|--------|-------|\n");
            for (reason, n) in &self.by_reason {
                out.push_str(&format!("| {reason} | {n} |\n"));
            }
        }
        out
    }
}
