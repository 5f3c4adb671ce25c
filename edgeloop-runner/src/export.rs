//! Trade ledger export: CSV tape, JSON dump and the Markdown performance report.

use std::path::Path;

use anyhow::{Context, Result};
use edgeloop_core::domain::Trade;
use edgeloop_core::settlement::PerformanceReport;

fn opt_f64(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{x:.precision$}")).unwrap_or_default()
}

/// Export the trade ledger as CSV, one row per trade.
///
/// Columns: id, contract_id, label, contract_end, side, entry_probability,
/// entry_price, profit_target, entry_time, status, close_reason, result_side,
/// exit_price, pnl, closed_at
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "contract_id",
        "label",
        "contract_end",
        "side",
        "entry_probability",
        "entry_price",
        "profit_target",
        "entry_time",
        "status",
        "close_reason",
        "result_side",
        "exit_price",
        "pnl",
        "closed_at",
    ])?;

    for t in trades {
        wtr.write_record([
            t.id.as_str(),
            &t.contract_id,
            &t.label,
            &t.contract_end.to_rfc3339(),
            t.side.as_str(),
            &format!("{:.4}", t.entry_probability),
            &opt_f64(t.entry_price, 4),
            &opt_f64(t.profit_target, 4),
            &t.entry_time.to_rfc3339(),
            t.status.as_str(),
            t.close_reason.map(|r| r.as_str()).unwrap_or(""),
            t.result_side.map(|s| s.as_str()).unwrap_or(""),
            &opt_f64(t.exit_price, 4),
            &opt_f64(t.pnl, 4),
            &t.closed_at.map(|c| c.to_rfc3339()).unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_trades_json(trades: &[Trade]) -> Result<String> {
    serde_json::to_string_pretty(trades).context("failed to serialize trades to JSON")
}

/// Write the ledger to `path`; `.json` selects JSON, anything else CSV.
pub fn save_trades(trades: &[Trade], path: &Path) -> Result<()> {
    let body = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => export_trades_json(trades)?,
        _ => export_trades_csv(trades)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

pub fn save_report(trades: &[Trade], path: &Path) -> Result<PerformanceReport> {
    let report = PerformanceReport::from_trades(trades);
    std::fs::write(path, report.to_markdown())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(report)
}
