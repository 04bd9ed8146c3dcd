//! Reporting and export: JSON, CSV, and Markdown artifacts.
//!
//! - **JSON**: the full `BacktestReport` with schema versioning
//! - **CSV**: trade list and equity curve for external tools
//! - **Markdown**: a human-readable single-run summary
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use stratlab_core::{BacktestResult, ClosedTrade, EquityPoint};

use crate::runner::{BacktestReport, SCHEMA_VERSION};
use crate::sweep::SweepReport;

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a `BacktestReport`, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: symbol, entry_bar, entry_time, entry_price, exit_bar, exit_time,
/// exit_price, quantity, gross_pnl, commission, net_pnl, bars_held, exit_reason
pub fn export_trades_csv(trades: &[ClosedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "quantity",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
        "exit_reason",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.symbol,
            &t.entry_bar.to_string(),
            &t.entry_time.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &t.exit_bar.to_string(),
            &t.exit_time.to_rfc3339(),
            &format!("{:.6}", t.exit_price),
            &format!("{:.6}", t.quantity),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.net_pnl),
            &t.bars_held.to_string(),
            &t.exit_reason.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "equity"])?;
    for point in equity_curve {
        wtr.write_record([&point.time.to_rfc3339(), &format!("{:.2}", point.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per sweep point, ranked order. Failed points carry their error.
pub fn export_sweep_csv(report: &SweepReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "assignments",
        "score",
        "total_return",
        "sharpe",
        "max_drawdown",
        "trades",
        "error",
    ])?;
    for (i, p) in report.points.iter().enumerate() {
        let metric = |f: fn(&BacktestResult) -> f64| {
            p.result.as_ref().map(|r| format!("{:.6}", f(r))).unwrap_or_default()
        };
        wtr.write_record([
            &(i + 1).to_string(),
            &p.label(),
            &p.score.map(|s| format!("{s:.6}")).unwrap_or_default(),
            &metric(|r| r.total_return),
            &metric(|r| r.sharpe_ratio),
            &metric(|r| r.max_drawdown),
            &p.result
                .as_ref()
                .map(|r| r.total_trades.to_string())
                .unwrap_or_default(),
            &p.error.clone().unwrap_or_default(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one run under `output_dir/{strategy_id}_{timestamp}/`:
/// - `report.json`: the full `BacktestReport`
/// - `trades.csv`: closed trades
/// - `equity.csv`: equity per bar
/// - `report.md`: Markdown summary
///
/// Returns the created directory.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(run_dir_name(&report.strategy_id));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(
        run_dir.join("trades.csv"),
        export_trades_csv(&report.result.trades)?,
    )?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(&report.result.equity_curve)?,
    )?;
    std::fs::write(run_dir.join("report.md"), generate_report(report))?;

    log::info!("artifacts written to {}", run_dir.display());
    Ok(run_dir)
}

/// Load a `BacktestReport` from an artifact directory's report.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Save `sweep.json` and `sweep.csv` under `output_dir/{strategy_id}_sweep_{timestamp}/`.
pub fn save_sweep_artifacts(report: &SweepReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(run_dir_name(&format!("{}_sweep", report.strategy_id)));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;
    let json = serde_json::to_string_pretty(report).context("failed to serialize sweep")?;
    std::fs::write(run_dir.join("sweep.json"), json)?;
    std::fs::write(run_dir.join("sweep.csv"), export_sweep_csv(report)?)?;
    log::info!("sweep artifacts written to {}", run_dir.display());
    Ok(run_dir)
}

fn run_dir_name(stem: &str) -> String {
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}", safe, chrono::Utc::now().format("%Y%m%d_%H%M%S%3f"))
}

// ─── Markdown reports ───────────────────────────────────────────────

pub fn generate_report(report: &BacktestReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str(&format!("# Backtest Report: {}\n\n", report.strategy_name));

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Strategy | {} |\n", report.strategy_id));
    md.push_str(&format!("| Fingerprint | {} |\n", report.fingerprint));
    md.push_str(&format!(
        "| Symbol | {} ({}) |\n",
        report.symbol,
        report.timeframe.as_str()
    ));
    match (report.start, report.end) {
        (Some(start), Some(end)) => md.push_str(&format!(
            "| Period | {} to {} |\n",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        )),
        _ => md.push_str("| Period | (no bars) |\n"),
    }
    md.push_str(&format!(
        "| Bars | {} ({} skipped) |\n",
        report.bar_count, report.result.skipped_timesteps
    ));
    md.push_str(&format!("| Dataset Hash | {} |\n", report.dataset_hash));
    if report.synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    let r = &report.result;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Total Return | {:.2}% |\n", r.total_return * 100.0));
    md.push_str(&format!("| Final Equity | {:.2} |\n", r.final_equity));
    md.push_str(&format!("| Sharpe | {:.3} |\n", r.sharpe_ratio));
    md.push_str(&format!("| Sortino | {:.3} |\n", r.sortino_ratio));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", r.max_drawdown * 100.0));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", r.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", r.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", r.total_trades));
    md.push_str(&format!("| Commission | {:.2} |\n", r.total_commission));
    md.push_str(&format!(
        "| Signals | {} ({} rejected) |\n",
        r.signal_count, r.rejected_signals
    ));
    md.push('\n');

    if !r.trades.is_empty() {
        md.push_str("## Trades\n\n");
        md.push_str("| Entry | Exit | Qty | Entry Price | Exit Price | Net PnL | Reason |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- | --- |\n");
        for t in &r.trades {
            md.push_str(&format!(
                "| {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {} |\n",
                t.entry_time.format("%Y-%m-%d"),
                t.exit_time.format("%Y-%m-%d"),
                t.quantity,
                t.entry_price,
                t.exit_price,
                t.net_pnl,
                t.exit_reason
            ));
        }
        md.push('\n');
    }

    if !report.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warn in &report.warnings {
            md.push_str(&format!("- {warn}\n"));
        }
        md.push('\n');
    }

    md
}
