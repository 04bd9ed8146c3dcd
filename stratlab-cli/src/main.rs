//! StratLab CLI: inspect the catalog, validate strategies, run backtests and sweeps.
//!
//! Commands:
//! - `catalog`: list the built-in components with their parameters and ports
//! - `validate`: check a strategy document and report errors and warnings
//! - `run`: backtest from a TOML config, or from a strategy plus a data file
//! - `sweep`: parameter sweep described by a config's `[sweep]` table
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for engine detail.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use stratlab_core::catalog::{ComponentDefinition, ParamDefault, PortDefault};
use stratlab_core::{validate, CancelFlag, Catalog, ComponentKind};
use stratlab_runner::{
    load_strategy, run_from_config, save_artifacts, save_sweep_artifacts, sweep_from_config,
    BacktestReport, DataConfig, Overrides, RunConfig, SweepReport,
};

#[derive(Parser)]
#[command(
    name = "stratlab",
    version,
    about = "StratLab CLI: compose, validate, and backtest strategy graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the component catalog.
    Catalog {
        /// Only this category.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a strategy document. Exits non-zero on errors.
    Validate {
        /// Path to a JSON strategy document.
        strategy: PathBuf,
    },
    /// Run a backtest from a TOML config file or a strategy plus market data.
    Run {
        /// Path to a TOML run config.
        #[arg(long, conflicts_with_all = ["strategy", "data", "synthetic"])]
        config: Option<PathBuf>,

        /// Path to a JSON strategy document (with --data or --synthetic).
        #[arg(long)]
        strategy: Option<PathBuf>,

        /// CSV or JSON bar file.
        #[arg(long, conflicts_with = "synthetic")]
        data: Option<PathBuf>,

        /// Generate this many synthetic bars instead of loading a file.
        #[arg(long)]
        synthetic: Option<usize>,

        /// First day included (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day included (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Output directory for artifacts. Overrides the config's output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the parameter sweep in a config's [sweep] table.
    Sweep {
        /// Path to a TOML run config with a [sweep] table.
        #[arg(long)]
        config: PathBuf,

        /// Rows to print. Defaults to the config's `top`, else 10.
        #[arg(long)]
        top: Option<usize>,

        /// Output directory for sweep artifacts. Overrides the config's output_dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Indicator,
    Condition,
    Action,
    Risk,
}

impl From<KindArg> for ComponentKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Indicator => ComponentKind::Indicator,
            KindArg::Condition => ComponentKind::Condition,
            KindArg::Action => ComponentKind::Action,
            KindArg::Risk => ComponentKind::Risk,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { kind, json } => run_catalog(kind.map(Into::into), json),
        Commands::Validate { strategy } => run_validate(strategy),
        Commands::Run {
            config,
            strategy,
            data,
            synthetic,
            start,
            end,
            output_dir,
            json,
        } => {
            let run_config = match config {
                Some(path) => RunConfig::from_file(&path)?,
                None => adhoc_config(strategy, data, synthetic, start, end)?,
            };
            run_backtest_cmd(run_config, output_dir, json)
        }
        Commands::Sweep {
            config,
            top,
            output_dir,
        } => run_sweep_cmd(RunConfig::from_file(&config)?, top, output_dir),
    }
}

// ─── catalog ─────────────────────────────────────────────────────────

fn run_catalog(kind: Option<ComponentKind>, json: bool) -> Result<()> {
    let defs: Vec<&ComponentDefinition> = Catalog::all()
        .iter()
        .copied()
        .filter(|d| kind.map_or(true, |k| d.kind == k))
        .collect();

    if json {
        let value: Vec<serde_json::Value> = defs.iter().map(|d| definition_json(d)).collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for def in defs {
        println!("{} [{}]: {}", def.name, def.kind, def.description);
        for p in def.parameters {
            println!(
                "    param  {:<14} {:<8} default {}",
                p.name,
                p.param_type,
                format_default(&p.default)
            );
        }
        for port in def.inputs {
            println!(
                "    in     {:<14} {:<8} {}",
                port.name,
                port.value_type,
                format_port_default(&port.default)
            );
        }
        for port in def.outputs {
            println!("    out    {:<14} {}", port.name, port.value_type);
        }
    }
    Ok(())
}

fn definition_json(def: &ComponentDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": def.name,
        "kind": def.kind,
        "description": def.description,
        "parameters": def.parameters.iter().map(|p| serde_json::json!({
            "name": p.name,
            "type": p.param_type,
            "default": format_default(&p.default),
            "min": p.min,
            "max": p.max,
            "choices": p.choices,
            "description": p.description,
        })).collect::<Vec<_>>(),
        "inputs": def.inputs.iter().map(|p| serde_json::json!({
            "name": p.name,
            "type": p.value_type,
            "default": format_port_default(&p.default),
        })).collect::<Vec<_>>(),
        "outputs": def.outputs.iter().map(|p| serde_json::json!({
            "name": p.name,
            "type": p.value_type,
        })).collect::<Vec<_>>(),
    })
}

fn format_default(d: &ParamDefault) -> String {
    match d {
        ParamDefault::Integer(i) => i.to_string(),
        ParamDefault::Float(f) => f.to_string(),
        ParamDefault::Text(s) => (*s).to_string(),
        ParamDefault::Bool(b) => b.to_string(),
    }
}

fn format_port_default(d: &PortDefault) -> String {
    match d {
        PortDefault::Required => "required".into(),
        PortDefault::Close => "close".into(),
        PortDefault::Number(x) => x.to_string(),
        PortDefault::Bool(b) => b.to_string(),
        PortDefault::Param(name) => format!("param:{name}"),
    }
}

// ─── validate ────────────────────────────────────────────────────────

fn run_validate(path: PathBuf) -> Result<()> {
    let strategy = load_strategy(&path)?;
    let report = validate(&strategy);

    println!(
        "{} ({} nodes, {} connections)",
        strategy.id,
        strategy.node_count(),
        strategy.connection_count()
    );
    for e in &report.errors {
        println!("ERROR:   {e}");
    }
    for w in &report.warnings {
        println!("WARNING: {w}");
    }
    if !report.is_valid() {
        bail!("{} validation error(s)", report.errors.len());
    }
    println!("OK");
    Ok(())
}

// ─── run ─────────────────────────────────────────────────────────────

fn adhoc_config(
    strategy: Option<PathBuf>,
    data: Option<PathBuf>,
    synthetic: Option<usize>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<RunConfig> {
    let Some(strategy) = strategy else {
        bail!("one of --config or --strategy is required");
    };
    let data = match (data, synthetic) {
        (Some(path), None) => DataConfig::File { path, format: None },
        (None, Some(bars)) if bars > 0 => DataConfig::Synthetic {
            start: start.unwrap_or(NaiveDate::from_ymd_opt(2020, 1, 1).context("bad date")?),
            bars,
        },
        (None, Some(_)) => bail!("--synthetic needs at least one bar"),
        _ => bail!("--strategy needs exactly one of --data or --synthetic"),
    };
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            bail!("--start {s} is after --end {e}");
        }
    }
    Ok(RunConfig {
        strategy,
        data,
        start,
        end,
        output_dir: None,
        overrides: Overrides::default(),
        sweep: None,
    })
}

fn run_backtest_cmd(config: RunConfig, output_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let report = run_from_config(&config, &CancelFlag::new())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if let Some(dir) = output_dir.or(config.output_dir) {
        let run_dir = save_artifacts(&report, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let r = &report.result;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {} ({})", report.strategy_name, report.strategy_id);
    println!("Symbol:         {} {}", report.symbol, report.timeframe.as_str());
    match (report.start, report.end) {
        (Some(start), Some(end)) => println!(
            "Period:         {} to {}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ),
        _ => println!("Period:         (no bars)"),
    }
    println!(
        "Bars:           {} ({} skipped)",
        report.bar_count, r.skipped_timesteps
    );
    println!(
        "Signals:        {} ({} rejected)",
        r.signal_count, r.rejected_signals
    );
    println!("Trades:         {}", r.total_trades);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", r.total_return * 100.0);
    println!("Final Equity:   {:.2}", r.final_equity);
    println!("Sharpe:         {:.3}", r.sharpe_ratio);
    println!("Sortino:        {:.3}", r.sortino_ratio);
    println!("Max Drawdown:   {:.2}%", r.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", r.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", r.profit_factor);
    println!("Commission:     {:.2}", r.total_commission);
    if !report.warnings.is_empty() {
        println!();
    }
    for warn in &report.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

// ─── sweep ───────────────────────────────────────────────────────────

fn run_sweep_cmd(config: RunConfig, top: Option<usize>, output_dir: Option<PathBuf>) -> Result<()> {
    let report = sweep_from_config(&config, &CancelFlag::new())?;
    let top = top
        .or(config.sweep.as_ref().and_then(|s| s.top))
        .unwrap_or(10);
    print_sweep(&report, top);

    if let Some(dir) = output_dir.or(config.output_dir) {
        let run_dir = save_sweep_artifacts(&report, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_sweep(report: &SweepReport, top: usize) {
    println!();
    println!(
        "=== Sweep: {} ({} variants, {} failed, ranked by {}) ===",
        report.strategy_id,
        report.len(),
        report.failures(),
        report.rank_by
    );
    println!(
        "{:>4}  {:>10}  {:>9}  {:>8}  {:>6}  {}",
        "Rank", "Score", "Return", "MaxDD", "Trades", "Parameters"
    );
    println!("{}", "-".repeat(72));
    for (i, p) in report.top_n(top).iter().enumerate() {
        match (&p.result, &p.error) {
            (Some(r), _) => println!(
                "{:>4}  {:>10.4}  {:>8.2}%  {:>7.2}%  {:>6}  {}",
                i + 1,
                p.score.unwrap_or(f64::NAN),
                r.total_return * 100.0,
                r.max_drawdown * 100.0,
                r.total_trades,
                p.label()
            ),
            (None, Some(err)) => println!("{:>4}  {:>10}  {}  ({err})", i + 1, "-", p.label()),
            (None, None) => {}
        }
    }
    println!();
}
