//! Backtest runner: loads a strategy document and market data, runs the
//! engine, and wraps the result in a versioned `BacktestReport`.
//!
//! Entry points:
//! - `run_from_config()`: everything from a `RunConfig`. Used by the CLI.
//! - `run_report()`: pre-loaded strategy and data, no I/O.
//! - `sweep_from_config()`: parameter sweep described by the config's `[sweep]` table.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::document::{from_json, to_canonical_json};
use stratlab_core::graph::Timeframe;
use stratlab_core::{
    run_backtest, validate, BacktestResult, CancelFlag, DateRange, DocumentError, EngineError,
    Strategy,
};

use crate::config::{ConfigError, DataConfig, RunConfig};
use crate::data_loader::{generate_synthetic_bars, load_bars, LoadError, LoadedData};
use crate::sweep::{run_sweep, SweepError, SweepReport};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] LoadError),

    #[error("strategy document error: {0}")]
    Document(#[from] DocumentError),

    #[error("backtest failed: {0}")]
    Engine(#[from] EngineError),

    #[error("sweep failed: {0}")]
    Sweep(#[from] SweepError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config has no [sweep] table")]
    NoSweep,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// A backtest result plus the provenance needed to reproduce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy_id: String,
    pub strategy_name: String,
    /// BLAKE3 of the canonical strategy document.
    pub fingerprint: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    /// First and last bar actually simulated.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub bar_count: usize,
    pub dataset_hash: String,
    pub synthetic: bool,
    pub warnings: Vec<String>,
    pub result: BacktestResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Read and rebuild a JSON strategy document.
pub fn load_strategy(path: &Path) -> Result<Strategy, RunError> {
    let json = std::fs::read_to_string(path).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let strategy = from_json(&json)?;
    log::debug!(
        "loaded strategy '{}' ({} nodes, {} connections) from {}",
        strategy.id,
        strategy.node_count(),
        strategy.connection_count(),
        path.display()
    );
    Ok(strategy)
}

/// Stable identity of a strategy's structure and parameters.
pub fn strategy_fingerprint(strategy: &Strategy) -> Result<String, RunError> {
    let canonical = to_canonical_json(strategy)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

/// Bars for `strategy` from the configured source.
pub fn load_data(source: &DataConfig, strategy: &Strategy) -> Result<LoadedData, RunError> {
    match source {
        DataConfig::File { path, format } => Ok(load_bars(path, *format)?),
        DataConfig::Synthetic { start, bars } => {
            let start = start.and_time(NaiveTime::MIN).and_utc();
            Ok(generate_synthetic_bars(
                &strategy.parameters.symbol,
                start,
                *bars,
                strategy.parameters.timeframe,
            ))
        }
    }
}

/// Backtest pre-loaded data. No I/O.
pub fn run_report(
    strategy: &Strategy,
    data: &LoadedData,
    range: Option<DateRange>,
    cancel: &CancelFlag,
) -> Result<BacktestReport, RunError> {
    let fingerprint = strategy_fingerprint(strategy)?;
    let result = run_backtest(strategy, &data.bars, range, cancel)?;

    let window = match range {
        Some(r) => r.apply(&data.bars),
        None => &data.bars[..],
    };

    let mut warnings: Vec<String> = validate(strategy)
        .warnings
        .iter()
        .map(|w| w.to_string())
        .collect();
    if window.is_empty() {
        warnings.push("no bars in the selected window".to_string());
    }
    if result.skipped_timesteps > 0 {
        warnings.push(format!(
            "{} timesteps skipped due to insufficient history",
            result.skipped_timesteps
        ));
    }
    if result.rejected_signals > 0 {
        warnings.push(format!(
            "{} signal(s) rejected (nothing to sell or insufficient cash)",
            result.rejected_signals
        ));
    }
    if data.synthetic {
        warnings.push("results use synthetic market data".to_string());
    }

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        strategy_id: strategy.id.clone(),
        strategy_name: strategy.name.clone(),
        fingerprint,
        symbol: strategy.parameters.symbol.clone(),
        timeframe: strategy.parameters.timeframe,
        start: window.first().map(|b| b.time),
        end: window.last().map(|b| b.time),
        bar_count: window.len(),
        dataset_hash: data.dataset_hash.clone(),
        synthetic: data.synthetic,
        warnings,
        result,
    })
}

/// Strategy with the config's overrides applied.
pub fn prepare_strategy(config: &RunConfig) -> Result<Strategy, RunError> {
    let mut strategy = load_strategy(&config.strategy)?;
    if !config.overrides.is_empty() {
        config.overrides.apply(&mut strategy);
        log::info!("applied parameter overrides: {:?}", config.overrides);
    }
    Ok(strategy)
}

/// Load strategy and data described by `config`, then backtest.
pub fn run_from_config(config: &RunConfig, cancel: &CancelFlag) -> Result<BacktestReport, RunError> {
    let strategy = prepare_strategy(config)?;
    let data = load_data(&config.data, &strategy)?;
    run_report(&strategy, &data, config.date_range(), cancel)
}

/// Run the config's `[sweep]` over its strategy and data.
pub fn sweep_from_config(config: &RunConfig, cancel: &CancelFlag) -> Result<SweepReport, RunError> {
    let sweep = config.sweep.as_ref().ok_or(RunError::NoSweep)?;
    let strategy = prepare_strategy(config)?;
    let data = load_data(&config.data, &strategy)?;
    Ok(run_sweep(&strategy, &data.bars, config.date_range(), sweep, cancel)?)
}
