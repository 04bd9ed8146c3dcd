//! StratLab Runner: backtest orchestration around `stratlab-core`.
//!
//! This crate provides:
//! - TOML run configuration with per-run parameter overrides
//! - Bar loading from CSV/JSON files or a deterministic synthetic walk
//! - Single-run reports with strategy fingerprint and dataset hash
//! - Parallel parameter sweeps ranked by a chosen metric
//! - JSON, CSV, and Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, DataConfig, Overrides, RunConfig};
pub use data_loader::{
    compute_dataset_hash, generate_synthetic_bars, load_bars, DataFormat, LoadError, LoadedData,
};
pub use export::{generate_report, load_artifacts, save_artifacts, save_sweep_artifacts};
pub use runner::{
    load_data, load_strategy, run_from_config, run_report, strategy_fingerprint,
    sweep_from_config, BacktestReport, RunError, SCHEMA_VERSION,
};
pub use sweep::{run_sweep, ParamGrid, RankMetric, SweepAxis, SweepConfig, SweepError, SweepReport};
