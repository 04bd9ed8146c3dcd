//! TOML run configuration.
//!
//! ```toml
//! strategy = "strategies/sma_cross.json"
//! output_dir = "runs"
//! start = "2023-01-01"
//! end = "2023-12-31"
//!
//! [data]
//! source = "file"
//! path = "data/spy.csv"
//!
//! [overrides]
//! commission = 0.0005
//!
//! [sweep]
//! rank_by = "sharpe"
//! [[sweep.axes]]
//! node = "fast"
//! parameter = "period"
//! values = [5, 10, 20]
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::{DateRange, Strategy};

use crate::data_loader::DataFormat;
use crate::sweep::SweepConfig;

/// Errors from reading or checking a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One backtest (or sweep) described on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Path to the JSON strategy document.
    pub strategy: PathBuf,

    pub data: DataConfig,

    /// First day included in the run (inclusive).
    #[serde(default)]
    pub start: Option<NaiveDate>,

    /// Last day included in the run (inclusive).
    #[serde(default)]
    pub end: Option<NaiveDate>,

    /// Where artifacts are written. No artifacts when absent.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub overrides: Overrides,

    #[serde(default)]
    pub sweep: Option<SweepConfig>,
}

/// Market data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case", deny_unknown_fields)]
pub enum DataConfig {
    /// CSV or JSON bar file; the format is inferred from the extension when omitted.
    File {
        path: PathBuf,
        #[serde(default)]
        format: Option<DataFormat>,
    },

    /// Deterministic random walk for the strategy's symbol and timeframe.
    Synthetic { start: NaiveDate, bars: usize },
}

/// Global strategy parameters replaced for this run only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
    pub symbol: Option<String>,
    pub initial_capital: Option<f64>,
    pub commission: Option<f64>,
    pub slippage: Option<f64>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Write every present override into `strategy.parameters`.
    pub fn apply(&self, strategy: &mut Strategy) {
        let p = &mut strategy.parameters;
        if let Some(symbol) = &self.symbol {
            p.symbol = symbol.clone();
        }
        if let Some(capital) = self.initial_capital {
            p.initial_capital = capital;
        }
        if let Some(commission) = self.commission {
            p.commission = commission;
        }
        if let Some(slippage) = self.slippage {
            p.slippage = slippage;
        }
    }
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load a config file and resolve its relative paths against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn check(&self) -> Result<(), ConfigError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        if let DataConfig::Synthetic { bars: 0, .. } = self.data {
            return Err(ConfigError::Invalid("synthetic data needs at least one bar".into()));
        }
        if let Some(sweep) = &self.sweep {
            if let Some(axis) = sweep.axes.iter().find(|a| a.values.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "sweep axis {}.{} has no values",
                    axis.node, axis.parameter
                )));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.strategy);
        if let DataConfig::File { path, .. } = &mut self.data {
            resolve(path);
        }
        if let Some(dir) = &mut self.output_dir {
            resolve(dir);
        }
    }

    /// The configured window as an inclusive UTC range covering whole days.
    pub fn date_range(&self) -> Option<DateRange> {
        if self.start.is_none() && self.end.is_none() {
            return None;
        }
        Some(DateRange::new(
            self.start.map(start_of_day),
            self.end.map(end_of_day),
        ))
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + chrono::Duration::days(1) - chrono::Duration::nanoseconds(1)
}
