//! Bar loading for the runner.
//!
//! Two file formats, picked from the extension unless configured:
//! - **CSV** with a header `time,open,high,low,close,volume`; `time` is
//!   RFC 3339 or a plain `YYYY-MM-DD` date (midnight UTC).
//! - **JSON**: an array of `{time, open, high, low, close, volume}` objects.
//!
//! Unsorted files are sorted by time; duplicate timestamps and insane OHLCV
//! rows are rejected. Synthetic data is a deterministic random walk seeded
//! from the symbol, tagged so reports can flag it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::graph::Timeframe;
use stratlab_core::{validate_series, Bar, MarketDataError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot infer data format of {0} (expected .csv or .json)")]
    UnknownFormat(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {row}: unparseable time '{value}'")]
    BadTime { row: usize, value: String },

    #[error("invalid market data: {0}")]
    Invalid(#[from] MarketDataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(DataFormat::Csv),
            "json" => Some(DataFormat::Json),
            _ => None,
        }
    }
}

/// Bars plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub bars: Vec<Bar>,
    /// BLAKE3 over every bar, for report fingerprints.
    pub dataset_hash: String,
    pub synthetic: bool,
}

impl LoadedData {
    pub fn new(bars: Vec<Bar>, synthetic: bool) -> Self {
        let dataset_hash = compute_dataset_hash(&bars);
        Self {
            bars,
            dataset_hash,
            synthetic,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Load bars from a file, inferring the format from the extension when `format` is `None`.
pub fn load_bars(path: &Path, format: Option<DataFormat>) -> Result<LoadedData, LoadError> {
    let format = format
        .or_else(|| DataFormat::from_path(path))
        .ok_or_else(|| LoadError::UnknownFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = match format {
        DataFormat::Csv => parse_csv(&content)?,
        DataFormat::Json => serde_json::from_str(&content)?,
    };
    let bars = normalize(bars)?;
    log::info!("loaded {} bars from {}", bars.len(), path.display());
    Ok(LoadedData::new(bars, false))
}

/// Parse CSV text with a `time,open,high,low,close,volume` header.
pub fn parse_csv(content: &str) -> Result<Vec<Bar>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut bars = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let time = parse_time(&row.time).ok_or_else(|| LoadError::BadTime {
            row: i + 1,
            value: row.time.clone(),
        })?;
        bars.push(Bar {
            time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(bars)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Sort ascending by time, then enforce the market-data contract.
fn normalize(mut bars: Vec<Bar>) -> Result<Vec<Bar>, LoadError> {
    if bars.windows(2).any(|w| w[0].time > w[1].time) {
        log::warn!("bars were not in time order; sorting");
        bars.sort_by_key(|b| b.time);
    }
    validate_series(&bars)?;
    Ok(bars)
}

/// Compute a deterministic BLAKE3 hash over all bar data.
pub fn compute_dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.time.timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Generate `count` synthetic bars for `symbol`, spaced by `timeframe`.
///
/// A random walk from 100.0, seeded from the symbol name so the same symbol
/// always yields the same series. Daily series skip weekends.
pub fn generate_synthetic_bars(
    symbol: &str,
    start: DateTime<Utc>,
    count: usize,
    timeframe: Timeframe,
) -> LoadedData {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);
    let step = timeframe.duration();
    let skip_weekends = matches!(timeframe, Timeframe::D1);

    let mut bars = Vec::with_capacity(count);
    let mut price = 100.0_f64;
    let mut current = start;
    while bars.len() < count {
        if skip_weekends && current.weekday().number_from_monday() > 5 {
            current += step;
            continue;
        }
        let change: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + change);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000.0..5_000_000.0_f64).round();
        bars.push(Bar {
            time: current,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
        current += step;
    }
    log::warn!("generated {count} synthetic bars for {symbol}; results are tagged synthetic");
    LoadedData::new(bars, true)
}
