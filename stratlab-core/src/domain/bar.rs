//! Bar: the market data unit the evaluator steps over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for the strategy's configured symbol and timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .any(|v| !v.is_finite())
    }

    /// Basic OHLCV sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }
}

/// Market data rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketDataError {
    #[error("bar {index} at {time} is not after the previous bar")]
    NotAscending { index: usize, time: DateTime<Utc> },
    #[error("bar {index} at {time} has invalid OHLCV values")]
    InvalidBar { index: usize, time: DateTime<Utc> },
}

/// Check the market-data contract: strictly ascending times, sane OHLCV.
pub fn validate_series(bars: &[Bar]) -> Result<(), MarketDataError> {
    for (index, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(MarketDataError::InvalidBar {
                index,
                time: bar.time,
            });
        }
        if index > 0 && bar.time <= bars[index - 1].time {
            return Err(MarketDataError::NotAscending {
                index,
                time: bar.time,
            });
        }
    }
    Ok(())
}

/// Optional inclusive time window applied to a series before a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| time >= s) && self.end.map_or(true, |e| time <= e)
    }

    /// Slice of `bars` inside the window. Bars must already be ascending.
    pub fn apply<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        let first = bars
            .iter()
            .position(|b| self.contains(b.time))
            .unwrap_or(bars.len());
        let last = bars[first..]
            .iter()
            .position(|b| !self.contains(b.time))
            .map_or(bars.len(), |offset| first + offset);
        &bars[first..last]
    }
}
