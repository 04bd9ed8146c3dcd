//! Streaming indicator implementations.
//!
//! Each indicator owns its rolling state and is fed one input value per
//! timestep through `Indicator::update`. `None` means the indicator is still
//! warming up; the evaluator then skips every dependent node for that step.
//!
//! Multi-output indicators (Bollinger, MACD) return a small struct per step.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{Bollinger, BollingerBands};
pub use ema::Ema;
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::Sma;

/// Incremental indicator over a numeric input series.
pub trait Indicator {
    type Output;

    /// Number of inputs consumed before the first output (first valid index).
    fn lookback(&self) -> usize;

    /// Feed the next input. Returns `None` until warm-up completes.
    fn update(&mut self, input: f64) -> Option<Self::Output>;
}

/// Run an indicator over a full series, for tests and reference comparisons.
#[cfg(test)]
pub fn collect<I: Indicator>(mut indicator: I, inputs: &[f64]) -> Vec<Option<I::Output>> {
    inputs.iter().map(|&x| indicator.update(x)).collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Reference tolerance for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// Deterministic wavy price series for reference comparisons.
#[cfg(test)]
pub fn wave(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 10.0 * (t * 0.3).sin() + 4.0 * (t * 1.7).cos() + t * 0.05
        })
        .collect()
}
