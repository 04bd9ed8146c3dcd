//! Moving Average Convergence/Divergence (MACD).
//!
//! macd = EMA(fast) - EMA(slow); signal = EMA(signal_period) of macd;
//! histogram = macd - signal. All three outputs become defined together,
//! once the signal line has warmed up.
//! Lookback: (slow - 1) + (signal - 1).

use super::{Ema, Indicator};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            signal: Ema::new(signal_period),
            slow_period: slow_period.max(1),
            signal_period: signal_period.max(1),
        }
    }
}

impl Indicator for Macd {
    type Output = MacdOutput;

    fn lookback(&self) -> usize {
        (self.slow_period - 1) + (self.signal_period - 1)
    }

    fn update(&mut self, input: f64) -> Option<MacdOutput> {
        let fast = self.fast.update(input);
        let slow = self.slow.update(input)?;
        let macd = fast? - slow;
        let signal = self.signal.update(macd)?;
        Some(MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}
