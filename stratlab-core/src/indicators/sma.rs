//! Simple Moving Average (SMA).
//!
//! Rolling mean over the last `period` inputs.
//! Lookback: period - 1 (first valid value at index period-1).

use std::collections::VecDeque;

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    type Output = f64;

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn update(&mut self, input: f64) -> Option<f64> {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(input);
        if self.window.len() < self.period {
            return None;
        }
        // Summed fresh each step so long runs do not accumulate drift.
        Some(self.window.iter().sum::<f64>() / self.period as f64)
    }
}
