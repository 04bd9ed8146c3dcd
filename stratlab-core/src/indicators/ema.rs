//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` inputs.
//! Lookback: period - 1.

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn update(&mut self, input: f64) -> Option<f64> {
        let next = match self.value {
            Some(prev) => self.alpha * input + (1.0 - self.alpha) * prev,
            None => {
                self.seen += 1;
                self.seed_sum += input;
                if self.seen < self.period {
                    return None;
                }
                self.seed_sum / self.period as f64
            }
        };
        self.value = Some(next);
        Some(next)
    }
}

/// Batch EMA with the same seeding, used as a reference in tests.
#[cfg(test)]
pub fn reference(inputs: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; inputs.len()];
    if inputs.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = inputs[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for i in period..inputs.len() {
        prev = alpha * inputs[i] + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, collect, wave, DEFAULT_EPSILON};

    #[test]
    fn ema_seed_is_sma() {
        let out = collect(Ema::new(3), &[2.0, 4.0, 6.0, 8.0]);
        assert!(out[0].is_none() && out[1].is_none());
        assert_approx(out[2].unwrap(), 4.0, DEFAULT_EPSILON);
        // alpha = 0.5: 0.5 * 8 + 0.5 * 4 = 6
        assert_approx(out[3].unwrap(), 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_matches_reference() {
        let inputs = wave(300);
        for period in [1, 5, 20] {
            let streamed = collect(Ema::new(period), &inputs);
            let batch = reference(&inputs, period);
            for (s, b) in streamed.iter().zip(&batch) {
                match (s, b) {
                    (Some(s), Some(b)) => assert_approx(*s, *b, DEFAULT_EPSILON),
                    (None, None) => {}
                    other => panic!("warm-up mismatch: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn ema_constant_input() {
        let out = collect(Ema::new(4), &[50.0; 10]);
        assert!(out.iter().flatten().all(|v| (v - 50.0).abs() < DEFAULT_EPSILON));
    }
}
