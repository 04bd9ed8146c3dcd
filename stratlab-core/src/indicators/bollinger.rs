//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(x, period)
//! - Upper: middle + mult * stddev(x, period)
//! - Lower: middle - mult * stddev(x, period)
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use std::collections::VecDeque;

use super::Indicator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    window: VecDeque<f64>,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Self {
        let period = period.max(1);
        Self {
            period,
            multiplier,
            window: VecDeque::with_capacity(period),
        }
    }
}

impl Indicator for Bollinger {
    type Output = BollingerBands;

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn update(&mut self, input: f64) -> Option<BollingerBands> {
        if self.window.len() == self.period {
            self.window.pop_front();
        }
        self.window.push_back(input);
        if self.window.len() < self.period {
            return None;
        }

        let n = self.period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|x| {
                let diff = x - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        let width = self.multiplier * variance.sqrt();

        Some(BollingerBands {
            upper: mean + width,
            middle: mean,
            lower: mean - width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, collect, wave, DEFAULT_EPSILON};

    #[test]
    fn bollinger_middle_is_sma() {
        let out = collect(Bollinger::new(3, 2.0), &[10.0, 11.0, 12.0, 13.0, 14.0]);
        assert!(out[0].is_none() && out[1].is_none());
        assert_approx(out[2].unwrap().middle, 11.0, DEFAULT_EPSILON);
        assert_approx(out[3].unwrap().middle, 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_known_width() {
        // Window [10, 11, 12]: population variance = 2/3
        let out = collect(Bollinger::new(3, 2.0), &[10.0, 11.0, 12.0]);
        let bands = out[2].unwrap();
        let sd = (2.0f64 / 3.0).sqrt();
        assert_approx(bands.upper, 11.0 + 2.0 * sd, DEFAULT_EPSILON);
        assert_approx(bands.lower, 11.0 - 2.0 * sd, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_bands_symmetric() {
        for bands in collect(Bollinger::new(20, 2.5), &wave(120)).into_iter().flatten() {
            assert_approx(
                bands.upper - bands.middle,
                bands.middle - bands.lower,
                DEFAULT_EPSILON,
            );
        }
    }

    #[test]
    fn bollinger_constant_price_zero_width() {
        let out = collect(Bollinger::new(3, 2.0), &[100.0; 4]);
        let bands = out[3].unwrap();
        assert_approx(bands.upper, 100.0, DEFAULT_EPSILON);
        assert_approx(bands.lower, 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_lookback() {
        assert_eq!(Bollinger::new(20, 2.0).lookback(), 19);
    }
}
