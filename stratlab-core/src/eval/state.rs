//! Per-node rolling state, rebuilt fresh for every run.

use crate::graph::NodeParams;
use crate::indicators::{Bollinger, Ema, Macd, Rsi, Sma};

#[derive(Debug, Clone)]
pub enum NodeState {
    Stateless,
    Sma(Sma),
    Ema(Ema),
    Rsi {
        rsi: Rsi,
        /// Last defined RSI value, for level-crossing events.
        prev: Option<f64>,
    },
    Bollinger(Bollinger),
    Macd(Macd),
}

impl NodeState {
    pub fn for_params(params: &NodeParams) -> Self {
        match params {
            NodeParams::Sma { period } => NodeState::Sma(Sma::new(*period)),
            NodeParams::Ema { period } => NodeState::Ema(Ema::new(*period)),
            NodeParams::Rsi { period, .. } => NodeState::Rsi {
                rsi: Rsi::new(*period),
                prev: None,
            },
            NodeParams::Bollinger { period, std_dev } => {
                NodeState::Bollinger(Bollinger::new(*period, *std_dev))
            }
            NodeParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            } => NodeState::Macd(Macd::new(*fast_period, *slow_period, *signal_period)),
            _ => NodeState::Stateless,
        }
    }
}
