//! Backtest engine: consumes the signal stream and simulates a portfolio.
//!
//! - `engine`: the per-timestep loop (limit fills, risk exits, signals, equity).
//! - `portfolio`: long-only cash accounting with commission.
//! - `trade`: closed round-trip records.
//! - `metrics`: pure metric functions over equity and trades.

pub mod engine;
pub mod metrics;
pub mod portfolio;
pub mod trade;

pub use engine::{run_backtest, run_program};
pub use portfolio::{Portfolio, Rejection};
pub use trade::{ClosedTrade, ExitReason};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// Immutable outcome of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Largest peak-to-trough decline as a positive fraction.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub profit_factor: f64,
    pub final_equity: f64,
    pub total_commission: f64,
    /// Signal events emitted by action nodes, filled or not.
    pub signal_count: usize,
    pub rejected_signals: usize,
    pub skipped_timesteps: usize,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
}

impl BacktestResult {
    /// Compute every metric from the run's equity curve and trade list.
    ///
    /// Return-based metrics see the initial capital as the first equity value.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        initial_capital: f64,
        periods_per_year: f64,
        equity_curve: Vec<EquityPoint>,
        trades: Vec<ClosedTrade>,
        total_commission: f64,
        signal_count: usize,
        rejected_signals: usize,
        skipped_timesteps: usize,
    ) -> Self {
        let equity: Vec<f64> = std::iter::once(initial_capital)
            .chain(equity_curve.iter().map(|p| p.equity))
            .collect();
        let final_equity = equity.last().copied().unwrap_or(initial_capital);

        Self {
            total_return: metrics::total_return(initial_capital, final_equity),
            sharpe_ratio: metrics::sharpe_ratio(&equity, periods_per_year),
            sortino_ratio: metrics::sortino_ratio(&equity, periods_per_year),
            max_drawdown: metrics::max_drawdown(&equity),
            win_rate: metrics::win_rate(&trades),
            total_trades: trades.len(),
            profit_factor: metrics::profit_factor(&trades),
            final_equity,
            total_commission,
            signal_count,
            rejected_signals,
            skipped_timesteps,
            equity_curve,
            trades,
        }
    }
}
