//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity series and/or trade list in, scalar out.
//! Ratios are annualized with the strategy timeframe's periods per year.

use super::trade::ClosedTrade;

/// Total return as a fraction: final / initial - 1.
pub fn total_return(initial: f64, final_equity: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    final_equity / initial - 1.0
}

/// Annualized Sharpe ratio from per-period returns.
///
/// Sharpe = mean(returns) / std(returns) * sqrt(periods_per_year).
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(equity: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(&returns);
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * periods_per_year.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
///
/// Returns 0.0 if there is no downside or fewer than 2 returns.
pub fn sortino_ratio(equity: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(&returns);

    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return 0.0; // No downside → ratio undefined
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean / downside_std) * periods_per_year.sqrt()
}

/// Maximum drawdown as a positive fraction (0.25 = 25% peak-to-trough decline).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Win rate: fraction of closed trades with positive net PnL.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity values.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    if equity.len() < 2 {
        return Vec::new();
    }
    equity
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::trade::ExitReason;
    use chrono::{TimeZone, Utc};

    fn make_trade(net_pnl: f64) -> ClosedTrade {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ClosedTrade {
            symbol: "SPY".into(),
            entry_time: t,
            exit_time: t,
            entry_bar: 0,
            exit_bar: 5,
            quantity: 50.0,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl / 50.0,
            gross_pnl: net_pnl,
            commission: 0.0,
            net_pnl,
            bars_held: 5,
            exit_reason: ExitReason::Signal,
        }
    }

    // ── Total return ──

    #[test]
    fn total_return_positive_and_negative() {
        assert!((total_return(100_000.0, 110_000.0) - 0.1).abs() < 1e-10);
        assert!((total_return(100_000.0, 90_000.0) + 0.1).abs() < 1e-10);
        assert_eq!(total_return(0.0, 5.0), 0.0);
    }

    // ── Drawdown ──

    #[test]
    fn max_drawdown_known_curve() {
        assert!((max_drawdown(&[100.0, 120.0, 90.0, 110.0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        assert_eq!(max_drawdown(&[100.0, 101.0, 105.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_takes_largest_decline() {
        // 100 → 80 (20%), then 150 → 105 (30%)
        assert!((max_drawdown(&[100.0, 80.0, 150.0, 105.0]) - 0.3).abs() < 1e-12);
    }

    // ── Sharpe / Sortino ──

    #[test]
    fn sharpe_constant_equity_is_zero() {
        assert_eq!(sharpe_ratio(&[100_000.0; 50], 365.0), 0.0);
    }

    #[test]
    fn sharpe_known_returns() {
        let eq = [100.0, 110.0, 99.0, 108.9];
        let r = period_returns(&eq);
        let expected = mean_f64(&r) / std_dev(&r) * 52f64.sqrt();
        assert!((sharpe_ratio(&eq, 52.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn sharpe_scales_with_periods() {
        let eq = [100.0, 101.0, 100.5, 102.0, 103.0];
        let daily = sharpe_ratio(&eq, 365.0);
        let hourly = sharpe_ratio(&eq, 8_760.0);
        assert!((hourly / daily - (8_760.0f64 / 365.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn sortino_no_downside_is_zero() {
        assert_eq!(sortino_ratio(&[100.0, 101.0, 102.0], 365.0), 0.0);
    }

    #[test]
    fn sortino_exceeds_sharpe_for_upside_skew() {
        let eq = [100.0, 105.0, 104.5, 110.0, 109.8, 116.0];
        assert!(sortino_ratio(&eq, 365.0) > sharpe_ratio(&eq, 365.0));
    }

    // ── Trade statistics ──

    #[test]
    fn win_rate_mixed() {
        let trades = vec![make_trade(100.0), make_trade(-50.0), make_trade(30.0), make_trade(-10.0)];
        assert!((win_rate(&trades) - 0.5).abs() < 1e-12);
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn profit_factor_mixed() {
        let trades = vec![make_trade(300.0), make_trade(-100.0), make_trade(-50.0)];
        assert!((profit_factor(&trades) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_edge_cases() {
        assert_eq!(profit_factor(&[make_trade(10.0)]), 100.0);
        assert_eq!(profit_factor(&[make_trade(0.0)]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn std_dev_is_sample() {
        // [1, 2, 3, 4]: sample variance 5/3
        assert!((std_dev(&[1.0, 2.0, 3.0, 4.0]) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
