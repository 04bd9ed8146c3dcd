//! Backtest event loop.
//!
//! Per timestep, in order:
//! 1. Fill limit orders resting from the previous timestep (bar low/high touch).
//! 2. Risk exits on the open position: stop-loss before take-profit; a gap
//!    through the level fills at the open.
//! 3. Evaluate the graph at the close.
//! 4. Apply market signals at close ± slippage; queue limit signals.
//! 5. Mark to market and record equity.
//!
//! An open position is liquidated at the last close before the final equity
//! point is recorded.

use crate::domain::{validate_series, Bar, DateRange, OrderType, Side, SignalEvent};
use crate::eval::{CancelFlag, EngineError, Evaluator, Program};
use crate::graph::Strategy;

use super::portfolio::{Portfolio, Rejection};
use super::trade::{ClosedTrade, ExitReason};
use super::{BacktestResult, EquityPoint};

/// Validate and compile `strategy`, then backtest it over `bars`
/// (optionally restricted to `range`).
pub fn run_backtest(
    strategy: &Strategy,
    bars: &[Bar],
    range: Option<DateRange>,
    cancel: &CancelFlag,
) -> Result<BacktestResult, EngineError> {
    let program = Program::compile(strategy)?;
    let bars = match range {
        Some(r) => r.apply(bars),
        None => bars,
    };
    run_program(&program, bars, cancel)
}

/// Backtest an already compiled program. Each call owns a fresh evaluator.
pub fn run_program(
    program: &Program,
    bars: &[Bar],
    cancel: &CancelFlag,
) -> Result<BacktestResult, EngineError> {
    validate_series(bars)?;

    let params = program.parameters();
    let stop_loss = program.stop_loss();
    let take_profit = program.take_profit();
    let mut evaluator = Evaluator::new(program);
    let mut portfolio = Portfolio::new(&params.symbol, params.initial_capital, params.commission);

    let mut pending: Vec<SignalEvent> = Vec::new();
    let mut trades: Vec<ClosedTrade> = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut signal_count = 0usize;
    let mut rejected = 0usize;

    for (i, bar) in bars.iter().enumerate() {
        if cancel.is_cancelled() {
            log::debug!("backtest cancelled at timestep {i}");
            return Err(EngineError::Cancelled);
        }

        // 1. Resting limit orders get exactly one timestep.
        for order in std::mem::take(&mut pending) {
            let Some(price) = limit_fill(&order, bar) else {
                continue;
            };
            let outcome = match order.side {
                Side::Buy => portfolio.buy(order.quantity, price, bar.time, i).map(|_| None),
                Side::Sell => portfolio.sell(order.quantity, price, bar.time, i, ExitReason::Signal),
            };
            record(outcome, &mut trades, &mut rejected);
        }

        // 2. Risk exits apply to positions opened before this bar.
        if portfolio.entry_bar().is_some_and(|entry| entry < i) {
            if let Some((price, reason)) = risk_exit(&portfolio, bar, stop_loss, take_profit) {
                if let Some(trade) = portfolio.liquidate(price, bar.time, i, reason) {
                    trades.push(trade);
                }
            }
        }

        // 3. Evaluate at the close.
        let step = evaluator.step(bar);
        signal_count += step.signals.len();

        // 4. Market fills now, limits rest until the next bar.
        for event in step.signals {
            match event.order_type {
                OrderType::Limit => pending.push(event),
                OrderType::Market => {
                    let outcome = match event.side {
                        Side::Buy => {
                            let price = bar.close * (1.0 + params.slippage);
                            portfolio.buy(event.quantity, price, bar.time, i).map(|_| None)
                        }
                        Side::Sell => {
                            let price = bar.close * (1.0 - params.slippage);
                            portfolio.sell(event.quantity, price, bar.time, i, ExitReason::Signal)
                        }
                    };
                    record(outcome, &mut trades, &mut rejected);
                }
            }
        }

        // 5. Liquidate on the last bar, then mark to market.
        if i + 1 == bars.len() {
            if let Some(trade) = portfolio.liquidate(bar.close, bar.time, i, ExitReason::EndOfData) {
                trades.push(trade);
            }
        }
        equity_curve.push(EquityPoint {
            time: bar.time,
            equity: portfolio.equity(bar.close),
        });
    }

    if rejected > 0 {
        log::warn!("{rejected} signal(s) rejected (no position to sell or insufficient cash)");
    }
    let skipped = evaluator.skipped_timesteps();
    if skipped > 0 {
        log::debug!("{skipped} timestep(s) skipped due to insufficient history");
    }

    let result = BacktestResult::compute(
        params.initial_capital,
        params.timeframe.periods_per_year(),
        equity_curve,
        trades,
        portfolio.total_commission(),
        signal_count,
        rejected,
        skipped,
    );
    log::info!(
        "backtest complete: {} bars, {} trades, total return {:.4}",
        bars.len(),
        result.total_trades,
        result.total_return
    );
    Ok(result)
}

fn record(
    outcome: Result<Option<ClosedTrade>, Rejection>,
    trades: &mut Vec<ClosedTrade>,
    rejected: &mut usize,
) {
    match outcome {
        Ok(Some(trade)) => trades.push(trade),
        Ok(None) => {}
        Err(reason) => {
            log::debug!("signal rejected: {reason:?}");
            *rejected += 1;
        }
    }
}

/// Fill price of a resting limit order on `bar`, if it trades.
/// A bar opening through the limit fills at the open.
fn limit_fill(order: &SignalEvent, bar: &Bar) -> Option<f64> {
    match order.side {
        Side::Buy if bar.open <= order.price => Some(bar.open),
        Side::Buy if bar.low <= order.price => Some(order.price),
        Side::Sell if bar.open >= order.price => Some(bar.open),
        Side::Sell if bar.high >= order.price => Some(order.price),
        _ => None,
    }
}

/// Stop-loss / take-profit exit price for the open position on `bar`.
/// Levels are offsets from the average entry price; the stop is checked first.
fn risk_exit(
    portfolio: &Portfolio,
    bar: &Bar,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
) -> Option<(f64, ExitReason)> {
    let entry = portfolio.avg_entry();
    if let Some(pct) = stop_loss {
        let level = entry * (1.0 - pct);
        if bar.open <= level {
            return Some((bar.open, ExitReason::StopLoss));
        }
        if bar.low <= level {
            return Some((level, ExitReason::StopLoss));
        }
    }
    if let Some(pct) = take_profit {
        let level = entry * (1.0 + pct);
        if bar.open >= level {
            return Some((bar.open, ExitReason::TakeProfit));
        }
        if bar.high >= level {
            return Some((level, ExitReason::TakeProfit));
        }
    }
    None
}
