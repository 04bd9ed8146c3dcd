//! Integration tests for the evaluator.
//!
//! Tests:
//! 1. RSI oversold crossing fires a buy exactly once on a V-shaped series
//! 2. Warm-up timesteps are skipped, not errors
//! 3. Identical inputs produce identical signal streams
//! 4. Invalid strategies and bad market data are refused up front
//! 5. Cancellation before or during a run returns no result
//! 6. Limit orders carry an offset price
//! 7. Only warm-up on an action's input chain counts as a skipped timestep

use chrono::{Duration, TimeZone, Utc};
use stratlab_core::graph::{patch, Endpoint, ParamPatch, ParamValue};
use stratlab_core::{
    evaluate, Bar, CancelFlag, EngineError, Evaluator, OrderType, Program, Side, Strategy, Value,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            time: start + Duration::days(i as i64),
            open: c,
            high: c + 1.0,
            low: c - 1.0,
            close: c,
            volume: 1_000.0,
        })
        .collect()
}

fn wire(s: &mut Strategy, from: (&str, &str), to: (&str, &str)) {
    s.connect(Endpoint::new(from.0, from.1), Endpoint::new(to.0, to.1))
        .unwrap();
}

/// RSI(3) oversold signal wired straight into a buy.
fn rsi_dip_buyer() -> Strategy {
    let mut s = Strategy::new("rsi-dip", "RSI dip buyer");
    s.add_node_with_id("rsi", "rsi", &patch(&[("period", ParamValue::Integer(3))]))
        .unwrap();
    s.add_node_with_id("buy", "buy", &ParamPatch::new()).unwrap();
    wire(&mut s, ("rsi", "oversoldSignal"), ("buy", "signal"));
    s
}

/// Falls from 100 to 80 then climbs back to 100, two points per bar.
fn v_shape() -> Vec<f64> {
    let down = (0..=10).map(|i| 100.0 - 2.0 * i as f64);
    let up = (1..=10).map(|i| 80.0 + 2.0 * i as f64);
    down.chain(up).collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn rsi_oversold_buy_fires_exactly_once() {
    init_logging();
    let bars = make_bars(&v_shape());
    let run = evaluate(&rsi_dip_buyer(), &bars, &CancelFlag::new()).unwrap();

    assert_eq!(run.signals.len(), 1, "signals: {:?}", run.signals);
    let event = &run.signals[0];
    assert_eq!(event.side, Side::Buy);
    assert_eq!(event.order_type, OrderType::Market);
    assert_eq!(event.node_id.as_str(), "buy");
    assert_eq!(event.symbol, "SPY");
    // RSI(3) needs three price changes: first value on the fourth bar.
    assert_eq!(event.timestamp, bars[3].time);
    assert_eq!(event.price, bars[3].close);
    assert_eq!(run.timesteps, bars.len());
    assert_eq!(run.skipped_timesteps, 3);
}

#[test]
fn warmup_is_skipped_not_failed() {
    let mut s = Strategy::new("ma", "sma above price");
    s.add_node_with_id("ma", "sma", &patch(&[("period", ParamValue::Integer(5))]))
        .unwrap();
    s.add_node_with_id("px", "price", &ParamPatch::new()).unwrap();
    s.add_node_with_id(
        "cmp",
        "compare",
        &patch(&[("operator", ParamValue::Text("gt".into()))]),
    )
    .unwrap();
    s.add_node_with_id("buy", "buy", &ParamPatch::new()).unwrap();
    wire(&mut s, ("px", "value"), ("cmp", "left"));
    wire(&mut s, ("ma", "value"), ("cmp", "right"));
    wire(&mut s, ("cmp", "result"), ("buy", "signal"));

    let closes: Vec<f64> = (0..8).map(|i| 100.0 + i as f64).collect();
    let run = evaluate(&s, &make_bars(&closes), &CancelFlag::new()).unwrap();

    // SMA(5) is undefined for the first four bars; afterwards price > average.
    assert_eq!(run.skipped_timesteps, 4);
    assert_eq!(run.signals.len(), 4);
    assert!(run.signals.iter().all(|e| e.side == Side::Buy));
}

#[test]
fn evaluation_is_deterministic() {
    let bars = make_bars(&v_shape());
    let s = rsi_dip_buyer();
    let a = evaluate(&s, &bars, &CancelFlag::new()).unwrap();
    let b = evaluate(&s, &bars, &CancelFlag::new()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn fresh_evaluators_share_nothing() {
    let s = rsi_dip_buyer();
    let program = Program::compile(&s).unwrap();
    let bars = make_bars(&v_shape());

    let mut first = Evaluator::new(&program);
    for bar in &bars {
        first.step(bar);
    }
    let second = Evaluator::new(&program);
    assert_eq!(first.timesteps(), bars.len());
    assert_eq!(second.timesteps(), 0);

    let rerun = second.run(&bars, &CancelFlag::new()).unwrap();
    assert_eq!(rerun.signals.len(), 1);
}

#[test]
fn invalid_strategy_is_refused() {
    let mut s = Strategy::new("bad", "unbound buy");
    s.add_node("buy", &ParamPatch::new()).unwrap();
    let err = evaluate(&s, &make_bars(&[100.0]), &CancelFlag::new()).unwrap_err();
    match err {
        EngineError::InvalidStrategy(errors) => assert_eq!(errors.len(), 1),
        other => panic!("expected InvalidStrategy, got {other:?}"),
    }
}

#[test]
fn unordered_bars_are_refused() {
    let mut bars = make_bars(&[100.0, 101.0, 102.0]);
    bars.swap(1, 2);
    let err = evaluate(&rsi_dip_buyer(), &bars, &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, EngineError::InvalidMarketData(_)));
}

#[test]
fn cancelled_flag_stops_run() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = evaluate(&rsi_dip_buyer(), &make_bars(&v_shape()), &cancel).unwrap_err();
    assert_eq!(err, EngineError::Cancelled);

    cancel.reset();
    assert!(evaluate(&rsi_dip_buyer(), &make_bars(&v_shape()), &cancel).is_ok());
}

#[test]
fn cancelling_mid_run_returns_no_result() {
    let s = rsi_dip_buyer();
    let program = Program::compile(&s).unwrap();
    let bars = make_bars(&v_shape());
    let cancel = CancelFlag::new();

    let mut evaluator = Evaluator::new(&program);
    for bar in &bars[..12] {
        evaluator.step(bar);
    }
    assert_eq!(evaluator.timesteps(), 12);
    cancel.cancel();
    let err = evaluator.run(&bars[12..], &cancel).unwrap_err();
    assert_eq!(err, EngineError::Cancelled);

    // Budget runs out on the sixth poll, after the buy has already fired.
    let err = evaluate(&s, &bars, &CancelFlag::with_poll_limit(5)).unwrap_err();
    assert_eq!(err, EngineError::Cancelled);
}

#[test]
fn warming_node_off_the_action_path_skips_nothing() {
    let mut s = rsi_dip_buyer();
    s.add_node_with_id("idle", "sma", &patch(&[("period", ParamValue::Integer(50))]))
        .unwrap();
    let bars = make_bars(&v_shape());
    let run = evaluate(&s, &bars, &CancelFlag::new()).unwrap();

    // Only the RSI feeding the buy counts; the unused SMA never warms up.
    assert_eq!(run.skipped_timesteps, 3);
    assert_eq!(run.signals.len(), 1);
}

#[test]
fn limit_orders_offset_from_close() {
    let mut s = Strategy::new("lim", "threshold limit buy");
    s.add_node_with_id("px", "price", &ParamPatch::new()).unwrap();
    s.add_node_with_id(
        "t",
        "threshold",
        &patch(&[
            ("operator", ParamValue::Text("gte".into())),
            ("threshold", ParamValue::Float(102.0)),
        ]),
    )
    .unwrap();
    s.add_node_with_id(
        "buy",
        "buy",
        &patch(&[
            ("orderType", ParamValue::Text("limit".into())),
            ("limitOffset", ParamValue::Float(0.02)),
            ("quantity", ParamValue::Float(3.0)),
        ]),
    )
    .unwrap();
    wire(&mut s, ("px", "value"), ("t", "value"));
    wire(&mut s, ("t", "result"), ("buy", "signal"));

    let run = evaluate(&s, &make_bars(&[100.0, 101.0, 102.0]), &CancelFlag::new()).unwrap();
    assert_eq!(run.signals.len(), 1);
    let event = &run.signals[0];
    assert_eq!(event.order_type, OrderType::Limit);
    assert_eq!(event.quantity, 3.0);
    assert!((event.price - 102.0 * 0.98).abs() < 1e-9);
}

#[test]
fn crossover_against_constant_default() {
    let mut s = Strategy::new("brk", "breakout");
    s.add_node_with_id("px", "price", &ParamPatch::new()).unwrap();
    s.add_node_with_id("x", "crossover", &ParamPatch::new()).unwrap();
    s.add_node_with_id("buy", "buy", &ParamPatch::new()).unwrap();
    s.set_input_default(&"x".into(), "slow", Some(Value::Number(105.0)))
        .unwrap();
    wire(&mut s, ("px", "value"), ("x", "fast"));
    wire(&mut s, ("x", "result"), ("buy", "signal"));

    let bars = make_bars(&[100.0, 104.0, 106.0, 107.0, 103.0, 108.0]);
    let run = evaluate(&s, &bars, &CancelFlag::new()).unwrap();
    let times: Vec<_> = run.signals.iter().map(|e| e.timestamp).collect();
    assert_eq!(times, vec![bars[2].time, bars[5].time]);
}
