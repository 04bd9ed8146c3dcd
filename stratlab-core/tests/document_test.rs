//! Strategy documents loaded from disk.

use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};
use stratlab_core::document::{from_json, serialize, to_canonical_json, to_json, DocumentError};
use stratlab_core::graph::{NodeParams, Timeframe};
use stratlab_core::{run_backtest, validate, Bar, CancelFlag, GraphError, StrategyDocument};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

fn sine_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.08).sin() * 12.0 + i as f64 * 0.02;
            Bar {
                time: start + Duration::days(i as i64),
                open: close - 0.2,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

#[test]
fn fixture_loads_and_validates() {
    let s = from_json(&fixture("sma_cross.json")).unwrap();
    assert_eq!(s.id, "sma-cross");
    assert_eq!(s.node_count(), 7);
    assert_eq!(s.connection_count(), 6);
    assert_eq!(s.parameters.timeframe, Timeframe::D1);
    assert_eq!(s.parameters.slippage, 0.0005);
    assert_eq!(
        s.node(&"slow".into()).unwrap().params(),
        &NodeParams::Sma { period: 30 }
    );
    // Integer quantity in the document is accepted for a float parameter.
    match s.node(&"entry".into()).unwrap().params() {
        NodeParams::Buy(order) => assert_eq!(order.quantity, 10.0),
        other => panic!("unexpected params {other:?}"),
    }

    let report = validate(&s);
    assert!(report.is_valid(), "errors: {:?}", report.errors);
}

#[test]
fn fixture_backtests() {
    let s = from_json(&fixture("sma_cross.json")).unwrap();
    let r = run_backtest(&s, &sine_bars(400), None, &CancelFlag::new()).unwrap();
    assert!(r.total_trades >= 2, "trades: {}", r.total_trades);
    assert!(r.total_commission > 0.0);
    assert_eq!(r.skipped_timesteps, 29);
}

#[test]
fn round_trip_through_disk() {
    let original = from_json(&fixture("sma_cross.json")).unwrap();
    let dir = std::env::temp_dir().join(format!("stratlab_doc_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("strategy.json");

    std::fs::write(&path, to_json(&original).unwrap()).unwrap();
    let reloaded = from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(original, reloaded);
    assert_eq!(
        to_canonical_json(&original).unwrap(),
        to_canonical_json(&reloaded).unwrap()
    );
}

#[test]
fn canonical_json_is_compact_document() {
    let s = from_json(&fixture("sma_cross.json")).unwrap();
    let canonical = to_canonical_json(&s).unwrap();
    assert!(!canonical.contains('\n'));
    let doc: StrategyDocument = serde_json::from_str(&canonical).unwrap();
    assert_eq!(doc, serialize(&s));
}

#[test]
fn dangling_connection_is_reported_with_index() {
    let mut value: serde_json::Value = serde_json::from_str(&fixture("sma_cross.json")).unwrap();
    value["connections"][4]["from"] = "ghost".into();
    let err = from_json(&value.to_string()).unwrap_err();
    match err {
        DocumentError::Connection { index, source, .. } => {
            assert_eq!(index, 4);
            assert_eq!(source, GraphError::UnknownNode("ghost".into()));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[test]
fn missing_parameters_block_is_malformed() {
    let err = from_json(r#"{ "id": "x", "name": "x", "components": [] }"#).unwrap_err();
    assert!(matches!(err, DocumentError::Malformed(_)));
}
