//! StratLab Core: strategy graph model, evaluator, and backtest engine.
//!
//! This crate contains the composition and evaluation engine:
//! - Component catalog of typed indicator/condition/action/risk primitives
//! - Strategy graph model with atomic, cycle-checked mutations
//! - Graph validator (required inputs, acyclicity, orphan connections)
//! - Streaming indicators and a topologically ordered interpreter
//! - Long-only backtest engine with commission, slippage, and risk exits
//! - Lossless strategy document serializer
//!
//! No I/O happens here; loading data and writing artifacts belong to the runner.

pub mod backtest;
pub mod catalog;
pub mod document;
pub mod domain;
pub mod eval;
pub mod graph;
pub mod indicators;
pub mod validate;

pub use backtest::{run_backtest, BacktestResult, ClosedTrade, EquityPoint, ExitReason};
pub use catalog::{Catalog, ComponentDefinition, ComponentKind, ComponentType};
pub use document::{DocumentError, StrategyDocument};
pub use domain::{
    validate_series, Bar, ConnectionId, DateRange, MarketDataError, NodeId, OrderType, Side,
    SignalEvent, Value, ValueType,
};
pub use eval::{evaluate, CancelFlag, EngineError, EvaluationRun, Evaluator, Program};
pub use graph::{
    patch, Endpoint, GraphError, NodeParams, ParamPatch, ParamValue, Strategy,
    StrategyParameters, Timeframe,
};
pub use validate::{validate, ValidationError, ValidationErrors, ValidationReport, ValidationWarning};
