//! Evaluator: executes a strategy graph over a bar series.
//!
//! - `Program::compile` validates and orders the graph once.
//! - `Evaluator` holds fresh per-node state for one run and steps bar by bar.
//! - `evaluate` is the convenience entry point returning the whole signal stream.
//!
//! Evaluation is single-threaded and synchronous. Independent runs share
//! nothing but the immutable `Program`.

pub mod cancel;
pub mod interpreter;
pub mod program;
pub mod state;

pub use cancel::CancelFlag;
pub use interpreter::{EvaluationRun, Evaluator, StepOutput};
pub use program::{CompiledNode, InputSource, Program, RiskKind, RiskRule};

use thiserror::Error;

use crate::domain::{validate_series, Bar, MarketDataError};
use crate::graph::Strategy;
use crate::validate::ValidationErrors;

/// Why an evaluation or backtest produced no result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("strategy is invalid: {0}")]
    InvalidStrategy(#[from] ValidationErrors),

    #[error("invalid market data: {0}")]
    InvalidMarketData(#[from] MarketDataError),

    #[error("run cancelled")]
    Cancelled,
}

/// Validate, compile, and run `strategy` over `bars`.
pub fn evaluate(
    strategy: &Strategy,
    bars: &[Bar],
    cancel: &CancelFlag,
) -> Result<EvaluationRun, EngineError> {
    let program = Program::compile(strategy)?;
    validate_series(bars)?;
    Evaluator::new(&program).run(bars, cancel)
}
