//! The per-timestep interpreter.
//!
//! Each `step` visits the compiled nodes in topological order, reading inputs
//! from the current value table. A node whose inputs are undefined (upstream
//! warm-up) is skipped and leaves its outputs undefined; that is not an error.
//! Action nodes whose inputs are ready still fire, whatever other branches do.
//! The previous step's table is kept for the crossover condition.

use crate::catalog::ComponentKind;
use crate::domain::{Bar, OrderType, Side, SignalEvent, Value};
use crate::graph::{CrossDirection, NodeParams, OrderParams};
use crate::indicators::Indicator;

use super::cancel::CancelFlag;
use super::program::{CompiledNode, InputSource, Program};
use super::state::NodeState;
use super::EngineError;

/// Result of evaluating one timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub signals: Vec<SignalEvent>,
    /// False when an action node could not run because its input chain was
    /// still warming up.
    pub complete: bool,
}

/// Full signal stream of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRun {
    pub signals: Vec<SignalEvent>,
    pub timesteps: usize,
    /// Timesteps on which at least one action's input chain had insufficient history.
    pub skipped_timesteps: usize,
}

enum Outcome {
    Outputs(Vec<Value>),
    WarmingUp,
    Action(Option<SignalEvent>),
}

pub struct Evaluator<'p> {
    program: &'p Program,
    states: Vec<NodeState>,
    values: Vec<Option<Value>>,
    prev_values: Vec<Option<Value>>,
    prev_close: Option<f64>,
    timesteps: usize,
    skipped: usize,
}

impl<'p> Evaluator<'p> {
    /// Fresh per-node state for one run over `program`.
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            states: program
                .nodes
                .iter()
                .map(|n| NodeState::for_params(&n.params))
                .collect(),
            values: vec![None; program.slot_count],
            prev_values: vec![None; program.slot_count],
            prev_close: None,
            timesteps: 0,
            skipped: 0,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn skipped_timesteps(&self) -> usize {
        self.skipped
    }

    /// Evaluate the graph at `bar`'s close.
    pub fn step(&mut self, bar: &Bar) -> StepOutput {
        std::mem::swap(&mut self.values, &mut self.prev_values);
        self.values.iter_mut().for_each(|v| *v = None);

        let program = self.program;
        let mut out = StepOutput {
            signals: Vec::new(),
            complete: true,
        };

        for (idx, node) in program.nodes.iter().enumerate() {
            let inputs: Option<Vec<Value>> = node
                .inputs
                .iter()
                .map(|src| read(src, &self.values, Some(bar.close)))
                .collect();
            let Some(inputs) = inputs else {
                if node.kind == ComponentKind::Action {
                    out.complete = false;
                }
                continue;
            };

            match self.eval_node(idx, node, &inputs, bar) {
                Outcome::Outputs(values) => {
                    for (k, v) in values.into_iter().enumerate().take(node.output_count) {
                        self.values[node.first_slot + k] = Some(v);
                    }
                }
                Outcome::WarmingUp => {}
                Outcome::Action(Some(event)) => out.signals.push(event),
                Outcome::Action(None) => {}
            }
        }

        self.prev_close = Some(bar.close);
        self.timesteps += 1;
        if !out.complete {
            self.skipped += 1;
        }
        out
    }

    /// Step through every bar, polling `cancel` once per timestep.
    ///
    /// A cancelled run returns `EngineError::Cancelled` and its partial
    /// signal stream is dropped.
    pub fn run(mut self, bars: &[Bar], cancel: &CancelFlag) -> Result<EvaluationRun, EngineError> {
        let mut signals = Vec::new();
        for bar in bars {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            signals.extend(self.step(bar).signals);
        }
        Ok(EvaluationRun {
            signals,
            timesteps: self.timesteps,
            skipped_timesteps: self.skipped,
        })
    }

    fn eval_node(&mut self, idx: usize, node: &CompiledNode, inputs: &[Value], bar: &Bar) -> Outcome {
        match (&node.params, &mut self.states[idx]) {
            (NodeParams::Price, _) => Outcome::Outputs(vec![Value::Number(num(inputs, 0))]),

            (NodeParams::Sma { .. }, NodeState::Sma(sma)) => match sma.update(num(inputs, 0)) {
                Some(v) => Outcome::Outputs(vec![Value::Number(v)]),
                None => Outcome::WarmingUp,
            },
            (NodeParams::Ema { .. }, NodeState::Ema(ema)) => match ema.update(num(inputs, 0)) {
                Some(v) => Outcome::Outputs(vec![Value::Number(v)]),
                None => Outcome::WarmingUp,
            },
            (
                NodeParams::Rsi {
                    oversold,
                    overbought,
                    ..
                },
                NodeState::Rsi { rsi, prev },
            ) => match rsi.update(num(inputs, 0)) {
                Some(v) => {
                    // Crossing events: the first defined value counts as coming from the other side.
                    let into_oversold = v < *oversold && prev.map_or(true, |p| p >= *oversold);
                    let into_overbought = v > *overbought && prev.map_or(true, |p| p <= *overbought);
                    *prev = Some(v);
                    Outcome::Outputs(vec![
                        Value::Number(v),
                        Value::Bool(into_oversold),
                        Value::Bool(into_overbought),
                    ])
                }
                None => Outcome::WarmingUp,
            },
            (NodeParams::Bollinger { .. }, NodeState::Bollinger(bb)) => match bb.update(num(inputs, 0)) {
                Some(b) => Outcome::Outputs(vec![
                    Value::Number(b.upper),
                    Value::Number(b.middle),
                    Value::Number(b.lower),
                ]),
                None => Outcome::WarmingUp,
            },
            (NodeParams::Macd { .. }, NodeState::Macd(macd)) => match macd.update(num(inputs, 0)) {
                Some(m) => Outcome::Outputs(vec![
                    Value::Number(m.macd),
                    Value::Number(m.signal),
                    Value::Number(m.histogram),
                ]),
                None => Outcome::WarmingUp,
            },

            (NodeParams::Crossover { direction }, _) => {
                let (fast, slow) = (num(inputs, 0), num(inputs, 1));
                let prev_fast = read(&node.inputs[0], &self.prev_values, self.prev_close);
                let prev_slow = read(&node.inputs[1], &self.prev_values, self.prev_close);
                let crossed = match (
                    prev_fast.and_then(|v| v.as_number()),
                    prev_slow.and_then(|v| v.as_number()),
                ) {
                    (Some(pf), Some(ps)) => match direction {
                        CrossDirection::Above => pf <= ps && fast > slow,
                        CrossDirection::Below => pf >= ps && fast < slow,
                    },
                    _ => false,
                };
                Outcome::Outputs(vec![Value::Bool(crossed)])
            }
            (NodeParams::Threshold { operator, .. }, _) | (NodeParams::Compare { operator }, _) => {
                Outcome::Outputs(vec![Value::Bool(operator.apply(num(inputs, 0), num(inputs, 1)))])
            }
            (NodeParams::And, _) => Outcome::Outputs(vec![Value::Bool(flag(inputs, 0) && flag(inputs, 1))]),
            (NodeParams::Or, _) => Outcome::Outputs(vec![Value::Bool(flag(inputs, 0) || flag(inputs, 1))]),

            (NodeParams::Buy(order), _) => {
                Outcome::Action(emit(&self.program.parameters.symbol, node, Side::Buy, order, flag(inputs, 0), bar))
            }
            (NodeParams::Sell(order), _) => {
                Outcome::Action(emit(&self.program.parameters.symbol, node, Side::Sell, order, flag(inputs, 0), bar))
            }

            (NodeParams::StopLoss { percent }, _) => {
                Outcome::Outputs(vec![Value::Number(num(inputs, 0) * (1.0 - percent))])
            }
            (NodeParams::TakeProfit { percent }, _) => {
                Outcome::Outputs(vec![Value::Number(num(inputs, 0) * (1.0 + percent))])
            }

            // State always matches params: both come from the same compiled node.
            _ => Outcome::WarmingUp,
        }
    }
}

/// Build the event for an action node whose signal is true.
fn emit(
    symbol: &str,
    node: &CompiledNode,
    side: Side,
    order: &OrderParams,
    signal: bool,
    bar: &Bar,
) -> Option<SignalEvent> {
    debug_assert_eq!(node.kind, ComponentKind::Action);
    if !signal {
        return None;
    }
    let price = match order.order_type {
        OrderType::Market => bar.close,
        OrderType::Limit => match side {
            Side::Buy => bar.close * (1.0 - order.limit_offset),
            Side::Sell => bar.close * (1.0 + order.limit_offset),
        },
    };
    Some(SignalEvent {
        timestamp: bar.time,
        symbol: symbol.to_string(),
        side,
        quantity: order.quantity,
        price,
        order_type: order.order_type,
        node_id: node.id.clone(),
    })
}

fn read(src: &InputSource, table: &[Option<Value>], close: Option<f64>) -> Option<Value> {
    match src {
        InputSource::Slot(slot) => table.get(*slot).copied().flatten(),
        InputSource::Const(v) => Some(*v),
        InputSource::Close => close.map(Value::Number),
    }
}

fn num(inputs: &[Value], i: usize) -> f64 {
    inputs.get(i).and_then(Value::as_number).unwrap_or(f64::NAN)
}

fn flag(inputs: &[Value], i: usize) -> bool {
    inputs.get(i).and_then(Value::as_bool).unwrap_or(false)
}
