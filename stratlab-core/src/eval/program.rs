//! Compilation of a validated strategy into a flat, ordered program.
//!
//! Nodes are ordered with Kahn's algorithm; ties go to the node inserted
//! first, so the order is a pure function of the graph. Every output port
//! gets a slot in a per-timestep value table, and every input is resolved to
//! a slot, a constant, or the bar close.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::catalog::ComponentKind;
use crate::domain::{NodeId, Value};
use crate::graph::{Endpoint, InputSourceDefault, NodeParams, Strategy, StrategyParameters};
use crate::validate::{validate, ValidationErrors, ValidationWarning};

/// Where a node input reads its value from at each timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSource {
    /// Output slot of an upstream node.
    Slot(usize),
    Const(Value),
    /// The current bar's close.
    Close,
}

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: NodeId,
    pub kind: ComponentKind,
    pub params: NodeParams,
    /// One entry per catalog input, in port order.
    pub inputs: Vec<InputSource>,
    /// First output slot; outputs occupy consecutive slots in port order.
    pub first_slot: usize,
    pub output_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskKind {
    StopLoss,
    TakeProfit,
}

/// A stop-loss or take-profit percentage registered by a risk node.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskRule {
    pub node_id: NodeId,
    pub kind: RiskKind,
    pub percent: f64,
}

/// Executable form of a strategy. Immutable and shareable across runs.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) nodes: Vec<CompiledNode>,
    pub(crate) slot_count: usize,
    pub(crate) parameters: StrategyParameters,
    pub(crate) risk_rules: Vec<RiskRule>,
    pub(crate) warnings: Vec<ValidationWarning>,
}

impl Program {
    /// Validate `strategy` and compile it. Refuses to compile while
    /// validation errors exist.
    pub fn compile(strategy: &Strategy) -> Result<Self, ValidationErrors> {
        let warnings = validate(strategy).into_result()?;

        let order = topological_order(strategy);
        let mut first_slot: HashMap<&NodeId, usize> = HashMap::new();
        let mut slot_count = 0;
        for node in &order {
            first_slot.insert(node.id(), slot_count);
            slot_count += node.definition().outputs.len();
        }

        let mut nodes = Vec::with_capacity(order.len());
        let mut risk_rules = Vec::new();
        for node in &order {
            let def = node.definition();
            let mut inputs = Vec::with_capacity(def.inputs.len());
            for port in def.inputs {
                let source = match strategy.binding(&Endpoint::new(node.id().clone(), port.name)) {
                    Some(conn) => {
                        let upstream = strategy.node(&conn.from.node);
                        let base = first_slot.get(&conn.from.node);
                        let offset = upstream.and_then(|n| n.definition().output_index(&conn.from.port));
                        match (base, offset) {
                            (Some(base), Some(offset)) => InputSource::Slot(base + offset),
                            // Unreachable after validation; read nothing rather than panic.
                            _ => InputSource::Const(Value::Number(f64::NAN)),
                        }
                    }
                    None => match node.input_default(port.name) {
                        Some(InputSourceDefault::Close) | None => InputSource::Close,
                        Some(InputSourceDefault::Const(v)) => InputSource::Const(v),
                    },
                };
                inputs.push(source);
            }

            match node.params() {
                NodeParams::StopLoss { percent } => risk_rules.push(RiskRule {
                    node_id: node.id().clone(),
                    kind: RiskKind::StopLoss,
                    percent: *percent,
                }),
                NodeParams::TakeProfit { percent } => risk_rules.push(RiskRule {
                    node_id: node.id().clone(),
                    kind: RiskKind::TakeProfit,
                    percent: *percent,
                }),
                _ => {}
            }

            nodes.push(CompiledNode {
                id: node.id().clone(),
                kind: node.kind(),
                params: node.params().clone(),
                inputs,
                first_slot: first_slot.get(node.id()).copied().unwrap_or(0),
                output_count: def.outputs.len(),
            });
        }

        log::debug!(
            "compiled strategy '{}': order [{}], {} slots, {} risk rule(s)",
            strategy.id,
            nodes
                .iter()
                .map(|n| n.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            slot_count,
            risk_rules.len()
        );

        Ok(Self {
            nodes,
            slot_count,
            parameters: strategy.parameters.clone(),
            risk_rules,
            warnings,
        })
    }

    /// Node ids in evaluation order.
    pub fn order(&self) -> Vec<&NodeId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    pub fn nodes(&self) -> &[CompiledNode] {
        &self.nodes
    }

    pub fn parameters(&self) -> &StrategyParameters {
        &self.parameters
    }

    pub fn risk_rules(&self) -> &[RiskRule] {
        &self.risk_rules
    }

    /// Validation warnings collected at compile time.
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    pub fn has_actions(&self) -> bool {
        self.nodes.iter().any(|n| n.kind == ComponentKind::Action)
    }

    /// Tightest stop-loss percentage, if any risk node registers one.
    pub fn stop_loss(&self) -> Option<f64> {
        self.risk_percent(RiskKind::StopLoss)
    }

    /// Tightest take-profit percentage, if any risk node registers one.
    pub fn take_profit(&self) -> Option<f64> {
        self.risk_percent(RiskKind::TakeProfit)
    }

    fn risk_percent(&self, kind: RiskKind) -> Option<f64> {
        self.risk_rules
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.percent)
            .reduce(f64::min)
    }
}

/// Kahn's algorithm with a min-heap on insertion sequence.
fn topological_order(strategy: &Strategy) -> Vec<&crate::graph::Node> {
    let nodes = strategy.nodes();
    let index: HashMap<&NodeId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();

    let mut indegree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for c in strategy.connections() {
        if let (Some(&from), Some(&to)) = (index.get(&c.from.node), index.get(&c.to.node)) {
            indegree[to] += 1;
            successors[from].push(to);
        }
    }

    let mut ready: BinaryHeap<Reverse<(u64, usize)>> = nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| indegree[*i] == 0)
        .map(|(i, n)| Reverse((n.seq(), i)))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(nodes[i]);
        for &next in &successors[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse((nodes[next].seq(), next)));
            }
        }
    }
    order
}
