//! Graph validator: structural and type checks run before evaluation.
//!
//! Checks, in order:
//! 1. Required inputs: every input is connected or has a usable default;
//!    action `signal` inputs must always be connected.
//! 2. Acyclicity: depth-first traversal tracking the active recursion stack.
//! 3. Orphans: connections whose endpoints reference missing nodes or ports.
//!
//! Global parameters are sanity-checked last. Non-blocking findings come
//! back as warnings and never stop an evaluation.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::catalog::{ComponentKind, ComponentType};
use crate::domain::{ConnectionId, NodeId};
use crate::graph::{Endpoint, Strategy};

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("input '{port}' is not connected and has no default")]
    UnboundInput { port: String },

    #[error("action signal input must be connected")]
    UnboundSignal,

    #[error("cycle through {}", format_path(.path))]
    Cycle { path: Vec<NodeId> },

    #[error("connection references missing {what} {endpoint}")]
    OrphanConnection { endpoint: Endpoint, what: &'static str },

    #[error("strategy parameter '{name}' {reason}")]
    InvalidStrategyParameter { name: &'static str, reason: String },
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// One blocking problem, tagged with the offending node and/or connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub node_id: Option<NodeId>,
    pub connection: Option<ConnectionId>,
    pub reason: ValidationIssue,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.node_id, self.connection) {
            (Some(node), Some(conn)) => write!(f, "node '{node}' ({conn}): {}", self.reason),
            (Some(node), None) => write!(f, "node '{node}': {}", self.reason),
            (None, Some(conn)) => write!(f, "{conn}: {}", self.reason),
            (None, None) => write!(f, "{}", self.reason),
        }
    }
}

/// Non-empty list of validation errors; the error type that blocks evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ─── Warnings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationWarning {
    #[error("strategy has no action nodes and will never trade")]
    NoActions,

    #[error("outputs of node '{0}' are not consumed")]
    UnusedOutput(NodeId),

    #[error("crossover '{node}' compares {feed} with itself")]
    CrossoverSameSource { node: NodeId, feed: Endpoint },
}

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(warnings)` when valid, otherwise the blocking errors.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

/// Run every check over `strategy`.
pub fn validate(strategy: &Strategy) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_inputs(strategy, &mut report);
    check_cycles(strategy, &mut report);
    check_orphans(strategy, &mut report);
    check_parameters(strategy, &mut report);
    collect_warnings(strategy, &mut report);
    if !report.errors.is_empty() {
        log::debug!(
            "strategy '{}' failed validation with {} error(s)",
            strategy.id,
            report.errors.len()
        );
    }
    report
}

fn node_error(node: &NodeId, reason: ValidationIssue) -> ValidationError {
    ValidationError {
        node_id: Some(node.clone()),
        connection: None,
        reason,
    }
}

fn check_inputs(strategy: &Strategy, report: &mut ValidationReport) {
    for node in strategy.nodes() {
        for port in node.definition().inputs {
            let endpoint = Endpoint::new(node.id().clone(), port.name);
            if strategy.binding(&endpoint).is_some() {
                continue;
            }
            if node.kind() == ComponentKind::Action && port.name == "signal" {
                report
                    .errors
                    .push(node_error(node.id(), ValidationIssue::UnboundSignal));
            } else if node.input_default(port.name).is_none() {
                report.errors.push(node_error(
                    node.id(),
                    ValidationIssue::UnboundInput {
                        port: port.name.to_string(),
                    },
                ));
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

fn check_cycles(strategy: &Strategy, report: &mut ValidationReport) {
    let nodes = strategy.nodes();
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for c in strategy.connections() {
        if strategy.node(&c.from.node).is_some() && strategy.node(&c.to.node).is_some() {
            adjacency.entry(&c.from.node).or_default().push(&c.to.node);
        }
    }

    let mut marks: HashMap<&NodeId, Mark> = nodes.iter().map(|n| (n.id(), Mark::Unvisited)).collect();
    let mut stack: Vec<&NodeId> = Vec::new();

    fn visit<'a>(
        id: &'a NodeId,
        adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        marks: &mut HashMap<&'a NodeId, Mark>,
        stack: &mut Vec<&'a NodeId>,
        report: &mut ValidationReport,
    ) {
        marks.insert(id, Mark::OnStack);
        stack.push(id);
        for &next in adjacency.get(id).map(Vec::as_slice).unwrap_or(&[]) {
            match marks.get(next).copied().unwrap_or(Mark::Done) {
                Mark::Unvisited => visit(next, adjacency, marks, stack, report),
                Mark::OnStack => {
                    let start = stack.iter().position(|n| *n == next).unwrap_or(0);
                    let mut path: Vec<NodeId> = stack[start..].iter().map(|n| (*n).clone()).collect();
                    path.push(next.clone());
                    report
                        .errors
                        .push(node_error(next, ValidationIssue::Cycle { path }));
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
    }

    for node in &nodes {
        if marks.get(node.id()) == Some(&Mark::Unvisited) {
            visit(node.id(), &adjacency, &mut marks, &mut stack, report);
        }
    }
}

fn check_orphans(strategy: &Strategy, report: &mut ValidationReport) {
    for c in strategy.connections() {
        let problem = match (strategy.node(&c.from.node), strategy.node(&c.to.node)) {
            (None, _) => Some((c.from.clone(), "node")),
            (_, None) => Some((c.to.clone(), "node")),
            (Some(src), Some(dst)) => {
                if src.definition().output(&c.from.port).is_none() {
                    Some((c.from.clone(), "output port"))
                } else if dst.definition().input(&c.to.port).is_none() {
                    Some((c.to.clone(), "input port"))
                } else {
                    None
                }
            }
        };
        if let Some((endpoint, what)) = problem {
            report.errors.push(ValidationError {
                node_id: Some(endpoint.node.clone()),
                connection: Some(c.id),
                reason: ValidationIssue::OrphanConnection { endpoint, what },
            });
        }
    }
}

fn check_parameters(strategy: &Strategy, report: &mut ValidationReport) {
    let p = &strategy.parameters;
    let mut fail = |name: &'static str, reason: &str| {
        report.errors.push(ValidationError {
            node_id: None,
            connection: None,
            reason: ValidationIssue::InvalidStrategyParameter {
                name,
                reason: reason.to_string(),
            },
        });
    };
    if p.symbol.trim().is_empty() {
        fail("symbol", "must not be empty");
    }
    if !(p.initial_capital.is_finite() && p.initial_capital > 0.0) {
        fail("initialCapital", "must be positive");
    }
    if !(0.0..1.0).contains(&p.commission) {
        fail("commission", "must be in [0, 1)");
    }
    if !(0.0..1.0).contains(&p.slippage) {
        fail("slippage", "must be in [0, 1)");
    }
}

fn collect_warnings(strategy: &Strategy, report: &mut ValidationReport) {
    let nodes = strategy.nodes();
    if !nodes.iter().any(|n| n.kind() == ComponentKind::Action) {
        report.warnings.push(ValidationWarning::NoActions);
    }
    for node in &nodes {
        let produces = matches!(node.kind(), ComponentKind::Indicator | ComponentKind::Condition);
        if produces && strategy.outgoing(node.id()).next().is_none() {
            report
                .warnings
                .push(ValidationWarning::UnusedOutput(node.id().clone()));
        }
        if node.component() == ComponentType::Crossover {
            let fast = strategy.binding(&Endpoint::new(node.id().clone(), "fast"));
            let slow = strategy.binding(&Endpoint::new(node.id().clone(), "slow"));
            if let (Some(f), Some(s)) = (fast, slow) {
                if f.from == s.from {
                    report.warnings.push(ValidationWarning::CrossoverSameSource {
                        node: node.id().clone(),
                        feed: f.from.clone(),
                    });
                }
            }
        }
    }
}
