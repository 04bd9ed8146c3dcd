//! Node: one instantiated catalog component inside a strategy.

use std::collections::BTreeMap;

use crate::catalog::{ComponentDefinition, ComponentKind, ComponentType, PortDefault};
use crate::domain::{NodeId, Value};

use super::params::NodeParams;

/// What an unconnected input reads at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSourceDefault {
    /// The current bar's close.
    Close,
    Const(Value),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(super) id: NodeId,
    pub(super) definition: &'static ComponentDefinition,
    pub(super) params: NodeParams,
    /// Per-node overrides of the catalog port defaults.
    pub(super) input_defaults: BTreeMap<String, Value>,
    /// Insertion sequence within the owning strategy; breaks topological ties.
    pub(super) seq: u64,
}

impl Node {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn definition(&self) -> &'static ComponentDefinition {
        self.definition
    }

    pub fn component(&self) -> ComponentType {
        self.definition.component
    }

    pub fn kind(&self) -> ComponentKind {
        self.definition.kind
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    pub fn input_defaults(&self) -> &BTreeMap<String, Value> {
        &self.input_defaults
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Effective default of an input port when nothing is connected to it.
    ///
    /// Node overrides win over the catalog default. `None` means the port has
    /// no usable default (or does not exist).
    pub fn input_default(&self, port: &str) -> Option<InputSourceDefault> {
        let spec = self.definition.input(port)?;
        if let Some(v) = self.input_defaults.get(port) {
            return Some(InputSourceDefault::Const(*v));
        }
        match spec.default {
            PortDefault::Required => None,
            PortDefault::Close => Some(InputSourceDefault::Close),
            PortDefault::Number(x) => Some(InputSourceDefault::Const(Value::Number(x))),
            PortDefault::Bool(b) => Some(InputSourceDefault::Const(Value::Bool(b))),
            PortDefault::Param(name) => self
                .params
                .number(name)
                .map(|x| InputSourceDefault::Const(Value::Number(x))),
        }
    }
}

/// Structural equality: sequence numbers are bookkeeping, not identity.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.definition.component == other.definition.component
            && self.params == other.params
            && self.input_defaults == other.input_defaults
    }
}
