//! Strategy document: the serialized, transport-neutral form of a strategy.
//!
//! ```text
//! { id, name, description,
//!   components:  [ { id, kind, parameters, defaults? } ],
//!   connections: [ { from, output, to, input } ],
//!   parameters:  { symbol, timeframe, initialCapital, commission, slippage? } }
//! ```
//!
//! Loading rebuilds the strategy through the ordinary graph operations, so a
//! document can never smuggle in a cycle, a type mismatch, or an unknown kind.
//! The first failure aborts the load with one descriptive error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{NodeId, Value};
use crate::graph::{Endpoint, GraphError, ParamPatch, Strategy, StrategyParameters};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub components: Vec<ComponentDocument>,
    #[serde(default)]
    pub connections: Vec<ConnectionDocument>,
    pub parameters: StrategyParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDocument {
    pub id: NodeId,
    pub kind: String,
    #[serde(default)]
    pub parameters: ParamPatch,
    /// Overrides for unconnected inputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDocument {
    pub from: NodeId,
    pub output: String,
    pub to: NodeId,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("malformed strategy document: {0}")]
    Malformed(String),

    #[error("component '{id}': {source}")]
    Component { id: NodeId, source: GraphError },

    #[error("connection #{index} ({from} -> {to}): {source}")]
    Connection {
        index: usize,
        from: Endpoint,
        to: Endpoint,
        source: GraphError,
    },
}

impl StrategyDocument {
    /// Snapshot a strategy. Components appear in insertion order with every
    /// parameter written out, connections in insertion order.
    pub fn from_strategy(strategy: &Strategy) -> Self {
        Self {
            id: strategy.id.clone(),
            name: strategy.name.clone(),
            description: strategy.description.clone(),
            components: strategy
                .nodes()
                .into_iter()
                .map(|n| ComponentDocument {
                    id: n.id().clone(),
                    kind: n.definition().name.to_string(),
                    parameters: n.params().to_values(),
                    defaults: n.input_defaults().clone(),
                })
                .collect(),
            connections: strategy
                .connections()
                .map(|c| ConnectionDocument {
                    from: c.from.node.clone(),
                    output: c.from.port.clone(),
                    to: c.to.node.clone(),
                    input: c.to.port.clone(),
                })
                .collect(),
            parameters: strategy.parameters.clone(),
        }
    }

    /// Rebuild the strategy through the graph operations.
    pub fn into_strategy(self) -> Result<Strategy, DocumentError> {
        let mut strategy = Strategy::new(self.id, self.name);
        strategy.description = self.description;
        strategy.parameters = self.parameters;

        for component in self.components {
            let id = component.id;
            strategy
                .add_node_with_id(id.clone(), &component.kind, &component.parameters)
                .map_err(|source| DocumentError::Component {
                    id: id.clone(),
                    source,
                })?;
            for (port, value) in component.defaults {
                strategy
                    .set_input_default(&id, &port, Some(value))
                    .map_err(|source| DocumentError::Component {
                        id: id.clone(),
                        source,
                    })?;
            }
        }

        for (index, c) in self.connections.into_iter().enumerate() {
            let from = Endpoint::new(c.from, c.output);
            let to = Endpoint::new(c.to, c.input);
            strategy
                .connect(from.clone(), to.clone())
                .map_err(|source| DocumentError::Connection {
                    index,
                    from,
                    to,
                    source,
                })?;
        }
        Ok(strategy)
    }
}

/// Serialize a strategy into its document form.
pub fn serialize(strategy: &Strategy) -> StrategyDocument {
    StrategyDocument::from_strategy(strategy)
}

/// Rebuild a strategy from its document form.
pub fn deserialize(document: StrategyDocument) -> Result<Strategy, DocumentError> {
    document.into_strategy()
}

/// Pretty-printed JSON document.
pub fn to_json(strategy: &Strategy) -> Result<String, DocumentError> {
    serde_json::to_string_pretty(&serialize(strategy)).map_err(|e| DocumentError::Malformed(e.to_string()))
}

/// Compact JSON with stable key order; the input to strategy fingerprints.
pub fn to_canonical_json(strategy: &Strategy) -> Result<String, DocumentError> {
    serde_json::to_string(&serialize(strategy)).map_err(|e| DocumentError::Malformed(e.to_string()))
}

pub fn from_json(json: &str) -> Result<Strategy, DocumentError> {
    let document: StrategyDocument =
        serde_json::from_str(json).map_err(|e| DocumentError::Malformed(e.to_string()))?;
    deserialize(document)
}
