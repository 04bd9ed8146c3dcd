//! Strategy: aggregate root owning nodes, connections, and global parameters.
//!
//! Every mutation is atomic: it either fully applies or returns a `GraphError`
//! and leaves the strategy untouched. Acyclicity is enforced at edge insertion
//! by a reachability check from the target back to the source.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::catalog::Catalog;
use crate::domain::{ConnectionId, NodeId, Value};

use super::error::{GraphError, PortDirection};
use super::node::Node;
use super::params::{NodeParams, ParamPatch};

// ─── Global parameters ───────────────────────────────────────────────

/// Bar interval of the strategy's market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    /// Periods per year on a 365-day, around-the-clock calendar.
    pub fn periods_per_year(self) -> f64 {
        match self {
            Timeframe::M1 => 525_600.0,
            Timeframe::M5 => 105_120.0,
            Timeframe::M15 => 35_040.0,
            Timeframe::M30 => 17_520.0,
            Timeframe::H1 => 8_760.0,
            Timeframe::H4 => 2_190.0,
            Timeframe::D1 => 365.0,
            Timeframe::W1 => 52.0,
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParameters {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub initial_capital: f64,
    /// Fraction of notional charged per fill.
    pub commission: f64,
    /// Fraction of price added to buys and removed from sells on market fills.
    #[serde(default)]
    pub slippage: f64,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            symbol: "SPY".to_string(),
            timeframe: Timeframe::D1,
            initial_capital: 10_000.0,
            commission: 0.001,
            slippage: 0.0,
        }
    }
}

// ─── Endpoints and connections ───────────────────────────────────────

/// One end of a connection: a node and one of its port names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: String,
}

impl Endpoint {
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub from: Endpoint,
    pub to: Endpoint,
}

// ─── Strategy ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters: StrategyParameters,
    nodes: BTreeMap<NodeId, Node>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_seq: u64,
    next_connection: u64,
}

impl Strategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parameters: StrategyParameters::default(),
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_seq: 0,
            next_connection: 0,
        }
    }

    // ── Node mutations ──

    /// Instantiate a catalog component with a generated id (`<kind>-<n>`).
    pub fn add_node(&mut self, kind: &str, params: &ParamPatch) -> Result<NodeId, GraphError> {
        let mut n = self.next_seq + 1;
        let id = loop {
            let candidate = NodeId::new(format!("{kind}-{n}"));
            if !self.nodes.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.add_node_with_id(id, kind, params)
    }

    /// Instantiate a component under a caller-chosen id.
    pub fn add_node_with_id(
        &mut self,
        id: impl Into<NodeId>,
        kind: &str,
        params: &ParamPatch,
    ) -> Result<NodeId, GraphError> {
        let id = id.into();
        let definition =
            Catalog::lookup(kind).ok_or_else(|| GraphError::UnknownComponentKind(kind.to_string()))?;
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNodeId(id));
        }
        let params = NodeParams::resolve(definition, None, params).map_err(|e| {
            GraphError::InvalidParameter {
                kind: kind.to_string(),
                parameter: e.parameter,
                reason: e.reason,
            }
        })?;

        let node = Node {
            id: id.clone(),
            definition,
            params,
            input_defaults: BTreeMap::new(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        log::debug!("added node {id} ({kind})");
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        self.connections
            .retain(|_, c| &c.from.node != id && &c.to.node != id);
        Ok(node)
    }

    /// Apply a parameter patch on top of the node's current parameters.
    pub fn set_parameters(&mut self, id: &NodeId, patch: &ParamPatch) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        let base = node.params.to_values();
        node.params = NodeParams::resolve(node.definition, Some(&base), patch).map_err(|e| {
            GraphError::InvalidParameter {
                kind: node.definition.name.to_string(),
                parameter: e.parameter,
                reason: e.reason,
            }
        })?;
        Ok(())
    }

    /// Override (or with `None`, clear) the default of an unconnected input.
    pub fn set_input_default(
        &mut self,
        id: &NodeId,
        port: &str,
        value: Option<Value>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        let spec = node
            .definition
            .input(port)
            .ok_or_else(|| GraphError::UnknownPort {
                node: id.clone(),
                port: port.to_string(),
                direction: PortDirection::Input,
            })?;
        let non_finite = matches!(value, Some(Value::Number(n)) if !n.is_finite());
        match value {
            Some(v) if non_finite || v.value_type() != spec.value_type => Err(GraphError::InvalidDefault {
                node: id.clone(),
                port: port.to_string(),
                expected: spec.value_type,
            }),
            Some(v) => {
                node.input_defaults.insert(port.to_string(), v);
                Ok(())
            }
            None => {
                node.input_defaults.remove(port);
                Ok(())
            }
        }
    }

    // ── Connection mutations ──

    /// Connect an output port to an input port.
    pub fn connect(&mut self, from: Endpoint, to: Endpoint) -> Result<ConnectionId, GraphError> {
        let source = self
            .nodes
            .get(&from.node)
            .ok_or_else(|| GraphError::UnknownNode(from.node.clone()))?;
        let target = self
            .nodes
            .get(&to.node)
            .ok_or_else(|| GraphError::UnknownNode(to.node.clone()))?;

        let out = source
            .definition
            .output(&from.port)
            .ok_or_else(|| GraphError::UnknownPort {
                node: from.node.clone(),
                port: from.port.clone(),
                direction: PortDirection::Output,
            })?;
        let input = target
            .definition
            .input(&to.port)
            .ok_or_else(|| GraphError::UnknownPort {
                node: to.node.clone(),
                port: to.port.clone(),
                direction: PortDirection::Input,
            })?;

        if out.value_type != input.value_type {
            return Err(GraphError::PortTypeMismatch {
                from_type: out.value_type,
                to_type: input.value_type,
                from,
                to,
            });
        }
        if let Some(existing) = self.binding(&to) {
            return Err(GraphError::PortAlreadyBound {
                existing: existing.id,
                to,
            });
        }
        if from.node == to.node || self.reaches(&to.node, &from.node) {
            return Err(GraphError::CycleDetected { from, to });
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        log::debug!("connected {from} -> {to} as {id}");
        self.connections.insert(id, Connection { id, from, to });
        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<Connection, GraphError> {
        self.connections
            .remove(&id)
            .ok_or(GraphError::UnknownConnection(id))
    }

    /// Drop all nodes and connections and restore default global parameters.
    /// Identity (`id`, `name`) is kept.
    pub fn reset(&mut self) {
        self.description.clear();
        self.parameters = StrategyParameters::default();
        self.nodes.clear();
        self.connections.clear();
        self.next_seq = 0;
        self.next_connection = 0;
    }

    // ── Queries ──

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Connections in insertion order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connections feeding into `node`.
    pub fn incoming<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| &c.to.node == node)
    }

    /// Connections leaving `node`.
    pub fn outgoing<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.values().filter(move |c| &c.from.node == node)
    }

    /// The connection bound to an input port, if any.
    pub fn binding(&self, input: &Endpoint) -> Option<&Connection> {
        self.connections.values().find(|c| &c.to == input)
    }

    /// Whether `target` is reachable from `start` along connections.
    fn reaches(&self, start: &NodeId, target: &NodeId) -> bool {
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.outgoing(current).map(|c| &c.to.node));
            }
        }
        false
    }

    /// Insert a connection without any checks, so tests can build graphs the
    /// public API refuses (cycles, dangling endpoints).
    #[cfg(test)]
    pub(crate) fn force_connect(&mut self, from: Endpoint, to: Endpoint) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connections.insert(id, Connection { id, from, to });
        id
    }
}

/// Structural equality: same metadata, nodes, and edge set. Connection ids,
/// sequence counters, and ordering are ignored.
impl PartialEq for Strategy {
    fn eq(&self, other: &Self) -> bool {
        let edges = |s: &Strategy| -> BTreeSet<(Endpoint, Endpoint)> {
            s.connections
                .values()
                .map(|c| (c.from.clone(), c.to.clone()))
                .collect()
        };
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.parameters == other.parameters
            && self.nodes == other.nodes
            && edges(self) == edges(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::params::{patch, ParamValue};
    use crate::ValueType;

    fn empty() -> ParamPatch {
        ParamPatch::new()
    }

    fn sma_cross() -> (Strategy, NodeId, NodeId, NodeId) {
        let mut s = Strategy::new("s1", "SMA cross");
        let fast = s
            .add_node("sma", &patch(&[("period", ParamValue::Integer(5))]))
            .unwrap();
        let slow = s.add_node("sma", &empty()).unwrap();
        let cross = s.add_node("crossover", &empty()).unwrap();
        (s, fast, slow, cross)
    }

    #[test]
    fn add_node_generates_unique_ids() {
        let (s, fast, slow, cross) = sma_cross();
        assert_eq!(fast.as_str(), "sma-1");
        assert_eq!(slow.as_str(), "sma-2");
        assert_eq!(cross.as_str(), "crossover-3");
        assert_eq!(s.node_count(), 3);
    }

    #[test]
    fn add_node_unknown_kind() {
        let mut s = Strategy::new("s", "s");
        let err = s.add_node("vwap", &empty()).unwrap_err();
        assert_eq!(err, GraphError::UnknownComponentKind("vwap".into()));
        assert!(s.is_empty());
    }

    #[test]
    fn add_node_invalid_parameter_leaves_graph_unchanged() {
        let mut s = Strategy::new("s", "s");
        let err = s
            .add_node("sma", &patch(&[("period", ParamValue::Integer(-3))]))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { ref parameter, .. } if parameter == "period"));
        assert!(s.is_empty());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut s = Strategy::new("s", "s");
        s.add_node_with_id("a", "price", &empty()).unwrap();
        let err = s.add_node_with_id("a", "sma", &empty()).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNodeId("a".into()));
    }

    #[test]
    fn connect_and_fan_out() {
        let (mut s, fast, slow, cross) = sma_cross();
        s.connect(Endpoint::new(fast.clone(), "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap();
        s.connect(Endpoint::new(slow.clone(), "value"), Endpoint::new(cross.clone(), "slow"))
            .unwrap();
        let cmp = s.add_node("compare", &empty()).unwrap();
        s.connect(Endpoint::new(fast.clone(), "value"), Endpoint::new(cmp, "left"))
            .unwrap();
        assert_eq!(s.outgoing(&fast).count(), 2);
        assert_eq!(s.incoming(&cross).count(), 2);
    }

    #[test]
    fn type_mismatch_leaves_graph_unchanged() {
        let (mut s, fast, _, cross) = sma_cross();
        let before = s.clone();
        let err = s
            .connect(Endpoint::new(cross, "result"), Endpoint::new(fast, "price"))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::PortTypeMismatch {
                from_type: ValueType::Boolean,
                to_type: ValueType::Number,
                ..
            }
        ));
        assert_eq!(s, before);
        assert_eq!(s.connection_count(), 0);
    }

    #[test]
    fn port_already_bound() {
        let (mut s, fast, slow, cross) = sma_cross();
        let first = s
            .connect(Endpoint::new(fast, "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap();
        let err = s
            .connect(Endpoint::new(slow, "value"), Endpoint::new(cross, "fast"))
            .unwrap_err();
        assert!(matches!(err, GraphError::PortAlreadyBound { existing, .. } if existing == first));
    }

    #[test]
    fn unknown_node_and_port() {
        let (mut s, fast, _, cross) = sma_cross();
        let err = s
            .connect(Endpoint::new("ghost", "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownNode("ghost".into()));

        let err = s
            .connect(Endpoint::new(fast, "upper"), Endpoint::new(cross, "fast"))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownPort {
                direction: PortDirection::Output,
                ..
            }
        ));
    }

    #[test]
    fn cycle_and_self_loop_rejected() {
        let mut s = Strategy::new("s", "s");
        let a = s.add_node("sma", &empty()).unwrap();
        let b = s.add_node("ema", &empty()).unwrap();
        let c = s.add_node("rsi", &empty()).unwrap();
        s.connect(Endpoint::new(a.clone(), "value"), Endpoint::new(b.clone(), "price"))
            .unwrap();
        s.connect(Endpoint::new(b.clone(), "value"), Endpoint::new(c.clone(), "price"))
            .unwrap();

        let err = s
            .connect(Endpoint::new(c, "value"), Endpoint::new(a.clone(), "price"))
            .unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));

        let d = s.add_node("sma", &empty()).unwrap();
        let err = s
            .connect(Endpoint::new(d.clone(), "value"), Endpoint::new(d, "price"))
            .unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert_eq!(s.connection_count(), 2);
    }

    #[test]
    fn remove_node_cascades() {
        let (mut s, fast, slow, cross) = sma_cross();
        s.connect(Endpoint::new(fast.clone(), "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap();
        s.connect(Endpoint::new(slow, "value"), Endpoint::new(cross.clone(), "slow"))
            .unwrap();
        s.remove_node(&fast).unwrap();
        assert_eq!(s.connection_count(), 1);
        assert!(s.incoming(&cross).all(|c| c.to.port == "slow"));
        assert!(s.remove_node(&fast).is_err());
    }

    #[test]
    fn disconnect_frees_port() {
        let (mut s, fast, slow, cross) = sma_cross();
        let id = s
            .connect(Endpoint::new(fast, "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap();
        s.disconnect(id).unwrap();
        assert_eq!(s.disconnect(id).unwrap_err(), GraphError::UnknownConnection(id));
        s.connect(Endpoint::new(slow, "value"), Endpoint::new(cross, "fast"))
            .unwrap();
    }

    #[test]
    fn set_parameters_patch_and_rollback() {
        let (mut s, fast, _, _) = sma_cross();
        s.set_parameters(&fast, &patch(&[("period", ParamValue::Integer(8))]))
            .unwrap();
        assert_eq!(s.node(&fast).unwrap().params(), &NodeParams::Sma { period: 8 });

        let err = s
            .set_parameters(&fast, &patch(&[("period", ParamValue::Float(0.5))]))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { .. }));
        assert_eq!(s.node(&fast).unwrap().params(), &NodeParams::Sma { period: 8 });
    }

    #[test]
    fn input_default_override() {
        let mut s = Strategy::new("s", "s");
        let t = s.add_node("threshold", &empty()).unwrap();
        s.set_input_default(&t, "threshold", Some(Value::Number(55.0)))
            .unwrap();
        let err = s
            .set_input_default(&t, "threshold", Some(Value::Bool(true)))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidDefault { .. }));
        assert!(s.set_input_default(&t, "nope", None).is_err());
        s.set_input_default(&t, "threshold", None).unwrap();
        assert!(s.node(&t).unwrap().input_defaults().is_empty());
    }

    #[test]
    fn non_finite_input_default_rejected() {
        let (mut s, _, _, cross) = sma_cross();
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let err = s
                .set_input_default(&cross, "slow", Some(Value::Number(bad)))
                .unwrap_err();
            assert!(matches!(
                err,
                GraphError::InvalidDefault {
                    expected: ValueType::Number,
                    ..
                }
            ));
        }
        assert!(s.node(&cross).unwrap().input_defaults().is_empty());
    }

    #[test]
    fn nodes_in_insertion_order() {
        let mut s = Strategy::new("s", "s");
        s.add_node_with_id("z", "price", &empty()).unwrap();
        s.add_node_with_id("a", "price", &empty()).unwrap();
        let ids: Vec<&str> = s.nodes().iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn reset_clears_graph() {
        let (mut s, fast, _, cross) = sma_cross();
        s.connect(Endpoint::new(fast, "value"), Endpoint::new(cross, "fast"))
            .unwrap();
        s.parameters.initial_capital = 5.0;
        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.connection_count(), 0);
        assert_eq!(s.parameters, StrategyParameters::default());
        assert_eq!(s.id, "s1");
    }

    #[test]
    fn equality_ignores_connection_ids() {
        let (mut a, fast, slow, cross) = sma_cross();
        let mut b = a.clone();
        a.connect(Endpoint::new(fast.clone(), "value"), Endpoint::new(cross.clone(), "fast"))
            .unwrap();
        a.connect(Endpoint::new(slow.clone(), "value"), Endpoint::new(cross.clone(), "slow"))
            .unwrap();
        b.connect(Endpoint::new(slow, "value"), Endpoint::new(cross.clone(), "slow"))
            .unwrap();
        b.connect(Endpoint::new(fast, "value"), Endpoint::new(cross, "fast"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn timeframe_serde_and_periods() {
        assert_eq!(serde_json::to_string(&Timeframe::H4).unwrap(), "\"4h\"");
        let tf: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(tf.periods_per_year(), 365.0);
        assert_eq!(Timeframe::W1.duration(), Duration::days(7));
    }

    #[test]
    fn parameters_slippage_defaults_to_zero() {
        let json = r#"{"symbol":"BTC","timeframe":"1h","initialCapital":1000,"commission":0.001}"#;
        let p: StrategyParameters = serde_json::from_str(json).unwrap();
        assert_eq!(p.slippage, 0.0);
        assert_eq!(p.timeframe, Timeframe::H1);
    }
}
