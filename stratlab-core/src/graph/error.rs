use thiserror::Error;

use crate::domain::{ConnectionId, NodeId, ValueType};

use super::strategy::Endpoint;

/// Which side of a node a port lookup was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Structural error raised by a graph mutation. The graph is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown component kind '{0}'")]
    UnknownComponentKind(String),

    #[error("invalid parameter '{parameter}' on {kind}: {reason}")]
    InvalidParameter {
        kind: String,
        parameter: String,
        reason: String,
    },

    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    #[error("node '{node}' has no {direction} port '{port}'")]
    UnknownPort {
        node: NodeId,
        port: String,
        direction: PortDirection,
    },

    #[error("cannot connect {from} ({from_type}) to {to} ({to_type})")]
    PortTypeMismatch {
        from: Endpoint,
        to: Endpoint,
        from_type: ValueType,
        to_type: ValueType,
    },

    #[error("input {to} is already bound by {existing}")]
    PortAlreadyBound { to: Endpoint, existing: ConnectionId },

    #[error("connecting {from} to {to} would create a cycle")]
    CycleDetected { from: Endpoint, to: Endpoint },

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Wrong value type, or a NaN/infinite number.
    #[error("input default for {node}.{port} must be a valid {expected}")]
    InvalidDefault {
        node: NodeId,
        port: String,
        expected: ValueType,
    },
}
