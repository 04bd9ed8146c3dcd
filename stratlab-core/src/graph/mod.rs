//! Strategy graph model: nodes, typed parameters, connections.
//!
//! - `Strategy` is the aggregate root; all mutations go through it.
//! - `NodeParams` holds validated, typed parameters per component.
//! - `GraphError` reports structural failures with the offending identifiers.

pub mod error;
pub mod node;
pub mod params;
pub mod strategy;

pub use error::{GraphError, PortDirection};
pub use node::{InputSourceDefault, Node};
pub use params::{
    patch, Comparison, CrossDirection, NodeParams, OrderParams, ParamError, ParamPatch, ParamValue,
};
pub use strategy::{Connection, Endpoint, Strategy, StrategyParameters, Timeframe};
