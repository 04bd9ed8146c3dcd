//! Component catalog: static registry of strategy primitives.
//!
//! Every node in a strategy graph is an instance of one `ComponentDefinition`.
//! Definitions are `static` items built into the binary: the catalog cannot
//! grow at runtime, and lookups never allocate.
//!
//! - `ComponentKind`: the four categories (indicator, condition, action, risk).
//! - `ComponentType`: one variant per concrete primitive.
//! - `ParamSpec` / `PortSpec`: the typed parameter and port schemas.

mod definitions;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::ValueType;

pub use definitions::ALL_DEFINITIONS;

// ─── Kinds and types ─────────────────────────────────────────────────

/// Category of a component. Determines how the evaluator treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Indicator,
    Condition,
    Action,
    Risk,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Indicator => "indicator",
            ComponentKind::Condition => "condition",
            ComponentKind::Action => "action",
            ComponentKind::Risk => "risk",
        };
        write!(f, "{s}")
    }
}

/// Concrete primitive. The serialized name is `ComponentDefinition::name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Price,
    Sma,
    Ema,
    Rsi,
    Bollinger,
    Macd,
    Crossover,
    Threshold,
    Compare,
    And,
    Or,
    Buy,
    Sell,
    StopLoss,
    TakeProfit,
}

impl ComponentType {
    /// The static definition for this type.
    pub fn definition(self) -> &'static ComponentDefinition {
        definitions::definition_for(self)
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn kind(self) -> ComponentKind {
        self.definition().kind
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─── Parameter schema ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Float,
    String,
    Boolean,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
        };
        write!(f, "{s}")
    }
}

/// Schema default. Kept `Copy` so definitions can live in statics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Integer(i64),
    Float(f64),
    Text(&'static str),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: ParamDefault,
    /// Inclusive lower bound for numeric parameters.
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    pub max: Option<f64>,
    /// Allowed values for string parameters. Empty means unrestricted.
    pub choices: &'static [&'static str],
    pub description: &'static str,
}

// ─── Port schema ─────────────────────────────────────────────────────

/// What an unconnected input port reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortDefault {
    /// No usable default: the port must be connected.
    Required,
    /// The current bar's close price.
    Close,
    Number(f64),
    Bool(bool),
    /// The current value of the named numeric parameter on the same node.
    Param(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSpec {
    pub name: &'static str,
    pub value_type: ValueType,
    pub default: PortDefault,
}

// ─── ComponentDefinition ─────────────────────────────────────────────

/// Immutable catalog entry.
#[derive(Debug, PartialEq)]
pub struct ComponentDefinition {
    pub component: ComponentType,
    pub kind: ComponentKind,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParamSpec],
    pub inputs: &'static [PortSpec],
    pub outputs: &'static [PortSpec],
}

impl ComponentDefinition {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&'static PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&'static PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────

/// Read-only access to the built-in definitions.
pub struct Catalog;

impl Catalog {
    /// Look up a definition by its serialized name (e.g. `"sma"`, `"stop_loss"`).
    pub fn lookup(name: &str) -> Option<&'static ComponentDefinition> {
        ALL_DEFINITIONS.iter().copied().find(|d| d.name == name)
    }

    /// Every definition, in catalog order.
    pub fn all() -> &'static [&'static ComponentDefinition] {
        &ALL_DEFINITIONS
    }

    /// Definitions of one category, in catalog order.
    pub fn of_kind(kind: ComponentKind) -> impl Iterator<Item = &'static ComponentDefinition> {
        ALL_DEFINITIONS.iter().copied().filter(move |d| d.kind == kind)
    }
}
