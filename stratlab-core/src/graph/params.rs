//! Typed node parameters.
//!
//! Callers (the UI, the document loader, sweeps) supply parameters as an open
//! key/value patch. `NodeParams::resolve` validates the patch against the
//! component's `ParamSpec` schema, fills schema defaults, and produces one
//! tagged variant per component type so the evaluator never reads a raw map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{ComponentDefinition, ComponentType, ParamDefault, ParamSpec, ParamType};
use crate::domain::OrderType;

/// A raw parameter value as it appears in a patch or a serialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<ParamDefault> for ParamValue {
    fn from(d: ParamDefault) -> Self {
        match d {
            ParamDefault::Integer(i) => ParamValue::Integer(i),
            ParamDefault::Float(f) => ParamValue::Float(f),
            ParamDefault::Text(s) => ParamValue::Text(s.to_string()),
            ParamDefault::Bool(b) => ParamValue::Bool(b),
        }
    }
}

/// Parameter patch keyed by parameter name. `BTreeMap` keeps serialization stable.
pub type ParamPatch = BTreeMap<String, ParamValue>;

/// Build a patch from `&[(&str, ParamValue)]` pairs.
pub fn patch(pairs: &[(&str, ParamValue)]) -> ParamPatch {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Why a parameter was rejected. Wrapped into `GraphError::InvalidParameter`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamError {
    pub parameter: String,
    pub reason: String,
}

impl ParamError {
    fn new(parameter: &str, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}

// ─── Enumerated parameter values ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Above,
    Below,
}

/// Comparison operator for threshold/compare conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Gte => left >= right,
            Comparison::Lt => left < right,
            Comparison::Lte => left <= right,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Comparison::Gt => "gt",
            Comparison::Gte => "gte",
            Comparison::Lt => "lt",
            Comparison::Lte => "lte",
        }
    }
}

/// Order settings shared by buy and sell actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderParams {
    pub quantity: f64,
    pub order_type: OrderType,
    pub limit_offset: f64,
}

// ─── NodeParams ──────────────────────────────────────────────────────

/// Fully resolved, typed parameter set of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeParams {
    Price,
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize, oversold: f64, overbought: f64 },
    Bollinger { period: usize, std_dev: f64 },
    Macd { fast_period: usize, slow_period: usize, signal_period: usize },
    Crossover { direction: CrossDirection },
    Threshold { operator: Comparison, threshold: f64 },
    Compare { operator: Comparison },
    And,
    Or,
    Buy(OrderParams),
    Sell(OrderParams),
    StopLoss { percent: f64 },
    TakeProfit { percent: f64 },
}

impl NodeParams {
    /// Validate `patch` on top of `base` (schema defaults when `None`) and build
    /// the typed parameter set. Nothing is modified on error.
    pub fn resolve(
        def: &ComponentDefinition,
        base: Option<&ParamPatch>,
        patch: &ParamPatch,
    ) -> Result<Self, ParamError> {
        let mut values: ParamPatch = match base {
            Some(b) => b.clone(),
            None => def
                .parameters
                .iter()
                .map(|s| (s.name.to_string(), ParamValue::from(s.default)))
                .collect(),
        };

        for (name, raw) in patch {
            let spec = def
                .param(name)
                .ok_or_else(|| ParamError::new(name, format!("{} has no such parameter", def.name)))?;
            values.insert(name.clone(), coerce(spec, raw)?);
        }

        Self::from_values(def.component, &values)
    }

    fn from_values(component: ComponentType, v: &ParamPatch) -> Result<Self, ParamError> {
        let params = match component {
            ComponentType::Price => NodeParams::Price,
            ComponentType::Sma => NodeParams::Sma {
                period: int(v, "period")?,
            },
            ComponentType::Ema => NodeParams::Ema {
                period: int(v, "period")?,
            },
            ComponentType::Rsi => {
                let oversold = float(v, "oversold")?;
                let overbought = float(v, "overbought")?;
                if oversold >= overbought {
                    return Err(ParamError::new(
                        "oversold",
                        format!("must be below overbought ({overbought})"),
                    ));
                }
                NodeParams::Rsi {
                    period: int(v, "period")?,
                    oversold,
                    overbought,
                }
            }
            ComponentType::Bollinger => NodeParams::Bollinger {
                period: int(v, "period")?,
                std_dev: float(v, "stdDev")?,
            },
            ComponentType::Macd => {
                let fast_period = int(v, "fastPeriod")?;
                let slow_period = int(v, "slowPeriod")?;
                if fast_period >= slow_period {
                    return Err(ParamError::new(
                        "fastPeriod",
                        format!("must be below slowPeriod ({slow_period})"),
                    ));
                }
                NodeParams::Macd {
                    fast_period,
                    slow_period,
                    signal_period: int(v, "signalPeriod")?,
                }
            }
            ComponentType::Crossover => NodeParams::Crossover {
                direction: match text(v, "direction")? {
                    "below" => CrossDirection::Below,
                    _ => CrossDirection::Above,
                },
            },
            ComponentType::Threshold => NodeParams::Threshold {
                operator: operator(v)?,
                threshold: float(v, "threshold")?,
            },
            ComponentType::Compare => NodeParams::Compare {
                operator: operator(v)?,
            },
            ComponentType::And => NodeParams::And,
            ComponentType::Or => NodeParams::Or,
            ComponentType::Buy => NodeParams::Buy(order(v)?),
            ComponentType::Sell => NodeParams::Sell(order(v)?),
            ComponentType::StopLoss => NodeParams::StopLoss {
                percent: float(v, "percent")?,
            },
            ComponentType::TakeProfit => NodeParams::TakeProfit {
                percent: float(v, "percent")?,
            },
        };
        Ok(params)
    }

    /// The component type these parameters belong to.
    pub fn component(&self) -> ComponentType {
        match self {
            NodeParams::Price => ComponentType::Price,
            NodeParams::Sma { .. } => ComponentType::Sma,
            NodeParams::Ema { .. } => ComponentType::Ema,
            NodeParams::Rsi { .. } => ComponentType::Rsi,
            NodeParams::Bollinger { .. } => ComponentType::Bollinger,
            NodeParams::Macd { .. } => ComponentType::Macd,
            NodeParams::Crossover { .. } => ComponentType::Crossover,
            NodeParams::Threshold { .. } => ComponentType::Threshold,
            NodeParams::Compare { .. } => ComponentType::Compare,
            NodeParams::And => ComponentType::And,
            NodeParams::Or => ComponentType::Or,
            NodeParams::Buy(_) => ComponentType::Buy,
            NodeParams::Sell(_) => ComponentType::Sell,
            NodeParams::StopLoss { .. } => ComponentType::StopLoss,
            NodeParams::TakeProfit { .. } => ComponentType::TakeProfit,
        }
    }

    /// Convert back to the open key/value form (inverse of `resolve`).
    pub fn to_values(&self) -> ParamPatch {
        let int = |n: usize| ParamValue::Integer(n as i64);
        let mut out = ParamPatch::new();
        let mut put = |k: &str, v: ParamValue| {
            out.insert(k.to_string(), v);
        };
        match self {
            NodeParams::Price | NodeParams::And | NodeParams::Or => {}
            NodeParams::Sma { period } | NodeParams::Ema { period } => put("period", int(*period)),
            NodeParams::Rsi {
                period,
                oversold,
                overbought,
            } => {
                put("period", int(*period));
                put("oversold", ParamValue::Float(*oversold));
                put("overbought", ParamValue::Float(*overbought));
            }
            NodeParams::Bollinger { period, std_dev } => {
                put("period", int(*period));
                put("stdDev", ParamValue::Float(*std_dev));
            }
            NodeParams::Macd {
                fast_period,
                slow_period,
                signal_period,
            } => {
                put("fastPeriod", int(*fast_period));
                put("slowPeriod", int(*slow_period));
                put("signalPeriod", int(*signal_period));
            }
            NodeParams::Crossover { direction } => {
                let s = match direction {
                    CrossDirection::Above => "above",
                    CrossDirection::Below => "below",
                };
                put("direction", ParamValue::Text(s.into()));
            }
            NodeParams::Threshold {
                operator,
                threshold,
            } => {
                put("operator", ParamValue::Text(operator.as_str().into()));
                put("threshold", ParamValue::Float(*threshold));
            }
            NodeParams::Compare { operator } => {
                put("operator", ParamValue::Text(operator.as_str().into()));
            }
            NodeParams::Buy(o) | NodeParams::Sell(o) => {
                put("quantity", ParamValue::Float(o.quantity));
                put("orderType", ParamValue::Text(o.order_type.as_str().into()));
                put("limitOffset", ParamValue::Float(o.limit_offset));
            }
            NodeParams::StopLoss { percent } | NodeParams::TakeProfit { percent } => {
                put("percent", ParamValue::Float(*percent));
            }
        }
        out
    }

    /// Numeric value of a parameter, used for `PortDefault::Param` inputs.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.to_values().get(name)? {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

// ─── Coercion and typed getters ──────────────────────────────────────

/// Check one raw value against its spec: type, bounds, allowed choices.
fn coerce(spec: &ParamSpec, raw: &ParamValue) -> Result<ParamValue, ParamError> {
    let value = match (spec.param_type, raw) {
        (ParamType::Integer, ParamValue::Integer(i)) => ParamValue::Integer(*i),
        (ParamType::Integer, ParamValue::Float(f)) if f.is_finite() && f.fract() == 0.0 => {
            ParamValue::Integer(*f as i64)
        }
        (ParamType::Float, ParamValue::Float(f)) if f.is_finite() => ParamValue::Float(*f),
        (ParamType::Float, ParamValue::Integer(i)) => ParamValue::Float(*i as f64),
        (ParamType::String, ParamValue::Text(s)) => {
            if !spec.choices.is_empty() && !spec.choices.contains(&s.as_str()) {
                return Err(ParamError::new(
                    spec.name,
                    format!("'{s}' is not one of {:?}", spec.choices),
                ));
            }
            ParamValue::Text(s.clone())
        }
        (ParamType::Boolean, ParamValue::Bool(b)) => ParamValue::Bool(*b),
        (expected, got) => {
            return Err(ParamError::new(
                spec.name,
                format!("expected {expected}, got '{got}'"),
            ))
        }
    };

    let numeric = match &value {
        ParamValue::Integer(i) => Some(*i as f64),
        ParamValue::Float(f) => Some(*f),
        _ => None,
    };
    if let Some(x) = numeric {
        if spec.min.is_some_and(|min| x < min) || spec.max.is_some_and(|max| x > max) {
            return Err(ParamError::new(
                spec.name,
                format!(
                    "{x} is outside [{}, {}]",
                    spec.min.map_or("-inf".to_string(), |m| m.to_string()),
                    spec.max.map_or("inf".to_string(), |m| m.to_string()),
                ),
            ));
        }
    }
    Ok(value)
}

fn missing(name: &str) -> ParamError {
    ParamError::new(name, "missing value")
}

fn int(v: &ParamPatch, name: &str) -> Result<usize, ParamError> {
    match v.get(name) {
        Some(ParamValue::Integer(i)) if *i >= 0 => Ok(*i as usize),
        Some(other) => Err(ParamError::new(name, format!("expected integer, got '{other}'"))),
        None => Err(missing(name)),
    }
}

fn float(v: &ParamPatch, name: &str) -> Result<f64, ParamError> {
    match v.get(name) {
        Some(ParamValue::Float(f)) => Ok(*f),
        Some(ParamValue::Integer(i)) => Ok(*i as f64),
        Some(other) => Err(ParamError::new(name, format!("expected float, got '{other}'"))),
        None => Err(missing(name)),
    }
}

fn text<'a>(v: &'a ParamPatch, name: &str) -> Result<&'a str, ParamError> {
    match v.get(name) {
        Some(ParamValue::Text(s)) => Ok(s),
        Some(other) => Err(ParamError::new(name, format!("expected string, got '{other}'"))),
        None => Err(missing(name)),
    }
}

fn operator(v: &ParamPatch) -> Result<Comparison, ParamError> {
    let s = text(v, "operator")?;
    Comparison::parse(s).ok_or_else(|| ParamError::new("operator", format!("unknown operator '{s}'")))
}

fn order(v: &ParamPatch) -> Result<OrderParams, ParamError> {
    let s = text(v, "orderType")?;
    Ok(OrderParams {
        quantity: float(v, "quantity")?,
        order_type: OrderType::parse(s)
            .ok_or_else(|| ParamError::new("orderType", format!("unknown order type '{s}'")))?,
        limit_offset: float(v, "limitOffset")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn resolve(kind: &str, p: &ParamPatch) -> Result<NodeParams, ParamError> {
        NodeParams::resolve(Catalog::lookup(kind).unwrap(), None, p)
    }

    #[test]
    fn defaults_fill_unspecified() {
        let params = resolve("rsi", &ParamPatch::new()).unwrap();
        assert_eq!(
            params,
            NodeParams::Rsi {
                period: 14,
                oversold: 30.0,
                overbought: 70.0
            }
        );
    }

    #[test]
    fn integer_accepts_whole_float() {
        let p = patch(&[("period", ParamValue::Float(5.0))]);
        assert_eq!(resolve("sma", &p).unwrap(), NodeParams::Sma { period: 5 });
    }

    #[test]
    fn integer_rejects_fraction() {
        let p = patch(&[("period", ParamValue::Float(5.5))]);
        let err = resolve("sma", &p).unwrap_err();
        assert_eq!(err.parameter, "period");
    }

    #[test]
    fn float_accepts_integer() {
        let p = patch(&[("stdDev", ParamValue::Integer(3))]);
        assert_eq!(
            resolve("bollinger", &p).unwrap(),
            NodeParams::Bollinger {
                period: 20,
                std_dev: 3.0
            }
        );
    }

    #[test]
    fn out_of_bounds_rejected() {
        let p = patch(&[("period", ParamValue::Integer(0))]);
        assert!(resolve("ema", &p).is_err());
        let p = patch(&[("oversold", ParamValue::Float(120.0))]);
        assert!(resolve("rsi", &p).is_err());
    }

    #[test]
    fn wrong_type_rejected() {
        let p = patch(&[("period", ParamValue::Text("ten".into()))]);
        let err = resolve("sma", &p).unwrap_err();
        assert!(err.reason.contains("expected integer"));
    }

    #[test]
    fn unknown_parameter_rejected() {
        let p = patch(&[("length", ParamValue::Integer(10))]);
        let err = resolve("sma", &p).unwrap_err();
        assert_eq!(err.parameter, "length");
    }

    #[test]
    fn choices_enforced() {
        let p = patch(&[("orderType", ParamValue::Text("stop".into()))]);
        assert!(resolve("buy", &p).is_err());
        let p = patch(&[("orderType", ParamValue::Text("limit".into()))]);
        match resolve("buy", &p).unwrap() {
            NodeParams::Buy(o) => assert_eq!(o.order_type, OrderType::Limit),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn macd_requires_fast_below_slow() {
        let p = patch(&[
            ("fastPeriod", ParamValue::Integer(30)),
            ("slowPeriod", ParamValue::Integer(26)),
        ]);
        assert_eq!(resolve("macd", &p).unwrap_err().parameter, "fastPeriod");
    }

    #[test]
    fn to_values_is_inverse_of_resolve() {
        for def in Catalog::all() {
            let params = NodeParams::resolve(def, None, &ParamPatch::new()).unwrap();
            let values = params.to_values();
            let again = NodeParams::resolve(def, None, &values).unwrap();
            assert_eq!(params, again, "{}", def.name);
            assert_eq!(params.component(), def.component);
        }
    }

    #[test]
    fn patch_on_base_keeps_other_values() {
        let def = Catalog::lookup("rsi").unwrap();
        let first = NodeParams::resolve(def, None, &patch(&[("period", ParamValue::Integer(7))]))
            .unwrap();
        let second = NodeParams::resolve(
            def,
            Some(&first.to_values()),
            &patch(&[("oversold", ParamValue::Float(25.0))]),
        )
        .unwrap();
        assert_eq!(
            second,
            NodeParams::Rsi {
                period: 7,
                oversold: 25.0,
                overbought: 70.0
            }
        );
    }

    #[test]
    fn param_number_lookup() {
        let params = resolve("threshold", &patch(&[("threshold", ParamValue::Float(42.0))])).unwrap();
        assert_eq!(params.number("threshold"), Some(42.0));
        assert_eq!(params.number("operator"), None);
    }

    #[test]
    fn param_value_json_shapes() {
        let v: ParamValue = serde_json::from_str("14").unwrap();
        assert_eq!(v, ParamValue::Integer(14));
        let v: ParamValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, ParamValue::Float(2.5));
        let v: ParamValue = serde_json::from_str("\"market\"").unwrap();
        assert_eq!(v, ParamValue::Text("market".into()));
    }
}
