//! Built-in component definitions.

use super::{
    ComponentDefinition, ComponentKind, ComponentType, ParamDefault, ParamSpec, ParamType,
    PortDefault, PortSpec,
};
use crate::domain::ValueType;

// ─── Shared schema pieces ────────────────────────────────────────────

const fn period(default: i64, description: &'static str) -> ParamSpec {
    ParamSpec {
        name: "period",
        param_type: ParamType::Integer,
        default: ParamDefault::Integer(default),
        min: Some(1.0),
        max: Some(1000.0),
        choices: &[],
        description,
    }
}

const fn number_out(name: &'static str) -> PortSpec {
    PortSpec {
        name,
        value_type: ValueType::Number,
        default: PortDefault::Required,
    }
}

const fn bool_out(name: &'static str) -> PortSpec {
    PortSpec {
        name,
        value_type: ValueType::Boolean,
        default: PortDefault::Required,
    }
}

const fn required(name: &'static str, value_type: ValueType) -> PortSpec {
    PortSpec {
        name,
        value_type,
        default: PortDefault::Required,
    }
}

const PRICE_IN: [PortSpec; 1] = [PortSpec {
    name: "price",
    value_type: ValueType::Number,
    default: PortDefault::Close,
}];

const VALUE_OUT: [PortSpec; 1] = [number_out("value")];
const RESULT_OUT: [PortSpec; 1] = [bool_out("result")];
const LEVEL_OUT: [PortSpec; 1] = [number_out("level")];
const SIGNAL_IN: [PortSpec; 1] = [required("signal", ValueType::Boolean)];
const GATE_IN: [PortSpec; 2] = [
    required("a", ValueType::Boolean),
    required("b", ValueType::Boolean),
];

const COMPARISONS: &[&str] = &["gt", "gte", "lt", "lte"];

const fn comparison(description: &'static str) -> ParamSpec {
    ParamSpec {
        name: "operator",
        param_type: ParamType::String,
        default: ParamDefault::Text("gt"),
        min: None,
        max: None,
        choices: COMPARISONS,
        description,
    }
}

const ORDER_PARAMS: [ParamSpec; 3] = [
    ParamSpec {
        name: "quantity",
        param_type: ParamType::Float,
        default: ParamDefault::Float(1.0),
        min: Some(1e-8),
        max: None,
        choices: &[],
        description: "Units per order",
    },
    ParamSpec {
        name: "orderType",
        param_type: ParamType::String,
        default: ParamDefault::Text("market"),
        min: None,
        max: None,
        choices: &["market", "limit"],
        description: "Market fills at the close; limit rests one bar at an offset",
    },
    ParamSpec {
        name: "limitOffset",
        param_type: ParamType::Float,
        default: ParamDefault::Float(0.01),
        min: Some(0.0),
        max: Some(1.0),
        choices: &[],
        description: "Fractional distance of the limit price from the close",
    },
];

// ─── Indicators ──────────────────────────────────────────────────────

pub static PRICE: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Price,
    kind: ComponentKind::Indicator,
    name: "price",
    description: "Passes its price input through (the bar close when unconnected)",
    parameters: &[],
    inputs: &PRICE_IN,
    outputs: &VALUE_OUT,
};

pub static SMA: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Sma,
    kind: ComponentKind::Indicator,
    name: "sma",
    description: "Simple moving average",
    parameters: &[period(20, "Window length")],
    inputs: &PRICE_IN,
    outputs: &VALUE_OUT,
};

pub static EMA: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Ema,
    kind: ComponentKind::Indicator,
    name: "ema",
    description: "Exponential moving average seeded with an SMA",
    parameters: &[period(20, "Smoothing length")],
    inputs: &PRICE_IN,
    outputs: &VALUE_OUT,
};

pub static RSI: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Rsi,
    kind: ComponentKind::Indicator,
    name: "rsi",
    description: "Wilder relative strength index with oversold/overbought crossing events",
    parameters: &[
        period(14, "Wilder smoothing length"),
        ParamSpec {
            name: "oversold",
            param_type: ParamType::Float,
            default: ParamDefault::Float(30.0),
            min: Some(0.0),
            max: Some(100.0),
            choices: &[],
            description: "Level whose downward crossing fires oversoldSignal",
        },
        ParamSpec {
            name: "overbought",
            param_type: ParamType::Float,
            default: ParamDefault::Float(70.0),
            min: Some(0.0),
            max: Some(100.0),
            choices: &[],
            description: "Level whose upward crossing fires overboughtSignal",
        },
    ],
    inputs: &PRICE_IN,
    outputs: &[
        number_out("value"),
        bool_out("oversoldSignal"),
        bool_out("overboughtSignal"),
    ],
};

pub static BOLLINGER: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Bollinger,
    kind: ComponentKind::Indicator,
    name: "bollinger",
    description: "Bollinger bands (SMA +/- population standard deviation)",
    parameters: &[
        period(20, "Window length"),
        ParamSpec {
            name: "stdDev",
            param_type: ParamType::Float,
            default: ParamDefault::Float(2.0),
            min: Some(0.0),
            max: Some(10.0),
            choices: &[],
            description: "Band width in standard deviations",
        },
    ],
    inputs: &PRICE_IN,
    outputs: &[number_out("upper"), number_out("middle"), number_out("lower")],
};

const fn macd_period(name: &'static str, default: i64, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        param_type: ParamType::Integer,
        default: ParamDefault::Integer(default),
        min: Some(1.0),
        max: Some(1000.0),
        choices: &[],
        description,
    }
}

pub static MACD: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Macd,
    kind: ComponentKind::Indicator,
    name: "macd",
    description: "Moving average convergence/divergence",
    parameters: &[
        macd_period("fastPeriod", 12, "Fast EMA length"),
        macd_period("slowPeriod", 26, "Slow EMA length (must exceed fastPeriod)"),
        macd_period("signalPeriod", 9, "EMA length of the signal line"),
    ],
    inputs: &PRICE_IN,
    outputs: &[
        number_out("macdLine"),
        number_out("signalLine"),
        number_out("histogram"),
    ],
};

// ─── Conditions ──────────────────────────────────────────────────────

pub static CROSSOVER: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Crossover,
    kind: ComponentKind::Condition,
    name: "crossover",
    description: "True on the timestep `fast` crosses `slow`",
    parameters: &[ParamSpec {
        name: "direction",
        param_type: ParamType::String,
        default: ParamDefault::Text("above"),
        min: None,
        max: None,
        choices: &["above", "below"],
        description: "Crossing direction of fast relative to slow",
    }],
    inputs: &[
        required("fast", ValueType::Number),
        required("slow", ValueType::Number),
    ],
    outputs: &RESULT_OUT,
};

pub static THRESHOLD: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Threshold,
    kind: ComponentKind::Condition,
    name: "threshold",
    description: "Compares `value` against a threshold (parameter unless connected)",
    parameters: &[
        comparison("value <op> threshold"),
        ParamSpec {
            name: "threshold",
            param_type: ParamType::Float,
            default: ParamDefault::Float(0.0),
            min: None,
            max: None,
            choices: &[],
            description: "Used when the threshold input is unconnected",
        },
    ],
    inputs: &[
        required("value", ValueType::Number),
        PortSpec {
            name: "threshold",
            value_type: ValueType::Number,
            default: PortDefault::Param("threshold"),
        },
    ],
    outputs: &RESULT_OUT,
};

pub static COMPARE: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Compare,
    kind: ComponentKind::Condition,
    name: "compare",
    description: "Compares two numeric series",
    parameters: &[comparison("left <op> right")],
    inputs: &[
        required("left", ValueType::Number),
        required("right", ValueType::Number),
    ],
    outputs: &RESULT_OUT,
};

pub static AND: ComponentDefinition = ComponentDefinition {
    component: ComponentType::And,
    kind: ComponentKind::Condition,
    name: "and",
    description: "Logical AND",
    parameters: &[],
    inputs: &GATE_IN,
    outputs: &RESULT_OUT,
};

pub static OR: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Or,
    kind: ComponentKind::Condition,
    name: "or",
    description: "Logical OR",
    parameters: &[],
    inputs: &GATE_IN,
    outputs: &RESULT_OUT,
};

// ─── Actions ─────────────────────────────────────────────────────────

pub static BUY: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Buy,
    kind: ComponentKind::Action,
    name: "buy",
    description: "Emits a buy signal event while `signal` is true",
    parameters: &ORDER_PARAMS,
    inputs: &SIGNAL_IN,
    outputs: &[],
};

pub static SELL: ComponentDefinition = ComponentDefinition {
    component: ComponentType::Sell,
    kind: ComponentKind::Action,
    name: "sell",
    description: "Emits a sell signal event while `signal` is true",
    parameters: &ORDER_PARAMS,
    inputs: &SIGNAL_IN,
    outputs: &[],
};

// ─── Risk ────────────────────────────────────────────────────────────

pub static STOP_LOSS: ComponentDefinition = ComponentDefinition {
    component: ComponentType::StopLoss,
    kind: ComponentKind::Risk,
    name: "stop_loss",
    description: "Closes the position once price falls `percent` below entry",
    parameters: &[ParamSpec {
        name: "percent",
        param_type: ParamType::Float,
        default: ParamDefault::Float(0.02),
        min: Some(0.0001),
        max: Some(1.0),
        choices: &[],
        description: "Fractional distance below the entry price",
    }],
    inputs: &PRICE_IN,
    outputs: &LEVEL_OUT,
};

pub static TAKE_PROFIT: ComponentDefinition = ComponentDefinition {
    component: ComponentType::TakeProfit,
    kind: ComponentKind::Risk,
    name: "take_profit",
    description: "Closes the position once price rises `percent` above entry",
    parameters: &[ParamSpec {
        name: "percent",
        param_type: ParamType::Float,
        default: ParamDefault::Float(0.05),
        min: Some(0.0001),
        max: Some(10.0),
        choices: &[],
        description: "Fractional distance above the entry price",
    }],
    inputs: &PRICE_IN,
    outputs: &LEVEL_OUT,
};

/// Catalog order: indicators, conditions, actions, risk.
pub static ALL_DEFINITIONS: [&ComponentDefinition; 15] = [
    &PRICE,
    &SMA,
    &EMA,
    &RSI,
    &BOLLINGER,
    &MACD,
    &CROSSOVER,
    &THRESHOLD,
    &COMPARE,
    &AND,
    &OR,
    &BUY,
    &SELL,
    &STOP_LOSS,
    &TAKE_PROFIT,
];

pub(super) fn definition_for(component: ComponentType) -> &'static ComponentDefinition {
    match component {
        ComponentType::Price => &PRICE,
        ComponentType::Sma => &SMA,
        ComponentType::Ema => &EMA,
        ComponentType::Rsi => &RSI,
        ComponentType::Bollinger => &BOLLINGER,
        ComponentType::Macd => &MACD,
        ComponentType::Crossover => &CROSSOVER,
        ComponentType::Threshold => &THRESHOLD,
        ComponentType::Compare => &COMPARE,
        ComponentType::And => &AND,
        ComponentType::Or => &OR,
        ComponentType::Buy => &BUY,
        ComponentType::Sell => &SELL,
        ComponentType::StopLoss => &STOP_LOSS,
        ComponentType::TakeProfit => &TAKE_PROFIT,
    }
}
