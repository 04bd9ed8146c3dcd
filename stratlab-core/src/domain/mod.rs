//! Domain types shared across the graph model, evaluator, and backtest engine.

pub mod bar;
pub mod ids;
pub mod signal;
pub mod value;

pub use bar::{validate_series, Bar, DateRange, MarketDataError};
pub use ids::{ConnectionId, NodeId};
pub use signal::{OrderType, Side, SignalEvent};
pub use value::{Value, ValueType};
