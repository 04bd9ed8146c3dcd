//! Parameter sweeps over strategy node parameters.
//!
//! A sweep is a grid of `(node, parameter, values)` axes applied to a base
//! strategy. Every combination becomes its own strategy variant, backtested
//! in parallel with rayon over the same bar series, then ranked by a metric.

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::graph::{ParamPatch, ParamValue};
use stratlab_core::{run_backtest, BacktestResult, Bar, CancelFlag, DateRange, EngineError, NodeId, Strategy};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("sweep axis refers to unknown node '{0}'")]
    UnknownNode(String),

    #[error("component '{kind}' of node '{node}' has no parameter '{parameter}'")]
    UnknownParameter {
        node: String,
        kind: String,
        parameter: String,
    },

    #[error("sweep cancelled")]
    Cancelled,
}

/// One swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepAxis {
    pub node: String,
    pub parameter: String,
    pub values: Vec<ParamValue>,
}

impl SweepAxis {
    pub fn key(&self) -> String {
        format!("{}.{}", self.node, self.parameter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub axes: Vec<SweepAxis>,

    #[serde(default)]
    pub rank_by: RankMetric,

    /// How many ranked points to print; all are kept in the report.
    #[serde(default)]
    pub top: Option<usize>,
}

/// Metric a sweep is ranked by. Higher scores rank first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    TotalReturn,
    #[default]
    Sharpe,
    Sortino,
    ProfitFactor,
    WinRate,
    /// Ranked by the smallest drawdown.
    MaxDrawdown,
}

impl RankMetric {
    pub fn score(self, result: &BacktestResult) -> f64 {
        match self {
            RankMetric::TotalReturn => result.total_return,
            RankMetric::Sharpe => result.sharpe_ratio,
            RankMetric::Sortino => result.sortino_ratio,
            RankMetric::ProfitFactor => result.profit_factor,
            RankMetric::WinRate => result.win_rate,
            RankMetric::MaxDrawdown => -result.max_drawdown,
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RankMetric::TotalReturn => "total_return",
            RankMetric::Sharpe => "sharpe",
            RankMetric::Sortino => "sortino",
            RankMetric::ProfitFactor => "profit_factor",
            RankMetric::WinRate => "win_rate",
            RankMetric::MaxDrawdown => "max_drawdown",
        };
        write!(f, "{s}")
    }
}

// ─── Grid ────────────────────────────────────────────────────────────

/// Cartesian product of sweep axes.
#[derive(Debug, Clone)]
pub struct ParamGrid<'a> {
    axes: &'a [SweepAxis],
}

impl<'a> ParamGrid<'a> {
    pub fn new(axes: &'a [SweepAxis]) -> Self {
        Self { axes }
    }

    /// Number of combinations. A grid without axes has one: the base strategy.
    pub fn size(&self) -> usize {
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Every combination as `(axis, value)` pairs, first axis varying slowest.
    pub fn combinations(&self) -> Vec<Vec<(&'a SweepAxis, &'a ParamValue)>> {
        let mut combos: Vec<Vec<(&'a SweepAxis, &'a ParamValue)>> = vec![Vec::new()];
        for axis in self.axes {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    axis.values.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.push((axis, value));
                        next
                    })
                })
                .collect();
        }
        combos
    }

    /// Reject axes naming nodes or parameters the base strategy does not have.
    pub fn check(&self, base: &Strategy) -> Result<(), SweepError> {
        for axis in self.axes {
            let node = base
                .node(&NodeId::new(axis.node.as_str()))
                .ok_or_else(|| SweepError::UnknownNode(axis.node.clone()))?;
            if node.definition().param(&axis.parameter).is_none() {
                return Err(SweepError::UnknownParameter {
                    node: axis.node.clone(),
                    kind: node.definition().name.to_string(),
                    parameter: axis.parameter.clone(),
                });
            }
        }
        Ok(())
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// One grid point and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    /// `node.parameter` → value.
    pub assignments: BTreeMap<String, ParamValue>,
    pub score: Option<f64>,
    pub result: Option<BacktestResult>,
    /// Why the variant could not run (invalid value, invalid graph).
    pub error: Option<String>,
}

impl SweepPoint {
    pub fn label(&self) -> String {
        self.assignments
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub strategy_id: String,
    pub rank_by: RankMetric,
    /// Ranked best first; failed points last, in grid order.
    pub points: Vec<SweepPoint>,
}

impl SweepReport {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn best(&self) -> Option<&SweepPoint> {
        self.points.first().filter(|p| p.result.is_some())
    }

    pub fn top_n(&self, n: usize) -> &[SweepPoint] {
        &self.points[..n.min(self.points.len())]
    }

    pub fn failures(&self) -> usize {
        self.points.iter().filter(|p| p.error.is_some()).count()
    }
}

// ─── Execution ───────────────────────────────────────────────────────

/// Backtest every grid point of `config` against `bars` in parallel.
pub fn run_sweep(
    base: &Strategy,
    bars: &[Bar],
    range: Option<DateRange>,
    config: &SweepConfig,
    cancel: &CancelFlag,
) -> Result<SweepReport, SweepError> {
    let grid = ParamGrid::new(&config.axes);
    grid.check(base)?;
    let bars = match range {
        Some(r) => r.apply(bars),
        None => bars,
    };

    let combos = grid.combinations();
    log::info!(
        "sweeping {} variant(s) of '{}' over {} bars, ranked by {}",
        combos.len(),
        base.id,
        bars.len(),
        config.rank_by
    );

    let points = combos
        .par_iter()
        .map(|combo| run_point(base, bars, combo, config.rank_by, cancel))
        .collect::<Result<Vec<_>, SweepError>>()?;

    let mut report = SweepReport {
        strategy_id: base.id.clone(),
        rank_by: config.rank_by,
        points,
    };
    rank(&mut report.points);
    if let Some(best) = report.best() {
        log::info!("best: {} (score {:.4})", best.label(), best.score.unwrap_or(f64::NAN));
    }
    Ok(report)
}

fn run_point(
    base: &Strategy,
    bars: &[Bar],
    combo: &[(&SweepAxis, &ParamValue)],
    metric: RankMetric,
    cancel: &CancelFlag,
) -> Result<SweepPoint, SweepError> {
    let assignments: BTreeMap<String, ParamValue> = combo
        .iter()
        .map(|(axis, value)| (axis.key(), (*value).clone()))
        .collect();

    let outcome = build_variant(base, combo).and_then(|variant| {
        run_backtest(&variant, bars, None, cancel).map_err(|e| match e {
            EngineError::Cancelled => None,
            other => Some(other.to_string()),
        })
    });

    match outcome {
        Ok(result) => Ok(SweepPoint {
            assignments,
            score: Some(metric.score(&result)),
            result: Some(result),
            error: None,
        }),
        Err(None) => Err(SweepError::Cancelled),
        Err(Some(error)) => {
            log::debug!("sweep point failed: {error}");
            Ok(SweepPoint {
                assignments,
                score: None,
                result: None,
                error: Some(error),
            })
        }
    }
}

/// Clone `base` with one patch per swept node. `Err(Some(msg))` on a rejected value.
fn build_variant(
    base: &Strategy,
    combo: &[(&SweepAxis, &ParamValue)],
) -> Result<Strategy, Option<String>> {
    let mut patches: BTreeMap<&str, ParamPatch> = BTreeMap::new();
    for (axis, value) in combo {
        patches
            .entry(axis.node.as_str())
            .or_default()
            .insert(axis.parameter.clone(), (*value).clone());
    }
    let mut variant = base.clone();
    for (node, patch) in &patches {
        variant
            .set_parameters(&NodeId::new(*node), patch)
            .map_err(|e| Some(e.to_string()))?;
    }
    Ok(variant)
}

/// Sort scored points descending; NaN scores and failures go last. Stable.
fn rank(points: &mut [SweepPoint]) {
    points.sort_by(|a, b| {
        let key = |p: &SweepPoint| p.score.filter(|s| !s.is_nan());
        match (key(a), key(b)) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use stratlab_core::graph::{patch, Endpoint};

    fn axis(node: &str, parameter: &str, values: &[i64]) -> SweepAxis {
        SweepAxis {
            node: node.into(),
            parameter: parameter.into(),
            values: values.iter().map(|&v| ParamValue::Integer(v)).collect(),
        }
    }

    fn bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 8.0;
                Bar {
                    time: start + Duration::days(i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn cross() -> Strategy {
        let mut s = Strategy::new("cross", "sma cross");
        s.add_node_with_id("fast", "sma", &patch(&[("period", ParamValue::Integer(3))]))
            .unwrap();
        s.add_node_with_id("slow", "sma", &patch(&[("period", ParamValue::Integer(8))]))
            .unwrap();
        s.add_node_with_id("up", "crossover", &ParamPatch::new()).unwrap();
        s.add_node_with_id("buy", "buy", &ParamPatch::new()).unwrap();
        s.connect(Endpoint::new("fast", "value"), Endpoint::new("up", "fast"))
            .unwrap();
        s.connect(Endpoint::new("slow", "value"), Endpoint::new("up", "slow"))
            .unwrap();
        s.connect(Endpoint::new("up", "result"), Endpoint::new("buy", "signal"))
            .unwrap();
        s
    }

    #[test]
    fn grid_size_is_product() {
        let axes = vec![axis("fast", "period", &[2, 3, 4]), axis("slow", "period", &[8, 10])];
        let grid = ParamGrid::new(&axes);
        assert_eq!(grid.size(), 6);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0][0].1, &ParamValue::Integer(2));
        assert_eq!(combos[1][1].1, &ParamValue::Integer(10));
    }

    #[test]
    fn empty_grid_runs_base_once() {
        let grid = ParamGrid::new(&[]);
        assert_eq!(grid.size(), 1);
        assert_eq!(grid.combinations(), vec![Vec::new()]);
    }

    #[test]
    fn check_rejects_unknown_targets() {
        let s = cross();
        let axes = vec![axis("ghost", "period", &[1])];
        assert!(matches!(
            ParamGrid::new(&axes).check(&s),
            Err(SweepError::UnknownNode(_))
        ));
        let axes = vec![axis("fast", "length", &[1])];
        assert!(matches!(
            ParamGrid::new(&axes).check(&s),
            Err(SweepError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn sweep_ranks_best_first() {
        let config = SweepConfig {
            axes: vec![axis("fast", "period", &[2, 3, 4]), axis("slow", "period", &[8, 12])],
            rank_by: RankMetric::TotalReturn,
            top: None,
        };
        let report = run_sweep(&cross(), &bars(120), None, &config, &CancelFlag::new()).unwrap();
        assert_eq!(report.len(), 6);
        assert_eq!(report.failures(), 0);
        let scores: Vec<f64> = report.points.iter().filter_map(|p| p.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(report.best().unwrap().score, Some(scores[0]));
        assert_eq!(report.top_n(2).len(), 2);
    }

    #[test]
    fn invalid_value_fails_point_not_sweep() {
        let config = SweepConfig {
            axes: vec![axis("fast", "period", &[0, 3])],
            rank_by: RankMetric::TotalReturn,
            top: None,
        };
        let report = run_sweep(&cross(), &bars(60), None, &config, &CancelFlag::new()).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report.failures(), 1);
        let last = report.points.last().unwrap();
        assert!(last.error.is_some());
        assert_eq!(last.assignments["fast.period"], ParamValue::Integer(0));
        assert!(report.points[0].result.is_some());
    }

    #[test]
    fn sweep_matches_single_runs() {
        let config = SweepConfig {
            axes: vec![axis("fast", "period", &[2, 5])],
            rank_by: RankMetric::TotalReturn,
            top: None,
        };
        let data = bars(90);
        let report = run_sweep(&cross(), &data, None, &config, &CancelFlag::new()).unwrap();
        for point in &report.points {
            let mut s = cross();
            let period = point.assignments["fast.period"].clone();
            s.set_parameters(&"fast".into(), &patch(&[("period", period)]))
                .unwrap();
            let single = run_backtest(&s, &data, None, &CancelFlag::new()).unwrap();
            assert_eq!(point.result.as_ref(), Some(&single));
        }
    }

    #[test]
    fn cancelled_sweep_returns_error() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let config = SweepConfig {
            axes: vec![axis("fast", "period", &[2, 3])],
            rank_by: RankMetric::Sharpe,
            top: None,
        };
        let err = run_sweep(&cross(), &bars(30), None, &config, &cancel).unwrap_err();
        assert!(matches!(err, SweepError::Cancelled));
    }

    #[test]
    fn drawdown_ranks_smallest_first() {
        let mut points: Vec<SweepPoint> = [0.3, 0.1, 0.2]
            .iter()
            .map(|&dd| SweepPoint {
                assignments: BTreeMap::new(),
                score: Some(-dd),
                result: None,
                error: None,
            })
            .collect();
        points.push(SweepPoint {
            assignments: BTreeMap::new(),
            score: None,
            result: None,
            error: Some("bad".into()),
        });
        rank(&mut points);
        assert_eq!(points[0].score, Some(-0.1));
        assert!(points[3].error.is_some());
    }
}
