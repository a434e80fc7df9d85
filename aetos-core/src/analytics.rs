//! Aggregate analytics over a document collection.
//!
//! Three independent pure computations: the cumulative-adoption S-curve,
//! the technology co-occurrence ranking, and the TRL maturity trend with a
//! short linear forecast. Each is a fold over its input slice; nothing here
//! holds state between calls.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::EnrichedRecord;

/// Genuine TRL scores top out at 9; forecasts are clamped to this ceiling.
const TRL_CEILING: f64 = 9.0;

/// One year on the adoption curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SCurvePoint {
    pub year: i32,
    pub count: usize,
    pub cumulative_count: usize,
}

/// One ranked co-occurrence edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergencePair {
    pub tech_1: String,
    pub tech_2: String,
    pub strength: u32,
}

/// One observed (or projected) yearly mean TRL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrlPoint {
    pub year: i32,
    pub trl: f64,
}

/// Yearly mean TRL history plus a linear forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrlTrend {
    pub history: Vec<TrlPoint>,
    pub forecast: Vec<TrlPoint>,
}

/// All three analytics views, as served to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsPayload {
    pub document_count: usize,
    pub s_curve: Vec<SCurvePoint>,
    pub convergence: Vec<ConvergencePair>,
    pub trl_trend: TrlTrend,
}

/// Documents per year with a running cumulative sum, ascending by year.
///
/// Records without a parseable publication date are skipped; an all-dateless
/// input yields an empty curve.
pub fn s_curve(records: &[EnrichedRecord]) -> Vec<SCurvePoint> {
    let mut yearly: BTreeMap<i32, usize> = BTreeMap::new();
    for record in records {
        if let Some(year) = record.year() {
            *yearly.entry(year).or_insert(0) += 1;
        }
    }

    let mut cumulative = 0;
    yearly
        .into_iter()
        .map(|(year, count)| {
            cumulative += count;
            SCurvePoint {
                year,
                count,
                cumulative_count: cumulative,
            }
        })
        .collect()
}

/// The strongest pairwise technology co-occurrences, descending by weight.
///
/// Each document contributes every unordered pair from its distinct
/// technology set exactly once; a document needs at least two distinct
/// technologies to contribute. Ties keep first-encountered order.
pub fn technology_convergence(records: &[EnrichedRecord], top_n: usize) -> Vec<ConvergencePair> {
    let mut graph: UnGraph<String, u32> = UnGraph::new_undirected();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

    for record in records {
        // Sorted set: self-pairs and per-document duplicates cannot occur,
        // and pair enumeration is deterministic.
        let techs: BTreeSet<&str> = record
            .technologies
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();
        let techs: Vec<&str> = techs.into_iter().collect();

        for (i, a) in techs.iter().enumerate() {
            for b in &techs[i + 1..] {
                let na = node_for(&mut graph, &mut nodes, a);
                let nb = node_for(&mut graph, &mut nodes, b);
                match graph.find_edge(na, nb) {
                    Some(edge) => graph[edge] += 1,
                    None => {
                        graph.add_edge(na, nb, 1);
                    }
                }
            }
        }
    }

    // edge_references iterates in insertion order; the stable sort keeps
    // that order among equal weights.
    let mut edges: Vec<ConvergencePair> = graph
        .edge_references()
        .map(|e| ConvergencePair {
            tech_1: graph[e.source()].clone(),
            tech_2: graph[e.target()].clone(),
            strength: *e.weight(),
        })
        .collect();
    edges.sort_by(|a, b| b.strength.cmp(&a.strength));
    edges.truncate(top_n);

    debug!(
        nodes = nodes.len(),
        ranked = edges.len(),
        "Convergence graph built"
    );
    edges
}

fn node_for(
    graph: &mut UnGraph<String, u32>,
    nodes: &mut HashMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    if let Some(idx) = nodes.get(name) {
        return *idx;
    }
    let idx = graph.add_node(name.to_string());
    nodes.insert(name.to_string(), idx);
    idx
}

/// Yearly mean TRL plus a linear projection `horizon_years` beyond the last
/// observed year.
///
/// Documents without a genuine TRL (zero) or a parseable date do not
/// qualify. Fewer than two qualifying documents yields an empty trend; a
/// history collapsed onto a single year yields history without a forecast.
/// Projected values above the TRL ceiling are clamped to exactly 9.0.
pub fn trl_trend(records: &[EnrichedRecord], horizon_years: u32) -> TrlTrend {
    let mut by_year: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    let mut qualifying = 0usize;
    for record in records {
        if record.technology_readiness_level == 0 {
            continue;
        }
        if let Some(year) = record.year() {
            by_year
                .entry(year)
                .or_default()
                .push(f64::from(record.technology_readiness_level));
            qualifying += 1;
        }
    }

    if qualifying < 2 {
        return TrlTrend::default();
    }

    let history: Vec<TrlPoint> = by_year
        .iter()
        .map(|(year, values)| TrlPoint {
            year: *year,
            trl: round2(values.iter().sum::<f64>() / values.len() as f64),
        })
        .collect();

    let forecast = match fit_line(&history) {
        Some((slope, intercept)) => {
            let last_year = history[history.len() - 1].year;
            (1..=horizon_years as i32)
                .map(|offset| {
                    let year = last_year + offset;
                    let projected = slope * f64::from(year) + intercept;
                    TrlPoint {
                        year,
                        trl: round2(projected.min(TRL_CEILING)),
                    }
                })
                .collect()
        }
        None => Vec::new(),
    };

    TrlTrend { history, forecast }
}

/// Least-squares fit over (year, mean TRL). Needs at least two distinct
/// years.
fn fit_line(points: &[TrlPoint]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| f64::from(p.year)).sum();
    let sum_y: f64 = points.iter().map(|p| p.trl).sum();
    let sum_xy: f64 = points.iter().map(|p| f64::from(p.year) * p.trl).sum();
    let sum_xx: f64 = points.iter().map(|p| f64::from(p.year).powi(2)).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Assemble the full payload with default parameters (top 10 convergences,
/// 3-year forecast).
pub fn full_payload(records: &[EnrichedRecord]) -> AnalyticsPayload {
    AnalyticsPayload {
        document_count: records.len(),
        s_curve: s_curve(records),
        convergence: technology_convergence(records, 10),
        trl_trend: trl_trend(records, 3),
    }
}
