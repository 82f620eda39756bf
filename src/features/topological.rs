//! Topological (persistent homology) features
//!
//! Two zero-dimensional persistence diagrams are built per series: one from
//! the Vietoris–Rips filtration of the Takens point cloud, one from the
//! sublevel-set filtration of the series itself. Both are summarised by the
//! same set of diagram descriptors.

use super::{extract_per_channel, FeatureGenerator, FeatureTable};
use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use serde::{Deserialize, Serialize};

/// Names of the diagram descriptors, in output order
pub const DIAGRAM_FEATURES: [&str; 10] = [
    "holes_number",
    "max_hole_lifetime",
    "relevant_holes_number",
    "average_hole_lifetime",
    "sum_hole_lifetime",
    "persistence_entropy",
    "simultaneous_alive_holes",
    "average_persistence_landscape",
    "betti_numbers_sum",
    "radius_at_max_bn",
];

const FILTRATIONS: [&str; 2] = ["rips", "sublevel"];
const RADIUS_GRID: usize = 50;

/// Configuration for topological features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologicalParams {
    pub embedding_dim: usize,
    pub delay: usize,
    /// Point clouds larger than this are subsampled evenly
    pub max_points: usize,
    /// Holes living at least this share of the longest one count as relevant
    pub relevance_ratio: f64,
}

impl Default for TopologicalParams {
    fn default() -> Self {
        Self {
            embedding_dim: 1,
            delay: 2,
            max_points: 400,
            relevance_ratio: 0.7,
        }
    }
}

/// A persistence pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub birth: f64,
    pub death: f64,
}

impl Interval {
    pub fn lifetime(&self) -> f64 {
        self.death - self.birth
    }
}

/// Delay embedding of a series into `dim`-dimensional points
pub fn takens_embedding(series: &[f64], dim: usize, delay: usize) -> Vec<Vec<f64>> {
    let dim = dim.max(1);
    let span = (dim - 1) * delay;
    if series.len() <= span {
        return Vec::new();
    }
    (0..series.len() - span)
        .map(|i| (0..dim).map(|d| series[i + d * delay]).collect())
        .collect()
}

fn subsample(points: Vec<Vec<f64>>, max_points: usize) -> Vec<Vec<f64>> {
    if max_points == 0 || points.len() <= max_points {
        return points;
    }
    let step = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| points[(i as f64 * step) as usize].clone())
        .collect()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// H0 diagram of the Rips filtration: every point is born at 0 and components
/// die at the lengths of the minimum spanning tree edges (Prim).
pub fn rips_h0(points: &[Vec<f64>]) -> Vec<Interval> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    best[0] = 0.0;
    let mut deaths = Vec::with_capacity(n - 1);

    for step in 0..n {
        let mut next = usize::MAX;
        let mut next_dist = f64::INFINITY;
        for v in 0..n {
            if !in_tree[v] && best[v] < next_dist {
                next = v;
                next_dist = best[v];
            }
        }
        if next == usize::MAX {
            break;
        }
        in_tree[next] = true;
        if step > 0 {
            deaths.push(next_dist);
        }
        for v in 0..n {
            if !in_tree[v] {
                let d = euclidean(&points[next], &points[v]);
                if d < best[v] {
                    best[v] = d;
                }
            }
        }
    }

    deaths
        .into_iter()
        .filter(|&d| d > 0.0)
        .map(|death| Interval { birth: 0.0, death })
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// H0 diagram of the sublevel-set filtration of a series (elder rule)
pub fn sublevel_h0(series: &[f64]) -> Vec<Interval> {
    let n = series.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        series[a]
            .partial_cmp(&series[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut parent: Vec<usize> = (0..n).collect();
    // birth value of each component, stored at its root
    let mut birth = vec![0.0; n];
    let mut active = vec![false; n];
    let mut out = Vec::new();

    for &i in &order {
        active[i] = true;
        birth[i] = series[i];
        for j in [i.wrapping_sub(1), i + 1] {
            if j >= n || !active[j] {
                continue;
            }
            let ri = find(&mut parent, i);
            let rj = find(&mut parent, j);
            if ri == rj {
                continue;
            }
            let (elder, younger) = if birth[ri] <= birth[rj] { (ri, rj) } else { (rj, ri) };
            if series[i] > birth[younger] {
                out.push(Interval {
                    birth: birth[younger],
                    death: series[i],
                });
            }
            parent[younger] = elder;
        }
    }
    out
}

/// Descriptors of a diagram in [`DIAGRAM_FEATURES`] order
pub fn diagram_features(diagram: &[Interval], relevance_ratio: f64) -> Vec<f64> {
    let holes: Vec<Interval> = diagram.iter().copied().filter(|i| i.lifetime() > 0.0).collect();
    if holes.is_empty() {
        return vec![0.0; DIAGRAM_FEATURES.len()];
    }

    let lifetimes: Vec<f64> = holes.iter().map(Interval::lifetime).collect();
    let total: f64 = lifetimes.iter().sum();
    let max_life = lifetimes.iter().cloned().fold(0.0, f64::max);
    let relevant = lifetimes
        .iter()
        .filter(|&&l| l >= relevance_ratio * max_life)
        .count();
    let entropy: f64 = lifetimes
        .iter()
        .map(|&l| {
            let p = l / total;
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        })
        .sum();

    // exact sweep: deaths sort before births at equal radius
    let mut events: Vec<(f64, i32)> = holes
        .iter()
        .flat_map(|h| [(h.birth, 1), (h.death, -1)])
        .collect();
    events.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    let mut alive = 0i32;
    let mut max_alive = 0i32;
    for (_, delta) in events {
        alive += delta;
        max_alive = max_alive.max(alive);
    }

    let lo = holes.iter().map(|h| h.birth).fold(f64::INFINITY, f64::min);
    let hi = holes.iter().map(|h| h.death).fold(f64::NEG_INFINITY, f64::max);
    let mut landscape_sum = 0.0;
    let mut betti_sum = 0.0;
    let mut best_radius = lo;
    let mut best_betti = 0usize;
    for g in 0..RADIUS_GRID {
        let r = lo + (hi - lo) * g as f64 / (RADIUS_GRID - 1) as f64;
        let betti = holes.iter().filter(|h| h.birth <= r && r < h.death).count();
        let landscape = holes
            .iter()
            .map(|h| (r - h.birth).min(h.death - r).max(0.0))
            .fold(0.0, f64::max);
        landscape_sum += landscape;
        betti_sum += betti as f64;
        if betti > best_betti {
            best_betti = betti;
            best_radius = r;
        }
    }

    vec![
        holes.len() as f64,
        max_life,
        relevant as f64,
        total / holes.len() as f64,
        total,
        entropy,
        max_alive as f64,
        landscape_sum / RADIUS_GRID as f64,
        betti_sum,
        best_radius,
    ]
}

/// Persistence-diagram descriptors of every series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologicalExtractor {
    params: TopologicalParams,
}

impl TopologicalExtractor {
    pub fn new(params: TopologicalParams) -> Self {
        Self { params }
    }

    fn column_names() -> Vec<String> {
        FILTRATIONS
            .iter()
            .flat_map(|f| DIAGRAM_FEATURES.iter().map(move |d| format!("{}_{}", f, d)))
            .collect()
    }

    pub fn extract(&self, series: &[f64]) -> Vec<f64> {
        let cloud = subsample(
            takens_embedding(series, self.params.embedding_dim, self.params.delay),
            self.params.max_points,
        );
        let mut out = diagram_features(&rips_h0(&cloud), self.params.relevance_ratio);
        out.extend(diagram_features(&sublevel_h0(series), self.params.relevance_ratio));
        out
    }
}

impl FeatureGenerator for TopologicalExtractor {
    fn name(&self) -> &str {
        "topological"
    }

    fn fit(&mut self, data: &SeriesDataset) -> Result<()> {
        let span = (self.params.embedding_dim.max(1) - 1) * self.params.delay;
        if data.series_len() <= span + 1 {
            return Err(IndustrialError::FeatureError(format!(
                "series of length {} is too short for embedding_dim={} delay={}",
                data.series_len(),
                self.params.embedding_dim,
                self.params.delay
            )));
        }
        Ok(())
    }

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        extract_per_channel(data, &Self::column_names(), |s| Ok(self.extract(s)))
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "embedding_dim": self.params.embedding_dim,
            "delay": self.params.delay,
            "max_points": self.params.max_points,
            "relevance_ratio": self.params.relevance_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takens_embedding() {
        let pts = takens_embedding(&[1.0, 2.0, 3.0, 4.0, 5.0], 2, 2);
        assert_eq!(pts, vec![vec![1.0, 3.0], vec![2.0, 4.0], vec![3.0, 5.0]]);
        assert!(takens_embedding(&[1.0, 2.0], 3, 1).is_empty());
    }

    #[test]
    fn test_rips_h0_on_line() {
        let pts: Vec<Vec<f64>> = [0.0, 1.0, 3.0, 7.0].iter().map(|&v| vec![v]).collect();
        let mut deaths: Vec<f64> = rips_h0(&pts).iter().map(|i| i.death).collect();
        deaths.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(deaths, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_sublevel_h0_two_minima() {
        // minima at 0 and 1, merged at the peak 5
        let diagram = sublevel_h0(&[0.0, 5.0, 1.0, 6.0]);
        assert_eq!(diagram, vec![Interval { birth: 1.0, death: 5.0 }]);
    }

    #[test]
    fn test_diagram_features() {
        let diagram = vec![
            Interval { birth: 0.0, death: 1.0 },
            Interval { birth: 0.0, death: 4.0 },
        ];
        let f = diagram_features(&diagram, 0.7);
        assert_eq!(f.len(), DIAGRAM_FEATURES.len());
        assert_eq!(f[0], 2.0);
        assert_eq!(f[1], 4.0);
        assert_eq!(f[2], 1.0);
        assert!((f[3] - 2.5).abs() < 1e-12);
        assert_eq!(f[4], 5.0);
        assert_eq!(f[6], 2.0);
    }

    #[test]
    fn test_empty_diagram_gives_zeros() {
        assert!(diagram_features(&[], 0.7).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_extract_width() {
        let ex = TopologicalExtractor::new(TopologicalParams::default());
        let series: Vec<f64> = (0..40).map(|t| (t as f64 * 0.5).sin()).collect();
        let f = ex.extract(&series);
        assert_eq!(f.len(), 2 * DIAGRAM_FEATURES.len());
        assert!(f.iter().all(|v| v.is_finite()));
    }
}
