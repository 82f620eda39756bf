//! K-Nearest Neighbors implementation
//!
//! Classifier and regressor over standardised features, parallel over query rows.

use super::scaler::StandardScaler;
use super::{check_labels, Classifier, Regressor};
use crate::error::{IndustrialError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    #[default]
    Uniform,
    /// Inverse distance
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Memory {
    scaler: StandardScaler,
    x: Option<Array2<f64>>,
    y: Option<Array1<f64>>,
}

impl Memory {
    fn store(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(IndustrialError::TrainingError("empty training set".to_string()));
        }
        self.x = Some(self.scaler.fit_transform(x)?);
        self.y = Some(y.clone());
        Ok(())
    }

    /// Neighbors of every query row as (distance, target) pairs
    fn query(&self, x: &Array2<f64>, config: &KnnConfig) -> Result<Vec<Vec<(f64, f64)>>> {
        let (x_train, y_train) = match (&self.x, &self.y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(IndustrialError::ModelNotFitted),
        };
        let xs = self.scaler.transform(x)?;
        let k = config.n_neighbors.clamp(1, x_train.nrows());
        Ok((0..xs.nrows())
            .into_par_iter()
            .map(|i| find_k_nearest(xs.row(i), x_train, y_train, k, config.metric))
            .collect())
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    config: KnnConfig,
    memory: Memory,
    n_classes: usize,
}

impl KnnClassifier {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            memory: Memory::default(),
            n_classes: 0,
        }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &str {
        "knn"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        check_labels(x, y, n_classes)?;
        self.memory.store(x, y)?;
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let neighbors = self.memory.query(x, &self.config)?;
        let n_classes = self.n_classes;
        let flat: Vec<f64> = neighbors
            .iter()
            .flat_map(|nb| class_probs_from(nb, n_classes, self.config.weights))
            .collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    config: KnnConfig,
    memory: Memory,
}

impl KnnRegressor {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            memory: Memory::default(),
        }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }
}

impl Regressor for KnnRegressor {
    fn name(&self) -> &str {
        "knnreg"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.memory.store(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let neighbors = self.memory.query(x, &self.config)?;
        Ok(neighbors
            .iter()
            .map(|nb| weighted_mean_from(nb, self.config.weights))
            .collect())
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Max-heap entry keeping the k smallest distances
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, row) in x_train.rows().into_iter().enumerate() {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, y_train[i]));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, y_train[i]));
            }
        }
    }
    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi) * (ai - bi))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
    }
}

fn neighbor_weight(dist: f64, weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (dist + 1e-10),
    }
}

fn class_probs_from(neighbors: &[(f64, f64)], n_classes: usize, weights: WeightScheme) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    let mut total = 0.0;
    for &(dist, label) in neighbors {
        let idx = label.round() as usize;
        if idx < n_classes {
            let w = neighbor_weight(dist, weights);
            counts[idx] += w;
            total += w;
        }
    }
    if total > 0.0 {
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

fn weighted_mean_from(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let (sum, total) = neighbors.iter().fold((0.0, 0.0), |(s, t), &(dist, y)| {
        let w = neighbor_weight(dist, weights);
        (s + w * y, t + w)
    });
    if total > 0.0 {
        sum / total
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Level, spread and peak of short series: calm ones around zero (class 0)
    /// and noisy ones shifted upwards (class 1)
    fn series_summaries() -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..12 {
            let class = i % 2;
            let series: Vec<f64> = (0..32)
                .map(|t| {
                    let t = t as f64;
                    if class == 0 {
                        0.3 * (t * 0.4 + i as f64).sin()
                    } else {
                        4.0 + 1.5 * (t * 1.3 + i as f64).sin()
                    }
                })
                .collect();
            let n = series.len() as f64;
            let mean = series.iter().sum::<f64>() / n;
            let std = (series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            let peak = series.iter().cloned().fold(f64::MIN, f64::max);
            rows.extend([mean, std, peak]);
            labels.push(class as f64);
        }
        (
            Array2::from_shape_vec((12, 3), rows).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_separates_series_by_level_and_spread() {
        let (x, y) = series_summaries();
        let mut knn = KnnClassifier::with_k(3);
        knn.fit(&x, &y, 2).unwrap();
        assert_eq!(knn.predict(&x).unwrap(), y);

        let proba = knn.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (12, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_every_stored_series_votes_when_k_exceeds_rows() {
        let (x, y) = series_summaries();
        // keep 2 calm and all 6 noisy series
        let keep = [0, 2, 1, 3, 5, 7, 9, 11];
        let x = x.select(ndarray::Axis(0), &keep);
        let y = y.select(ndarray::Axis(0), &keep);
        let mut knn = KnnClassifier::with_k(50);
        knn.fit(&x, &y, 2).unwrap();
        let proba = knn.predict_proba(&x).unwrap();
        assert!((proba[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((proba[[7, 1]] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_regressor_interpolates_between_window_levels() {
        // window mean -> next value of a linear trend
        let x = Array2::from_shape_fn((11, 1), |(i, _)| i as f64);
        let y = Array1::from_iter((0..11).map(|i| 2.0 * i as f64 + 1.0));

        let mut uniform = KnnRegressor::with_k(2);
        uniform.fit(&x, &y).unwrap();
        let query = ndarray::array![[4.5]];
        assert!((uniform.predict(&query).unwrap()[0] - 10.0).abs() < 1e-9);

        let mut weighted = KnnRegressor::new(KnnConfig {
            n_neighbors: 2,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        weighted.fit(&x, &y).unwrap();
        let query = ndarray::array![[4.25]];
        assert!((weighted.predict(&query).unwrap()[0] - 9.5).abs() < 1e-6);
    }

    #[test]
    fn test_distance_between_series_windows() {
        let a = ndarray::array![1.0, 2.0, 3.0, 4.0];
        let b = ndarray::array![2.0, 2.0, 5.0, 4.0];
        let euclid = compute_distance(a.view(), b.view(), DistanceMetric::Euclidean);
        assert!((euclid - 5f64.sqrt()).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Manhattan) - 3.0).abs() < 1e-12);
    }
}
