//! Labeled series container

use crate::error::{IndustrialError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Ordered set of (series, label) pairs.
///
/// Features are stored as `(samples, channels, length)`; univariate data has
/// a single channel. Labels are already encoded to `0..n_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDataset {
    pub features: Array3<f64>,
    pub target: Array1<f64>,
}

impl SeriesDataset {
    /// Create a dataset from a multichannel feature cube
    pub fn new(features: Array3<f64>, target: Array1<f64>) -> Result<Self> {
        if features.len_of(Axis(0)) != target.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} labels", features.len_of(Axis(0))),
                actual: format!("{} labels", target.len()),
            });
        }
        Ok(Self { features, target })
    }

    /// Create a univariate dataset from a `(samples, length)` matrix
    pub fn from_univariate(features: Array2<f64>, target: Array1<f64>) -> Result<Self> {
        let features = features.insert_axis(Axis(1));
        Self::new(features, target)
    }

    /// Unlabeled dataset (target filled with zeros), used at inference time
    pub fn unlabeled(features: Array3<f64>) -> Self {
        let n = features.len_of(Axis(0));
        Self {
            features,
            target: Array1::zeros(n),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.features.len_of(Axis(0))
    }

    pub fn n_channels(&self) -> usize {
        self.features.len_of(Axis(1))
    }

    pub fn series_len(&self) -> usize {
        self.features.len_of(Axis(2))
    }

    /// View of one channel of one sample
    pub fn series(&self, sample: usize, channel: usize) -> ArrayView1<'_, f64> {
        self.features.slice(ndarray::s![sample, channel, ..])
    }

    /// Number of distinct labels
    pub fn n_classes(&self) -> usize {
        count_classes(&self.target)
    }

    /// Subset of samples, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            target: self.target.select(Axis(0), indices),
        }
    }

    /// Flatten channels into a `(samples, channels * length)` matrix
    pub fn flattened(&self) -> Array2<f64> {
        let n = self.n_samples();
        let width = self.n_channels() * self.series_len();
        self.features
            .as_standard_layout()
            .to_owned()
            .into_shape_with_order((n, width))
            .unwrap_or_else(|_| Array2::zeros((n, width)))
    }
}

/// Count the distinct integer labels of an encoded target
pub fn count_classes(target: &Array1<f64>) -> usize {
    let mut labels: Vec<i64> = target.iter().map(|v| v.round() as i64).collect();
    labels.sort_unstable();
    labels.dedup();
    labels.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_univariate_shape() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let ds = SeriesDataset::from_univariate(x, array![0.0, 1.0]).unwrap();
        assert_eq!(ds.n_samples(), 2);
        assert_eq!(ds.n_channels(), 1);
        assert_eq!(ds.series_len(), 3);
        assert_eq!(ds.series(1, 0)[2], 6.0);
    }

    #[test]
    fn test_label_mismatch_rejected() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(SeriesDataset::from_univariate(x, array![0.0]).is_err());
    }

    #[test]
    fn test_select_and_classes() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let ds = SeriesDataset::from_univariate(x, array![0.0, 1.0, 2.0, 1.0]).unwrap();
        assert_eq!(ds.n_classes(), 3);
        let sub = ds.select(&[3, 0]);
        assert_eq!(sub.target, array![1.0, 0.0]);
        assert_eq!(sub.series(0, 0)[0], 4.0);
    }
}
