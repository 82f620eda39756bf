//! Input sanitising and label encoding

use crate::error::{IndustrialError, Result};
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};

use super::SeriesDataset;

/// Learning problem handled by the toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    Classification,
    Regression,
}

/// Maps raw labels onto `0..n_classes`.
///
/// Labels that all parse as numbers are ordered numerically, anything else
/// lexicographically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the class vocabulary
    pub fn fit(&mut self, labels: &[String]) -> &mut Self {
        let mut classes: Vec<String> = labels.iter().map(|l| normalize_label(l)).collect();
        classes.sort();
        classes.dedup();

        let numeric: Option<Vec<f64>> = classes.iter().map(|c| c.parse::<f64>().ok()).collect();
        if let Some(values) = numeric {
            let mut paired: Vec<(f64, String)> = values.into_iter().zip(classes).collect();
            paired.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            classes = paired.into_iter().map(|(_, c)| c).collect();
        }

        self.classes = classes;
        self
    }

    /// Encode labels; unseen labels are an error
    pub fn transform(&self, labels: &[String]) -> Result<Array1<f64>> {
        labels
            .iter()
            .map(|l| {
                let key = normalize_label(l);
                self.classes
                    .iter()
                    .position(|c| *c == key)
                    .map(|p| p as f64)
                    .ok_or_else(|| IndustrialError::DataError(format!("unseen label '{}'", l)))
            })
            .collect()
    }

    pub fn fit_transform(&mut self, labels: &[String]) -> Result<Array1<f64>> {
        self.fit(labels);
        self.transform(labels)
    }

    /// Decode an encoded label back to its raw form
    pub fn inverse(&self, code: f64) -> Option<&str> {
        let idx = code.round();
        if idx < 0.0 {
            return None;
        }
        self.classes.get(idx as usize).map(|s| s.as_str())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }
}

/// "1", "1.0" and " 1 " all name the same class
fn normalize_label(label: &str) -> String {
    let trimmed = label.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => format!("{}", v as i64),
        Ok(v) => format!("{}", v),
        Err(_) => trimmed.to_string(),
    }
}

/// Replace NaN and infinite values with zero
pub fn sanitize_features(features: &mut Array3<f64>) {
    features.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
}

/// Checks and prepares raw `(features, labels)` pairs.
pub struct DataCheck {
    task: Task,
}

impl DataCheck {
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    /// Build a training dataset, fitting `encoder` for classification
    pub fn check_train(
        &self,
        mut features: Array3<f64>,
        labels: &[String],
        encoder: &mut LabelEncoder,
    ) -> Result<SeriesDataset> {
        sanitize_features(&mut features);
        let target = match self.task {
            Task::Classification => encoder.fit_transform(labels)?,
            Task::Regression => parse_regression_target(labels)?,
        };
        SeriesDataset::new(features, target)
    }

    /// Build an evaluation dataset with an already fitted encoder
    pub fn check_test(
        &self,
        mut features: Array3<f64>,
        labels: &[String],
        encoder: &LabelEncoder,
    ) -> Result<SeriesDataset> {
        sanitize_features(&mut features);
        let target = match self.task {
            Task::Classification => encoder.transform(labels)?,
            Task::Regression => parse_regression_target(labels)?,
        };
        SeriesDataset::new(features, target)
    }
}

fn parse_regression_target(labels: &[String]) -> Result<Array1<f64>> {
    labels
        .iter()
        .map(|l| {
            l.trim()
                .parse::<f64>()
                .map_err(|_| IndustrialError::DataError(format!("non-numeric target '{}'", l)))
        })
        .collect()
}
