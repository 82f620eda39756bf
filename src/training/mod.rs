//! Model training module
//!
//! Base learners used on top of generated features:
//! - Multinomial logistic regression (`logit`)
//! - K-Nearest Neighbors (`knn`, `knnreg`)
//! - Ridge regression (`ridge`)
//!
//! Classifiers and regressors sit behind the [`Classifier`] and [`Regressor`]
//! traits; [`AnyClassifier`] and [`AnyRegressor`] are the serializable
//! closed sets built from configuration.

pub mod knn;
pub mod linear_models;
pub mod metrics;
mod scaler;

pub use knn::{DistanceMetric, KnnClassifier, KnnConfig, KnnRegressor, WeightScheme};
pub use linear_models::{softmax_rows, RidgeRegression, SoftmaxRegression};
pub use metrics::ModelMetrics;
pub use scaler::StandardScaler;

use crate::error::{IndustrialError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A probabilistic classifier over encoded labels `0..n_classes`
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()>;

    /// Class probabilities, `(samples, n_classes)`
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Most probable class per row
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }

    fn n_classes(&self) -> usize;

    fn to_json(&self) -> Result<String>;
}

/// A real-valued regressor
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn to_json(&self) -> Result<String>;
}

/// Index of the largest value in each row; the first one wins ties
pub fn argmax_rows(prob: &Array2<f64>) -> Array1<f64> {
    prob.rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            best as f64
        })
        .collect()
}

pub(crate) fn check_labels(x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(IndustrialError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(IndustrialError::TrainingError("empty training set".to_string()));
    }
    if n_classes == 0 {
        return Err(IndustrialError::TrainingError("n_classes must be positive".to_string()));
    }
    if let Some(bad) = y
        .iter()
        .find(|&&v| v < 0.0 || v.round() as usize >= n_classes || v.fract() != 0.0)
    {
        return Err(IndustrialError::TrainingError(format!(
            "label {} outside 0..{}",
            bad, n_classes
        )));
    }
    Ok(())
}

/// Model names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Logit,
    Knn,
    Ridge,
    KnnReg,
}

impl ModelKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "logit" | "logistic" => Ok(Self::Logit),
            "knn" => Ok(Self::Knn),
            "ridge" => Ok(Self::Ridge),
            "knnreg" => Ok(Self::KnnReg),
            other => Err(IndustrialError::UnknownModel(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logit => "logit",
            Self::Knn => "knn",
            Self::Ridge => "ridge",
            Self::KnnReg => "knnreg",
        }
    }
}

/// Hyperparameters of a base learner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub model: ModelKind,
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    /// Regularization strength (logit L2, ridge alpha)
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: ModelKind::Logit,
            n_neighbors: 5,
            weights: WeightScheme::Uniform,
            alpha: 0.01,
            learning_rate: 0.1,
            max_iter: 1000,
        }
    }
}

impl ModelParams {
    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    fn knn_config(&self) -> KnnConfig {
        KnnConfig {
            n_neighbors: self.n_neighbors,
            weights: self.weights,
            ..Default::default()
        }
    }

    /// Build an unfitted classifier
    pub fn build_classifier(&self) -> Result<AnyClassifier> {
        match self.model {
            ModelKind::Logit => Ok(AnyClassifier::Logit(
                SoftmaxRegression::new()
                    .with_alpha(self.alpha)
                    .with_learning_rate(self.learning_rate)
                    .with_max_iter(self.max_iter),
            )),
            ModelKind::Knn => Ok(AnyClassifier::Knn(KnnClassifier::new(self.knn_config()))),
            other => Err(IndustrialError::UnknownModel(format!(
                "'{}' is not a classifier",
                other.as_str()
            ))),
        }
    }

    /// Build an unfitted regressor; `knn` maps to the KNN regressor
    pub fn build_regressor(&self) -> Result<AnyRegressor> {
        match self.model {
            ModelKind::Ridge => Ok(AnyRegressor::Ridge(RidgeRegression::new(self.alpha.max(1e-6)))),
            ModelKind::KnnReg | ModelKind::Knn => {
                Ok(AnyRegressor::Knn(KnnRegressor::new(self.knn_config())))
            }
            ModelKind::Logit => Err(IndustrialError::UnknownModel(
                "'logit' is not a regressor".to_string(),
            )),
        }
    }
}

/// Serializable classifier built from [`ModelParams`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "lowercase")]
pub enum AnyClassifier {
    Logit(SoftmaxRegression),
    Knn(KnnClassifier),
}

impl AnyClassifier {
    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::Logit(m) => m,
            Self::Knn(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Self::Logit(m) => m,
            Self::Knn(m) => m,
        }
    }
}

impl Classifier for AnyClassifier {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.inner_mut().fit(x, y, n_classes)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner().predict_proba(x)
    }

    fn n_classes(&self) -> usize {
        self.inner().n_classes()
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serializable regressor built from [`ModelParams`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "lowercase")]
pub enum AnyRegressor {
    Ridge(RidgeRegression),
    Knn(KnnRegressor),
}

impl AnyRegressor {
    fn inner(&self) -> &dyn Regressor {
        match self {
            Self::Ridge(m) => m,
            Self::Knn(m) => m,
        }
    }
}

impl Regressor for AnyRegressor {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Self::Ridge(m) => m.fit(x, y),
            Self::Knn(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
