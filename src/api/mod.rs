//! High-level fit/predict API
//!
//! [`IndustrialModel`] wraps one feature generator and one base model behind
//! a `fit` / `predict` / `predict_proba` interface over raw series and raw
//! labels. For large classification training sets it can switch to a batch
//! ensemble: the rows are split into batches, one branch is fitted per
//! batch in parallel, and a logistic head is trained on the stacked
//! `(samples, batches, classes)` probabilities.

use crate::data::{sanitize_features, LabelEncoder, SeriesDataset, Task};
use crate::ensemble::{stack_branches, EnsembleHead, LogitHead};
use crate::error::{IndustrialError, Result};
use crate::experiment::results;
use crate::features::{AnyGenerator, FeatureGenerator};
use crate::training::{
    argmax_rows, AnyClassifier, AnyRegressor, Classifier, ModelKind, ModelMetrics, ModelParams, Regressor,
};
use ndarray::{Array1, Array2, Array3};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Training sets above this many rows are split when the batch ensemble is on
pub const BATCH_SIZE_FOR_WORKER: usize = 1000;
/// Number of batches when `batch_workers` is not set
pub const DEFAULT_WORKER_NUM: usize = 5;

const MODEL_FILE: &str = "industrial_model.json";

/// Configuration of [`IndustrialModel`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub problem: Task,
    pub generator: String,
    pub generator_params: Option<serde_yaml::Value>,
    pub model: ModelParams,
    pub output_folder: PathBuf,
    pub batch_ensemble: bool,
    /// Number of batches; defaults to [`DEFAULT_WORKER_NUM`]
    pub batch_workers: Option<usize>,
    /// Threads used for batch fitting; `None` uses the global rayon pool
    pub n_jobs: Option<usize>,
    pub seed: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            problem: Task::Classification,
            generator: "quantile".to_string(),
            generator_params: None,
            model: ModelParams::default(),
            output_folder: PathBuf::from("results_of_experiments"),
            batch_ensemble: false,
            batch_workers: None,
            n_jobs: None,
            seed: 42,
        }
    }
}

/// Which prediction [`IndustrialModel::save_predict`] writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionKind {
    Labels,
    Probs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedBranch {
    generator: AnyGenerator,
    model: AnyClassifier,
}

impl FittedBranch {
    fn fit(config: &ApiConfig, data: &SeriesDataset, n_classes: usize) -> Result<Self> {
        let mut generator = AnyGenerator::build(&config.generator, config.generator_params.as_ref())?;
        let features = generator.fit_transform(data)?;
        let mut model = config.model.build_classifier()?;
        model.fit(&features.values, &data.target, n_classes)?;
        Ok(Self { generator, model })
    }

    fn predict_proba(&self, data: &SeriesDataset) -> Result<Array2<f64>> {
        let features = self.generator.transform(data)?;
        self.model.predict_proba(&features.values)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "solver", rename_all = "snake_case")]
enum Solver {
    Single(FittedBranch),
    Batch { members: Vec<FittedBranch>, head: LogitHead },
    Regression { generator: AnyGenerator, model: AnyRegressor },
}

#[derive(Serialize, Deserialize)]
struct SavedModel {
    config: ApiConfig,
    encoder: LabelEncoder,
    solver: Solver,
}

/// Time-series model with raw-label input and output
pub struct IndustrialModel {
    config: ApiConfig,
    encoder: LabelEncoder,
    solver: Option<Solver>,
    predicted_labels: Option<Array1<f64>>,
    predicted_probs: Option<Array2<f64>>,
}

fn labels_to_strings(target: &Array1<f64>) -> Vec<String> {
    target.iter().map(|v| v.to_string()).collect()
}

impl IndustrialModel {
    pub fn new(config: ApiConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.output_folder)?;
        Ok(Self {
            config,
            encoder: LabelEncoder::new(),
            solver: None,
            predicted_labels: None,
            predicted_probs: None,
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Whether the fitted solver is a batch ensemble
    pub fn is_batch_ensemble(&self) -> bool {
        matches!(self.solver, Some(Solver::Batch { .. }))
    }

    /// Fit on `(samples, channels, length)` series and raw labels
    pub fn fit(&mut self, features: &Array3<f64>, target: &Array1<f64>) -> Result<&mut Self> {
        let mut features = features.clone();
        sanitize_features(&mut features);

        let solver = match self.config.problem {
            Task::Classification => {
                let encoded = self.encoder.fit_transform(&labels_to_strings(target))?;
                let data = SeriesDataset::new(features, encoded)?;
                let n_classes = self.encoder.n_classes();
                if self.config.batch_ensemble && data.n_samples() > BATCH_SIZE_FOR_WORKER {
                    self.fit_batches(&data, n_classes)?
                } else {
                    Solver::Single(FittedBranch::fit(&self.config, &data, n_classes)?)
                }
            }
            Task::Regression => {
                let data = SeriesDataset::new(features, target.clone())?;
                let mut generator =
                    AnyGenerator::build(&self.config.generator, self.config.generator_params.as_ref())?;
                let table = generator.fit_transform(&data)?;
                let params = match self.config.model.model {
                    ModelKind::Logit => self.config.model.clone().with_model(ModelKind::Ridge),
                    _ => self.config.model.clone(),
                };
                let mut model = params.build_regressor()?;
                model.fit(&table.values, &data.target)?;
                Solver::Regression { generator, model }
            }
        };

        info!(
            generator = %self.config.generator,
            model = self.config.model.model.as_str(),
            n_samples = target.len(),
            "Industrial model fitted"
        );
        self.solver = Some(solver);
        self.predicted_labels = None;
        self.predicted_probs = None;
        Ok(self)
    }

    fn fit_batches(&self, data: &SeriesDataset, n_classes: usize) -> Result<Solver> {
        let n_batches = self.config.batch_workers.unwrap_or(DEFAULT_WORKER_NUM).max(2);
        let mut indices: Vec<usize> = (0..data.n_samples()).collect();
        indices.shuffle(&mut Xoshiro256PlusPlus::seed_from_u64(self.config.seed));
        let batch_size = data.n_samples().div_ceil(n_batches);
        let batches: Vec<SeriesDataset> = indices.chunks(batch_size).map(|idx| data.select(idx)).collect();
        info!(batch_size, n_batches = batches.len(), "Batch ensemble applied");

        let fit_all = || {
            batches
                .par_iter()
                .map(|batch| FittedBranch::fit(&self.config, batch, n_classes))
                .collect::<Result<Vec<_>>>()
        };
        let members = match self.config.n_jobs {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n.max(1))
                .build()
                .map_err(|e| IndustrialError::ComputationError(e.to_string()))?
                .install(fit_all)?,
            None => fit_all()?,
        };

        let probs = members
            .iter()
            .map(|m| m.predict_proba(data))
            .collect::<Result<Vec<_>>>()?;
        let mut head = LogitHead::new();
        head.fit(&stack_branches(&probs)?, &data.target)?;
        Ok(Solver::Batch { members, head })
    }

    fn solver(&self) -> Result<&Solver> {
        self.solver.as_ref().ok_or(IndustrialError::ModelNotFitted)
    }

    fn dataset(features: &Array3<f64>) -> SeriesDataset {
        let mut features = features.clone();
        sanitize_features(&mut features);
        SeriesDataset::unlabeled(features)
    }

    fn encoded_probs(&self, features: &Array3<f64>) -> Result<Array2<f64>> {
        let data = Self::dataset(features);
        match self.solver()? {
            Solver::Single(branch) => branch.predict_proba(&data),
            Solver::Batch { members, head } => {
                let probs = members
                    .par_iter()
                    .map(|m| m.predict_proba(&data))
                    .collect::<Result<Vec<_>>>()?;
                head.predict_proba(&stack_branches(&probs)?)
            }
            Solver::Regression { .. } => Err(IndustrialError::InvalidParameter {
                name: "problem".to_string(),
                value: "regression".to_string(),
                reason: "class probabilities need a classification model".to_string(),
            }),
        }
    }

    fn decode(&self, encoded: &Array1<f64>) -> Array1<f64> {
        encoded.mapv(|code| {
            self.encoder
                .inverse(code)
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(code)
        })
    }

    /// Predicted raw labels (classification) or values (regression)
    pub fn predict(&mut self, features: &Array3<f64>) -> Result<Array1<f64>> {
        let labels = match self.solver()? {
            Solver::Regression { generator, model } => {
                let table = generator.transform(&Self::dataset(features))?;
                model.predict(&table.values)?
            }
            _ => {
                let probs = self.encoded_probs(features)?;
                let labels = self.decode(&argmax_rows(&probs));
                self.predicted_probs = Some(probs);
                labels
            }
        };
        self.predicted_labels = Some(labels.clone());
        Ok(labels)
    }

    /// Class probabilities, columns in encoder order
    pub fn predict_proba(&mut self, features: &Array3<f64>) -> Result<Array2<f64>> {
        let probs = self.encoded_probs(features)?;
        self.predicted_labels = Some(self.decode(&argmax_rows(&probs)));
        self.predicted_probs = Some(probs.clone());
        Ok(probs)
    }

    /// Metrics of the last prediction against raw `target`, rounded to `rounding` decimals
    pub fn get_metrics(&self, target: &Array1<f64>, metric_names: &[&str], rounding: u32) -> Result<Vec<(String, f64)>> {
        let labels = self.predicted_labels.as_ref().ok_or_else(|| {
            IndustrialError::DataError("no prediction to evaluate, call predict first".to_string())
        })?;
        let metrics = match self.config.problem {
            Task::Classification => {
                let encoded_target = self.encoder.transform(&labels_to_strings(target))?;
                let encoded_labels = self.encoder.transform(&labels_to_strings(labels))?;
                ModelMetrics::compute_classification(&encoded_target, &encoded_labels, self.predicted_probs.as_ref())
            }
            Task::Regression => ModelMetrics::compute_regression(target, labels),
        }
        .rounded(rounding);

        metric_names
            .iter()
            .map(|&name| {
                metrics
                    .get(name)
                    .map(|v| (name.to_string(), v))
                    .ok_or_else(|| IndustrialError::InvalidParameter {
                        name: "metric_names".to_string(),
                        value: name.to_string(),
                        reason: format!("not available for {:?}", self.config.problem),
                    })
            })
            .collect()
    }

    /// Write the last prediction to `{output_folder}/predictions_{labels|probs}.csv`
    pub fn save_predict(&self, kind: PredictionKind) -> Result<PathBuf> {
        let (path, columns) = match kind {
            PredictionKind::Labels => {
                let labels = self.predicted_labels.as_ref().ok_or(IndustrialError::ModelNotFitted)?;
                (
                    self.config.output_folder.join("predictions_labels.csv"),
                    vec![("label".to_string(), labels.to_vec())],
                )
            }
            PredictionKind::Probs => {
                let probs = self.predicted_probs.as_ref().ok_or(IndustrialError::ModelNotFitted)?;
                let columns = probs
                    .columns()
                    .into_iter()
                    .enumerate()
                    .map(|(j, col)| {
                        let name = self.encoder.inverse(j as f64).unwrap_or("unknown").to_string();
                        (name, col.to_vec())
                    })
                    .collect();
                (self.config.output_folder.join("predictions_probs.csv"), columns)
            }
        };
        results::write_columns(&path, columns)?;
        Ok(path)
    }

    /// Write `(metric, value)` pairs to `{output_folder}/metrics.csv`
    pub fn save_metrics(&self, metrics: &[(String, f64)]) -> Result<PathBuf> {
        let path = self.config.output_folder.join("metrics.csv");
        let columns = metrics.iter().map(|(n, v)| (n.clone(), vec![*v])).collect();
        results::write_columns(&path, columns)?;
        Ok(path)
    }

    /// Persist the fitted model into `dir`
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let solver = self.solver()?.clone();
        let saved = SavedModel {
            config: self.config.clone(),
            encoder: self.encoder.clone(),
            solver,
        };
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(MODEL_FILE);
        std::fs::write(&path, serde_json::to_string(&saved)?)?;
        info!(path = %path.display(), "Industrial model saved");
        Ok(path)
    }

    /// Load a model written by [`IndustrialModel::save`]
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(MODEL_FILE);
        let saved: SavedModel = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        if !saved.config.output_folder.exists() {
            warn!(folder = %saved.config.output_folder.display(), "Output folder of the saved model is missing");
        }
        Ok(Self {
            config: saved.config,
            encoder: saved.encoder,
            solver: Some(saved.solver),
            predicted_labels: None,
            predicted_probs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;

    fn toy(n: usize) -> (Array3<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 32), |(i, t)| {
            let t = t as f64;
            if i % 2 == 0 {
                (t * 0.9).sin()
            } else {
                (t * 0.1).sin() * 3.0 + 2.0
            }
        });
        // raw labels as found in UCR files
        let y = Array1::from_iter((0..n).map(|i| if i % 2 == 0 { -1.0 } else { 1.0 }));
        (x.insert_axis(Axis(1)), y)
    }

    fn config(dir: &Path) -> ApiConfig {
        ApiConfig {
            output_folder: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_predict_returns_raw_labels() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y) = toy(20);
        let mut model = IndustrialModel::new(config(dir.path())).unwrap();
        model.fit(&x, &y).unwrap();

        let labels = model.predict(&x).unwrap();
        assert!(labels.iter().all(|&l| l == -1.0 || l == 1.0));
        let metrics = model.get_metrics(&y, &["accuracy", "f1"], 3).unwrap();
        assert_eq!(metrics[0].0, "accuracy");
        assert!(metrics[0].1 > 0.9);
        assert!(model.get_metrics(&y, &["rmse"], 3).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let dir = tempfile::tempdir().unwrap();
        let (x, _) = toy(4);
        let mut model = IndustrialModel::new(config(dir.path())).unwrap();
        assert!(matches!(model.predict(&x), Err(IndustrialError::ModelNotFitted)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y) = toy(16);
        let mut model = IndustrialModel::new(config(dir.path())).unwrap();
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        model.save(dir.path().join("model")).unwrap();
        assert!(model.save_predict(PredictionKind::Probs).unwrap().exists());

        let mut restored = IndustrialModel::load(dir.path().join("model")).unwrap();
        let again = restored.predict_proba(&x).unwrap();
        for (a, b) in probs.iter().zip(again.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_regression_path() {
        let dir = tempfile::tempdir().unwrap();
        let (x, _) = toy(20);
        let y = Array1::from_iter((0..20).map(|i| if i % 2 == 0 { 0.5 } else { 4.0 }));
        let mut model = IndustrialModel::new(ApiConfig {
            problem: Task::Regression,
            ..config(dir.path())
        })
        .unwrap();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.len(), 20);
        assert!(model.predict_proba(&x).is_err());
        let rmse = model.get_metrics(&y, &["rmse"], 4).unwrap()[0].1;
        assert!(rmse < 1.0);
    }
}
