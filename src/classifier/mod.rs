//! Multi-branch time-series classifier
//!
//! Each branch turns raw series into features and fits a base classifier.
//! Branches are independent: one failing to fit is logged and dropped, the
//! rest carry on.

mod branch;

pub use branch::FeatureBranch;

use crate::data::SeriesDataset;
use crate::ecm::{CorrectionOutcome, CorrectionRecord, EcmConfig};
use crate::error::{IndustrialError, Result};
use crate::features::FeatureTable;
use crate::training::{argmax_rows, ModelMetrics};
use ndarray::{Array1, Array2};
use serde::Serialize;
use tracing::{error, info, warn};

/// Folds used for out-of-fold first-stage predictions
pub const OOF_FOLDS: usize = 5;

/// Features and class probabilities produced by a branch
#[derive(Debug, Clone)]
pub struct BranchOutput {
    pub features: FeatureTable,
    pub probs: Array2<f64>,
}

/// A fittable path from raw series to class probabilities
pub trait BranchModel: Send + Sync {
    fn name(&self) -> &str;

    /// Fit on the training set; returns the training features
    fn fit(&mut self, train: &SeriesDataset, n_classes: usize) -> Result<FeatureTable>;

    fn predict(&self, data: &SeriesDataset) -> Result<BranchOutput>;

    /// Predictions on the cached training features
    fn predict_on_train(&self) -> Result<BranchOutput>;

    fn train_target(&self) -> Option<&Array1<f64>>;

    /// Training-set probabilities from models fitted without the predicted rows
    fn out_of_fold(&self, n_folds: usize, seed: u64) -> Result<Array2<f64>>;

    fn spectrum(&self, _data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        None
    }

    /// Fitted models as (name, JSON) pairs
    fn models(&self) -> Result<Vec<(String, String)>>;

    fn params(&self) -> serde_json::Value;
}

/// Output of one branch on one dataset
#[derive(Debug, Clone)]
pub struct BranchPrediction {
    pub name: String,
    pub labels: Array1<f64>,
    pub probs: Array2<f64>,
    pub features: FeatureTable,
    pub metrics: ModelMetrics,
}

impl BranchPrediction {
    fn from_output(name: &str, output: BranchOutput, target: &Array1<f64>) -> Self {
        let labels = argmax_rows(&output.probs);
        let metrics = ModelMetrics::compute_classification(target, &labels, Some(&output.probs));
        Self {
            name: name.to_string(),
            labels,
            probs: output.probs,
            features: output.features,
            metrics,
        }
    }
}

/// Summary of a fitted branch
#[derive(Debug, Clone, Serialize)]
pub struct PredictorSummary {
    pub branch: String,
    pub params: serde_json::Value,
}

/// Result of [`TimeSeriesClassifier::fit`]
#[derive(Debug, Clone)]
pub struct FitResult {
    pub predictors: Vec<PredictorSummary>,
    pub train_features: Vec<(String, FeatureTable)>,
}

/// Runs several branches over the same data
pub struct TimeSeriesClassifier {
    branches: Vec<Box<dyn BranchModel>>,
    ecm: EcmConfig,
    n_classes: usize,
}

impl TimeSeriesClassifier {
    pub fn new(branches: Vec<Box<dyn BranchModel>>, ecm: EcmConfig) -> Self {
        Self {
            branches,
            ecm,
            n_classes: 0,
        }
    }

    pub fn branches(&self) -> &[Box<dyn BranchModel>] {
        &self.branches
    }

    pub fn ecm_enabled(&self) -> bool {
        self.ecm.enabled
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Fit every branch; branches that fail are logged and dropped
    pub fn fit(&mut self, train: &SeriesDataset, dataset_name: &str) -> Result<FitResult> {
        if train.n_samples() == 0 {
            return Err(IndustrialError::DataError(format!("{}: empty training set", dataset_name)));
        }
        let n_classes = train
            .target
            .iter()
            .fold(0.0_f64, |m, &v| m.max(v))
            .round() as usize
            + 1;
        self.n_classes = n_classes;

        let mut kept: Vec<Box<dyn BranchModel>> = Vec::with_capacity(self.branches.len());
        let mut train_features = Vec::new();
        let mut last_error = None;

        for mut branch in std::mem::take(&mut self.branches) {
            match branch.fit(train, n_classes) {
                Ok(features) => {
                    info!(
                        dataset = %dataset_name,
                        branch = %branch.name(),
                        n_features = features.n_features(),
                        "Branch fitted"
                    );
                    train_features.push((branch.name().to_string(), features));
                    kept.push(branch);
                }
                Err(e) => {
                    error!(dataset = %dataset_name, branch = %branch.name(), error = %e, "Branch failed to fit, skipping");
                    last_error = Some(e);
                }
            }
        }
        self.branches = kept;

        if self.branches.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                IndustrialError::TrainingError("no branches configured".to_string())
            }));
        }

        Ok(FitResult {
            predictors: self
                .branches
                .iter()
                .map(|b| PredictorSummary {
                    branch: b.name().to_string(),
                    params: b.params(),
                })
                .collect(),
            train_features,
        })
    }

    pub fn predict(&self, test: &SeriesDataset) -> Result<Vec<BranchPrediction>> {
        self.branches
            .iter()
            .map(|b| -> Result<BranchPrediction> {
                Ok(BranchPrediction::from_output(b.name(), b.predict(test)?, &test.target))
            })
            .collect()
    }

    pub fn predict_on_train(&self) -> Result<Vec<BranchPrediction>> {
        self.branches
            .iter()
            .map(|b| -> Result<BranchPrediction> {
                let target = b.train_target().ok_or(IndustrialError::ModelNotFitted)?;
                Ok(BranchPrediction::from_output(b.name(), b.predict_on_train()?, target))
            })
            .collect()
    }

    /// Residual correction for every branch, in branch order.
    ///
    /// Each correction model is fitted on out-of-fold training predictions
    /// and evaluated on `test_predictions`. Entries are `None` when
    /// correction is disabled.
    pub fn error_correction(
        &self,
        test_predictions: &[BranchPrediction],
        test: &SeriesDataset,
    ) -> Result<Vec<Option<CorrectionOutcome>>> {
        if !self.ecm.enabled {
            return Ok(self.branches.iter().map(|_| None).collect());
        }
        if test_predictions.len() != self.branches.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} branch predictions", self.branches.len()),
                actual: format!("{} branch predictions", test_predictions.len()),
            });
        }

        self.branches
            .iter()
            .zip(test_predictions)
            .map(|(branch, test_pred)| -> Result<Option<CorrectionOutcome>> {
                let train = branch.predict_on_train()?;
                let target = branch.train_target().ok_or(IndustrialError::ModelNotFitted)?;
                let oof = branch.out_of_fold(OOF_FOLDS, self.ecm.seed)?;

                let train_record =
                    CorrectionRecord::new(train.features.values, argmax_rows(&oof), target.clone())?;
                let test_record = CorrectionRecord::new(
                    test_pred.features.values.clone(),
                    test_pred.labels.clone(),
                    test.target.clone(),
                )?;

                let outcome = crate::ecm::run(&self.ecm, &train_record, &test_record, Some(self.n_classes))?;
                if outcome.as_ref().map_or(false, |o| o.model.stages().is_empty()) {
                    warn!(branch = %branch.name(), "No correction stage improved the holdout error");
                }
                Ok(outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{QuantileExtractor, QuantileParams, TopologicalExtractor, TopologicalParams};
    use crate::features::{WaveletExtractor, WaveletParams};
    use crate::training::ModelParams;

    fn toy() -> SeriesDataset {
        let x = Array2::from_shape_fn((16, 48), |(i, t)| {
            let t = t as f64;
            if i % 2 == 0 {
                (t * 0.6).sin()
            } else {
                (t * 0.08).sin() * 3.0 + 1.0
            }
        });
        let y = Array1::from_iter((0..16).map(|i| (i % 2) as f64));
        SeriesDataset::from_univariate(x, y).unwrap()
    }

    fn branch(name: &str, g: Box<dyn crate::features::FeatureGenerator>) -> Box<dyn BranchModel> {
        Box::new(FeatureBranch::new(name, g, ModelParams::default()))
    }

    #[test]
    fn test_fit_and_predict_every_branch() {
        let data = toy();
        let mut clf = TimeSeriesClassifier::new(
            vec![
                branch("quantile", Box::new(QuantileExtractor::new(QuantileParams::default()))),
                branch("topological", Box::new(TopologicalExtractor::new(TopologicalParams::default()))),
            ],
            EcmConfig::default(),
        );
        let fit = clf.fit(&data, "toy").unwrap();
        assert_eq!(fit.predictors.len(), 2);
        assert_eq!(clf.n_classes(), 2);

        let preds = clf.predict(&data).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].probs.dim(), (16, 2));
        assert!(preds[0].metrics.accuracy.unwrap() > 0.9);

        let on_train = clf.predict_on_train().unwrap();
        assert_eq!(on_train[1].name, "topological");
    }

    #[test]
    fn test_failing_branch_is_dropped() {
        // embedding span (40 - 1) * 2 exceeds the series length
        let data = toy();
        let bad = TopologicalExtractor::new(TopologicalParams {
            embedding_dim: 40,
            delay: 2,
            ..Default::default()
        });
        let mut clf = TimeSeriesClassifier::new(
            vec![
                branch("topological", Box::new(bad)),
                branch("wavelet", Box::new(WaveletExtractor::new(WaveletParams::default()).unwrap())),
            ],
            EcmConfig::default(),
        );
        let fit = clf.fit(&data, "toy").unwrap();
        assert_eq!(fit.predictors.len(), 1);
        assert_eq!(clf.branches()[0].name(), "wavelet");
    }

    #[test]
    fn test_disabled_correction_yields_none() {
        let data = toy();
        let mut clf = TimeSeriesClassifier::new(
            vec![branch("quantile", Box::new(QuantileExtractor::new(QuantileParams::default())))],
            EcmConfig::default(),
        );
        clf.fit(&data, "toy").unwrap();
        let preds = clf.predict(&data).unwrap();
        let outcomes = clf.error_correction(&preds, &data).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_none());
    }
}
