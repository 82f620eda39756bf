//! Error-correction model (ECM)
//!
//! Boosting on the residual of a first-stage prediction. Each stage fits a
//! regressor on `[features | current prediction]` to predict the remaining
//! residual `target - prediction`, and is kept only when it lowers the RMSE
//! on a held-out part of the training data. Stage outputs are combined by
//! summation or by a ridge model fitted on the holdout.

use crate::data::holdout_split;
use crate::error::{IndustrialError, Result};
use crate::training::{AnyRegressor, ModelKind, ModelMetrics, ModelParams, Regressor, RidgeRegression};
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How accepted stages are merged into the final prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    /// Base prediction plus every stage output
    #[default]
    Sum,
    /// Ridge regression over the cumulative stage predictions
    Ridge,
}

fn default_regressor() -> ModelParams {
    ModelParams::default().with_model(ModelKind::Ridge)
}

/// Configuration for residual correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcmConfig {
    pub enabled: bool,
    pub n_boosting_stages: usize,
    /// Share of the training rows held out to accept or reject stages
    pub holdout_ratio: f64,
    pub regressor: ModelParams,
    pub combine: CombineMethod,
    pub seed: u64,
}

impl Default for EcmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_boosting_stages: 3,
            holdout_ratio: 0.3,
            regressor: default_regressor(),
            combine: CombineMethod::Sum,
            seed: 42,
        }
    }
}

impl EcmConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }
}

/// Original features, first-stage prediction and true target of a set of samples
#[derive(Debug, Clone)]
pub struct CorrectionRecord {
    pub features: Array2<f64>,
    pub prediction: Array1<f64>,
    pub target: Array1<f64>,
}

impl CorrectionRecord {
    pub fn new(features: Array2<f64>, prediction: Array1<f64>, target: Array1<f64>) -> Result<Self> {
        let n = features.nrows();
        if prediction.len() != n || target.len() != n {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} predictions and targets", n),
                actual: format!("{} predictions, {} targets", prediction.len(), target.len()),
            });
        }
        Ok(Self {
            features,
            prediction,
            target,
        })
    }

    /// What the regressor learns: `target - prediction`
    pub fn residual(&self) -> Array1<f64> {
        &self.target - &self.prediction
    }

    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), rows),
            prediction: self.prediction.select(Axis(0), rows),
            target: self.target.select(Axis(0), rows),
        }
    }
}

fn stage_input(features: &Array2<f64>, current: &Array1<f64>) -> Result<Array2<f64>> {
    let column = current.view().insert_axis(Axis(1));
    Ok(concatenate(Axis(1), &[features.view(), column])?)
}

fn rmse(target: &Array1<f64>, pred: &Array1<f64>) -> f64 {
    ModelMetrics::compute_regression(target, pred).rmse.unwrap_or(0.0)
}

/// Fitted residual-boosting stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCorrectionModel {
    config: EcmConfig,
    stages: Vec<AnyRegressor>,
    ensemble: Option<RidgeRegression>,
    /// Classification label count; `None` for real-valued targets
    n_classes: Option<usize>,
    holdout_rmse: Vec<f64>,
}

impl ErrorCorrectionModel {
    pub fn new(config: EcmConfig, n_classes: Option<usize>) -> Self {
        Self {
            config,
            stages: Vec::new(),
            ensemble: None,
            n_classes,
            holdout_rmse: Vec::new(),
        }
    }

    pub fn stages(&self) -> &[AnyRegressor] {
        &self.stages
    }

    /// Ridge combiner; `None` means stages are summed
    pub fn ensemble(&self) -> Option<&RidgeRegression> {
        self.ensemble.as_ref()
    }

    /// Holdout RMSE of the base prediction followed by each accepted stage
    pub fn holdout_rmse(&self) -> &[f64] {
        &self.holdout_rmse
    }

    pub fn fit(&mut self, record: &CorrectionRecord) -> Result<&mut Self> {
        self.stages.clear();
        self.ensemble = None;
        self.holdout_rmse.clear();

        let n = record.target.len();
        if n < 4 {
            info!(n_samples = n, "Too few samples for residual correction, no stages fitted");
            return Ok(self);
        }
        let split = holdout_split(n, self.config.holdout_ratio, None, self.config.seed)?;
        let fit_part = record.select(&split.train_indices);
        let hold = record.select(&split.test_indices);

        let mut current_fit = fit_part.prediction.clone();
        let mut current_hold = hold.prediction.clone();
        let mut best = rmse(&hold.target, &current_hold);
        self.holdout_rmse.push(best);
        let mut hold_history = vec![current_hold.clone()];

        for stage in 0..self.config.n_boosting_stages {
            let x_fit = stage_input(&fit_part.features, &current_fit)?;
            let residual = &fit_part.target - &current_fit;
            let mut regressor = self.config.regressor.build_regressor()?;
            regressor.fit(&x_fit, &residual)?;

            let x_hold = stage_input(&hold.features, &current_hold)?;
            let candidate = &current_hold + &regressor.predict(&x_hold)?;
            let score = rmse(&hold.target, &candidate);
            debug!(stage, holdout_rmse = score, previous = best, "Correction stage evaluated");

            if score + 1e-12 >= best {
                info!(stage, "Correction stage did not improve the holdout, stopping");
                break;
            }
            current_fit = &current_fit + &regressor.predict(&x_fit)?;
            current_hold = candidate;
            best = score;
            self.holdout_rmse.push(score);
            hold_history.push(current_hold.clone());
            self.stages.push(regressor);
        }

        if self.config.combine == CombineMethod::Ridge && !self.stages.is_empty() {
            let views: Vec<_> = hold_history.iter().map(|p| p.view()).collect();
            let stacked = ndarray::stack(Axis(1), &views)?;
            let mut ridge = RidgeRegression::new(1e-3);
            ridge.fit(&stacked, &hold.target)?;
            self.ensemble = Some(ridge);
        }

        info!(
            accepted_stages = self.stages.len(),
            holdout_rmse = best,
            combine = ?self.config.combine,
            "Error correction fitted"
        );
        Ok(self)
    }

    /// Base prediction followed by the cumulative prediction after every stage
    pub fn stage_predictions(&self, features: &Array2<f64>, base: &Array1<f64>) -> Result<Vec<Array1<f64>>> {
        if features.nrows() != base.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} predictions", features.nrows()),
                actual: format!("{} predictions", base.len()),
            });
        }
        let mut out = vec![base.clone()];
        let mut current = base.clone();
        for regressor in &self.stages {
            current = &current + &regressor.predict(&stage_input(features, &current)?)?;
            out.push(current.clone());
        }
        Ok(out)
    }

    /// Map a raw corrected value onto the label range
    fn finalize(&self, raw: Array1<f64>) -> Array1<f64> {
        match self.n_classes {
            Some(c) => {
                let max = c.saturating_sub(1) as f64;
                raw.mapv(|v| if v.is_finite() { v.round().clamp(0.0, max) } else { 0.0 })
            }
            None => raw,
        }
    }

    /// Corrected prediction; classification outputs are rounded and clipped to `[0, C-1]`
    pub fn correct(&self, features: &Array2<f64>, base: &Array1<f64>) -> Result<Array1<f64>> {
        let history = self.stage_predictions(features, base)?;
        let raw = match &self.ensemble {
            Some(ridge) => {
                let views: Vec<_> = history.iter().map(|p| p.view()).collect();
                ridge.predict(&ndarray::stack(Axis(1), &views)?)?
            }
            None => history.last().cloned().unwrap_or_else(|| base.clone()),
        };
        Ok(self.finalize(raw))
    }
}

/// Apply an optional correction model; without one the base prediction is returned unchanged
pub fn apply(
    model: Option<&ErrorCorrectionModel>,
    features: &Array2<f64>,
    base: &Array1<f64>,
) -> Result<Array1<f64>> {
    match model {
        Some(m) => m.correct(features, base),
        None => Ok(base.clone()),
    }
}

/// Per-sample view of the boosting run on the evaluation set
#[derive(Debug, Clone)]
pub struct SolutionTable {
    pub target: Array1<f64>,
    pub base: Array1<f64>,
    /// Cumulative prediction after each accepted stage
    pub stages: Vec<Array1<f64>>,
    pub corrected: Array1<f64>,
}

/// Everything produced by one correction run
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub model: ErrorCorrectionModel,
    pub solution_table: SolutionTable,
    /// Metrics of the base prediction, each stage, and the final correction
    pub metrics_table: Vec<(String, ModelMetrics)>,
}

impl CorrectionOutcome {
    pub fn model_list(&self) -> &[AnyRegressor] {
        self.model.stages()
    }

    pub fn ensemble_model(&self) -> Option<&RidgeRegression> {
        self.model.ensemble()
    }
}

/// Fit on `train` and evaluate on `test`; `None` when correction is disabled
pub fn run(
    config: &EcmConfig,
    train: &CorrectionRecord,
    test: &CorrectionRecord,
    n_classes: Option<usize>,
) -> Result<Option<CorrectionOutcome>> {
    if !config.enabled {
        return Ok(None);
    }
    let mut model = ErrorCorrectionModel::new(config.clone(), n_classes);
    model.fit(train)?;

    let history = model.stage_predictions(&test.features, &test.prediction)?;
    let corrected = model.correct(&test.features, &test.prediction)?;

    let score = |pred: &Array1<f64>| match n_classes {
        Some(_) => ModelMetrics::compute_classification(&test.target, pred, None),
        None => ModelMetrics::compute_regression(&test.target, pred),
    };
    let mut metrics_table = vec![("base".to_string(), score(&test.prediction))];
    for (i, stage) in history.iter().enumerate().skip(1) {
        metrics_table.push((format!("boost_{}", i), score(&model.finalize(stage.clone()))));
    }
    metrics_table.push(("corrected".to_string(), score(&corrected)));

    Ok(Some(CorrectionOutcome {
        solution_table: SolutionTable {
            target: test.target.clone(),
            base: test.prediction.clone(),
            stages: history.into_iter().skip(1).collect(),
            corrected,
        },
        metrics_table,
        model,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Labels equal to `x0`, first stage always one too low
    fn biased(n: usize) -> CorrectionRecord {
        let features = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { (i % 4) as f64 } else { (i % 3) as f64 });
        let target = features.column(0).to_owned();
        let prediction = target.mapv(|v| (v - 1.0).max(0.0));
        CorrectionRecord::new(features, prediction, target).unwrap()
    }

    #[test]
    fn test_disabled_run_is_none_and_apply_is_identity() {
        let record = biased(20);
        assert!(run(&EcmConfig::default(), &record, &record, Some(4)).unwrap().is_none());
        let out = apply(None, &record.features, &record.prediction).unwrap();
        assert_eq!(out, record.prediction);
    }

    #[test]
    fn test_correction_removes_bias() {
        let train = biased(60);
        let test = biased(20);
        let outcome = run(&EcmConfig::enabled(), &train, &test, Some(4)).unwrap().unwrap();
        assert!(!outcome.model_list().is_empty());
        let before = outcome.metrics_table.first().unwrap().1.accuracy.unwrap();
        let after = outcome.metrics_table.last().unwrap().1.accuracy.unwrap();
        assert!(after > before, "accuracy {} -> {}", before, after);
        assert!(outcome.ensemble_model().is_none());
    }

    #[test]
    fn test_corrected_labels_stay_in_range() {
        let train = biased(60);
        let mut model = ErrorCorrectionModel::new(EcmConfig::enabled(), Some(3));
        model.fit(&train).unwrap();
        let wild = array![-5.0, 10.0, 1.0];
        let features = array![[0.0, 0.0], [3.0, 1.0], [1.0, 2.0]];
        let out = model.correct(&features, &wild).unwrap();
        assert!(out.iter().all(|&v| (0.0..=2.0).contains(&v) && v.fract() == 0.0));
    }

    #[test]
    fn test_ridge_combiner_is_fitted() {
        let train = biased(60);
        let config = EcmConfig {
            combine: CombineMethod::Ridge,
            ..EcmConfig::enabled()
        };
        let mut model = ErrorCorrectionModel::new(config, Some(4));
        model.fit(&train).unwrap();
        assert!(model.ensemble().is_some());
        assert_eq!(model.holdout_rmse().len(), model.stages().len() + 1);
    }

    #[test]
    fn test_perfect_first_stage_accepts_no_stage() {
        let features = Array2::from_shape_fn((30, 1), |(i, _)| (i % 3) as f64);
        let target = features.column(0).to_owned();
        let record = CorrectionRecord::new(features, target.clone(), target).unwrap();
        let mut model = ErrorCorrectionModel::new(EcmConfig::enabled(), Some(3));
        model.fit(&record).unwrap();
        assert!(model.stages().is_empty());
        assert_eq!(model.correct(&record.features, &record.prediction).unwrap(), record.prediction);
    }

    #[test]
    fn test_record_shape_check() {
        assert!(CorrectionRecord::new(array![[1.0], [2.0]], array![1.0], array![1.0, 2.0]).is_err());
    }
}
