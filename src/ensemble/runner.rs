//! Ensemble of feature branches behind a single branch interface

use super::{combine, stack_branches, EnsembleHead, LogitHead};
use crate::classifier::{BranchModel, BranchOutput, FeatureBranch};
use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use crate::features::FeatureTable;
use ndarray::{concatenate, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Ensemble runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Train a logistic head on the stacked branch probabilities; otherwise sum them
    pub use_head: bool,
    /// Folds for the out-of-fold probabilities the head is trained on
    pub n_folds: usize,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            use_head: false,
            n_folds: 5,
            seed: 42,
        }
    }
}

/// Fits several feature branches and merges their class probabilities
pub struct EnsembleRunner {
    name: String,
    members: Vec<FeatureBranch>,
    config: EnsembleConfig,
    head: Option<LogitHead>,
    train_features: Option<FeatureTable>,
}

impl EnsembleRunner {
    pub fn new(members: Vec<FeatureBranch>, config: EnsembleConfig) -> Self {
        Self {
            name: "ensemble".to_string(),
            members,
            config,
            head: None,
            train_features: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn members(&self) -> &[FeatureBranch] {
        &self.members
    }

    pub fn head(&self) -> Option<&LogitHead> {
        self.head.as_ref()
    }

    fn head_ref(&self) -> Option<&dyn EnsembleHead> {
        self.head.as_ref().map(|h| h as &dyn EnsembleHead)
    }

    fn merge(&self, outputs: Vec<BranchOutput>) -> Result<BranchOutput> {
        let probs: Vec<Array2<f64>> = outputs.iter().map(|o| o.probs.clone()).collect();
        let combined = combine(&stack_branches(&probs)?, self.head_ref())?;
        let tables: Vec<(&str, FeatureTable)> = self
            .members
            .iter()
            .map(|m| m.name())
            .zip(outputs.into_iter().map(|o| o.features))
            .collect();
        Ok(BranchOutput {
            features: concat_tables(&tables)?,
            probs: combined,
        })
    }
}

/// Column-wise concatenation, each name prefixed with its member name
fn concat_tables(tables: &[(&str, FeatureTable)]) -> Result<FeatureTable> {
    let views: Vec<_> = tables.iter().map(|(_, t)| t.values.view()).collect();
    let values = concatenate(Axis(1), &views)?;
    let names = tables
        .iter()
        .flat_map(|(member, t)| t.names.iter().map(move |n| format!("{}_{}", member, n)))
        .collect();
    FeatureTable::new(values, names)
}

impl BranchModel for EnsembleRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, train: &SeriesDataset, n_classes: usize) -> Result<FeatureTable> {
        if self.members.is_empty() {
            return Err(IndustrialError::EnsembleError("ensemble has no members".to_string()));
        }
        let mut kept = Vec::with_capacity(self.members.len());
        let mut tables = Vec::with_capacity(self.members.len());
        let mut last_error = None;
        for mut member in std::mem::take(&mut self.members) {
            match member.fit(train, n_classes) {
                Ok(table) => {
                    tables.push(table);
                    kept.push(member);
                }
                Err(e) => {
                    error!(
                        ensemble = %self.name,
                        member = %member.name(),
                        error = %e,
                        "Ensemble member failed to fit, skipping"
                    );
                    last_error = Some(e);
                }
            }
        }
        self.members = kept;
        if self.members.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                IndustrialError::EnsembleError("every ensemble member failed to fit".to_string())
            }));
        }
        let named: Vec<(&str, FeatureTable)> = self.members.iter().map(|m| m.name()).zip(tables).collect();
        let features = concat_tables(&named)?;

        self.head = None;
        if self.config.use_head {
            let oof = self
                .members
                .iter()
                .map(|m| m.out_of_fold(self.config.n_folds, self.config.seed))
                .collect::<Result<Vec<_>>>()?;
            let mut head = LogitHead::new();
            head.fit(&stack_branches(&oof)?, &train.target)?;
            self.head = Some(head);
        }
        info!(
            ensemble = %self.name,
            members = self.members.len(),
            head = self.config.use_head,
            "Ensemble fitted"
        );
        self.train_features = Some(features.clone());
        Ok(features)
    }

    fn predict(&self, data: &SeriesDataset) -> Result<BranchOutput> {
        let outputs = self
            .members
            .iter()
            .map(|m| m.predict(data))
            .collect::<Result<Vec<_>>>()?;
        self.merge(outputs)
    }

    fn predict_on_train(&self) -> Result<BranchOutput> {
        let outputs = self
            .members
            .iter()
            .map(|m| m.predict_on_train())
            .collect::<Result<Vec<_>>>()?;
        self.merge(outputs)
    }

    fn train_target(&self) -> Option<&Array1<f64>> {
        self.members.first().and_then(|m| m.train_target())
    }

    fn out_of_fold(&self, n_folds: usize, seed: u64) -> Result<Array2<f64>> {
        let oof = self
            .members
            .iter()
            .map(|m| m.out_of_fold(n_folds, seed))
            .collect::<Result<Vec<_>>>()?;
        // the head itself was fitted on these rows, so sum them instead
        Ok(super::sum_fallback(&stack_branches(&oof)?))
    }

    fn spectrum(&self, data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        let spectra: Vec<Result<Array2<f64>>> = self.members.iter().filter_map(|m| m.spectrum(data)).collect();
        if spectra.is_empty() {
            return None;
        }
        Some(spectra.into_iter().collect::<Result<Vec<_>>>().and_then(|s| {
            let views: Vec<_> = s.iter().map(|a| a.view()).collect();
            Ok(concatenate(Axis(1), &views)?)
        }))
    }

    fn models(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for member in &self.members {
            out.extend(member.models()?);
        }
        if let Some(head) = &self.head {
            out.push(("ensemble_head".to_string(), head.to_json()?));
        }
        Ok(out)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "generator": "ensemble",
            "members": self.members.iter().map(|m| m.params()).collect::<Vec<_>>(),
            "ensemble": self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{QuantileExtractor, QuantileParams, TopologicalExtractor, TopologicalParams};
    use crate::features::{WaveletExtractor, WaveletParams};
    use crate::training::ModelParams;

    fn toy() -> SeriesDataset {
        let x = Array2::from_shape_fn((20, 40), |(i, t)| {
            let t = t as f64;
            if i % 2 == 0 {
                (t * 0.7).sin()
            } else {
                (t * 0.1).cos() * 2.0 + 0.5
            }
        });
        let y = Array1::from_iter((0..20).map(|i| (i % 2) as f64));
        SeriesDataset::from_univariate(x, y).unwrap()
    }

    fn members() -> Vec<FeatureBranch> {
        vec![
            FeatureBranch::new(
                "quantile",
                Box::new(QuantileExtractor::new(QuantileParams::default())),
                ModelParams::default(),
            ),
            FeatureBranch::new(
                "wavelet",
                Box::new(WaveletExtractor::new(WaveletParams::default()).unwrap()),
                ModelParams::default(),
            ),
        ]
    }

    #[test]
    fn test_sum_ensemble_rows_sum_to_one() {
        let data = toy();
        let mut runner = EnsembleRunner::new(members(), EnsembleConfig::default());
        let features = runner.fit(&data, 2).unwrap();
        assert!(features.names.iter().any(|n| n.starts_with("quantile_")));
        assert!(features.names.iter().any(|n| n.starts_with("wavelet_")));
        assert!(runner.head().is_none());

        let out = runner.predict(&data).unwrap();
        assert_eq!(out.probs.dim(), (20, 2));
        for row in out.probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sum_ensemble_ignores_member_order() {
        let data = toy();
        let mut forward = EnsembleRunner::new(members(), EnsembleConfig::default());
        let mut reversed_members = members();
        reversed_members.reverse();
        let mut backward = EnsembleRunner::new(reversed_members, EnsembleConfig::default());
        forward.fit(&data, 2).unwrap();
        backward.fit(&data, 2).unwrap();

        let a = forward.predict(&data).unwrap().probs;
        let b = backward.predict(&data).unwrap().probs;
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_head_is_fitted_and_saved() {
        let data = toy();
        let config = EnsembleConfig {
            use_head: true,
            n_folds: 4,
            ..Default::default()
        };
        let mut runner = EnsembleRunner::new(members(), config);
        runner.fit(&data, 2).unwrap();
        assert!(runner.head().is_some());

        let models = runner.models().unwrap();
        let names: Vec<&str> = models.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["quantile", "wavelet", "ensemble_head"]);

        let out = runner.predict(&data).unwrap();
        assert_eq!(out.probs.dim(), (20, 2));
    }

    #[test]
    fn test_failing_member_is_dropped() {
        // embedding span (40 - 1) * 2 exceeds the series length
        let bad = FeatureBranch::new(
            "topological",
            Box::new(TopologicalExtractor::new(TopologicalParams {
                embedding_dim: 40,
                delay: 2,
                ..Default::default()
            })),
            ModelParams::default(),
        );
        let quantile = FeatureBranch::new(
            "quantile",
            Box::new(QuantileExtractor::new(QuantileParams::default())),
            ModelParams::default(),
        );
        let data = toy();
        let config = EnsembleConfig {
            use_head: true,
            n_folds: 4,
            ..Default::default()
        };
        let mut runner = EnsembleRunner::new(vec![quantile, bad], config);
        let features = runner.fit(&data, 2).unwrap();
        assert!(features.names.iter().all(|n| n.starts_with("quantile_")));

        let names: Vec<&str> = runner.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["quantile"]);
        let models: Vec<String> = runner.models().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(models, vec!["quantile".to_string(), "ensemble_head".to_string()]);

        let out = runner.predict(&data).unwrap();
        assert_eq!(out.probs.dim(), (20, 2));
        assert_eq!(runner.out_of_fold(4, 1).unwrap().dim(), (20, 2));
    }

    #[test]
    fn test_ensemble_fails_when_every_member_fails() {
        let bad = FeatureBranch::new(
            "topological",
            Box::new(TopologicalExtractor::new(TopologicalParams {
                embedding_dim: 40,
                delay: 2,
                ..Default::default()
            })),
            ModelParams::default(),
        );
        let mut runner = EnsembleRunner::new(vec![bad], EnsembleConfig::default());
        assert!(runner.fit(&toy(), 2).is_err());
    }

    #[test]
    fn test_empty_ensemble_fails() {
        let mut runner = EnsembleRunner::new(Vec::new(), EnsembleConfig::default());
        assert!(runner.fit(&toy(), 2).is_err());
    }
}
