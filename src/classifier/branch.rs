//! Single feature-generator branch

use super::{BranchModel, BranchOutput};
use crate::data::{k_fold, SeriesDataset};
use crate::error::{IndustrialError, Result};
use crate::features::{FeatureGenerator, FeatureTable};
use crate::training::{AnyClassifier, Classifier, ModelParams};
use ndarray::{Array1, Array2};
use tracing::{debug, info};

struct TrainState {
    features: FeatureTable,
    target: Array1<f64>,
    n_classes: usize,
}

/// One generator followed by one base classifier
pub struct FeatureBranch {
    name: String,
    generator: Box<dyn FeatureGenerator>,
    params: ModelParams,
    model: Option<AnyClassifier>,
    train: Option<TrainState>,
}

impl FeatureBranch {
    pub fn new(name: impl Into<String>, generator: Box<dyn FeatureGenerator>, params: ModelParams) -> Self {
        Self {
            name: name.into(),
            generator,
            params,
            model: None,
            train: None,
        }
    }

    pub fn generator(&self) -> &dyn FeatureGenerator {
        self.generator.as_ref()
    }

    pub fn model(&self) -> Option<&AnyClassifier> {
        self.model.as_ref()
    }

    fn fitted(&self) -> Result<(&AnyClassifier, &TrainState)> {
        match (&self.model, &self.train) {
            (Some(m), Some(t)) => Ok((m, t)),
            _ => Err(IndustrialError::ModelNotFitted),
        }
    }

    /// Fit the classifier on already generated features
    pub fn fit_features(&mut self, features: FeatureTable, target: &Array1<f64>, n_classes: usize) -> Result<()> {
        let mut model = self.params.build_classifier()?;
        model.fit(&features.values, target, n_classes)?;
        self.model = Some(model);
        self.train = Some(TrainState {
            features,
            target: target.clone(),
            n_classes,
        });
        Ok(())
    }
}

impl BranchModel for FeatureBranch {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, train: &SeriesDataset, n_classes: usize) -> Result<FeatureTable> {
        let features = self.generator.fit_transform(train)?;
        info!(
            branch = %self.name,
            n_features = features.n_features(),
            model = self.params.model.as_str(),
            "Features generated, fitting classifier"
        );
        self.fit_features(features.clone(), &train.target, n_classes)?;
        Ok(features)
    }

    fn predict(&self, data: &SeriesDataset) -> Result<BranchOutput> {
        let (model, _) = self.fitted()?;
        let features = self.generator.transform(data)?;
        let probs = model.predict_proba(&features.values)?;
        Ok(BranchOutput { features, probs })
    }

    fn predict_on_train(&self) -> Result<BranchOutput> {
        let (model, train) = self.fitted()?;
        let probs = model.predict_proba(&train.features.values)?;
        Ok(BranchOutput {
            features: train.features.clone(),
            probs,
        })
    }

    fn train_target(&self) -> Option<&Array1<f64>> {
        self.train.as_ref().map(|t| &t.target)
    }

    /// Probabilities for every training row from a model that never saw that row
    fn out_of_fold(&self, n_folds: usize, seed: u64) -> Result<Array2<f64>> {
        let (_, train) = self.fitted()?;
        let n = train.target.len();
        let folds = n_folds.min(n);
        if folds < 2 {
            return Ok(self.predict_on_train()?.probs);
        }

        let mut oof = Array2::<f64>::zeros((n, train.n_classes));
        for (fold, split) in k_fold(n, folds, Some(&train.target), seed)?.iter().enumerate() {
            let fold_train = train.features.select_rows(&split.train_indices);
            let fold_target = train.target.select(ndarray::Axis(0), &split.train_indices);
            let mut model = self.params.build_classifier()?;
            model.fit(&fold_train.values, &fold_target, train.n_classes)?;

            let held = train.features.select_rows(&split.test_indices);
            let probs = model.predict_proba(&held.values)?;
            for (local, &global) in split.test_indices.iter().enumerate() {
                oof.row_mut(global).assign(&probs.row(local));
            }
            debug!(branch = %self.name, fold, "Out-of-fold predictions computed");
        }
        Ok(oof)
    }

    fn spectrum(&self, data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        self.generator.spectrum(data)
    }

    fn models(&self) -> Result<Vec<(String, String)>> {
        let (model, _) = self.fitted()?;
        Ok(vec![(self.name.clone(), model.to_json()?)])
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "generator": self.generator.name(),
            "generator_params": self.generator.params(),
            "model": self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{QuantileExtractor, QuantileParams};

    fn toy() -> SeriesDataset {
        let x = Array2::from_shape_fn((12, 40), |(i, t)| {
            if i % 2 == 0 {
                (t as f64 * 0.5).sin()
            } else {
                (t as f64 * 0.05).sin() * 4.0 + 2.0
            }
        });
        let y = Array1::from_iter((0..12).map(|i| (i % 2) as f64));
        SeriesDataset::from_univariate(x, y).unwrap()
    }

    fn branch() -> FeatureBranch {
        FeatureBranch::new(
            "quantile",
            Box::new(QuantileExtractor::new(QuantileParams::default())),
            ModelParams::default(),
        )
    }

    #[test]
    fn test_fit_predict_shapes() {
        let data = toy();
        let mut b = branch();
        let features = b.fit(&data, 2).unwrap();
        assert_eq!(features.n_samples(), 12);
        let out = b.predict(&data.select(&[0, 1, 2])).unwrap();
        assert_eq!(out.probs.dim(), (3, 2));
        assert_eq!(out.features.names, features.names);
    }

    #[test]
    fn test_out_of_fold_covers_every_row() {
        let data = toy();
        let mut b = branch();
        b.fit(&data, 2).unwrap();
        let oof = b.out_of_fold(3, 7).unwrap();
        assert_eq!(oof.dim(), (12, 2));
        for row in oof.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        assert!(matches!(branch().predict(&toy()), Err(IndustrialError::ModelNotFitted)));
    }
}
