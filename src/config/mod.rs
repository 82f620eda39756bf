//! Experiment configuration
//!
//! An experiment file lists datasets, feature generators and their
//! parameters, the base model and the number of launches:
//!
//! ```yaml
//! datasets_list: [ItalyPowerDemand, ECG200]
//! feature_generator: [quantile, "ensemble: wavelet spectral"]
//! feature_generator_params:
//!   quantile: { window_size: 0 }
//!   spectral: { window_length: 20 }
//! model_params: { model: logit, max_iter: 500 }
//! error_correction: false
//! launches: 1
//! ```
//!
//! YAML is the default format; a file whose first non-blank character is
//! `{` is read as JSON.

use crate::classifier::{BranchModel, FeatureBranch};
use crate::data::Task;
use crate::ecm::EcmConfig;
use crate::ensemble::{EnsembleConfig, EnsembleRunner};
use crate::error::{IndustrialError, Result};
use crate::features::{build_generator, GeneratorKind};
use crate::training::ModelParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of an ensemble entry in `feature_generator`
const ENSEMBLE_PREFIX: &str = "ensemble:";

/// One entry of `feature_generator`, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSpec {
    Single(GeneratorKind),
    Ensemble(Vec<GeneratorKind>),
}

impl BranchSpec {
    /// Parse `"quantile"` or `"ensemble: quantile wavelet"`
    pub fn parse(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        if let Some(rest) = entry.strip_prefix(ENSEMBLE_PREFIX) {
            let members = rest
                .split_whitespace()
                .map(GeneratorKind::from_name)
                .collect::<Result<Vec<_>>>()?;
            if members.is_empty() {
                return Err(IndustrialError::ConfigError(format!(
                    "'{}' names no ensemble members",
                    entry
                )));
            }
            if members.contains(&GeneratorKind::Ensemble) {
                return Err(IndustrialError::ConfigError("ensembles cannot be nested".to_string()));
            }
            return Ok(Self::Ensemble(members));
        }
        match GeneratorKind::from_name(entry)? {
            GeneratorKind::Ensemble => Err(IndustrialError::ConfigError(
                "'ensemble' needs member generators, e.g. 'ensemble: quantile wavelet'".to_string(),
            )),
            kind => Ok(Self::Single(kind)),
        }
    }

    /// Branch name, also the result sub-directory
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single(kind) => kind.as_str(),
            Self::Ensemble(_) => GeneratorKind::Ensemble.as_str(),
        }
    }
}

/// Full experiment description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Name under which launches are tracked
    pub experiment_name: String,
    pub datasets_list: Vec<String>,
    pub feature_generator: Vec<String>,
    /// Parameters per generator name; `ensemble` holds [`EnsembleConfig`]
    pub feature_generator_params: BTreeMap<String, serde_yaml::Value>,
    #[serde(alias = "fedot_params")]
    pub model_params: ModelParams,
    pub launches: usize,
    pub error_correction: bool,
    pub ecm_params: EcmConfig,
    pub task: Task,
    /// Archive root with one directory per dataset
    pub data_dir: PathBuf,
    /// Results root; generator/dataset/launch directories go below it
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            experiment_name: "industrial".to_string(),
            datasets_list: Vec::new(),
            feature_generator: vec!["quantile".to_string()],
            feature_generator_params: BTreeMap::new(),
            model_params: ModelParams::default(),
            launches: 1,
            error_correction: false,
            ecm_params: EcmConfig::default(),
            task: Task::Classification,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("results_of_experiments"),
        }
    }
}

impl ExperimentConfig {
    /// Load from a YAML or JSON file and validate
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!(
            path = %path.display(),
            datasets = ?config.datasets_list,
            generators = ?config.feature_generator,
            "Experiment config loaded"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = if content.trim_start().starts_with('{') {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets_list.is_empty() {
            return Err(IndustrialError::ConfigError("datasets_list is empty".to_string()));
        }
        if self.feature_generator.is_empty() {
            return Err(IndustrialError::ConfigError("feature_generator is empty".to_string()));
        }
        if self.task == Task::Regression {
            return Err(IndustrialError::ConfigError(
                "experiments run classification only; fit regressors through the api module".to_string(),
            ));
        }
        if self.launches == 0 {
            return Err(IndustrialError::InvalidParameter {
                name: "launches".to_string(),
                value: "0".to_string(),
                reason: "at least one launch is required".to_string(),
            });
        }
        let specs = self.branch_specs()?;
        let mut seen = std::collections::HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name()) {
                return Err(IndustrialError::ConfigError(format!(
                    "generator '{}' is listed twice",
                    spec.name()
                )));
            }
        }
        // building a classifier checks the base model kind
        self.model_params.build_classifier()?;
        if self.error_correction {
            self.ecm_params.regressor.build_regressor()?;
        }
        Ok(())
    }

    pub fn branch_specs(&self) -> Result<Vec<BranchSpec>> {
        self.feature_generator.iter().map(|g| BranchSpec::parse(g)).collect()
    }

    fn generator_params(&self, kind: GeneratorKind) -> Option<&serde_yaml::Value> {
        self.feature_generator_params.get(kind.as_str())
    }

    fn ensemble_config(&self) -> Result<EnsembleConfig> {
        match self.generator_params(GeneratorKind::Ensemble) {
            None | Some(serde_yaml::Value::Null) => Ok(EnsembleConfig::default()),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                IndustrialError::ConfigError(format!("invalid ensemble parameters: {}", e))
            }),
        }
    }

    fn feature_branch(&self, kind: GeneratorKind) -> Result<FeatureBranch> {
        let generator = build_generator(kind.as_str(), self.generator_params(kind))?;
        Ok(FeatureBranch::new(kind.as_str(), generator, self.model_params.clone()))
    }

    /// Fresh, unfitted branches in `feature_generator` order
    pub fn build_branches(&self) -> Result<Vec<Box<dyn BranchModel>>> {
        self.branch_specs()?
            .into_iter()
            .map(|spec| -> Result<Box<dyn BranchModel>> {
                match spec {
                    BranchSpec::Single(kind) => Ok(Box::new(self.feature_branch(kind)?)),
                    BranchSpec::Ensemble(members) => {
                        let members = members
                            .into_iter()
                            .map(|k| self.feature_branch(k))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(Box::new(EnsembleRunner::new(members, self.ensemble_config()?)))
                    }
                }
            })
            .collect()
    }

    /// Correction settings with the `error_correction` switch applied
    pub fn effective_ecm(&self) -> EcmConfig {
        EcmConfig {
            enabled: self.error_correction,
            ..self.ecm_params.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
datasets_list: [Toy]
feature_generator: [quantile, "ensemble: wavelet topological"]
feature_generator_params:
  quantile: { window_size: 20 }
  ensemble: { use_head: true }
fedot_params: { model: knn, n_neighbors: 3 }
error_correction: true
launches: 2
"#;

    #[test]
    fn test_parse_yaml() {
        let config = ExperimentConfig::parse(YAML).unwrap();
        assert_eq!(config.launches, 2);
        assert_eq!(config.model_params.n_neighbors, 3);
        assert!(config.effective_ecm().enabled);
        assert_eq!(
            config.branch_specs().unwrap(),
            vec![
                BranchSpec::Single(GeneratorKind::Quantile),
                BranchSpec::Ensemble(vec![GeneratorKind::Wavelet, GeneratorKind::Topological]),
            ]
        );
        let branches = config.build_branches().unwrap();
        let names: Vec<&str> = branches.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["quantile", "ensemble"]);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"datasets_list": ["A"], "feature_generator": ["spectral"]}"#;
        let config = ExperimentConfig::parse(json).unwrap();
        assert_eq!(config.launches, 1);
        assert!(!config.error_correction);
    }

    #[test]
    fn test_unknown_generator_is_rejected() {
        let yaml = "datasets_list: [A]\nfeature_generator: [rocket]\n";
        assert!(matches!(
            ExperimentConfig::parse(yaml),
            Err(IndustrialError::UnknownGenerator(_))
        ));
    }

    #[test]
    fn test_bare_and_nested_ensemble_are_rejected() {
        assert!(BranchSpec::parse("ensemble").is_err());
        assert!(BranchSpec::parse("ensemble: ensemble quantile").is_err());
        assert!(BranchSpec::parse("ensemble:").is_err());
    }

    #[test]
    fn test_regression_task_is_rejected() {
        let yaml = "datasets_list: [A]\nfeature_generator: [quantile]\ntask: regression\n";
        assert!(matches!(
            ExperimentConfig::parse(yaml),
            Err(IndustrialError::ConfigError(_))
        ));
        let yaml = "datasets_list: [A]\nfeature_generator: [quantile]\ntask: classification\n";
        assert!(ExperimentConfig::parse(yaml).is_ok());
    }

    #[test]
    fn test_zero_launches_is_rejected() {
        let yaml = "datasets_list: [A]\nlaunches: 0\n";
        assert!(ExperimentConfig::parse(yaml).is_err());
    }
}
