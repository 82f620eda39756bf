//! Experiment orchestration
//!
//! Runs every configured feature generator over every dataset, `launches`
//! times, and writes the results to
//! `{output_dir}/{generator}/{dataset}/{launch}/` (see [`results`]).
//!
//! Datasets and launches are processed sequentially. Model files that cannot
//! be saved are logged and skipped; any other failure ends the experiment
//! and is returned to the caller.

pub mod results;

use crate::classifier::{BranchPrediction, TimeSeriesClassifier};
use crate::config::ExperimentConfig;
use crate::data::{ArchiveLoader, DatasetSplits};
use crate::ecm::CorrectionOutcome;
use crate::error::Result;
use crate::tracking::{ExperimentTracker, RunStatus};
use crate::training::ModelMetrics;
use crate::utils::Timer;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Metrics of one branch on one dataset and launch
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub dataset: String,
    pub launch: usize,
    pub branch: String,
    pub test_metrics: ModelMetrics,
    pub train_metrics: ModelMetrics,
    /// Metrics after residual correction, when enabled
    pub corrected_metrics: Option<ModelMetrics>,
    pub path: PathBuf,
}

/// Everything an experiment produced
#[derive(Debug, Clone, Default)]
pub struct ExperimentReport {
    pub records: Vec<LaunchRecord>,
}

impl ExperimentReport {
    /// Mean test accuracy of `branch` over datasets and launches
    pub fn mean_accuracy(&self, branch: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .records
            .iter()
            .filter(|r| r.branch == branch)
            .filter_map(|r| r.test_metrics.accuracy)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Experiment runner
pub struct Industrial {
    config: ExperimentConfig,
}

impl Industrial {
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Read a YAML/JSON config and run it
    pub fn run_experiment(config_path: impl AsRef<Path>) -> Result<ExperimentReport> {
        let config = ExperimentConfig::from_file(config_path.as_ref())?;
        Self::run_with_config(config)
    }

    pub fn run_with_config(config: ExperimentConfig) -> Result<ExperimentReport> {
        Self::new(config)?.run()
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    fn load_datasets(&self) -> Result<Vec<DatasetSplits>> {
        let loader = ArchiveLoader::new(&self.config.data_dir).with_task(self.config.task);
        self.config.datasets_list.iter().map(|name| loader.load(name)).collect()
    }

    pub fn run(&self) -> Result<ExperimentReport> {
        let timer = Timer::start("experiment");
        info!(
            experiment = %self.config.experiment_name,
            datasets = ?self.config.datasets_list,
            generators = ?self.config.feature_generator,
            launches = self.config.launches,
            "START EXPERIMENT"
        );
        let datasets = self.load_datasets()?;

        let mut tracker = ExperimentTracker::with_dir(&self.config.output_dir)?;
        tracker.create_experiment(self.config.experiment_name.clone());

        let mut report = ExperimentReport::default();
        for launch in 1..=self.config.launches {
            info!(launch, "START LAUNCH");
            for splits in &datasets {
                tracker.start_run(format!("{}/{}", splits.name, launch));
                tracker.log_param("dataset", splits.name.clone())?;
                tracker.log_param("launch", launch.to_string())?;
                tracker.log_param("generators", self.config.feature_generator.join(", "))?;

                match self.run_dataset(splits, launch, &mut tracker) {
                    Ok(records) => {
                        tracker.end_run(RunStatus::Finished, None)?;
                        report.records.extend(records);
                    }
                    Err(e) => {
                        error!(dataset = %splits.name, launch, error = %e, "Launch failed");
                        tracker.end_run(RunStatus::Failed, Some(e.to_string()))?;
                        tracker.save()?;
                        return Err(e);
                    }
                }
                tracker.save()?;
            }
        }

        info!(
            records = report.records.len(),
            elapsed_secs = timer.finish().as_secs_f64(),
            "END EXPERIMENT"
        );
        Ok(report)
    }

    fn run_dataset(
        &self,
        splits: &DatasetSplits,
        launch: usize,
        tracker: &mut ExperimentTracker,
    ) -> Result<Vec<LaunchRecord>> {
        let dataset = splits.name.as_str();
        info!(dataset, classes = splits.train.n_classes(), "START WORKING on dataset");

        let mut ecm = self.config.effective_ecm();
        ecm.seed = ecm.seed.wrapping_add(launch as u64);
        let mut classifier = TimeSeriesClassifier::new(self.config.build_branches()?, ecm);

        info!(dataset, "START TRAINING");
        let fitted = classifier.fit(&splits.train, dataset)?;

        info!(dataset, "START PREDICTION");
        let predictions = classifier.predict(&splits.test)?;
        let on_train = classifier.predict_on_train()?;
        let corrections = classifier.error_correction(&predictions, &splits.test)?;

        info!(dataset, "SAVING RESULTS");
        let mut records = Vec::with_capacity(predictions.len());
        for (idx, prediction) in predictions.iter().enumerate() {
            let branch = &classifier.branches()[idx];
            let path = self
                .config
                .output_dir
                .join(branch.name())
                .join(dataset)
                .join(launch.to_string());

            let train_features = fitted
                .train_features
                .iter()
                .find(|(name, _)| name == branch.name())
                .map(|(_, t)| t)
                .unwrap_or(&on_train[idx].features);
            let correction = corrections.get(idx).and_then(|c| c.as_ref());

            save_branch_results(
                &path,
                splits,
                train_features,
                prediction,
                branch.models()?,
                correction,
            )?;

            if let Some(spectrum) = branch.spectrum(&splits.train) {
                results::write_matrix(&path.join("train_spectrum.csv"), &spectrum?, "sv")?;
            }
            if let Some(spectrum) = branch.spectrum(&splits.test) {
                results::write_matrix(&path.join("test_spectrum.csv"), &spectrum?, "sv")?;
            }

            let corrected_metrics = correction.and_then(|c| c.metrics_table.last().map(|(_, m)| m.clone()));
            for (metric, value) in prediction.metrics.as_pairs() {
                tracker.log_metric(format!("{}/{}", branch.name(), metric), value)?;
            }
            if let Some(m) = &corrected_metrics {
                for (metric, value) in m.as_pairs() {
                    tracker.log_metric(format!("{}/corrected_{}", branch.name(), metric), value)?;
                }
            }
            tracker.log_artifact(path.display().to_string())?;

            info!(
                dataset,
                launch,
                branch = %branch.name(),
                accuracy = prediction.metrics.accuracy.unwrap_or(f64::NAN),
                train_accuracy = on_train[idx].metrics.accuracy.unwrap_or(f64::NAN),
                "Branch evaluated"
            );
            records.push(LaunchRecord {
                dataset: dataset.to_string(),
                launch,
                branch: branch.name().to_string(),
                test_metrics: prediction.metrics.clone(),
                train_metrics: on_train[idx].metrics.clone(),
                corrected_metrics,
                path,
            });
        }
        Ok(records)
    }
}

/// Write the per-branch result layout
fn save_branch_results(
    path: &Path,
    splits: &DatasetSplits,
    train_features: &crate::features::FeatureTable,
    prediction: &BranchPrediction,
    models: Vec<(String, String)>,
    correction: Option<&CorrectionOutcome>,
) -> Result<()> {
    let test_results = path.join(results::TEST_RESULTS_DIR);
    std::fs::create_dir_all(&test_results)?;

    for (name, json) in &models {
        results::save_model_json(&test_results.join(format!("pipeline_{}.json", name)), json);
    }
    if let Some(outcome) = correction {
        results::save_boosting_results(&test_results, outcome)?;
    }

    results::write_feature_table(&path.join("train_features.csv"), train_features)?;
    results::write_target(&path.join("train_target.csv"), &splits.train.target)?;
    results::write_feature_table(&path.join("test_features.csv"), &prediction.features)?;
    results::write_target(&path.join("test_target.csv"), &splits.test.target)?;
    results::write_probs_preds_target(
        &test_results.join("probs_preds_target.csv"),
        prediction,
        &splits.test.target,
    )?;
    results::write_metrics(&test_results.join("metrics.csv"), &prediction.metrics)?;
    Ok(())
}
