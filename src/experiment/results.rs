//! Result files of one branch on one dataset and launch
//!
//! ```text
//! {branch_dir}/train_features.csv
//! {branch_dir}/train_target.csv
//! {branch_dir}/test_features.csv
//! {branch_dir}/test_target.csv
//! {branch_dir}/test_results/probs_preds_target.csv
//! {branch_dir}/test_results/metrics.csv
//! {branch_dir}/test_results/pipeline_{model}.json
//! {branch_dir}/test_results/boosting/solution_table.csv
//! {branch_dir}/test_results/boosting/metrics_table.csv
//! {branch_dir}/test_results/boosting/boosting_pipelines/boost_{i}.json
//! {branch_dir}/test_results/boosting/boosting_pipelines/boost_ensemble.json
//! ```

use crate::classifier::BranchPrediction;
use crate::ecm::CorrectionOutcome;
use crate::error::Result;
use crate::features::FeatureTable;
use crate::training::{ModelMetrics, Regressor};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const TEST_RESULTS_DIR: &str = "test_results";
pub const BOOSTING_DIR: &str = "boosting";
pub const BOOSTING_PIPELINES_DIR: &str = "boosting_pipelines";

/// Write named f64 columns as a CSV with a header row
pub fn write_columns(path: &Path, columns: Vec<(String, Vec<f64>)>) -> Result<()> {
    let columns: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| Series::new(name.into(), values).into())
        .collect();
    let mut df = DataFrame::new(columns)?;
    write_frame(path, &mut df)
}

fn write_frame(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<()> {
    let columns = table
        .names
        .iter()
        .zip(table.values.columns())
        .map(|(name, col)| (name.clone(), col.to_vec()))
        .collect();
    write_columns(path, columns)
}

pub fn write_target(path: &Path, target: &Array1<f64>) -> Result<()> {
    write_columns(path, vec![("target".to_string(), target.to_vec())])
}

/// Matrix with columns named `{prefix}{j}`
pub fn write_matrix(path: &Path, matrix: &Array2<f64>, prefix: &str) -> Result<()> {
    let columns = matrix
        .columns()
        .into_iter()
        .enumerate()
        .map(|(j, col)| (format!("{}{}", prefix, j), col.to_vec()))
        .collect();
    write_columns(path, columns)
}

/// One column per class probability, then `Target` and `Preds`
pub fn write_probs_preds_target(path: &Path, prediction: &BranchPrediction, target: &Array1<f64>) -> Result<()> {
    let mut columns: Vec<(String, Vec<f64>)> = prediction
        .probs
        .columns()
        .into_iter()
        .enumerate()
        .map(|(j, col)| (j.to_string(), col.to_vec()))
        .collect();
    columns.push(("Target".to_string(), target.to_vec()));
    columns.push(("Preds".to_string(), prediction.labels.to_vec()));
    write_columns(path, columns)
}

pub fn write_metrics(path: &Path, metrics: &ModelMetrics) -> Result<()> {
    let (names, values): (Vec<String>, Vec<f64>) = metrics
        .as_pairs()
        .into_iter()
        .map(|(n, v)| (n.to_string(), v))
        .unzip();
    let mut df = DataFrame::new(vec![
        Series::new("metric".into(), names).into(),
        Series::new("value".into(), values).into(),
    ])?;
    write_frame(path, &mut df)
}

/// Metric rows per correction stage; a metric missing in any stage is left out
pub fn write_metrics_table(path: &Path, table: &[(String, ModelMetrics)]) -> Result<()> {
    let metric_names: Vec<&'static str> = table
        .first()
        .map(|(_, m)| m.as_pairs().into_iter().map(|(n, _)| n).collect())
        .unwrap_or_default();

    let mut columns: Vec<Column> = vec![Series::new(
        "stage".into(),
        table.iter().map(|(s, _)| s.clone()).collect::<Vec<_>>(),
    )
    .into()];
    for name in metric_names {
        let values: Option<Vec<f64>> = table.iter().map(|(_, m)| m.get(name)).collect();
        if let Some(values) = values {
            columns.push(Series::new(name.into(), values).into());
        }
    }
    let mut df = DataFrame::new(columns)?;
    write_frame(path, &mut df)
}

/// Write a serialized model; failures are logged and skipped
pub fn save_model_json(path: &Path, json: &str) -> bool {
    let result = path
        .parent()
        .map_or(Ok(()), |p| fs::create_dir_all(p))
        .and_then(|_| fs::write(path, json));
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Can not save model");
            false
        }
    }
}

/// Boosting tables and stage models under `{test_results}/boosting`
pub fn save_boosting_results(test_results: &Path, outcome: &CorrectionOutcome) -> Result<Vec<PathBuf>> {
    let location = test_results.join(BOOSTING_DIR);
    fs::create_dir_all(&location)?;

    let table = &outcome.solution_table;
    let mut columns = vec![
        ("target".to_string(), table.target.to_vec()),
        ("base".to_string(), table.base.to_vec()),
    ];
    for (i, stage) in table.stages.iter().enumerate() {
        columns.push((format!("boost_{}", i + 1), stage.to_vec()));
    }
    columns.push(("corrected".to_string(), table.corrected.to_vec()));
    let solution_path = location.join("solution_table.csv");
    write_columns(&solution_path, columns)?;

    let metrics_path = location.join("metrics_table.csv");
    write_metrics_table(&metrics_path, &outcome.metrics_table)?;

    let models_path = location.join(BOOSTING_PIPELINES_DIR);
    let mut written = vec![solution_path, metrics_path];
    for (index, model) in outcome.model_list().iter().enumerate() {
        let path = models_path.join(format!("boost_{}.json", index));
        match model.to_json() {
            Ok(json) if save_model_json(&path, &json) => written.push(path),
            Ok(_) => {}
            Err(e) => error!(stage = index, error = %e, "Can not serialize boosting model"),
        }
    }
    match outcome.ensemble_model() {
        Some(ensemble) => {
            let path = models_path.join("boost_ensemble.json");
            match ensemble.to_json() {
                Ok(json) if save_model_json(&path, &json) => written.push(path),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Can not serialize boosting ensemble"),
            }
        }
        None => info!("Boosting ensemble not saved, stages are combined by SUM"),
    }
    Ok(written)
}
