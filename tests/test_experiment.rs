//! Integration test: full experiment run over a synthetic archive

use industrial_ts::config::ExperimentConfig;
use industrial_ts::data::loader::write_split;
use industrial_ts::experiment::Industrial;
use ndarray::Array2;
use std::path::Path;

/// Two classes: slow sine vs fast sine with a level shift
fn write_toy_split(path: &Path, n: usize, offset: usize) {
    let length = 40;
    let mut labels = Vec::with_capacity(n);
    let features = Array2::from_shape_fn((n, length), |(i, t)| {
        let phase = ((i + offset) % 7) as f64 * 0.3;
        if i % 2 == 0 {
            (t as f64 * 0.15 + phase).sin()
        } else {
            (t as f64 * 0.9 + phase).sin() + 1.5
        }
    });
    for i in 0..n {
        labels.push(if i % 2 == 0 { "a".to_string() } else { "b".to_string() });
    }
    write_split(path, &features, &labels).unwrap();
}

fn toy_archive(root: &Path) {
    let dir = root.join("Toy");
    std::fs::create_dir_all(&dir).unwrap();
    write_toy_split(&dir.join("Toy_TRAIN.tsv"), 30, 0);
    write_toy_split(&dir.join("Toy_TEST.tsv"), 12, 3);
}

fn config(root: &Path, generators: &str, error_correction: bool) -> ExperimentConfig {
    let yaml = format!(
        r#"
datasets_list: [Toy]
feature_generator: [{generators}]
launches: 1
error_correction: {error_correction}
data_dir: {data}
output_dir: {out}
"#,
        data = root.join("data").display(),
        out = root.join("results").display(),
    );
    ExperimentConfig::parse(&yaml).unwrap()
}

#[test]
fn test_experiment_writes_result_layout() {
    let tmp = tempfile::tempdir().unwrap();
    toy_archive(&tmp.path().join("data"));

    let report = Industrial::run_with_config(config(tmp.path(), "quantile", false)).unwrap();
    assert_eq!(report.records.len(), 1);
    assert!(report.mean_accuracy("quantile").unwrap() > 0.8);

    let branch_dir = tmp.path().join("results").join("quantile").join("Toy").join("1");
    for file in [
        "train_features.csv",
        "train_target.csv",
        "test_features.csv",
        "test_target.csv",
        "test_results/probs_preds_target.csv",
        "test_results/metrics.csv",
    ] {
        assert!(branch_dir.join(file).exists(), "missing {}", file);
    }
    assert!(!branch_dir.join("test_results").join("boosting").exists());
    assert!(tmp.path().join("results").join("experiments.json").exists());
}

#[test]
fn test_experiment_with_ensemble_and_correction() {
    let tmp = tempfile::tempdir().unwrap();
    toy_archive(&tmp.path().join("data"));

    let report = Industrial::run_with_config(config(tmp.path(), "quantile, \"ensemble: quantile wavelet\"", true)).unwrap();
    let branches: Vec<&str> = report.records.iter().map(|r| r.branch.as_str()).collect();
    assert_eq!(branches, vec!["quantile", "ensemble"]);
    assert!(report.records.iter().all(|r| r.corrected_metrics.is_some()));

    let boosting = tmp
        .path()
        .join("results")
        .join("ensemble")
        .join("Toy")
        .join("1")
        .join("test_results")
        .join("boosting");
    assert!(boosting.join("solution_table.csv").exists());
    assert!(boosting.join("metrics_table.csv").exists());
}

#[test]
fn test_spectral_branch_writes_spectra() {
    let tmp = tempfile::tempdir().unwrap();
    toy_archive(&tmp.path().join("data"));

    Industrial::run_with_config(config(tmp.path(), "spectral", false)).unwrap();
    let branch_dir = tmp.path().join("results").join("spectral").join("Toy").join("1");
    assert!(branch_dir.join("train_spectrum.csv").exists());
    assert!(branch_dir.join("test_spectrum.csv").exists());
}

#[test]
fn test_missing_dataset_fails_the_experiment() {
    let tmp = tempfile::tempdir().unwrap();
    toy_archive(&tmp.path().join("data"));
    let mut cfg = config(tmp.path(), "quantile", false);
    cfg.datasets_list.push("Absent".to_string());
    assert!(Industrial::run_with_config(cfg).is_err());
}
