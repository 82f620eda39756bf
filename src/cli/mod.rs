//! Industrial CLI Module
//!
//! Command-line interface for experiments, feature extraction and quick fits.

use clap::{Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::api::{ApiConfig, IndustrialModel};
use crate::data::ArchiveLoader;
use crate::experiment::{results, Industrial};
use crate::features::{build_generator, GeneratorKind};
use crate::training::{ModelKind, ModelParams};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
    let _ = std::io::stdout().flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "industrial")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-series classification with feature generators, ensembles and error correction")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an experiment described by a YAML or JSON config
    Run {
        /// Experiment config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate features for one dataset and write them as CSV
    Features {
        /// Archive root with one directory per dataset
        #[arg(long)]
        data_dir: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Generator (quantile, window_quantile, wavelet, spectral, spectral_window, topological)
        #[arg(short, long, default_value = "quantile")]
        generator: String,

        /// Output directory
        #[arg(short, long, default_value = "features")]
        output: PathBuf,
    },

    /// Show dataset information
    Info {
        /// Archive root with one directory per dataset
        #[arg(long)]
        data_dir: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        dataset: String,
    },

    /// Fit one generator and model on a dataset and report test metrics
    Fit {
        /// Archive root with one directory per dataset
        #[arg(long)]
        data_dir: PathBuf,

        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Feature generator
        #[arg(short, long, default_value = "quantile")]
        generator: String,

        /// Base model (logit, knn)
        #[arg(short, long, default_value = "logit")]
        model: String,

        /// Directory to save the fitted model into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config: &Path) -> anyhow::Result<()> {
    section("Experiment");
    kv("Config", &config.display().to_string());

    let start = Instant::now();
    let report = Industrial::run_experiment(config)?;

    println!();
    println!(
        "  {:<16} {:<24} {:>6} {:>10}",
        muted("Branch"),
        muted("Dataset"),
        muted("Launch"),
        muted("Accuracy")
    );
    println!("  {}", dim(&"─".repeat(60)));
    for record in &report.records {
        let accuracy = record
            .test_metrics
            .accuracy
            .map_or_else(|| "-".to_string(), |a| format!("{:.4}", a));
        println!(
            "  {:<16} {:<24} {:>6} {:>10}",
            record.branch.cyan(),
            record.dataset,
            record.launch,
            accuracy.white().bold()
        );
    }
    println!();
    kv("Time", &format!("{:.2?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_features(data_dir: &Path, dataset: &str, generator: &str, output: &Path) -> anyhow::Result<()> {
    section("Features");

    step_run(&format!("Loading {}", dataset));
    let splits = ArchiveLoader::new(data_dir).load(dataset)?;
    step_done(&format!("{} train / {} test", splits.train.n_samples(), splits.test.n_samples()));

    step_run(&format!("Generating {}", generator.cyan()));
    let start = Instant::now();
    let mut gen = build_generator(generator, None)?;
    let train = gen.fit_transform(&splits.train)?;
    let test = gen.transform(&splits.test)?;
    step_done(&format!("{} features in {:.2?}", train.n_features(), start.elapsed()));

    let dir = output.join(generator).join(dataset);
    step_run(&format!("Saving → {}", dir.display()));
    results::write_feature_table(&dir.join("train_features.csv"), &train)?;
    results::write_target(&dir.join("train_target.csv"), &splits.train.target)?;
    results::write_feature_table(&dir.join("test_features.csv"), &test)?;
    results::write_target(&dir.join("test_target.csv"), &splits.test.target)?;
    if GeneratorKind::from_name(generator)?.has_spectrum() {
        if let Some(spectrum) = gen.spectrum(&splits.train) {
            results::write_matrix(&dir.join("train_spectrum.csv"), &spectrum?, "sv")?;
        }
    }
    step_done("");
    println!();
    Ok(())
}

pub fn cmd_info(data_dir: &Path, dataset: &str) -> anyhow::Result<()> {
    section("Dataset");
    let splits = ArchiveLoader::new(data_dir).load(dataset)?;

    kv("Name", &splits.name);
    kv("Train samples", &splits.train.n_samples().to_string());
    kv("Test samples", &splits.test.n_samples().to_string());
    kv("Channels", &splits.train.n_channels().to_string());
    kv("Series length", &splits.train.series_len().to_string());
    kv("Classes", &splits.encoder.classes().join(", "));
    println!();
    Ok(())
}

pub fn cmd_fit(
    data_dir: &Path,
    dataset: &str,
    generator: &str,
    model: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Fit");

    step_run(&format!("Loading {}", dataset));
    let splits = ArchiveLoader::new(data_dir).load(dataset)?;
    step_done(&format!("{} train / {} test", splits.train.n_samples(), splits.test.n_samples()));

    let config = ApiConfig {
        generator: generator.to_string(),
        model: ModelParams::default().with_model(ModelKind::from_name(model)?),
        output_folder: output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("results_of_experiments")),
        ..Default::default()
    };

    step_run(&format!("Training {} + {}", generator.cyan(), model.cyan()));
    let start = Instant::now();
    let mut industrial = IndustrialModel::new(config)?;
    industrial.fit(&splits.train.features, &splits.train.target)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    industrial.predict_proba(&splits.test.features)?;
    let metrics = industrial.get_metrics(&splits.test.target, &["accuracy", "f1", "roc_auc"], 4)?;

    println!();
    for (name, value) in &metrics {
        println!("  {:<16} {}", muted(name), format!("{:.4}", value).white().bold());
    }

    if let Some(dir) = output {
        let path = industrial.save(dir)?;
        industrial.save_metrics(&metrics)?;
        println!();
        kv("Saved", &path.display().to_string());
    }
    println!();
    Ok(())
}
