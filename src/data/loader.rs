//! UCR/UEA style archive loading
//!
//! Each dataset lives in `{root}/{name}/` with `{name}_TRAIN.tsv` and
//! `{name}_TEST.tsv` (comma separated `.csv` files are accepted as well).
//! The first column is the class label, the remaining columns the series.

use crate::error::{IndustrialError, Result};
use ndarray::{Array2, Array3, Axis};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::check::{DataCheck, LabelEncoder, Task};
use super::SeriesDataset;

/// Raw split as read from disk: series matrix and unparsed labels
#[derive(Debug, Clone)]
pub struct RawSplit {
    pub features: Array2<f64>,
    pub labels: Vec<String>,
}

/// Encoded train/test pair for one dataset
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub name: String,
    pub train: SeriesDataset,
    pub test: SeriesDataset,
    pub encoder: LabelEncoder,
}

/// Loads datasets from an archive directory
pub struct ArchiveLoader {
    root: PathBuf,
    task: Task,
}

impl ArchiveLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            task: Task::Classification,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    /// Load and encode the train/test splits of `name`
    pub fn load(&self, name: &str) -> Result<DatasetSplits> {
        let start = Instant::now();
        let train_raw = read_split(&self.split_path(name, "TRAIN")?)?;
        let test_raw = read_split(&self.split_path(name, "TEST")?)?;

        if train_raw.features.ncols() != test_raw.features.ncols() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} test columns", train_raw.features.ncols()),
                actual: format!("{} test columns", test_raw.features.ncols()),
            });
        }

        let check = DataCheck::new(self.task);
        let mut encoder = LabelEncoder::new();
        let train = check.check_train(
            train_raw.features.insert_axis(Axis(1)),
            &train_raw.labels,
            &mut encoder,
        )?;
        let test = check.check_test(test_raw.features.insert_axis(Axis(1)), &test_raw.labels, &encoder)?;

        info!(
            dataset = name,
            train = train.n_samples(),
            test = test.n_samples(),
            length = train.series_len(),
            classes = encoder.n_classes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );

        Ok(DatasetSplits {
            name: name.to_string(),
            train,
            test,
            encoder,
        })
    }

    fn split_path(&self, name: &str, split: &str) -> Result<PathBuf> {
        let dir = self.root.join(name);
        ["tsv", "csv"]
            .iter()
            .map(|ext| dir.join(format!("{}_{}.{}", name, split, ext)))
            .find(|p| p.exists())
            .ok_or_else(|| {
                IndustrialError::DataError(format!(
                    "no {} split for dataset '{}' under {}",
                    split,
                    name,
                    dir.display()
                ))
            })
    }
}

/// Read one headerless label-first table
pub fn read_split(path: &Path) -> Result<RawSplit> {
    let separator = match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    };

    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(1000))
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Read split");
    frame_to_split(&df)
}

/// Label column first, every other column numeric
pub fn frame_to_split(df: &DataFrame) -> Result<RawSplit> {
    let columns = df.get_columns();
    if columns.len() < 2 {
        return Err(IndustrialError::DataError(
            "expected a label column followed by at least one value column".to_string(),
        ));
    }

    let label_col = columns[0].cast(&DataType::String)?;
    let labels: Vec<String> = label_col
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect();

    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = columns[1..]
        .iter()
        .map(|col| {
            let values = col.cast(&DataType::Float64)?;
            let values: Vec<f64> = values
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let features = Array2::from_shape_fn((n_rows, col_data.len()), |(r, c)| col_data[c][r]);
    Ok(RawSplit { features, labels })
}

/// Write a dataset split in the same label-first TSV layout
pub fn write_split(path: &Path, features: &Array2<f64>, labels: &[String]) -> Result<()> {
    let mut columns: Vec<Column> = Vec::with_capacity(features.ncols() + 1);
    columns.push(Series::new("label".into(), labels.to_vec()).into());
    for (j, col) in features.columns().into_iter().enumerate() {
        columns.push(Series::new(format!("t{}", j).into(), col.to_vec()).into());
    }
    let mut df = DataFrame::new(columns)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(false)
        .with_separator(b'\t')
        .finish(&mut df)?;
    Ok(())
}

/// Multichannel cube from a list of per-channel matrices
pub fn stack_channels(channels: &[Array2<f64>]) -> Result<Array3<f64>> {
    let views: Vec<_> = channels.iter().map(|c| c.view()).collect();
    Ok(ndarray::stack(Axis(1), &views)?)
}
