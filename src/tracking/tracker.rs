//! Experiment and run records

use super::{LocalStorage, StorageBackend};
use crate::error::{IndustrialError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// One dataset × launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    /// Latest value per metric, keyed `{branch}/{metric}`
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<String>,
    pub status: RunStatus,
    pub error: Option<String>,
}

impl Run {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            run_name: run_name.into(),
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            status: RunStatus::Running,
            error: None,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// A named group of runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub runs: Vec<Run>,
    pub tags: BTreeMap<String, String>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            experiment_id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            runs: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Finished run with the best value of `metric`
    pub fn best_run(&self, metric: &str, maximize: bool) -> Option<&Run> {
        self.runs
            .iter()
            .filter(|r| r.status == RunStatus::Finished)
            .filter_map(|r| r.metrics.get(metric).map(|v| (r, *v)))
            .max_by(|(_, a), (_, b)| {
                let ord = a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
                if maximize {
                    ord
                } else {
                    ord.reverse()
                }
            })
            .map(|(r, _)| r)
    }
}

/// Records runs of the current experiment and saves them through a [`StorageBackend`]
pub struct ExperimentTracker {
    storage: Box<dyn StorageBackend>,
    experiments: Vec<Experiment>,
    current_experiment: Option<usize>,
    current_run: Option<Run>,
}

impl ExperimentTracker {
    pub fn new(storage: Box<dyn StorageBackend>) -> Self {
        Self {
            storage,
            experiments: Vec::new(),
            current_experiment: None,
            current_run: None,
        }
    }

    /// Tracker over `{dir}/experiments.json`, keeping experiments already stored there
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut tracker = Self::new(Box::new(LocalStorage::new(dir)));
        tracker.load()?;
        Ok(tracker)
    }

    pub fn create_experiment(&mut self, name: impl Into<String>) -> String {
        let experiment = Experiment::new(name);
        let id = experiment.experiment_id.clone();
        debug!(experiment_id = %id, name = %experiment.name, "Experiment created");
        self.experiments.push(experiment);
        self.current_experiment = Some(self.experiments.len() - 1);
        id
    }

    pub fn start_run(&mut self, run_name: impl Into<String>) -> String {
        let run = Run::new(run_name);
        let id = run.run_id.clone();
        self.current_run = Some(run);
        id
    }

    fn run_mut(&mut self) -> Result<&mut Run> {
        self.current_run
            .as_mut()
            .ok_or_else(|| IndustrialError::ConfigError("no active run".to_string()))
    }

    pub fn log_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.run_mut()?.params.insert(key.into(), value.into());
        Ok(())
    }

    /// Non-finite values are not recorded; JSON has no representation for them
    pub fn log_metric(&mut self, name: impl Into<String>, value: f64) -> Result<()> {
        let run = self.run_mut()?;
        let name = name.into();
        if !value.is_finite() {
            debug!(metric = %name, "Skipping non-finite metric");
            return Ok(());
        }
        run.metrics.insert(name, value);
        Ok(())
    }

    pub fn log_artifact(&mut self, path: impl Into<String>) -> Result<()> {
        self.run_mut()?.artifacts.push(path.into());
        Ok(())
    }

    /// Close the current run and attach it to the current experiment
    pub fn end_run(&mut self, status: RunStatus, error: Option<String>) -> Result<()> {
        let mut run = self
            .current_run
            .take()
            .ok_or_else(|| IndustrialError::ConfigError("no active run".to_string()))?;
        run.end_time = Some(Utc::now());
        run.status = status;
        run.error = error;

        let idx = self
            .current_experiment
            .ok_or_else(|| IndustrialError::ConfigError("no active experiment".to_string()))?;
        debug!(run = %run.run_name, status = ?status, secs = run.duration_secs(), "Run ended");
        self.experiments[idx].runs.push(run);
        Ok(())
    }

    pub fn current_run(&self) -> Option<&Run> {
        self.current_run.as_ref()
    }

    pub fn current_experiment(&self) -> Option<&Experiment> {
        self.current_experiment.map(|i| &self.experiments[i])
    }

    pub fn experiments(&self) -> &[Experiment] {
        &self.experiments
    }

    pub fn save(&self) -> Result<()> {
        self.storage.save_experiments(&self.experiments)
    }

    /// Prepend stored experiments to the in-memory list
    pub fn load(&mut self) -> Result<()> {
        let mut stored = self.storage.load_experiments()?;
        let offset = stored.len();
        stored.append(&mut self.experiments);
        self.experiments = stored;
        self.current_experiment = self.current_experiment.map(|i| i + offset);
        Ok(())
    }
}
