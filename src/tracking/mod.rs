//! Experiment tracking
//!
//! Every dataset × launch of an experiment becomes a [`Run`] holding the
//! parameters it was started with, the metrics of each branch and the
//! paths of the files it wrote. Runs are grouped into an [`Experiment`]
//! and persisted as `experiments.json`.

mod storage;
mod tracker;

pub use storage::{LocalStorage, StorageBackend};
pub use tracker::{Experiment, ExperimentTracker, Run, RunStatus};
