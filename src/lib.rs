//! Industrial TS - time-series classification toolkit
//!
//! This crate turns raw (possibly multichannel) time series into tabular
//! features and classifies them:
//! - Feature generators: statistical, wavelet, SSA spectral, topological
//! - Base classifiers and regressors on top of the features
//! - Ensembles of generator branches with sum or learned-head combination
//! - Residual error correction of first-stage predictions
//! - YAML-driven experiments over UCR-style archives with CSV outputs
//!
//! # Modules
//!
//! ## Core
//! - [`data`] - Archive loading, label encoding, splits
//! - [`features`] - Feature generators
//! - [`training`] - Base models and metrics
//! - [`classifier`] - Multi-branch time-series classifier
//! - [`ensemble`] - Branch stacking, combination and the ensemble runner
//! - [`ecm`] - Error-correction model
//!
//! ## Orchestration
//! - [`config`] - Experiment configuration
//! - [`experiment`] - Experiment runner and result layout
//! - [`tracking`] - Experiment tracking
//! - [`api`] - High-level fit/predict API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core
pub mod data;
pub mod features;
pub mod training;
pub mod classifier;
pub mod ensemble;
pub mod ecm;

// Orchestration
pub mod config;
pub mod experiment;
pub mod tracking;
pub mod api;
pub mod cli;

// Utilities
pub mod utils;

pub use error::{IndustrialError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{IndustrialError, Result};

    // Data
    pub use crate::data::{ArchiveLoader, LabelEncoder, SeriesDataset, Task};

    // Features
    pub use crate::features::{build_generator, AnyGenerator, FeatureGenerator, FeatureTable, GeneratorKind};

    // Training
    pub use crate::training::{Classifier, ModelKind, ModelMetrics, ModelParams, Regressor};

    // Classifier and ensembles
    pub use crate::classifier::{BranchModel, BranchPrediction, FeatureBranch, TimeSeriesClassifier};
    pub use crate::ensemble::{combine, stack_branches, EnsembleConfig, EnsembleHead, EnsembleRunner, LogitHead};

    // Error correction
    pub use crate::ecm::{CorrectionOutcome, EcmConfig, ErrorCorrectionModel};

    // Orchestration
    pub use crate::api::{ApiConfig, IndustrialModel};
    pub use crate::config::ExperimentConfig;
    pub use crate::experiment::{ExperimentReport, Industrial};
    pub use crate::tracking::{ExperimentTracker, RunStatus};
}
