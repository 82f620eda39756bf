//! Utility functions and types

pub mod linalg;

pub use linalg::{cholesky_solve, quantile, quantile_sorted, symmetric_eigen};

use std::time::{Duration, Instant};

/// Simple wall-clock timer for stage logging
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Log the elapsed time at debug level and return it
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::debug!(stage = %self.label, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        elapsed
    }
}
