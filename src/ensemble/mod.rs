//! Ensemble methods module
//!
//! Combines the class probabilities of several branches:
//! - [`stack_branches`] builds the `(samples, branches, classes)` input
//! - [`combine`] applies a head model, or sums over branches and renormalises
//! - [`EnsembleRunner`] fits a set of feature branches plus an optional head

mod head;
mod runner;

pub use head::{EnsembleHead, LogitHead};
pub use runner::{EnsembleConfig, EnsembleRunner};

use crate::error::{IndustrialError, Result};
use ndarray::{Array2, Array3, Axis};

/// Stack per-branch `(N, C)` probability matrices into an `(N, K, C)` tensor
pub fn stack_branches(branch_probs: &[Array2<f64>]) -> Result<Array3<f64>> {
    let first = branch_probs.first().ok_or_else(|| {
        IndustrialError::EnsembleError("no branch predictions to stack".to_string())
    })?;
    let dim = first.dim();
    if let Some((idx, bad)) = branch_probs.iter().enumerate().find(|(_, p)| p.dim() != dim) {
        return Err(IndustrialError::ShapeError {
            expected: format!("{:?} for every branch", dim),
            actual: format!("{:?} for branch {}", bad.dim(), idx),
        });
    }
    let views: Vec<_> = branch_probs.iter().map(|p| p.view()).collect();
    Ok(ndarray::stack(Axis(1), &views)?)
}

/// Sum over the branch axis, then scale every row to sum to one.
/// Rows whose sum is not positive become uniform.
pub fn sum_fallback(input: &Array3<f64>) -> Array2<f64> {
    let mut summed = input.sum_axis(Axis(1));
    let n_classes = summed.ncols();
    for mut row in summed.rows_mut() {
        let total = row.sum();
        if total > 0.0 && total.is_finite() {
            row.mapv_inplace(|v| v / total);
        } else if n_classes > 0 {
            row.fill(1.0 / n_classes as f64);
        }
    }
    summed
}

/// Final `(N, C)` probabilities from the stacked branch tensor
pub fn combine(input: &Array3<f64>, head: Option<&dyn EnsembleHead>) -> Result<Array2<f64>> {
    match head {
        Some(head) => head.predict_proba(input),
        None => Ok(sum_fallback(input)),
    }
}
