//! Head models over stacked branch probabilities

use crate::error::{IndustrialError, Result};
use crate::training::{Classifier, SoftmaxRegression};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

/// A model that maps the `(N, K, C)` branch tensor to final `(N, C)` probabilities
pub trait EnsembleHead: Send + Sync {
    fn fit(&mut self, input: &Array3<f64>, target: &Array1<f64>) -> Result<()>;

    fn predict_proba(&self, input: &Array3<f64>) -> Result<Array2<f64>>;

    fn to_json(&self) -> Result<String>;
}

/// Flatten `(N, K, C)` into `(N, K*C)`, branch-major
pub fn flatten_branches(input: &Array3<f64>) -> Result<Array2<f64>> {
    let (n, k, c) = input.dim();
    Ok(input
        .as_standard_layout()
        .to_owned()
        .into_shape_with_order((n, k * c))?)
}

/// Multinomial logistic regression on the flattened branch probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogitHead {
    model: SoftmaxRegression,
    n_branches: Option<usize>,
}

impl Default for LogitHead {
    fn default() -> Self {
        Self::new()
    }
}

impl LogitHead {
    pub fn new() -> Self {
        Self {
            model: SoftmaxRegression::new(),
            n_branches: None,
        }
    }
}

impl EnsembleHead for LogitHead {
    fn fit(&mut self, input: &Array3<f64>, target: &Array1<f64>) -> Result<()> {
        let (_, k, c) = input.dim();
        self.model.fit(&flatten_branches(input)?, target, c)?;
        self.n_branches = Some(k);
        Ok(())
    }

    fn predict_proba(&self, input: &Array3<f64>) -> Result<Array2<f64>> {
        let k = self.n_branches.ok_or(IndustrialError::ModelNotFitted)?;
        if input.dim().1 != k {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} branches", k),
                actual: format!("{} branches", input.dim().1),
            });
        }
        self.model.predict_proba(&flatten_branches(input)?)
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::stack_branches;
    use ndarray::array;

    #[test]
    fn test_flatten_is_branch_major() {
        let a = array![[0.1, 0.9]];
        let b = array![[0.7, 0.3]];
        let flat = flatten_branches(&stack_branches(&[a, b]).unwrap()).unwrap();
        assert_eq!(flat, array![[0.1, 0.9, 0.7, 0.3]]);
    }

    #[test]
    fn test_logit_head_learns_to_trust_the_good_branch() {
        // branch 0 is always right, branch 1 is noise
        let good = array![[0.9, 0.1], [0.1, 0.9], [0.8, 0.2], [0.2, 0.8], [0.95, 0.05], [0.05, 0.95]];
        let noise = array![[0.5, 0.5], [0.6, 0.4], [0.4, 0.6], [0.5, 0.5], [0.3, 0.7], [0.7, 0.3]];
        let target = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let input = stack_branches(&[good, noise]).unwrap();

        let mut head = LogitHead::new();
        head.fit(&input, &target).unwrap();
        let proba = head.predict_proba(&input).unwrap();
        for (i, &t) in target.iter().enumerate() {
            assert!(proba[[i, t as usize]] > 0.5);
        }
    }

    #[test]
    fn test_head_rejects_other_branch_count() {
        let input = stack_branches(&[array![[0.5, 0.5], [0.4, 0.6]]]).unwrap();
        let mut head = LogitHead::new();
        head.fit(&input, &array![0.0, 1.0]).unwrap();
        let wider = stack_branches(&[array![[0.5, 0.5]], array![[0.5, 0.5]]]).unwrap();
        assert!(head.predict_proba(&wider).is_err());
    }
}
