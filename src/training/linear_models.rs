//! Linear model implementations

use super::scaler::StandardScaler;
use super::{check_labels, Classifier, Regressor};
use crate::error::{IndustrialError, Result};
use crate::utils::linalg::cholesky_solve;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Row-wise softmax with max subtraction
pub fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Multinomial logistic regression fitted by full-batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    /// Fitted weights, `(features, classes)`
    pub weights: Option<Array2<f64>>,
    /// Fitted per-class bias
    pub bias: Option<Array1<f64>>,
    /// L2 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    /// Convergence tolerance on the gradient norm
    pub tol: f64,
    pub learning_rate: f64,
    n_classes: usize,
    scaler: StandardScaler,
}

impl Default for SoftmaxRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftmaxRegression {
    pub fn new() -> Self {
        Self {
            weights: None,
            bias: None,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            n_classes: 0,
            scaler: StandardScaler::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }
}

impl Classifier for SoftmaxRegression {
    fn name(&self) -> &str {
        "logit"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        check_labels(x, y, n_classes)?;
        let n_samples = x.nrows() as f64;
        let xs = self.scaler.fit_transform(x)?;

        let mut onehot = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (i, &label) in y.iter().enumerate() {
            onehot[[i, label.round() as usize]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((x.ncols(), n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);
        let lr = self.learning_rate;

        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let logits = xs.dot(&weights) + &bias.view().insert_axis(Axis(0));
            let errors = softmax_rows(&logits) - &onehot;

            let dw = xs.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = errors.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_classes));

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias = bias - lr * db;
        }
        debug!(iterations, n_classes, "Softmax regression fitted");

        self.weights = Some(weights);
        self.bias = Some(bias);
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (weights, bias) = match (&self.weights, &self.bias) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(IndustrialError::ModelNotFitted),
        };
        let xs = self.scaler.transform(x)?;
        let logits = xs.dot(weights) + &bias.view().insert_axis(Axis(0));
        Ok(softmax_rows(&logits))
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha,
        }
    }
}

impl Regressor for RidgeRegression {
    fn name(&self) -> &str {
        "ridge"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_features = x.ncols();
        if x.nrows() != y.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(IndustrialError::TrainingError("empty training set".to_string()));
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        let x_c = x - &x_mean.view().insert_axis(Axis(0));
        let y_c = y - y_mean;

        let mut xtx = x_c.t().dot(&x_c);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha.max(1e-10);
        }
        let xty = x_c.t().dot(&y_c);

        let coefficients = cholesky_solve(&xtx, &xty)
            .ok_or_else(|| IndustrialError::ComputationError("Singular matrix".to_string()))?;

        self.intercept = Some(y_mean - coefficients.dot(&x_mean));
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(IndustrialError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_blobs() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.8, 5.1],
            [0.0, 5.0],
            [0.2, 5.2],
            [-0.1, 4.9]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        (x, y)
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let p = softmax_rows(&array![[1.0, 2.0, 3.0], [1000.0, 0.0, -1000.0]]);
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(p[[1, 0]] > 0.999);
    }

    #[test]
    fn test_softmax_regression_separates_blobs() {
        let (x, y) = three_blobs();
        let mut model = SoftmaxRegression::new();
        model.fit(&x, &y, 3).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred, y);
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (9, 3));
    }

    #[test]
    fn test_softmax_rejects_out_of_range_labels() {
        let (x, _) = three_blobs();
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 5.0];
        assert!(SoftmaxRegression::new().fit(&x, &y, 3).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let (x, _) = three_blobs();
        assert!(matches!(
            SoftmaxRegression::new().predict_proba(&x),
            Err(IndustrialError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_ridge_recovers_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];
        let mut model = RidgeRegression::new(1e-6);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[6.0]]).unwrap();
        assert!((pred[0] - 13.0).abs() < 1e-3);
    }
}
