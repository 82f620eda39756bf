//! Evaluation metrics

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Metrics for model evaluation; only the fields relevant to the task are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: Option<f64>,
    /// Macro-averaged F1
    pub f1: Option<f64>,
    /// Macro-averaged precision
    pub precision: Option<f64>,
    /// Macro-averaged recall
    pub recall: Option<f64>,
    /// One-vs-rest macro ROC AUC
    pub roc_auc: Option<f64>,
    pub log_loss: Option<f64>,
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub r2: Option<f64>,
    pub n_samples: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classification metrics from encoded labels and, optionally, class probabilities
    pub fn compute_classification(
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        y_prob: Option<&Array2<f64>>,
    ) -> Self {
        let mut metrics = Self::new();
        metrics.n_samples = y_true.len();
        if y_true.is_empty() {
            return metrics;
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| (*t - *p).abs() < 0.5)
            .count();
        metrics.accuracy = Some(correct as f64 / y_true.len() as f64);

        let mut labels: Vec<i64> = y_true
            .iter()
            .chain(y_pred.iter())
            .map(|v| v.round() as i64)
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        for &label in &labels {
            let (tp, fp, fn_) = confusion_counts(y_true, y_pred, label);
            let p = if tp + fp > 0 { tp as f64 / (tp + fp) as f64 } else { 0.0 };
            let r = if tp + fn_ > 0 { tp as f64 / (tp + fn_) as f64 } else { 0.0 };
            precision += p;
            recall += r;
            f1 += if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        }
        let n_labels = labels.len() as f64;
        metrics.precision = Some(precision / n_labels);
        metrics.recall = Some(recall / n_labels);
        metrics.f1 = Some(f1 / n_labels);

        if let Some(prob) = y_prob {
            metrics.roc_auc = roc_auc_ovr(y_true, prob);
            metrics.log_loss = Some(log_loss(y_true, prob));
        }
        metrics
    }

    /// Regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self::new();
        metrics.n_samples = y_true.len();
        if y_true.is_empty() {
            return metrics;
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        metrics.r2 = Some(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 });

        metrics
    }

    /// Present metrics as (name, value) pairs in a fixed order
    pub fn as_pairs(&self) -> Vec<(&'static str, f64)> {
        [
            ("accuracy", self.accuracy),
            ("f1", self.f1),
            ("precision", self.precision),
            ("recall", self.recall),
            ("roc_auc", self.roc_auc),
            ("log_loss", self.log_loss),
            ("rmse", self.rmse),
            ("mae", self.mae),
            ("r2", self.r2),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }

    /// Look a metric up by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.as_pairs()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// Round every metric to `decimals` places
    pub fn rounded(&self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        let r = |v: Option<f64>| v.map(|x| (x * factor).round() / factor);
        Self {
            accuracy: r(self.accuracy),
            f1: r(self.f1),
            precision: r(self.precision),
            recall: r(self.recall),
            roc_auc: r(self.roc_auc),
            log_loss: r(self.log_loss),
            rmse: r(self.rmse),
            mae: r(self.mae),
            r2: r(self.r2),
            n_samples: self.n_samples,
        }
    }
}

fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>, label: i64) -> (usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        let t = t.round() as i64 == label;
        let p = p.round() as i64 == label;
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    (tp, fp, fn_)
}

/// Rank-based AUC of `scores` for the positive mask; ties get average ranks
fn binary_auc(scores: &[f64], positive: &[bool]) -> Option<f64> {
    let n_pos = positive.iter().filter(|&&p| p).count();
    let n_neg = positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks.iter().zip(positive).filter(|(_, &p)| p).map(|(r, _)| r).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// One-vs-rest macro ROC AUC over classes that have both positives and negatives
pub fn roc_auc_ovr(y_true: &Array1<f64>, prob: &Array2<f64>) -> Option<f64> {
    let aucs: Vec<f64> = (0..prob.ncols())
        .filter_map(|c| {
            let positive: Vec<bool> = y_true.iter().map(|v| v.round() as usize == c).collect();
            let scores: Vec<f64> = prob.column(c).to_vec();
            binary_auc(&scores, &positive)
        })
        .collect();
    if aucs.is_empty() {
        None
    } else {
        Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
    }
}

/// Mean negative log-likelihood of the true class, probabilities clipped to `1e-15`
pub fn log_loss(y_true: &Array1<f64>, prob: &Array2<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let eps = 1e-15;
    let total: f64 = y_true
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let c = label.round() as usize;
            let p = if c < prob.ncols() { prob[[i, c]] } else { 0.0 };
            -p.clamp(eps, 1.0 - eps).ln()
        })
        .sum();
    total / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classification_metrics() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let m = ModelMetrics::compute_classification(&y_true, &y_pred, None);
        assert_eq!(m.accuracy, Some(0.75));
        assert!((m.f1.unwrap() - 0.75).abs() < 1e-12);
        assert!(m.roc_auc.is_none());
    }

    #[test]
    fn test_multiclass_macro_scores() {
        let y_true = array![0.0, 1.0, 2.0, 2.0];
        let y_pred = array![0.0, 2.0, 2.0, 2.0];
        let m = ModelMetrics::compute_classification(&y_true, &y_pred, None);
        // per-class recall: 1, 0, 1
        assert!((m.recall.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_perfect_and_random() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let perfect = array![[0.9, 0.1], [0.8, 0.2], [0.3, 0.7], [0.1, 0.9]];
        assert!((roc_auc_ovr(&y, &perfect).unwrap() - 1.0).abs() < 1e-12);
        let flat = array![[0.5, 0.5], [0.5, 0.5], [0.5, 0.5], [0.5, 0.5]];
        assert!((roc_auc_ovr(&y, &flat).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_log_loss() {
        let y = array![0.0, 1.0];
        let p = array![[1.0, 0.0], [0.5, 0.5]];
        assert!((log_loss(&y, &p) - 0.5 * 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];
        let m = ModelMetrics::compute_regression(&y_true, &y_pred);
        assert!(m.rmse.unwrap() < 0.1);
        assert!(m.r2.unwrap() > 0.9);
        assert!(m.accuracy.is_none());
    }

    #[test]
    fn test_pairs_and_rounding() {
        let m = ModelMetrics {
            accuracy: Some(0.123456),
            f1: Some(0.5),
            ..Default::default()
        };
        let r = m.rounded(2);
        assert_eq!(r.accuracy, Some(0.12));
        assert_eq!(r.as_pairs(), vec![("accuracy", 0.12), ("f1", 0.5)]);
        assert_eq!(m.get("f1"), Some(0.5));
    }
}
