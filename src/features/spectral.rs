//! Singular spectrum analysis (SSA) features
//!
//! Each series is embedded into its trajectory (Hankel) matrix, decomposed,
//! and the leading components are reconstructed by diagonal averaging.
//! Statistical features are then computed per component.

use super::stats::{global_statistics, local_statistics, GLOBAL_STATS, LOCAL_STATS};
use super::{extract_per_channel, FeatureGenerator, FeatureTable, VarianceFilter};
use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use crate::utils::linalg::{quantile, symmetric_eigen};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Candidate window sizes (percent of series length) tried in window mode
pub const WINDOW_CANDIDATES: [f64; 4] = [10.0, 20.0, 30.0, 40.0];
/// Training samples inspected when choosing the window
const WINDOW_SEARCH_SAMPLES: usize = 20;
const EIGEN_SWEEPS: usize = 60;
const EIGEN_TOL: f64 = 1e-10;

/// Optimal hard-threshold coefficient for an aspect ratio `beta`
pub fn beta_thr(beta: f64) -> f64 {
    0.56 * beta.powi(3) - 0.95 * beta.powi(2) + 1.82 * beta + 1.43
}

/// Number of singular values above `ω(β)·median(σ)`, at least one
pub fn hard_threshold_rank(singular_values: &[f64], beta: f64) -> usize {
    if singular_values.is_empty() {
        return 0;
    }
    let thr = beta_thr(beta) * quantile(singular_values, 0.5);
    singular_values.iter().filter(|&&s| s > thr).count().max(1)
}

/// Window length in samples, clamped so the trajectory matrix has at least two rows and columns
pub fn ssa_window(len: usize, percent: f64) -> usize {
    let w = (len as f64 * percent / 100.0).round() as usize;
    w.clamp(2, len.saturating_sub(1).max(2))
}

/// Eigen-decomposition of a single trajectory matrix
#[derive(Debug, Clone)]
pub struct SsaDecomposition {
    /// Singular values in descending order
    pub singular_values: Array1<f64>,
    /// Left singular vectors as columns
    pub u: Array2<f64>,
    trajectory: Array2<f64>,
}

impl SsaDecomposition {
    pub fn new(series: &[f64], window: usize) -> Result<Self> {
        let n = series.len();
        if window < 2 || window >= n {
            return Err(IndustrialError::InvalidParameter {
                name: "window_length".to_string(),
                value: window.to_string(),
                reason: format!("must lie in [2, {})", n),
            });
        }
        let k = n - window + 1;
        let trajectory = Array2::from_shape_fn((window, k), |(i, j)| series[i + j]);
        let lag_cov = trajectory.dot(&trajectory.t());
        let (eigenvalues, u) = symmetric_eigen(&lag_cov, EIGEN_SWEEPS, EIGEN_TOL);
        let singular_values = eigenvalues.mapv(|l| l.max(0.0).sqrt());
        Ok(Self {
            singular_values,
            u,
            trajectory,
        })
    }

    /// Aspect ratio of the trajectory matrix
    pub fn beta(&self) -> f64 {
        let (l, k) = self.trajectory.dim();
        l.min(k) as f64 / l.max(k) as f64
    }

    pub fn rank(&self) -> usize {
        hard_threshold_rank(self.singular_values.as_slice().unwrap_or(&[]), self.beta())
    }

    /// Share of total energy carried by the first `rank` components
    pub fn explained_variance(&self, rank: usize) -> f64 {
        let total: f64 = self.singular_values.iter().map(|s| s * s).sum();
        if total == 0.0 {
            return 0.0;
        }
        self.singular_values.iter().take(rank).map(|s| s * s).sum::<f64>() / total
    }

    /// Drop the trajectory and eigenvectors, keeping only the singular values
    fn into_spectrum(self) -> Self {
        Self {
            singular_values: self.singular_values,
            u: Array2::zeros((0, 0)),
            trajectory: Array2::zeros((0, 0)),
        }
    }

    /// Reconstruct component `idx` as a series by diagonal averaging
    pub fn component(&self, idx: usize) -> Vec<f64> {
        let (l, k) = self.trajectory.dim();
        let n = l + k - 1;
        if idx >= l {
            return vec![0.0; n];
        }
        let u = self.u.column(idx);
        let proj = u.dot(&self.trajectory);
        let mut sums = vec![0.0; n];
        let mut counts = vec![0usize; n];
        for i in 0..l {
            for j in 0..k {
                sums[i + j] += u[i] * proj[j];
                counts[i + j] += 1;
            }
        }
        sums.iter().zip(&counts).map(|(s, &c)| s / c as f64).collect()
    }
}

/// Configuration for SSA features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaParams {
    /// Window length as a percentage of the series length
    pub window_length: f64,
    /// Fixed number of components; chosen by hard thresholding when absent
    pub rank: Option<usize>,
    /// Search the window among the candidate sizes
    pub window_mode: bool,
    pub var_threshold: f64,
}

impl Default for SsaParams {
    fn default() -> Self {
        Self {
            window_length: 20.0,
            rank: None,
            window_mode: false,
            var_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SsaState {
    window: usize,
    rank: usize,
}

/// SSA component statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsaExtractor {
    name: String,
    params: SsaParams,
    state: Option<SsaState>,
    filter: VarianceFilter,
}

impl SsaExtractor {
    pub fn new(params: SsaParams) -> Self {
        let filter = VarianceFilter::new(params.var_threshold);
        Self {
            name: "spectral".to_string(),
            params,
            state: None,
            filter,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Fitted (window, rank), if any
    pub fn fitted(&self) -> Option<(usize, usize)> {
        self.state.map(|s| (s.window, s.rank))
    }

    fn sample_series(data: &SeriesDataset, limit: usize) -> Vec<Vec<f64>> {
        (0..data.n_samples().min(limit))
            .flat_map(|i| (0..data.n_channels()).map(move |c| (i, c)))
            .map(|(i, c)| data.series(i, c).to_vec())
            .collect()
    }

    fn median_rank(series: &[Vec<f64>], window: usize) -> Result<(usize, f64)> {
        let spectra: Vec<(usize, SsaDecomposition)> = series
            .par_iter()
            .map(|s| {
                SsaDecomposition::new(s, window).map(|d| (d.rank(), d.into_spectrum()))
            })
            .collect::<Result<Vec<_>>>()?;
        let ranks: Vec<f64> = spectra.iter().map(|(r, _)| *r as f64).collect();
        let rank = (quantile(&ranks, 0.5).round() as usize).max(1);
        let explained = spectra
            .iter()
            .map(|(_, d)| d.explained_variance(rank))
            .sum::<f64>()
            / spectra.len().max(1) as f64;
        Ok((rank, explained))
    }

    fn choose_window(&self, data: &SeriesDataset) -> Result<usize> {
        let len = data.series_len();
        if !self.params.window_mode {
            return Ok(ssa_window(len, self.params.window_length));
        }
        let sample = Self::sample_series(data, WINDOW_SEARCH_SAMPLES);
        let mut best: Option<(usize, f64)> = None;
        for &pct in WINDOW_CANDIDATES.iter() {
            let window = ssa_window(len, pct);
            let (_, explained) = Self::median_rank(&sample, window)?;
            debug!(window, explained, "SSA window candidate");
            // strict comparison keeps the smaller window on ties
            if best.map_or(true, |(_, e)| explained > e + 1e-12) {
                best = Some((window, explained));
            }
        }
        Ok(best.map_or_else(|| ssa_window(len, self.params.window_length), |(w, _)| w))
    }

    fn state(&self) -> Result<SsaState> {
        self.state.ok_or(IndustrialError::ModelNotFitted)
    }

    fn column_names(rank: usize) -> Vec<String> {
        (1..=rank)
            .flat_map(|comp| {
                GLOBAL_STATS
                    .iter()
                    .chain(LOCAL_STATS.iter())
                    .map(move |stat| format!("{}_comp{}", stat, comp))
            })
            .collect()
    }

    fn raw_table(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        let state = self.state()?;
        if state.window >= data.series_len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("series longer than {}", state.window),
                actual: format!("length {}", data.series_len()),
            });
        }
        let names = Self::column_names(state.rank);
        extract_per_channel(data, &names, |s| {
            let decomp = SsaDecomposition::new(s, state.window)?;
            Ok((0..state.rank)
                .flat_map(|idx| {
                    let comp = decomp.component(idx);
                    let mut v = global_statistics(&comp);
                    v.extend(local_statistics(&comp));
                    v
                })
                .collect())
        })
    }

    fn fit_state(&mut self, data: &SeriesDataset) -> Result<()> {
        if data.series_len() < 4 {
            return Err(IndustrialError::FeatureError(
                "SSA needs series of at least four points".to_string(),
            ));
        }
        let window = self.choose_window(data)?;
        let rank = match self.params.rank {
            Some(r) => r.max(1).min(window),
            None => {
                let all = Self::sample_series(data, data.n_samples());
                Self::median_rank(&all, window)?.0.min(window)
            }
        };
        info!(generator = %self.name, window, rank, "SSA basis fitted");
        self.state = Some(SsaState { window, rank });
        Ok(())
    }
}

impl FeatureGenerator for SsaExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, data: &SeriesDataset) -> Result<()> {
        self.fit_state(data)?;
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        Ok(())
    }

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.filter.apply(self.raw_table(data)?)
    }

    fn fit_transform(&mut self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.fit_state(data)?;
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        self.filter.apply(raw)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "window_length": self.params.window_length,
            "rank": self.params.rank,
            "window_mode": self.params.window_mode,
            "var_threshold": self.params.var_threshold,
            "fitted_window": self.state.map(|s| s.window),
            "fitted_rank": self.state.map(|s| s.rank),
        })
    }

    /// Singular values of every (sample, channel) trajectory matrix, channels side by side
    fn spectrum(&self, data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        let state = match self.state() {
            Ok(s) => s,
            Err(e) => return Some(Err(e)),
        };
        let n = data.n_samples();
        let width = state.window * data.n_channels();
        let rows: Result<Vec<Vec<f64>>> = (0..n)
            .into_par_iter()
            .map(|i| -> Result<Vec<f64>> {
                let mut row = Vec::with_capacity(width);
                for c in 0..data.n_channels() {
                    let s = data.series(i, c).to_vec();
                    row.extend(SsaDecomposition::new(&s, state.window)?.singular_values.iter());
                }
                Ok(row)
            })
            .collect();
        Some(rows.and_then(|rows| {
            Ok(Array2::from_shape_vec((n, width), rows.into_iter().flatten().collect())?)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| {
                let t = t as f64;
                (t * 0.2).sin() * 3.0 + (t * 1.1).sin()
            })
            .collect()
    }

    #[test]
    fn test_beta_thr_values() {
        assert!((beta_thr(1.0) - 2.86).abs() < 1e-12);
        assert!((beta_thr(0.0) - 1.43).abs() < 1e-12);
    }

    #[test]
    fn test_components_reconstruct_series() {
        let series = two_tone(60);
        let d = SsaDecomposition::new(&series, 12).unwrap();
        let mut total = vec![0.0; 60];
        for idx in 0..12 {
            for (t, v) in d.component(idx).iter().enumerate() {
                total[t] += v;
            }
        }
        for (a, b) in total.iter().zip(&series) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rank_covers_sinusoid_mixture() {
        let d = SsaDecomposition::new(&two_tone(80), 16).unwrap();
        // two sinusoids span four components, the rest is numerical noise
        assert!(d.rank() >= 4, "rank {}", d.rank());
        assert!(d.explained_variance(4) > 0.95);
    }

    #[test]
    fn test_window_clamped() {
        assert_eq!(ssa_window(100, 20.0), 20);
        assert_eq!(ssa_window(5, 1.0), 2);
        assert_eq!(ssa_window(5, 200.0), 4);
    }

    #[test]
    fn test_fit_freezes_rank_and_spectrum_shape() {
        let x = Array2::from_shape_fn((4, 50), |(i, t)| ((t as f64) * (0.2 + 0.1 * i as f64)).sin());
        let data = SeriesDataset::from_univariate(x, ndarray::array![0.0, 1.0, 0.0, 1.0]).unwrap();
        let mut ex = SsaExtractor::new(SsaParams {
            rank: Some(2),
            ..Default::default()
        });
        let table = ex.fit_transform(&data).unwrap();
        assert_eq!(ex.fitted(), Some((10, 2)));
        assert_eq!(table.n_samples(), 4);
        let spectrum = ex.spectrum(&data).unwrap().unwrap();
        assert_eq!(spectrum.dim(), (4, 10));
    }

    #[test]
    fn test_window_mode_picks_a_candidate() {
        let x = Array2::from_shape_fn((3, 40), |(i, t)| ((t as f64) * 0.3 + i as f64).sin());
        let data = SeriesDataset::from_univariate(x, ndarray::array![0.0, 1.0, 0.0]).unwrap();
        let mut ex = SsaExtractor::new(SsaParams {
            window_mode: true,
            ..Default::default()
        });
        ex.fit(&data).unwrap();
        let (window, _) = ex.fitted().unwrap();
        assert!([4, 8, 12, 16].contains(&window));
    }
}
