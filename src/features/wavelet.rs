//! Wavelet-basis feature extraction
//!
//! Discrete wavelets use a multi-level DWT with symmetric boundary extension.
//! Continuous wavelets use a direct CWT at fixed scales, where the coarsest
//! scale plays the role of the low-frequency component.

use super::stats::{global_statistics, local_statistics, GLOBAL_STATS, LOCAL_STATS};
use super::{extract_per_channel, FeatureGenerator, FeatureTable, VarianceFilter};
use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// CWT scales; the last one is the low-frequency component
pub const WAVELET_SCALES: [f64; 4] = [2.0, 4.0, 10.0, 20.0];

/// Effective support of the continuous mother wavelets
const CWT_SUPPORT: f64 = 8.0;

const HAAR: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];
const DB2: [f64; 4] = [
    -0.12940952255126037,
    0.2241438680420134,
    0.8365163037378079,
    0.48296291314453416,
];
const DB3: [f64; 6] = [
    0.03522629188570953,
    -0.08544127388202666,
    -0.13501102001025458,
    0.45987750211849154,
    0.8068915093110925,
    0.33267055295008263,
];
const DB4: [f64; 8] = [
    -0.010597401785069032,
    0.0328830116668852,
    0.030841381835560764,
    -0.18703481171909309,
    -0.027983769416859854,
    0.6308807679298589,
    0.7148465705529157,
    0.2303778133088965,
];

/// Supported mother wavelets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wavelet {
    Haar,
    Db2,
    Db3,
    Db4,
    MexicanHat,
    Morlet,
}

impl Wavelet {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "haar" | "db1" => Ok(Self::Haar),
            "db2" => Ok(Self::Db2),
            "db3" => Ok(Self::Db3),
            "db4" => Ok(Self::Db4),
            "mexh" => Ok(Self::MexicanHat),
            "morl" => Ok(Self::Morlet),
            other => Err(IndustrialError::InvalidParameter {
                name: "wavelet".to_string(),
                value: other.to_string(),
                reason: "expected one of haar, db2, db3, db4, mexh, morl".to_string(),
            }),
        }
    }

    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::MexicanHat | Self::Morlet)
    }

    fn dec_lo(&self) -> &'static [f64] {
        match self {
            Self::Haar => &HAAR,
            Self::Db2 => &DB2,
            Self::Db3 => &DB3,
            Self::Db4 => &DB4,
            Self::MexicanHat | Self::Morlet => &[],
        }
    }

    fn dec_hi(&self) -> Vec<f64> {
        let lo = self.dec_lo();
        let l = lo.len();
        (0..l)
            .map(|k| {
                let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                sign * lo[l - 1 - k]
            })
            .collect()
    }

    fn psi(&self, u: f64) -> f64 {
        match self {
            Self::MexicanHat => {
                let norm = 2.0 / (3.0_f64.sqrt() * PI.powf(0.25));
                norm * (1.0 - u * u) * (-u * u / 2.0).exp()
            }
            Self::Morlet => (-u * u / 2.0).exp() * (5.0 * u).cos(),
            _ => 0.0,
        }
    }
}

fn reflect(mut j: isize, n: isize) -> usize {
    loop {
        if j < 0 {
            j = -j - 1;
        } else if j >= n {
            j = 2 * n - j - 1;
        } else {
            return j as usize;
        }
    }
}

/// Single-level DWT, returning (approximation, detail)
pub fn dwt(signal: &[f64], wavelet: Wavelet) -> (Vec<f64>, Vec<f64>) {
    let lo = wavelet.dec_lo();
    let hi = wavelet.dec_hi();
    let n = signal.len();
    let l = lo.len();
    if n == 0 || l == 0 {
        return (signal.to_vec(), Vec::new());
    }
    let out_len = (n + l - 1) / 2;
    let mut approx = Vec::with_capacity(out_len);
    let mut detail = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let mut a = 0.0;
        let mut d = 0.0;
        for k in 0..l {
            let x = signal[reflect(2 * i as isize + 1 - k as isize, n as isize)];
            a += lo[k] * x;
            d += hi[k] * x;
        }
        approx.push(a);
        detail.push(d);
    }
    (approx, detail)
}

/// Highest useful decomposition level for a signal of length `n`
pub fn dwt_max_level(n: usize, filter_len: usize) -> usize {
    if filter_len < 2 || n < filter_len - 1 {
        return 0;
    }
    ((n as f64) / (filter_len - 1) as f64).log2().floor().max(0.0) as usize
}

/// Continuous wavelet transform at the given scales, one row per scale
pub fn cwt(signal: &[f64], scales: &[f64], wavelet: Wavelet) -> Vec<Vec<f64>> {
    let n = signal.len() as isize;
    scales
        .iter()
        .map(|&s| {
            let half = (CWT_SUPPORT * s).ceil() as isize;
            let norm = 1.0 / s.sqrt();
            (0..n)
                .map(|t| {
                    let lo = (t - half).max(0);
                    let hi = (t + half).min(n - 1);
                    (lo..=hi)
                        .map(|k| signal[k as usize] * wavelet.psi((k - t) as f64 / s))
                        .sum::<f64>()
                        * norm
                })
                .collect()
        })
        .collect()
}

/// Configuration for wavelet features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveletParams {
    pub wavelet: String,
    /// Number of high-frequency components kept
    pub n_components: usize,
    pub var_threshold: f64,
}

impl Default for WaveletParams {
    fn default() -> Self {
        Self {
            wavelet: "mexh".to_string(),
            n_components: 2,
            var_threshold: 0.1,
        }
    }
}

/// Statistics of the leading wavelet components of every series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveletExtractor {
    params: WaveletParams,
    wavelet: Wavelet,
    filter: VarianceFilter,
}

impl WaveletExtractor {
    pub fn new(params: WaveletParams) -> Result<Self> {
        let wavelet = Wavelet::from_name(&params.wavelet)?;
        if params.n_components == 0 {
            return Err(IndustrialError::InvalidParameter {
                name: "n_components".to_string(),
                value: "0".to_string(),
                reason: "at least one component is required".to_string(),
            });
        }
        let filter = VarianceFilter::new(params.var_threshold);
        Ok(Self {
            params,
            wavelet,
            filter,
        })
    }

    fn n_high(&self, len: usize) -> usize {
        if self.wavelet.is_discrete() {
            self.params
                .n_components
                .min(dwt_max_level(len, self.wavelet.dec_lo().len()))
        } else {
            self.params.n_components.min(WAVELET_SCALES.len() - 1)
        }
    }

    /// High-frequency components followed by the low-frequency one
    pub fn decompose(&self, series: &[f64]) -> Vec<Vec<f64>> {
        let n_high = self.n_high(series.len());
        if self.wavelet.is_discrete() {
            let mut components = Vec::with_capacity(n_high + 1);
            let mut approx = series.to_vec();
            for _ in 0..n_high {
                let (a, d) = dwt(&approx, self.wavelet);
                components.push(d);
                approx = a;
            }
            components.push(approx);
            components
        } else {
            let mut rows = cwt(series, &WAVELET_SCALES, self.wavelet);
            let low = rows.pop().unwrap_or_default();
            rows.truncate(n_high);
            rows.push(low);
            rows
        }
    }

    fn column_names(&self, len: usize) -> Vec<String> {
        let n_high = self.n_high(len);
        let components = (1..=n_high)
            .map(|i| format!("high{}", i))
            .chain(std::iter::once("low".to_string()));
        components
            .flat_map(|comp| {
                GLOBAL_STATS
                    .iter()
                    .chain(LOCAL_STATS.iter())
                    .map(move |stat| format!("{}_{}", stat, comp))
            })
            .collect()
    }

    fn extract(&self, series: &[f64]) -> Vec<f64> {
        self.decompose(series)
            .iter()
            .flat_map(|comp| {
                let mut v = global_statistics(comp);
                v.extend(local_statistics(comp));
                v
            })
            .collect()
    }

    fn raw_table(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        if data.series_len() < 2 {
            return Err(IndustrialError::FeatureError(
                "wavelet features need series of at least two points".to_string(),
            ));
        }
        let names = self.column_names(data.series_len());
        extract_per_channel(data, &names, |s| Ok(self.extract(s)))
    }
}

impl FeatureGenerator for WaveletExtractor {
    fn name(&self) -> &str {
        "wavelet"
    }

    fn fit(&mut self, data: &SeriesDataset) -> Result<()> {
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        Ok(())
    }

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.filter.apply(self.raw_table(data)?)
    }

    fn fit_transform(&mut self, data: &SeriesDataset) -> Result<FeatureTable> {
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        self.filter.apply(raw)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "wavelet": self.params.wavelet,
            "n_components": self.params.n_components,
            "var_threshold": self.params.var_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_are_orthonormal() {
        for w in [Wavelet::Haar, Wavelet::Db2, Wavelet::Db3, Wavelet::Db4] {
            let lo = w.dec_lo();
            let sum: f64 = lo.iter().sum();
            let energy: f64 = lo.iter().map(|v| v * v).sum();
            assert!((sum - 2f64.sqrt()).abs() < 1e-6, "{:?}", w);
            assert!((energy - 1.0).abs() < 1e-6, "{:?}", w);
            let hi_sum: f64 = w.dec_hi().iter().sum();
            assert!(hi_sum.abs() < 1e-6, "{:?}", w);
        }
    }

    #[test]
    fn test_haar_detail_of_constant_is_zero() {
        let (approx, detail) = dwt(&[3.0; 16], Wavelet::Haar);
        assert_eq!(approx.len(), 8);
        assert!(detail.iter().all(|d| d.abs() < 1e-12));
        assert!(approx.iter().all(|a| (a - 3.0 * 2f64.sqrt()).abs() < 1e-12));
    }

    #[test]
    fn test_max_level() {
        assert_eq!(dwt_max_level(64, 2), 6);
        assert_eq!(dwt_max_level(64, 8), 3);
        assert_eq!(dwt_max_level(3, 8), 0);
    }

    #[test]
    fn test_discrete_decomposition_components() {
        let ex = WaveletExtractor::new(WaveletParams {
            wavelet: "db2".to_string(),
            n_components: 3,
            ..Default::default()
        })
        .unwrap();
        let series: Vec<f64> = (0..64).map(|t| (t as f64 * 0.4).sin()).collect();
        assert_eq!(ex.decompose(&series).len(), 4);
        assert_eq!(ex.column_names(64).len(), 4 * (GLOBAL_STATS.len() + LOCAL_STATS.len()));
    }

    #[test]
    fn test_continuous_decomposition_keeps_length() {
        let ex = WaveletExtractor::new(WaveletParams::default()).unwrap();
        let series: Vec<f64> = (0..50).map(|t| (t as f64 * 0.3).cos()).collect();
        let comps = ex.decompose(&series);
        assert_eq!(comps.len(), 3);
        assert!(comps.iter().all(|c| c.len() == 50));
    }

    #[test]
    fn test_unknown_wavelet_rejected() {
        assert!(WaveletExtractor::new(WaveletParams {
            wavelet: "sym5".to_string(),
            ..Default::default()
        })
        .is_err());
    }
}
