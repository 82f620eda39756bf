//! Statistical (quantile) feature extraction

use super::stats::{global_statistics, local_statistics, GLOBAL_STATS, LOCAL_STATS};
use super::{extract_per_channel, FeatureGenerator, FeatureTable, VarianceFilter};
use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Window size used by `window_quantile` when none is configured (percent)
pub const DEFAULT_WINDOW_SIZE: f64 = 10.0;
const MIN_WINDOW_LEN: usize = 5;

/// Configuration for quantile features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantileParams {
    /// Window length as a percentage of the series length; 0 disables windowing
    pub window_size: f64,
    /// Step between windows in samples; defaults to the window length
    pub stride: Option<usize>,
    /// Columns with variance at or below this value on the fit set are dropped
    pub var_threshold: f64,
}

impl Default for QuantileParams {
    fn default() -> Self {
        Self {
            window_size: 0.0,
            stride: None,
            var_threshold: 0.1,
        }
    }
}

/// Window length in samples for a series of `len` points
pub fn window_length(len: usize, window_size: f64) -> usize {
    let w = (len as f64 * window_size / 100.0).round() as usize;
    w.max(MIN_WINDOW_LEN).min(len.max(1))
}

/// Global plus local statistics of every series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantileExtractor {
    name: String,
    params: QuantileParams,
    filter: VarianceFilter,
}

impl QuantileExtractor {
    pub fn new(params: QuantileParams) -> Self {
        let filter = VarianceFilter::new(params.var_threshold);
        Self {
            name: "quantile".to_string(),
            params,
            filter,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    fn windows(&self, len: usize) -> Vec<(usize, usize)> {
        if self.params.window_size <= 0.0 {
            return vec![(0, len)];
        }
        let w = window_length(len, self.params.window_size);
        let stride = self.params.stride.unwrap_or(w).max(1);
        let mut out = Vec::new();
        let mut start = 0;
        while start + w <= len {
            out.push((start, start + w));
            start += stride;
        }
        if out.is_empty() {
            out.push((0, len));
        }
        out
    }

    fn column_names(&self, len: usize) -> Vec<String> {
        let windows = self.windows(len);
        let mut names: Vec<String> = GLOBAL_STATS.iter().map(|s| s.to_string()).collect();
        if windows.len() == 1 {
            names.extend(LOCAL_STATS.iter().map(|s| s.to_string()));
        } else {
            for w in 0..windows.len() {
                names.extend(LOCAL_STATS.iter().map(|s| format!("{}_win{}", s, w)));
            }
        }
        names
    }

    /// Features for one series, in `column_names` order
    pub fn extract(&self, series: &[f64]) -> Vec<f64> {
        let mut out = global_statistics(series);
        for (start, end) in self.windows(series.len()) {
            out.extend(local_statistics(&series[start..end]));
        }
        out
    }

    fn raw_table(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        if data.series_len() == 0 {
            return Err(IndustrialError::FeatureError("empty series".to_string()));
        }
        let names = self.column_names(data.series_len());
        extract_per_channel(data, &names, |s| Ok(self.extract(s)))
    }
}

impl FeatureGenerator for QuantileExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, data: &SeriesDataset) -> Result<()> {
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        debug!(
            generator = %self.name,
            raw = raw.n_features(),
            kept = self.filter.kept().map_or(0, |k| k.len()),
            "Quantile features fitted"
        );
        Ok(())
    }

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        let raw = self.raw_table(data)?;
        self.filter.apply(raw)
    }

    fn fit_transform(&mut self, data: &SeriesDataset) -> Result<FeatureTable> {
        let raw = self.raw_table(data)?;
        self.filter.fit(&raw);
        self.filter.apply(raw)
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "window_size": self.params.window_size,
            "stride": self.params.stride,
            "var_threshold": self.params.var_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dataset() -> SeriesDataset {
        let x = Array2::from_shape_fn((6, 60), |(i, t)| {
            let f = 0.1 + 0.05 * i as f64;
            (t as f64 * f).sin() * (1.0 + i as f64) + if i % 2 == 0 { t as f64 * 0.1 } else { 0.0 }
        });
        let y = ndarray::array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        SeriesDataset::from_univariate(x, y).unwrap()
    }

    #[test]
    fn test_window_length_minimum() {
        assert_eq!(window_length(100, 10.0), 10);
        assert_eq!(window_length(20, 10.0), 5);
        assert_eq!(window_length(3, 10.0), 3);
    }

    #[test]
    fn test_whole_series_columns() {
        let ex = QuantileExtractor::new(QuantileParams::default());
        let names = ex.column_names(60);
        assert_eq!(names.len(), GLOBAL_STATS.len() + LOCAL_STATS.len());
        assert_eq!(ex.extract(&vec![1.0; 60]).len(), names.len());
    }

    #[test]
    fn test_windowed_columns() {
        let ex = QuantileExtractor::new(QuantileParams {
            window_size: 25.0,
            ..Default::default()
        });
        // 60 * 25% = 15 -> 4 non-overlapping windows
        assert_eq!(ex.windows(60).len(), 4);
        assert_eq!(ex.column_names(60).len(), GLOBAL_STATS.len() + 4 * LOCAL_STATS.len());
    }

    #[test]
    fn test_transform_reuses_fitted_columns() {
        let data = dataset();
        let mut ex = QuantileExtractor::new(QuantileParams::default());
        let train = ex.fit_transform(&data).unwrap();
        let test = ex.transform(&data.select(&[0, 1])).unwrap();
        assert_eq!(train.names, test.names);
        assert_eq!(test.n_samples(), 2);
        assert!(train.names.iter().all(|n| n.ends_with("_ch0")));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let ex = QuantileExtractor::new(QuantileParams::default());
        assert!(ex.transform(&dataset()).is_err());
    }
}
