//! Feature generators
//!
//! Every generator maps a [`SeriesDataset`] to a flat [`FeatureTable`]:
//! - `quantile` / `window_quantile`: statistical descriptors
//! - `wavelet`: statistics of wavelet components
//! - `spectral` / `spectral_window`: statistics of SSA components
//! - `topological`: persistence-diagram descriptors
//!
//! Multichannel series are processed channel by channel and the resulting
//! columns are concatenated with a `_ch{c}` suffix.

pub mod quantile;
pub mod spectral;
pub mod stats;
pub mod topological;
pub mod wavelet;

pub use quantile::{QuantileExtractor, QuantileParams};
pub use spectral::{SsaExtractor, SsaParams};
pub use topological::{TopologicalExtractor, TopologicalParams};
pub use wavelet::{WaveletExtractor, WaveletParams};

use crate::data::SeriesDataset;
use crate::error::{IndustrialError, Result};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Flat feature matrix with column names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub values: Array2<f64>,
    pub names: Vec<String>,
}

impl FeatureTable {
    pub fn new(values: Array2<f64>, names: Vec<String>) -> Result<Self> {
        if values.ncols() != names.len() {
            return Err(IndustrialError::ShapeError {
                expected: format!("{} column names", values.ncols()),
                actual: format!("{} column names", names.len()),
            });
        }
        Ok(Self { values, names })
    }

    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Keep only the given columns, in the given order
    pub fn select_columns(&self, columns: &[usize]) -> Self {
        Self {
            values: self.values.select(ndarray::Axis(1), columns),
            names: columns.iter().map(|&c| self.names[c].clone()).collect(),
        }
    }

    /// Keep only the given rows
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            values: self.values.select(ndarray::Axis(0), rows),
            names: self.names.clone(),
        }
    }
}

/// A transformation from raw series to tabular features.
///
/// `fit` freezes whatever the generator learns from the training set (kept
/// columns, SSA rank); `transform` must then produce the same columns for
/// any dataset with the same channel count.
pub trait FeatureGenerator: Send + Sync {
    /// Registry name of the generator
    fn name(&self) -> &str;

    fn fit(&mut self, data: &SeriesDataset) -> Result<()>;

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable>;

    fn fit_transform(&mut self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.fit(data)?;
        self.transform(data)
    }

    /// Effective parameters, for logging and result records
    fn params(&self) -> serde_json::Value;

    /// Per-sample spectrum, for generators that have one
    fn spectrum(&self, _data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        None
    }
}

/// Drops columns whose variance on the fit set does not exceed a threshold.
///
/// The kept set is frozen by `fit`; `apply` reuses it on any later table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarianceFilter {
    threshold: f64,
    kept: Option<Vec<usize>>,
}

impl VarianceFilter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            kept: None,
        }
    }

    pub fn fit(&mut self, table: &FeatureTable) {
        let mut kept: Vec<usize> = (0..table.n_features())
            .filter(|&c| {
                let col = table.values.column(c);
                col.var(0.0) > self.threshold
            })
            .collect();

        if kept.is_empty() && table.n_features() > 0 {
            warn!(
                threshold = self.threshold,
                n_features = table.n_features(),
                "Every feature is below the variance threshold, keeping all"
            );
            kept = (0..table.n_features()).collect();
        }
        self.kept = Some(kept);
    }

    pub fn apply(&self, table: FeatureTable) -> Result<FeatureTable> {
        let kept = self.kept.as_ref().ok_or(IndustrialError::ModelNotFitted)?;
        if kept.iter().any(|&c| c >= table.n_features()) {
            return Err(IndustrialError::ShapeError {
                expected: format!("at least {} features", kept.iter().max().map_or(0, |m| m + 1)),
                actual: format!("{} features", table.n_features()),
            });
        }
        Ok(table.select_columns(kept))
    }

    pub fn kept(&self) -> Option<&[usize]> {
        self.kept.as_deref()
    }
}

/// Apply a per-series extractor to every (sample, channel) pair in parallel.
///
/// `extract` must return one value per entry of `names` for every series.
pub(crate) fn extract_per_channel<F>(
    data: &SeriesDataset,
    names: &[String],
    extract: F,
) -> Result<FeatureTable>
where
    F: Fn(&[f64]) -> Result<Vec<f64>> + Sync,
{
    let n = data.n_samples();
    let n_channels = data.n_channels();
    let width = names.len();

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<Vec<f64>> {
            let mut row = Vec::with_capacity(width * n_channels);
            for c in 0..n_channels {
                let series = data.series(i, c).to_vec();
                let values = extract(&series)?;
                if values.len() != width {
                    return Err(IndustrialError::FeatureError(format!(
                        "extractor returned {} values, expected {}",
                        values.len(),
                        width
                    )));
                }
                row.extend(values);
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let values = Array2::from_shape_vec((n, width * n_channels), flat)?
        .mapv(|v| if v.is_finite() { v } else { 0.0 });

    let column_names = (0..n_channels)
        .flat_map(|c| names.iter().map(move |name| format!("{}_ch{}", name, c)))
        .collect();
    FeatureTable::new(values, column_names)
}

/// Known generator names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Quantile,
    WindowQuantile,
    Wavelet,
    Spectral,
    SpectralWindow,
    Topological,
    Ensemble,
}

impl GeneratorKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "quantile" => Ok(Self::Quantile),
            "window_quantile" => Ok(Self::WindowQuantile),
            "wavelet" => Ok(Self::Wavelet),
            "spectral" => Ok(Self::Spectral),
            "spectral_window" => Ok(Self::SpectralWindow),
            "topological" => Ok(Self::Topological),
            "ensemble" => Ok(Self::Ensemble),
            other => Err(IndustrialError::UnknownGenerator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quantile => "quantile",
            Self::WindowQuantile => "window_quantile",
            Self::Wavelet => "wavelet",
            Self::Spectral => "spectral",
            Self::SpectralWindow => "spectral_window",
            Self::Topological => "topological",
            Self::Ensemble => "ensemble",
        }
    }

    /// Whether the generator exposes a spectrum dump
    pub fn has_spectrum(&self) -> bool {
        matches!(self, Self::Spectral | Self::SpectralWindow)
    }
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(
    name: &str,
    params: Option<&serde_yaml::Value>,
) -> Result<T> {
    match params {
        None | Some(serde_yaml::Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
            IndustrialError::ConfigError(format!("invalid parameters for '{}': {}", name, e))
        }),
    }
}

/// Serializable generator, for persisting fitted state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "generator", rename_all = "lowercase")]
pub enum AnyGenerator {
    Quantile(QuantileExtractor),
    Wavelet(WaveletExtractor),
    Spectral(SsaExtractor),
    Topological(TopologicalExtractor),
}

impl AnyGenerator {
    /// Build a single (non-ensemble) generator from its name and optional parameters
    pub fn build(name: &str, params: Option<&serde_yaml::Value>) -> Result<Self> {
        let generator = match GeneratorKind::from_name(name)? {
            GeneratorKind::Quantile => Self::Quantile(QuantileExtractor::new(parse_params(name, params)?)),
            GeneratorKind::WindowQuantile => {
                let mut p: QuantileParams = parse_params(name, params)?;
                if p.window_size <= 0.0 {
                    p.window_size = quantile::DEFAULT_WINDOW_SIZE;
                }
                Self::Quantile(QuantileExtractor::new(p).with_name("window_quantile"))
            }
            GeneratorKind::Wavelet => Self::Wavelet(WaveletExtractor::new(parse_params(name, params)?)?),
            GeneratorKind::Spectral => Self::Spectral(SsaExtractor::new(parse_params(name, params)?)),
            GeneratorKind::SpectralWindow => {
                let mut p: SsaParams = parse_params(name, params)?;
                p.window_mode = true;
                Self::Spectral(SsaExtractor::new(p).with_name("spectral_window"))
            }
            GeneratorKind::Topological => {
                Self::Topological(TopologicalExtractor::new(parse_params(name, params)?))
            }
            GeneratorKind::Ensemble => {
                return Err(IndustrialError::ConfigError(
                    "'ensemble' needs member generators, e.g. 'ensemble: quantile wavelet'".to_string(),
                ))
            }
        };
        Ok(generator)
    }

    fn inner(&self) -> &dyn FeatureGenerator {
        match self {
            Self::Quantile(g) => g,
            Self::Wavelet(g) => g,
            Self::Spectral(g) => g,
            Self::Topological(g) => g,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FeatureGenerator {
        match self {
            Self::Quantile(g) => g,
            Self::Wavelet(g) => g,
            Self::Spectral(g) => g,
            Self::Topological(g) => g,
        }
    }
}

impl FeatureGenerator for AnyGenerator {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, data: &SeriesDataset) -> Result<()> {
        self.inner_mut().fit(data)
    }

    fn transform(&self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.inner().transform(data)
    }

    fn fit_transform(&mut self, data: &SeriesDataset) -> Result<FeatureTable> {
        self.inner_mut().fit_transform(data)
    }

    fn params(&self) -> serde_json::Value {
        self.inner().params()
    }

    fn spectrum(&self, data: &SeriesDataset) -> Option<Result<Array2<f64>>> {
        self.inner().spectrum(data)
    }
}

/// Boxed form of [`AnyGenerator::build`]
pub fn build_generator(
    name: &str,
    params: Option<&serde_yaml::Value>,
) -> Result<Box<dyn FeatureGenerator>> {
    Ok(Box::new(AnyGenerator::build(name, params)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_generator_kind_from_name() {
        assert_eq!(GeneratorKind::from_name("quantile").unwrap(), GeneratorKind::Quantile);
        assert_eq!(
            GeneratorKind::from_name(" Spectral_Window ").unwrap(),
            GeneratorKind::SpectralWindow
        );
        assert!(matches!(
            GeneratorKind::from_name("rocket"),
            Err(IndustrialError::UnknownGenerator(_))
        ));
    }

    #[test]
    fn test_build_generator_names() {
        for name in ["quantile", "window_quantile", "wavelet", "spectral", "spectral_window", "topological"] {
            let g = build_generator(name, None).unwrap();
            assert_eq!(g.name(), name);
        }
        assert!(build_generator("ensemble", None).is_err());
    }

    #[test]
    fn test_fitted_generator_survives_json() {
        let x = Array2::from_shape_fn((6, 30), |(i, t)| ((t as f64) * 0.3 * (i + 1) as f64).sin());
        let y = ndarray::Array1::from_iter((0..6).map(|i| (i % 2) as f64));
        let data = SeriesDataset::from_univariate(x, y).unwrap();

        let mut g = AnyGenerator::build("spectral", None).unwrap();
        let before = g.fit_transform(&data).unwrap();
        let json = serde_json::to_string(&g).unwrap();
        let restored: AnyGenerator = serde_json::from_str(&json).unwrap();
        let after = restored.transform(&data).unwrap();
        assert_eq!(before.names, after.names);
        assert_eq!(before.values, after.values);
    }

    #[test]
    fn test_variance_filter_freezes_columns() {
        let table = FeatureTable::new(
            array![[1.0, 5.0, 0.0], [1.0, 9.0, 0.01], [1.0, 1.0, 0.02]],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let mut filter = VarianceFilter::new(0.1);
        filter.fit(&table);
        assert_eq!(filter.kept().unwrap(), &[1]);

        let other = FeatureTable::new(
            array![[7.0, 2.0, 3.0]],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let out = filter.apply(other).unwrap();
        assert_eq!(out.names, vec!["b".to_string()]);
        assert_eq!(out.values, array![[2.0]]);
    }

    #[test]
    fn test_variance_filter_keeps_all_when_everything_is_constant() {
        let table = FeatureTable::new(array![[1.0, 2.0], [1.0, 2.0]], vec!["a".into(), "b".into()]).unwrap();
        let mut filter = VarianceFilter::new(0.1);
        filter.fit(&table);
        assert_eq!(filter.kept().unwrap(), &[0, 1]);
    }

    #[test]
    fn test_unfitted_filter_errors() {
        let table = FeatureTable::new(array![[1.0]], vec!["a".into()]).unwrap();
        assert!(VarianceFilter::new(0.1).apply(table).is_err());
    }
}
