//! Statistical descriptors of a single series
//!
//! Local statistics are cheap order/moment summaries evaluated on whole
//! series or on windows. Global statistics describe shape and dynamics and
//! are only evaluated on whole series.

use crate::utils::linalg::quantile_sorted;

/// Names of the local statistics, in output order
pub const LOCAL_STATS: [&str; 9] = [
    "mean", "median", "std", "max", "min", "q5", "q25", "q75", "q95",
];

/// Names of the global statistics, in output order
pub const GLOBAL_STATS: [&str; 19] = [
    "skewness",
    "kurtosis",
    "n_peaks",
    "slope",
    "ben_corr",
    "interquartile_range",
    "energy",
    "cross_rate",
    "autocorrelation",
    "shannon_entropy",
    "ptp_amplitude",
    "mean_ptp_distance",
    "crest_factor",
    "mean_ema",
    "mean_moving_median",
    "hjorth_mobility",
    "hjorth_complexity",
    "hurst_exponent",
    "petrosian_fractal_dimension",
];

const EMA_SPAN: usize = 10;
const MOVING_MEDIAN_WINDOW: usize = 10;
const ENTROPY_BINS: usize = 10;

/// Local statistics in [`LOCAL_STATS`] order
pub fn local_statistics(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return vec![0.0; LOCAL_STATS.len()];
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    vec![
        mean(x),
        quantile_sorted(&sorted, 0.5),
        std(x),
        sorted[sorted.len() - 1],
        sorted[0],
        quantile_sorted(&sorted, 0.05),
        quantile_sorted(&sorted, 0.25),
        quantile_sorted(&sorted, 0.75),
        quantile_sorted(&sorted, 0.95),
    ]
}

/// Global statistics in [`GLOBAL_STATS`] order
pub fn global_statistics(x: &[f64]) -> Vec<f64> {
    if x.is_empty() {
        return vec![0.0; GLOBAL_STATS.len()];
    }
    let peaks = peak_indices(x);
    vec![
        skewness(x),
        kurtosis(x),
        peaks.len() as f64,
        slope(x),
        benford_correlation(x),
        interquartile_range(x),
        energy(x),
        zero_crossing_rate(x),
        autocorrelation(x),
        shannon_entropy(x),
        ptp_amplitude(x),
        mean_peak_distance(&peaks),
        crest_factor(x),
        mean_ema(x, EMA_SPAN),
        mean_moving_median(x, MOVING_MEDIAN_WINDOW),
        hjorth_mobility(x),
        hjorth_complexity(x),
        hurst_exponent(x),
        petrosian_fd(x),
    ]
}

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    }
}

/// Population variance
pub fn variance(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.len() as f64
}

pub fn std(x: &[f64]) -> f64 {
    variance(x).sqrt()
}

/// Biased sample skewness
pub fn skewness(x: &[f64]) -> f64 {
    let s = std(x);
    if x.len() < 3 || s == 0.0 {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|v| ((v - m) / s).powi(3)).sum::<f64>() / x.len() as f64
}

/// Excess (Fisher) kurtosis
pub fn kurtosis(x: &[f64]) -> f64 {
    let s = std(x);
    if x.len() < 4 || s == 0.0 {
        return 0.0;
    }
    let m = mean(x);
    x.iter().map(|v| ((v - m) / s).powi(4)).sum::<f64>() / x.len() as f64 - 3.0
}

/// Indices of strict local maxima
pub fn peak_indices(x: &[f64]) -> Vec<usize> {
    if x.len() < 3 {
        return Vec::new();
    }
    (1..x.len() - 1)
        .filter(|&i| x[i] > x[i - 1] && x[i] > x[i + 1])
        .collect()
}

/// Least-squares slope against the sample index
pub fn slope(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let t_mean = (n - 1) as f64 / 2.0;
    let x_mean = mean(x);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, v) in x.iter().enumerate() {
        let dt = i as f64 - t_mean;
        num += dt * (v - x_mean);
        den += dt * dt;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Correlation between the leading-digit distribution and Benford's law
pub fn benford_correlation(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mut observed = [0.0; 9];
    for v in x {
        let a = v.abs();
        if a > 0.0 && a.is_finite() {
            let digit = (a / 10f64.powf(a.log10().floor())).floor() as usize;
            if (1..=9).contains(&digit) {
                observed[digit - 1] += 1.0 / n;
            }
        }
    }
    let benford: Vec<f64> = (1..=9).map(|d| (1.0 + 1.0 / d as f64).log10()).collect();
    pearson(&benford, &observed)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let ma = mean(a);
    let mb = mean(b);
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    if va == 0.0 || vb == 0.0 {
        0.0
    } else {
        cov / (va.sqrt() * vb.sqrt())
    }
}

pub fn interquartile_range(x: &[f64]) -> f64 {
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25)
}

/// Mean squared value
pub fn energy(x: &[f64]) -> f64 {
    mean(&x.iter().map(|v| v * v).collect::<Vec<_>>())
}

/// Fraction of consecutive pairs whose sign differs
pub fn zero_crossing_rate(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return 0.0;
    }
    let crossings = x
        .windows(2)
        .filter(|w| w[0].signum() != w[1].signum() && w[0] != 0.0 && w[1] != 0.0)
        .count();
    crossings as f64 / x.len() as f64
}

/// Mean normalised autocorrelation over all non-negative lags
pub fn autocorrelation(x: &[f64]) -> f64 {
    let n = x.len();
    let var = variance(x);
    if n < 2 || var == 0.0 {
        return 0.0;
    }
    let m = mean(x);
    let centered: Vec<f64> = x.iter().map(|v| v - m).collect();
    let total: f64 = (0..n)
        .map(|lag| {
            let r: f64 = (0..n - lag).map(|i| centered[i] * centered[i + lag]).sum();
            r / (var * (n - lag) as f64)
        })
        .sum();
    total / n as f64
}

/// Shannon entropy (bits) of a fixed-bin histogram
pub fn shannon_entropy(x: &[f64]) -> f64 {
    let (lo, hi) = min_max(x);
    if hi <= lo {
        return 0.0;
    }
    let width = (hi - lo) / ENTROPY_BINS as f64;
    let mut counts = [0usize; ENTROPY_BINS];
    for v in x {
        let bin = (((v - lo) / width).floor() as usize).min(ENTROPY_BINS - 1);
        counts[bin] += 1;
    }
    let n = x.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

fn min_max(x: &[f64]) -> (f64, f64) {
    x.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

pub fn ptp_amplitude(x: &[f64]) -> f64 {
    let (lo, hi) = min_max(x);
    if x.is_empty() {
        0.0
    } else {
        hi - lo
    }
}

/// Mean index distance between consecutive peaks
pub fn mean_peak_distance(peaks: &[usize]) -> f64 {
    if peaks.len() < 2 {
        return 0.0;
    }
    let total: usize = peaks.windows(2).map(|w| w[1] - w[0]).sum();
    total as f64 / (peaks.len() - 1) as f64
}

/// Peak magnitude over RMS
pub fn crest_factor(x: &[f64]) -> f64 {
    let rms = energy(x).sqrt();
    if rms == 0.0 {
        return 0.0;
    }
    x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())) / rms
}

/// Mean of the exponentially weighted moving average
pub fn mean_ema(x: &[f64], span: usize) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = x[0];
    let mut total = ema;
    for v in &x[1..] {
        ema = alpha * v + (1.0 - alpha) * ema;
        total += ema;
    }
    total / x.len() as f64
}

/// Mean of the trailing moving median
pub fn mean_moving_median(x: &[f64], window: usize) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let total: f64 = (0..x.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let mut w = x[start..=i].to_vec();
            w.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            quantile_sorted(&w, 0.5)
        })
        .sum();
    total / x.len() as f64
}

fn diff(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

pub fn hjorth_mobility(x: &[f64]) -> f64 {
    let var = variance(x);
    if x.len() < 2 || var == 0.0 {
        return 0.0;
    }
    (variance(&diff(x)) / var).sqrt()
}

pub fn hjorth_complexity(x: &[f64]) -> f64 {
    let mobility = hjorth_mobility(x);
    if mobility == 0.0 {
        return 0.0;
    }
    hjorth_mobility(&diff(x)) / mobility
}

/// Hurst exponent estimated by rescaled-range analysis over dyadic chunk sizes
pub fn hurst_exponent(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 16 {
        return 0.5;
    }

    let mut log_sizes = Vec::new();
    let mut log_rs = Vec::new();
    let mut size = 8;
    while size <= n / 2 {
        let rs: Vec<f64> = x
            .chunks_exact(size)
            .filter_map(|chunk| {
                let m = mean(chunk);
                let mut cum = 0.0;
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for v in chunk {
                    cum += v - m;
                    lo = lo.min(cum);
                    hi = hi.max(cum);
                }
                let s = std(chunk);
                (s > 0.0).then(|| (hi - lo) / s)
            })
            .collect();
        if !rs.is_empty() {
            log_sizes.push((size as f64).ln());
            log_rs.push(mean(&rs).ln());
        }
        size *= 2;
    }

    if log_sizes.len() < 2 {
        return 0.5;
    }
    let mx = mean(&log_sizes);
    let my = mean(&log_rs);
    let num: f64 = log_sizes.iter().zip(&log_rs).map(|(a, b)| (a - mx) * (b - my)).sum();
    let den: f64 = log_sizes.iter().map(|a| (a - mx).powi(2)).sum();
    if den == 0.0 {
        0.5
    } else {
        num / den
    }
}

/// Petrosian fractal dimension
pub fn petrosian_fd(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 3 {
        return 0.0;
    }
    let d = diff(x);
    let sign_changes = d
        .windows(2)
        .filter(|w| w[0] * w[1] < 0.0)
        .count() as f64;
    let n = n as f64;
    let log_n = n.log10();
    log_n / (log_n + (n / (n + 0.4 * sign_changes)).log10())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_statistics_order() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let s = local_statistics(&x);
        assert_eq!(s.len(), LOCAL_STATS.len());
        assert!((s[0] - 3.0).abs() < 1e-12); // mean
        assert!((s[1] - 3.0).abs() < 1e-12); // median
        assert_eq!(s[3], 5.0);
        assert_eq!(s[4], 1.0);
        assert!((s[6] - 2.0).abs() < 1e-12); // q25
    }

    #[test]
    fn test_global_statistics_length_and_finiteness() {
        let x: Vec<f64> = (0..128).map(|i| (i as f64 * 0.3).sin() + 0.01 * i as f64).collect();
        let g = global_statistics(&x);
        assert_eq!(g.len(), GLOBAL_STATS.len());
        assert!(g.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_series_is_degenerate_but_finite() {
        let x = [2.0; 40];
        let g = global_statistics(&x);
        assert!(g.iter().all(|v| v.is_finite()));
        assert_eq!(skewness(&x), 0.0);
        assert_eq!(hjorth_mobility(&x), 0.0);
    }

    #[test]
    fn test_slope_of_line() {
        let x: Vec<f64> = (0..10).map(|i| 3.0 * i as f64 + 1.0).collect();
        assert!((slope(&x) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_peaks_and_distance() {
        let x = [0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 3.0, 0.0];
        let peaks = peak_indices(&x);
        assert_eq!(peaks, vec![1, 4, 6]);
        assert!((mean_peak_distance(&peaks) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_crossings() {
        let x = [1.0, -1.0, 1.0, -1.0];
        assert!((zero_crossing_rate(&x) - 0.75).abs() < 1e-12);
    }
}
