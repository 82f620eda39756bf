//! Seeded sample splitting

use crate::error::{IndustrialError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::BTreeMap;

/// A single train/holdout partition of sample indices
#[derive(Debug, Clone)]
pub struct Split {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

fn rng_for(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Shuffled holdout split. With `stratify`, every class contributes to the
/// holdout in proportion to its size (at least one sample when it has two or more).
pub fn holdout_split(
    n_samples: usize,
    holdout_ratio: f64,
    stratify: Option<&Array1<f64>>,
    seed: u64,
) -> Result<Split> {
    if !(0.0..1.0).contains(&holdout_ratio) || holdout_ratio == 0.0 {
        return Err(IndustrialError::InvalidParameter {
            name: "holdout_ratio".to_string(),
            value: holdout_ratio.to_string(),
            reason: "must lie in (0, 1)".to_string(),
        });
    }
    if n_samples < 2 {
        return Err(IndustrialError::DataError(
            "at least two samples are required for a holdout split".to_string(),
        ));
    }

    let mut rng = rng_for(seed);

    let groups: Vec<Vec<usize>> = match stratify {
        Some(y) => {
            let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
            for (idx, &val) in y.iter().enumerate() {
                by_class.entry(val.round() as i64).or_default().push(idx);
            }
            by_class.into_values().collect()
        }
        None => vec![(0..n_samples).collect()],
    };

    let mut train_indices = Vec::with_capacity(n_samples);
    let mut test_indices = Vec::new();

    for mut group in groups {
        group.shuffle(&mut rng);
        let mut n_hold = (group.len() as f64 * holdout_ratio).round() as usize;
        if n_hold == 0 && group.len() >= 2 {
            n_hold = 1;
        }
        n_hold = n_hold.min(group.len().saturating_sub(1));
        test_indices.extend_from_slice(&group[..n_hold]);
        train_indices.extend_from_slice(&group[n_hold..]);
    }

    if test_indices.is_empty() {
        // every class was a singleton; fall back to an unstratified draw
        if let Some(idx) = train_indices.pop() {
            test_indices.push(idx);
        }
    }

    train_indices.sort_unstable();
    test_indices.sort_unstable();
    Ok(Split {
        train_indices,
        test_indices,
    })
}

/// Shuffled (optionally stratified) k-fold partitions
pub fn k_fold(
    n_samples: usize,
    n_splits: usize,
    stratify: Option<&Array1<f64>>,
    seed: u64,
) -> Result<Vec<Split>> {
    if n_splits < 2 {
        return Err(IndustrialError::InvalidParameter {
            name: "n_splits".to_string(),
            value: n_splits.to_string(),
            reason: "must be at least 2".to_string(),
        });
    }
    if n_samples < n_splits {
        return Err(IndustrialError::DataError(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }

    let mut rng = rng_for(seed);
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];

    match stratify {
        Some(y) => {
            let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
            for (idx, &val) in y.iter().enumerate() {
                by_class.entry(val.round() as i64).or_default().push(idx);
            }
            // continue the round-robin across classes so fold sizes stay balanced
            let mut slot = 0;
            for mut indices in by_class.into_values() {
                indices.shuffle(&mut rng);
                for idx in indices {
                    folds[slot % n_splits].push(idx);
                    slot += 1;
                }
            }
        }
        None => {
            let mut indices: Vec<usize> = (0..n_samples).collect();
            indices.shuffle(&mut rng);
            for (i, idx) in indices.into_iter().enumerate() {
                folds[i % n_splits].push(idx);
            }
        }
    }

    Ok((0..n_splits)
        .map(|fold_idx| {
            let test_indices = folds[fold_idx].clone();
            let train_indices = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            Split {
                train_indices,
                test_indices,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_holdout_partitions_all_samples() {
        let split = holdout_split(10, 0.3, None, 7).unwrap();
        assert_eq!(split.test_indices.len(), 3);
        let mut all: Vec<usize> = split.train_indices.iter().chain(&split.test_indices).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_holdout_stratified_keeps_each_class_in_train() {
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0];
        let split = holdout_split(6, 0.5, Some(&y), 1).unwrap();
        let train_classes: Vec<f64> = split.train_indices.iter().map(|&i| y[i]).collect();
        assert!(train_classes.contains(&0.0));
        assert!(train_classes.contains(&1.0));
        assert_eq!(split.test_indices.len(), 3);
    }

    #[test]
    fn test_holdout_is_deterministic() {
        let a = holdout_split(20, 0.25, None, 42).unwrap();
        let b = holdout_split(20, 0.25, None, 42).unwrap();
        assert_eq!(a.test_indices, b.test_indices);
    }

    #[test]
    fn test_holdout_rejects_bad_ratio() {
        assert!(holdout_split(10, 1.5, None, 0).is_err());
        assert!(holdout_split(10, 0.0, None, 0).is_err());
    }

    #[test]
    fn test_k_fold_covers_every_sample_once() {
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 2.0];
        let splits = k_fold(7, 3, Some(&y), 3).unwrap();
        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        for s in &splits {
            assert_eq!(s.train_indices.len() + s.test_indices.len(), 7);
        }
    }
}
