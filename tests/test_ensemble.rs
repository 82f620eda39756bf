//! Integration test: combining branch probabilities

use industrial_ts::ensemble::{combine, stack_branches, sum_fallback};
use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

fn random_probs(rng: &mut Xoshiro256PlusPlus, n: usize, c: usize) -> Array2<f64> {
    let mut m = Array2::from_shape_fn((n, c), |_| rng.gen::<f64>());
    for mut row in m.rows_mut() {
        let s = row.sum();
        row.mapv_inplace(|v| v / s);
    }
    m
}

#[test]
fn test_sum_fallback_rows_sum_to_one() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    for k in 1..=6 {
        let branches: Vec<_> = (0..k).map(|_| random_probs(&mut rng, 25, 4)).collect();
        let out = combine(&stack_branches(&branches).unwrap(), None).unwrap();
        assert_eq!(out.dim(), (25, 4));
        for row in out.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12, "k = {}", k);
        }
    }
}

#[test]
fn test_sum_fallback_is_permutation_invariant() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    let branches: Vec<_> = (0..4).map(|_| random_probs(&mut rng, 10, 3)).collect();
    let forward = sum_fallback(&stack_branches(&branches).unwrap());

    let permuted = vec![branches[2].clone(), branches[0].clone(), branches[3].clone(), branches[1].clone()];
    let shuffled = sum_fallback(&stack_branches(&permuted).unwrap());
    for (a, b) in forward.iter().zip(shuffled.iter()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_sum_fallback_matches_manual_sum() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
    let branches: Vec<_> = (0..3).map(|_| random_probs(&mut rng, 8, 5)).collect();
    let stacked = stack_branches(&branches).unwrap();
    assert_eq!(stacked.dim(), (8, 3, 5));

    let mut manual = &branches[0] + &branches[1] + &branches[2];
    let totals = manual.sum_axis(Axis(1));
    for (mut row, total) in manual.rows_mut().into_iter().zip(totals.iter()) {
        row.mapv_inplace(|v| v / total);
    }
    let out = sum_fallback(&stacked);
    for (a, b) in out.iter().zip(manual.iter()) {
        assert!((a - b).abs() < 1e-12);
    }
}

#[test]
fn test_mismatched_branches_are_rejected() {
    let a = Array2::<f64>::zeros((4, 2));
    let b = Array2::<f64>::zeros((4, 3));
    assert!(stack_branches(&[a, b]).is_err());
    assert!(stack_branches(&[]).is_err());
}
