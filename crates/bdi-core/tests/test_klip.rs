mod common;

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3, Axis};

use common::{render, sum_of_squares, Lcg, Source};

use bdi_core::error::BdiError;
use bdi_core::klip::{clip_ranks, psf_subtract, subtract_with_basis, KlBasis, KlipOptions};
use bdi_core::pipeline::ReductionWarning;

const SHAPE: (usize, usize) = (24, 24);

fn science() -> Array2<f64> {
    render(SHAPE, &[Source::new(11.6, 12.3, 1e4)])
}

/// A library of `n` PSFs with varying width and amplitude plus a
/// deterministic speckle term, so it spans many independent directions.
fn library(n: usize, seed: u64) -> Array3<f64> {
    let mut rng = Lcg::new(seed);
    let planes: Vec<Array2<f64>> = (0..n)
        .map(|i| {
            let source = Source {
                fwhm: 8.0 + 0.3 * i as f64,
                ..Source::new(11.6, 12.3, 1e4 * (1.0 + 0.05 * i as f64))
            };
            render(SHAPE, &[source]) + &rng.image(SHAPE, 200.0)
        })
        .collect();
    let views: Vec<_> = planes.iter().map(|p| p.view()).collect();
    ndarray::stack(Axis(0), &views).unwrap()
}

// ---------------------------------------------------------------------------
// Basis
// ---------------------------------------------------------------------------

#[test]
fn test_basis_modes_are_orthonormal() {
    let reference = library(8, 3);
    let basis = KlBasis::build(&reference.view(), 5, None).unwrap();
    assert_eq!(basis.mode_count(), 5);
    assert_eq!(basis.pixel_count(), SHAPE.0 * SHAPE.1);
    assert_eq!(basis.non_positive, 0);

    let gram = basis.modes.t().dot(&basis.modes);
    for ((i, j), &v) in gram.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        assert_abs_diff_eq!(v, expected, epsilon = 1e-8);
    }
    for pair in basis.eigenvalues.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[test]
fn test_precomputed_covariance_gives_same_basis() {
    let reference = library(6, 11);
    let fresh = KlBasis::build(&reference.view(), 4, None).unwrap();
    let reused = KlBasis::build(&reference.view(), 4, Some(&fresh.covariance)).unwrap();
    for (a, b) in fresh.eigenvalues.iter().zip(reused.eigenvalues.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9 * a.abs().max(1.0));
    }

    let wrong = Array2::<f64>::eye(3);
    assert!(KlBasis::build(&reference.view(), 4, Some(&wrong)).is_err());
}

// ---------------------------------------------------------------------------
// Subtraction
// ---------------------------------------------------------------------------

#[test]
fn test_round_trip_with_copies_of_science() {
    let science = science();
    let views = vec![science.view(); 3];
    let reference = ndarray::stack(Axis(0), &views).unwrap();

    let result = psf_subtract(&science.view(), &reference.view(), &[3], &KlipOptions::default()).unwrap();
    assert_eq!(result.residuals.dim(), (1, SHAPE.0, SHAPE.1));
    assert_abs_diff_eq!(result.offset.dx, 0.0);
    assert_abs_diff_eq!(result.offset.dy, 0.0);
    for &v in result.residuals.iter() {
        assert!(v.abs() < 1e-6, "residual {v}");
    }
    // Identical references leave a single positive eigenvalue.
    assert!(result
        .warnings
        .iter()
        .any(|w| matches!(w, ReductionWarning::NonPositiveEigenvalues { count: 2, .. })));
}

#[test]
fn test_residual_energy_decreases_with_rank() {
    let reference = library(12, 7);
    let mut rng = Lcg::new(99);
    let target = science() + &rng.image(SHAPE, 200.0);

    let ranks = [1, 2, 4, 6, 10];
    let result = psf_subtract(&target.view(), &reference.view(), &ranks, &KlipOptions::default()).unwrap();
    assert_eq!(result.ranks, ranks.to_vec());

    let energy: Vec<f64> = result.residuals.outer_iter().map(sum_of_squares).collect();
    for pair in energy.windows(2) {
        assert!(pair[1] <= pair[0] * (1.0 + 1e-12), "{energy:?}");
    }
    assert!(energy[0] < sum_of_squares(target.view()));
}

#[test]
fn test_ranks_clipped_to_library_size() {
    let reference = library(10, 5);
    let target = science();

    let result = psf_subtract(&target.view(), &reference.view(), &[50], &KlipOptions::default()).unwrap();
    assert_eq!(result.residuals.dim(), (1, SHAPE.0, SHAPE.1));
    assert_eq!(result.ranks, vec![10]);
    assert!(result.warnings.iter().any(|w| matches!(
        w,
        ReductionWarning::RanksClipped { available: 10, used, .. } if used == &vec![10]
    )));
}

#[test]
fn test_reused_basis_matches_fresh_build() {
    let reference = library(8, 21);
    let first = science();
    let fresh = psf_subtract(&first.view(), &reference.view(), &[1, 4], &KlipOptions::default()).unwrap();

    let options = KlipOptions {
        basis: Some(Arc::clone(&fresh.basis)),
        ..KlipOptions::default()
    };
    let reused = psf_subtract(&first.view(), &reference.view(), &[1, 4], &options).unwrap();
    for (a, b) in fresh.residuals.iter().zip(reused.residuals.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }

    let small = KlipOptions {
        basis: Some(Arc::new(KlBasis::build(&reference.view(), 2, None).unwrap())),
        ..KlipOptions::default()
    };
    assert!(psf_subtract(&first.view(), &reference.view(), &[4], &small).is_err());
}

#[test]
fn test_subtract_with_basis_rejects_excess_rank() {
    let reference = library(4, 1);
    let basis = KlBasis::build(&reference.view(), 4, None).unwrap();
    let image = science();
    assert!(subtract_with_basis(&image.view(), &basis, &[5]).is_err());
    let residuals = subtract_with_basis(&image.view(), &basis, &[4, 1]).unwrap();
    assert_eq!(residuals.dim(), (2, SHAPE.0, SHAPE.1));
}

#[test]
fn test_subtract_with_basis_rejects_zero_rank() {
    let reference = library(4, 1);
    let basis = KlBasis::build(&reference.view(), 4, None).unwrap();
    let image = science();
    assert!(matches!(
        subtract_with_basis(&image.view(), &basis, &[0, 2]),
        Err(BdiError::Config(_))
    ));
    assert!(subtract_with_basis(&image.view(), &basis, &[]).is_err());
}

#[test]
fn test_invalid_inputs() {
    let reference = library(4, 2);
    let wrong = Array2::<f64>::zeros((10, 10));
    assert!(psf_subtract(&wrong.view(), &reference.view(), &[1], &KlipOptions::default()).is_err());
    assert!(psf_subtract(&science().view(), &reference.view(), &[], &KlipOptions::default()).is_err());
    assert!(psf_subtract(&science().view(), &reference.view(), &[0], &KlipOptions::default()).is_err());
}

#[test]
fn test_clip_ranks_leaves_small_ranks() {
    let (used, warning) = clip_ranks(&[1, 3], 3);
    assert_eq!(used, vec![1, 3]);
    assert!(warning.is_none());
}
