/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and summary statistics for the serocatalytic models.
//
// Created on: 19 Oct 2026
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared numeric helpers: dense matrix exponentials for transition-rate
//! generators, linear solves, scalar summary statistics, and small
//! conversion routines.

use faer::Mat;
use faer::prelude::Solve;
use num_traits::ToPrimitive;
use thiserror::Error;

/// Padé(13) coefficients from Higham (2005), "The scaling and squaring
/// method for the matrix exponential revisited".
const PADE13: [f64; 14] = [
    64_764_752_532_480_000.0,
    32_382_376_266_240_000.0,
    7_771_770_303_897_600.0,
    1_187_353_796_428_800.0,
    129_060_195_264_000.0,
    10_559_470_521_600.0,
    670_442_572_800.0,
    33_522_128_640.0,
    1_323_241_920.0,
    40_840_800.0,
    960_960.0,
    16_380.0,
    182.0,
    1.0,
];

/// Largest 1-norm for which Padé(13) is accurate without scaling.
const THETA13: f64 = 5.371_920_351_148_152;

/// Errors from dense linear algebra helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinalgError {
    #[error("matrix must be square; found {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("matrix contains non-finite values")]
    NonFinite,
    #[error("linear solve produced non-finite values")]
    SolveFailed,
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

/// Counts convert exactly up to 2^53 and round to nearest above.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

/// Arithmetic mean; `NaN` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

/// Unbiased sample variance; zero for fewer than two values.
#[must_use]
pub fn sample_variance(values: &[f64]) -> f64 {
    match values.len() {
        0 | 1 => 0.0,
        n => {
            let centre = mean(values);
            values
                .iter()
                .map(|value| (value - centre).powi(2))
                .sum::<f64>()
                / usize_to_f64(n - 1)
        }
    }
}

/// Linearly interpolated quantile of ascending `sorted` values; `NaN` when
/// empty.
#[must_use]
pub fn quantile(sorted: &[f64], probability: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = probability.clamp(0.0, 1.0) * usize_to_f64(sorted.len() - 1);
    let floor = position.floor();
    let lower = floor.to_usize().unwrap_or(0).min(sorted.len() - 1);
    match sorted.get(lower + 1) {
        Some(&upper) => (position - floor).mul_add(upper - sorted[lower], sorted[lower]),
        None => sorted[lower],
    }
}

/// `ln(sum(exp(values)))` without overflow.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|value| (value - max).exp()).sum::<f64>().ln()
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

/// Maximum absolute column sum.
#[must_use]
pub fn one_norm(matrix: &Mat<f64>) -> f64 {
    (0..matrix.ncols())
        .map(|j| (0..matrix.nrows()).map(|i| matrix[(i, j)].abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// # Errors
///
/// Returns `LinalgError::SolveFailed` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, LinalgError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(LinalgError::SolveFailed);
    }
    Ok(solution)
}

/// Dense matrix-vector product `matrix · vector`.
#[must_use]
pub fn mat_vec(matrix: &Mat<f64>, vector: &[f64]) -> Vec<f64> {
    (0..matrix.nrows())
        .map(|i| {
            (0..matrix.ncols())
                .map(|j| matrix[(i, j)] * vector[j])
                .sum()
        })
        .collect()
}

/// Matrix exponential by scaling and squaring with a Padé(13) approximant.
///
/// The generator is scaled by `2^-s` so its 1-norm falls below `THETA13`,
/// the rational approximant `(V - U)^-1 (V + U)` is formed with a full-pivot
/// LU solve, and the result is squared `s` times.
///
/// # Errors
///
/// Returns `LinalgError` if the matrix is not square, contains non-finite
/// entries, or the Padé denominator cannot be solved.
pub fn expm(matrix: &Mat<f64>) -> Result<Mat<f64>, LinalgError> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(LinalgError::NotSquare {
            rows: n,
            cols: matrix.ncols(),
        });
    }
    if !matrix_is_finite(matrix) {
        return Err(LinalgError::NonFinite);
    }
    if n == 0 {
        return Ok(Mat::zeros(0, 0));
    }

    let norm = one_norm(matrix);
    let squarings = if norm > THETA13 {
        let raw = (norm / THETA13).log2().ceil();
        num_traits::ToPrimitive::to_i32(&raw).unwrap_or(0).max(0)
    } else {
        0
    };
    let scale = 0.5f64.powi(squarings);
    let a = Mat::from_fn(n, n, |i, j| matrix[(i, j)] * scale);

    let a2 = &a * &a;
    let a4 = &a2 * &a2;
    let a6 = &a4 * &a2;
    let b = &PADE13;

    let u_inner = &a6 * &linear_combination(n, &[(b[13], &a6), (b[11], &a4), (b[9], &a2)]);
    let u_poly = Mat::from_fn(n, n, |i, j| {
        u_inner[(i, j)]
            + b[7] * a6[(i, j)]
            + b[5] * a4[(i, j)]
            + b[3] * a2[(i, j)]
            + if i == j { b[1] } else { 0.0 }
    });
    let u = &a * &u_poly;

    let v_inner = &a6 * &linear_combination(n, &[(b[12], &a6), (b[10], &a4), (b[8], &a2)]);
    let v = Mat::from_fn(n, n, |i, j| {
        v_inner[(i, j)]
            + b[6] * a6[(i, j)]
            + b[4] * a4[(i, j)]
            + b[2] * a2[(i, j)]
            + if i == j { b[0] } else { 0.0 }
    });

    let numerator = Mat::from_fn(n, n, |i, j| v[(i, j)] + u[(i, j)]);
    let denominator = Mat::from_fn(n, n, |i, j| v[(i, j)] - u[(i, j)]);
    let mut result = solve_linear_system(&denominator, &numerator)?;

    for _ in 0..squarings {
        result = &result * &result;
    }
    if !matrix_is_finite(&result) {
        return Err(LinalgError::NonFinite);
    }
    Ok(result)
}

fn linear_combination(n: usize, terms: &[(f64, &Mat<f64>)]) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| {
        terms
            .iter()
            .fold(0.0, |acc, (weight, term)| weight.mul_add(term[(i, j)], acc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn expm_of_zero_is_identity() {
        let zero = Mat::<f64>::zeros(3, 3);
        let result = expm(&zero).expect("expm of zero should succeed");
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(result[(i, j)], expected, epsilon = 1.0e-14);
            }
        }
    }

    #[test]
    fn expm_matches_scalar_exponential_on_diagonal() {
        let diag = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => -0.3,
            (1, 1) => 12.0,
            _ => 0.0,
        });
        let result = expm(&diag).expect("diagonal expm should succeed");
        assert_relative_eq!(result[(0, 0)], (-0.3f64).exp(), max_relative = 1.0e-10);
        assert_relative_eq!(result[(1, 1)], 12.0f64.exp(), max_relative = 1.0e-10);
        assert_relative_eq!(result[(0, 1)], 0.0, epsilon = 1.0e-10);
    }

    #[test]
    fn expm_of_two_state_generator_matches_closed_form() {
        let (lambda, mu) = (0.4, 0.1);
        let generator = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => -lambda,
            (0, 1) => mu,
            (1, 0) => lambda,
            _ => -mu,
        });
        let result = expm(&generator).expect("generator expm should succeed");
        let total = lambda + mu;
        let expected_infected = lambda / total * (1.0 - (-total).exp());
        assert_relative_eq!(result[(1, 0)], expected_infected, max_relative = 1.0e-10);
        assert_relative_eq!(result[(0, 0)] + result[(1, 0)], 1.0, epsilon = 1.0e-10);
    }

    #[test]
    fn expm_rejects_non_square_input() {
        let rect = Mat::<f64>::zeros(2, 3);
        assert_eq!(
            expm(&rect).expect_err("non-square should fail"),
            LinalgError::NotSquare { rows: 2, cols: 3 }
        );
    }

    #[test]
    fn expm_rejects_non_finite_input() {
        let bad = Mat::from_fn(2, 2, |i, _| if i == 0 { f64::NAN } else { 0.0 });
        assert_eq!(
            expm(&bad).expect_err("nan should fail"),
            LinalgError::NonFinite
        );
    }

    #[test]
    fn solve_linear_system_rejects_non_finite_solution() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let b = Mat::from_fn(2, 1, |i, _| if i == 0 { f64::NAN } else { 1.0 });
        let err = solve_linear_system(&a, &b).expect_err("non-finite rhs should fail");
        assert_eq!(err, LinalgError::SolveFailed);
    }

    #[test]
    fn counts_above_u32_range_convert_exactly() {
        let count = 6_000_000_000_u64;
        assert_relative_eq!(u64_to_f64(count), 6.0e9);
        assert_relative_eq!(u64_to_f64(count) / u64_to_f64(2 * count), 0.5);
        assert_relative_eq!(usize_to_f64(70_000), 70_000.0);
    }

    #[test]
    fn scalar_statistics() {
        let values = [2.0, 4.0, 4.0, 6.0];
        assert_relative_eq!(mean(&values), 4.0);
        assert_relative_eq!(sample_variance(&values), 8.0 / 3.0, epsilon = 1.0e-14);
        assert_relative_eq!(sample_variance(&[3.0]), 0.0);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn quantile_interpolates_between_order_statistics() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&sorted, 0.5), 2.0);
        assert_relative_eq!(quantile(&sorted, 0.125), 0.5);
        assert_relative_eq!(quantile(&sorted, 1.0), 4.0);
        assert_relative_eq!(quantile(&sorted, -0.3), 0.0);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn log_sum_exp_handles_large_magnitudes() {
        assert_relative_eq!(
            log_sum_exp(&[1000.0, 1000.0]),
            1000.0 + 2.0f64.ln(),
            epsilon = 1.0e-12
        );
        let empty = log_sum_exp(&[]);
        assert!(empty.is_infinite() && empty.is_sign_negative());
    }

    #[test]
    fn mat_vec_multiplies_rows() {
        let m = Mat::from_fn(2, 2, |i, j| usize_to_f64(i * 2 + j));
        assert_eq!(mat_vec(&m, &[1.0, 1.0]), vec![1.0, 5.0]);
    }
}
