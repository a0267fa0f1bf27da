//! Dense linear-algebra utilities shared by both solvers.
//!
//! Everything here is built on faer's dense SVD, because the whole toolkit
//! prefers a best-effort minimum-norm answer over a hard failure: a
//! rank-deficient matrix never raises, it just loses its near-null
//! directions. Rank decisions use the LAPACK-style cutoff
//! `EPSILON * max(nrows, ncols) * largest_singular_value`.

use faer::{Mat, linalg::svd::SvdError};

/// Condition numbers above this get flagged as ill-conditioned in warnings.
pub(crate) const ILL_CONDITIONED: f64 = 1e12;

/// Rank-revealing cutoff for the singular values of `a`, relative to the
/// largest one.
fn rank_cutoff(nrows: usize, ncols: usize, largest_singular_value: f64) -> f64 {
    f64::EPSILON * (nrows.max(ncols) as f64) * largest_singular_value
}

/// Moore-Penrose pseudo-inverse of `a`, via full SVD.
///
/// Singular values at or below the rank cutoff are zeroed rather than
/// inverted, so singular and rank-deficient matrices are fine: the result is
/// the minimum-norm least-squares inverse.
pub fn pinv(a: &Mat<f64>) -> Result<Mat<f64>, SvdError> {
    let (nrows, ncols) = (a.nrows(), a.ncols());
    let svd = a.svd()?;

    // These are the 'singular values'.
    let sigma_diags = svd.S();
    let sigma: Vec<f64> = sigma_diags.column_vector().iter().copied().collect();
    let largest = sigma.iter().copied().reduce(libm::fmax).unwrap_or(0.0);
    let cutoff = rank_cutoff(nrows, ncols, largest);

    // a⁺ = V Σ⁺ U', accumulated one singular triplet at a time.
    let u = svd.U();
    let v = svd.V();
    let mut out = Mat::<f64>::zeros(ncols, nrows);
    for (k, &sigma_k) in sigma.iter().enumerate() {
        if sigma_k <= cutoff {
            continue;
        }
        let inv = 1.0 / sigma_k;
        for i in 0..ncols {
            let v_ik = v.get(i, k);
            for j in 0..nrows {
                let u_jk = u.get(j, k);
                out[(i, j)] += inv * v_ik * u_jk;
            }
        }
    }
    Ok(out)
}

/// Minimum-norm least-squares solution of `a * x = rhs`.
///
/// Tolerant of any rank: for consistent full-rank systems this is the exact
/// solution, for overdetermined ones the least-squares fit, and for
/// underdetermined or rank-deficient ones the minimum-norm choice among the
/// least-squares fits.
pub fn lstsq(a: &Mat<f64>, rhs: &Mat<f64>) -> Result<Mat<f64>, SvdError> {
    let inverse = pinv(a)?;
    Ok(inverse.as_ref() * rhs.as_ref())
}

/// Condition number estimate: ratio of the largest to smallest singular
/// value. Infinite for singular (or empty) matrices.
pub fn condition(a: &Mat<f64>) -> Result<f64, SvdError> {
    let svd = a.svd()?;
    let sigma_diags = svd.S();
    let sigma = sigma_diags.column_vector();
    let largest = sigma.iter().copied().reduce(libm::fmax).unwrap_or(0.0);
    let smallest = sigma
        .iter()
        .copied()
        .reduce(libm::fmin)
        .unwrap_or(f64::INFINITY);
    if smallest <= 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(largest / smallest)
}

/// Euclidean norm of a slice.
pub(crate) fn norm(values: &[f64]) -> f64 {
    libm::sqrt(values.iter().map(|v| v * v).sum())
}

/// Dot product of two equal-length slices.
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
