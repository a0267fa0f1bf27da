//! The differentiation oracle.
//!
//! The optimizer never differentiates anything itself. It asks an injected
//! [`Differentiator`] for gradients, Jacobians and Hessians, so any
//! deterministic differentiation technology (autodiff, symbolic, finite
//! differences) can be plugged in. [`FiniteDifference`] is the batteries-included
//! implementation and is what the convenience entry points use.

use faer::Mat;

/// The function handed to [`Differentiator::jacobian`] returned the wrong
/// number of values at a probe point.
#[derive(thiserror::Error, Debug)]
#[error("Function returned {actual} values at a probe point but {expected} were expected")]
pub struct DimensionMismatch {
    /// How many values were expected.
    pub expected: usize,
    /// How many values the function returned.
    pub actual: usize,
}

/// Produces derivatives of user-supplied functions at a point.
///
/// Implementations must be deterministic: the same function and point must
/// always produce the same derivative values.
pub trait Differentiator {
    /// Gradient of a scalar-valued function at `x`.
    fn gradient<F: Fn(&[f64]) -> f64>(&self, f: F, x: &[f64]) -> Vec<f64>;

    /// Jacobian of a vector-valued function at `x`, as an
    /// `n_residuals` x `x.len()` matrix. A probe evaluation that returns a
    /// different number of values than `n_residuals` is a
    /// [`DimensionMismatch`], never a silent reshape.
    fn jacobian<F: Fn(&[f64]) -> Vec<f64>>(
        &self,
        f: F,
        x: &[f64],
        n_residuals: usize,
    ) -> Result<Mat<f64>, DimensionMismatch>;

    /// Hessian of a scalar-valued function at `x`.
    fn hessian<F: Fn(&[f64]) -> f64>(&self, f: F, x: &[f64]) -> Mat<f64>;
}

/// Central finite differences.
///
/// Good enough accuracy for the solvers here: central differences are exact
/// (up to rounding) on quadratics, which is what the one-step Newton
/// behaviour relies on.
#[derive(Debug, Clone, Copy)]
pub struct FiniteDifference {
    /// Perturbation size for each coordinate.
    pub step: f64,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        // Large enough that the function-value difference stays well above
        // rounding noise, small enough to keep truncation error ~1e-10.
        Self { step: 1e-5 }
    }
}

impl Differentiator for FiniteDifference {
    fn gradient<F: Fn(&[f64]) -> f64>(&self, f: F, x: &[f64]) -> Vec<f64> {
        let h = self.step;
        let mut probe = x.to_vec();
        let mut grad = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            probe[i] = x[i] + h;
            let above = f(&probe);
            probe[i] = x[i] - h;
            let below = f(&probe);
            probe[i] = x[i];
            grad.push((above - below) / (2.0 * h));
        }
        grad
    }

    fn jacobian<F: Fn(&[f64]) -> Vec<f64>>(
        &self,
        f: F,
        x: &[f64],
        n_residuals: usize,
    ) -> Result<Mat<f64>, DimensionMismatch> {
        let h = self.step;
        let mut probe = x.to_vec();
        let mut jac = Mat::<f64>::zeros(n_residuals, x.len());
        for col in 0..x.len() {
            probe[col] = x[col] + h;
            let above = f(&probe);
            probe[col] = x[col] - h;
            let below = f(&probe);
            probe[col] = x[col];
            for sample in [&above, &below] {
                if sample.len() != n_residuals {
                    return Err(DimensionMismatch {
                        expected: n_residuals,
                        actual: sample.len(),
                    });
                }
            }
            for row in 0..n_residuals {
                jac[(row, col)] = (above[row] - below[row]) / (2.0 * h);
            }
        }
        Ok(jac)
    }

    /// Two nested differentiation passes: a central difference of the
    /// gradient. The result is symmetrized, since rounding in the nested
    /// passes otherwise leaves `H[i][j]` and `H[j][i]` a hair apart.
    fn hessian<F: Fn(&[f64]) -> f64>(&self, f: F, x: &[f64]) -> Mat<f64> {
        let h = self.step;
        let n = x.len();
        let mut probe = x.to_vec();
        let mut hess = Mat::<f64>::zeros(n, n);
        for i in 0..n {
            probe[i] = x[i] + h;
            let above = self.gradient(&f, &probe);
            probe[i] = x[i] - h;
            let below = self.gradient(&f, &probe);
            probe[i] = x[i];
            for j in 0..n {
                hess[(i, j)] = (above[j] - below[j]) / (2.0 * h);
            }
        }
        // Symmetrize.
        for i in 0..n {
            for j in (i + 1)..n {
                let mean = (hess[(i, j)] + hess[(j, i)]) / 2.0;
                hess[(i, j)] = mean;
                hess[(j, i)] = mean;
            }
        }
        hess
    }
}
