//! Direct solver for equality-constrained quadratic programs.
//!
//! Minimizes `0.5 x'Bx + c'x` subject to `Ax + b = 0`, returning the
//! minimizer and the Lagrange multipliers, by either of two KKT methods:
//!
//! - [`KktMethod::Naive`]: one minimum-norm least-squares solve of the full
//!   `(n+m) x (n+m)` augmented KKT system. Simple, but needs the whole KKT
//!   matrix to be well-conditioned.
//! - [`KktMethod::NullSpace`]: reduces the problem onto the null space of
//!   `A` first, so only the reduced Hessian `Z'BZ` needs to be positive
//!   definite. More bookkeeping, weaker requirement on `B`.
//!
//! Both are pure functions of their inputs. Neither raises on singular
//! inputs; they degrade to a minimum-norm answer and flag conditioning
//! problems as warnings instead.

use faer::Mat;

use crate::{
    QpError, Warning, WarningContent,
    linalg::{self, lstsq},
};

/// How to solve the KKT system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KktMethod {
    /// Solve the full augmented KKT system in one go.
    Naive,
    /// Reduce onto the null space of the constraint Jacobian first.
    NullSpace,
}

/// The solution of an equality-constrained QP.
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct QpSolution {
    /// The minimizer.
    pub x: Vec<f64>,
    /// Lagrange multipliers, one per constraint row, with the sign
    /// convention `A'λ = Bx + c` that the KKT assembly produces. Both
    /// methods use the same convention, so their multipliers agree.
    pub lambda: Vec<f64>,
    /// Non-blocking conditioning diagnostics. An ill-conditioned KKT matrix
    /// or reduced Hessian means the answer is a least-squares best effort
    /// rather than a guaranteed constrained minimum.
    pub warnings: Vec<Warning>,
}

/// Solve the QP `min 0.5 x'Bx + c'x` subject to `Ax + b = 0`.
///
/// `curvature` is `B` (n x n), `linear` is `c` (n), `constraints` is `A`
/// (m x n, m <= n and ideally full row rank), `offset` is `b` (m).
///
/// Shape mismatches are hard errors. Rank problems are not: violating the
/// Second-Order Sufficiency Condition (positive-definite `Z'BZ`) silently
/// degrades the answer to a least-squares pseudo-solution, so check the
/// returned warnings if you care.
pub fn solve(
    curvature: &Mat<f64>,
    linear: &[f64],
    constraints: &Mat<f64>,
    offset: &[f64],
    method: KktMethod,
) -> Result<QpSolution, QpError> {
    let n = curvature.nrows();
    let m = constraints.nrows();
    if n == 0 {
        return Err(QpError::EmptySystemNotAllowed);
    }
    if curvature.ncols() != n || linear.len() != n {
        return Err(QpError::ObjectiveShape {
            rows: n,
            cols: curvature.ncols(),
            linear: linear.len(),
        });
    }
    if constraints.ncols() != n || offset.len() != m {
        return Err(QpError::ConstraintShape {
            rows: m,
            cols: constraints.ncols(),
            offset: offset.len(),
            variables: n,
        });
    }
    if m > n {
        return Err(QpError::TooManyConstraints {
            constraints: m,
            variables: n,
        });
    }

    match method {
        KktMethod::Naive => solve_naive(curvature, linear, constraints, offset),
        KktMethod::NullSpace => solve_null_space(curvature, linear, constraints, offset),
    }
}

/// Assemble and solve the augmented system
///
/// ```text
/// [ B   A' ]  [ x  ]     [ -c ]
/// [ A   0  ]  [ -λ ]  =  [ -b ]
/// ```
///
/// as one minimum-norm least-squares solve.
fn solve_naive(
    curvature: &Mat<f64>,
    linear: &[f64],
    constraints: &Mat<f64>,
    offset: &[f64],
) -> Result<QpSolution, QpError> {
    let n = curvature.nrows();
    let m = constraints.nrows();
    let size = n + m;

    let mut kkt = Mat::<f64>::zeros(size, size);
    for i in 0..n {
        for j in 0..n {
            kkt[(i, j)] = curvature[(i, j)];
        }
    }
    for i in 0..m {
        for j in 0..n {
            kkt[(n + i, j)] = constraints[(i, j)];
            kkt[(j, n + i)] = constraints[(i, j)];
        }
    }

    let mut rhs = Mat::<f64>::zeros(size, 1);
    for (i, &c_i) in linear.iter().enumerate() {
        rhs[(i, 0)] = -c_i;
    }
    for (i, &b_i) in offset.iter().enumerate() {
        rhs[(n + i, 0)] = -b_i;
    }

    let solution = lstsq(&kkt, &rhs)?;
    let x: Vec<f64> = (0..n).map(|i| solution[(i, 0)]).collect();
    // The second block of unknowns is -λ.
    let lambda: Vec<f64> = (0..m).map(|i| -solution[(n + i, 0)]).collect();

    let mut warnings = Vec::new();
    let condition = linalg::condition(&kkt)?;
    if condition > linalg::ILL_CONDITIONED {
        warnings.push(Warning {
            about_iteration: None,
            content: WarningContent::IllConditionedKkt { condition },
        });
    }

    Ok(QpSolution {
        x,
        lambda,
        warnings,
    })
}

/// Null-space reduction.
///
/// A complete orthogonal factorization of `A` (realized with the full SVD,
/// `A = U Σ V'`) splits the variable space: the first `m` right singular
/// vectors `Y` span the range of `A'`, the remaining `n - m` columns `Z`
/// span the null space of `A`. Any feasible `x` is
/// `x_particular + Z * x_g`, and only the reduced Hessian `Z'BZ` has to be
/// positive definite for the reduced solve to be well-posed.
fn solve_null_space(
    curvature: &Mat<f64>,
    linear: &[f64],
    constraints: &Mat<f64>,
    offset: &[f64],
) -> Result<QpSolution, QpError> {
    let n = curvature.nrows();
    let m = constraints.nrows();

    let svd = constraints.svd()?;
    let v = svd.V();
    // Null-space basis of A: the right singular vectors beyond row rank.
    let z = v.submatrix(0, m, n, n - m).to_owned();

    // A particular solution of A x = -b.
    let mut neg_offset = Mat::<f64>::zeros(m, 1);
    for (i, &b_i) in offset.iter().enumerate() {
        neg_offset[(i, 0)] = -b_i;
    }
    let x_particular = lstsq(constraints, &neg_offset)?;

    let mut warnings = Vec::new();

    // Reduce onto the null space and solve there, unless the constraints
    // already pin down every variable (m == n, Z empty).
    let x = if m == n {
        x_particular
    } else {
        let bz = curvature.as_ref() * z.as_ref();
        let reduced = z.transpose() * bz.as_ref();
        let mut reduced_rhs = Mat::<f64>::zeros(n - m, 1);
        // b_reduced = Z'c + Z'B x_particular, negated for the solve.
        let bxp = curvature.as_ref() * x_particular.as_ref();
        let b_term = z.transpose() * bxp.as_ref();
        for i in 0..(n - m) {
            let mut zc = 0.0;
            for (j, &c_j) in linear.iter().enumerate() {
                zc += z[(j, i)] * c_j;
            }
            reduced_rhs[(i, 0)] = -(zc + b_term[(i, 0)]);
        }
        let x_g = lstsq(&reduced, &reduced_rhs)?;

        let condition = linalg::condition(&reduced)?;
        if condition > linalg::ILL_CONDITIONED {
            warnings.push(Warning {
                about_iteration: None,
                content: WarningContent::IllConditionedReducedHessian { condition },
            });
        }

        // x = Z x_g + x_particular.
        let lifted = z.as_ref() * x_g.as_ref();
        let mut x = x_particular;
        for i in 0..n {
            x[(i, 0)] += lifted[(i, 0)];
        }
        x
    };

    // Multipliers from the range-space equation A'λ = Bx + c, solved in the
    // least-squares sense. Same sign convention as the naive KKT assembly.
    let stationarity = curvature.as_ref() * x.as_ref();
    let mut grad = Mat::<f64>::zeros(n, 1);
    for (i, &c_i) in linear.iter().enumerate() {
        grad[(i, 0)] = stationarity[(i, 0)] + c_i;
    }
    let a_transpose = constraints.transpose().to_owned();
    let lambda_mat = lstsq(&a_transpose, &grad)?;

    Ok(QpSolution {
        x: (0..n).map(|i| x[(i, 0)]).collect(),
        lambda: (0..m).map(|i| lambda_mat[(i, 0)]).collect(),
        warnings,
    })
}

/// Evaluate the QP objective `0.5 x'Bx + c'x` at `x`.
pub fn objective(curvature: &Mat<f64>, linear: &[f64], x: &[f64]) -> f64 {
    let n = x.len();
    let mut quadratic = 0.0;
    for i in 0..n {
        for j in 0..n {
            quadratic += x[i] * curvature[(i, j)] * x[j];
        }
    }
    let linear_term: f64 = linear.iter().zip(x.iter()).map(|(c, v)| c * v).sum();
    0.5 * quadratic + linear_term
}
