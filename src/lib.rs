//! Newton-type least-squares optimizers and an equality-constrained QP
//! solver, built on dense [faer] linear algebra.
//!
//! Two entry points:
//!
//! - [`optimize`] (or [`Optimizer`] for control over the differentiation
//!   oracle) minimizes a sum-of-squares objective built from a residual
//!   closure, by one of five [`Method`]s: exact Newton, gradient descent,
//!   Gauss-Newton, Levenberg-Marquardt, or BFGS quasi-Newton. Optional
//!   Armijo backtracking line search via [`Config::globalized`].
//! - [`qp::solve`] minimizes a quadratic objective subject to linear
//!   equality constraints through the KKT conditions, either naively or
//!   via a null-space reduction.
//!
//! Derivatives are never supplied by the caller. A [`Differentiator`]
//! oracle (by default central [`FiniteDifference`]) estimates gradients,
//! Jacobians and Hessians from the residual closure alone.
//!
//! Rank-deficient linear algebra inside a solve is not an error: every
//! inner solve is a minimum-norm least-squares solve, and conditioning
//! problems surface as [`Warning`]s on the outcome instead of failures.

pub use crate::diff::{Differentiator, DimensionMismatch, FiniteDifference};
pub use crate::error::{OptimizeError, QpError};
pub use crate::solve_outcome::{FailureOutcome, OptimizeOutcome};
pub use crate::solver::{Config, LineSearch, Method, Optimizer, optimize};
pub use crate::warnings::{Warning, WarningContent};

/// Differentiation oracles (finite differences).
pub mod diff;
/// Error types for both solvers.
mod error;
/// Dense SVD-backed helpers: pseudo-inverse, least squares, conditioning.
pub mod linalg;
/// Equality-constrained quadratic programming.
pub mod qp;
/// Solve outcomes, success and failure.
mod solve_outcome;
/// The iterative least-squares optimizer.
mod solver;
/// Non-blocking solver diagnostics.
mod warnings;
