//! The iterative Newton-type optimizer.
//!
//! Construction and configuration live here; the per-iteration numerics live
//! in [`newton`].

use crate::{
    FailureOutcome, OptimizeError, OptimizeOutcome,
    diff::{Differentiator, FiniteDifference},
};

pub(crate) mod newton;

/// Which Hessian-approximation strategy drives the Newton-type step.
///
/// Each variant carries only the configuration it actually uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// Exact Hessian of the squared-error objective, computed by the
    /// differentiation oracle via two nested passes.
    ExactNewton,
    /// Fixed-step gradient descent, expressed in Newton form: the curvature
    /// matrix is `(1/step_size) * I`, so the update is `x -= step_size * g`.
    GradientDescent {
        /// The fixed step size (learning rate).
        step_size: f64,
    },
    /// Curvature `J'J` from the residual Jacobian. No second derivatives.
    GaussNewton,
    /// Gauss-Newton with a damping regularizer: curvature `J'J + damping*I`.
    /// Zero damping reduces to Gauss-Newton; large damping approaches
    /// (scaled) gradient descent.
    LevenbergMarquardt {
        /// The damping regularizer added to the diagonal.
        damping: f64,
    },
    /// BFGS: a running curvature approximation, identity at iteration 0,
    /// rank-2 updated from gradient differences each iteration.
    QuasiNewton,
}

impl std::fmt::Display for Method {
    #[mutants::skip]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::ExactNewton => write!(f, "exact Newton"),
            Method::GradientDescent { .. } => write!(f, "gradient descent"),
            Method::GaussNewton => write!(f, "Gauss-Newton"),
            Method::LevenbergMarquardt { .. } => write!(f, "Levenberg-Marquardt"),
            Method::QuasiNewton => write!(f, "quasi-Newton (BFGS)"),
        }
    }
}

/// Armijo backtracking parameters.
#[derive(Debug, Clone, Copy)]
pub struct LineSearch {
    /// Multiplier applied to the trial step scale after each failed Armijo
    /// test. Must be in (0, 1).
    pub shrink: f64,
    /// The Armijo sufficient-decrease fraction (gamma). Must be in (0, 1).
    pub sufficient_decrease: f64,
    /// Backtracking stops, accepting the current trial scale, once it drops
    /// below this floor, even if the Armijo test still fails. That caps
    /// backtracking depth at the cost of occasionally accepting a
    /// non-decreasing step; a [`crate::WarningContent::LineSearchFloor`]
    /// warning is raised when it happens.
    pub floor: f64,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self {
            shrink: 0.8,
            sufficient_decrease: 0.1,
            floor: 0.1,
        }
    }
}

/// Configuration for an optimization run. Set once, read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Converged once the step norm `‖dx‖` drops below this. Note the
    /// objective is a sum (not mean) of squared residuals, so sensible
    /// values depend on the residual count.
    pub step_tolerance: f64,
    /// Give up (with a warning, not an error) after this many iterations.
    pub max_iterations: usize,
    /// `Some` enables globalized Armijo backtracking along each step.
    pub line_search: Option<LineSearch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_tolerance: 1e-8,
            max_iterations: 100,
            line_search: None,
        }
    }
}

impl Config {
    /// Enable Armijo backtracking with default parameters.
    pub fn globalized(mut self) -> Self {
        self.line_search = Some(LineSearch::default());
        self
    }

    /// Set the convergence tolerance on the step norm.
    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// An optimization problem plus everything needed to run it.
///
/// Holds the residual function, the method, the configuration, and the
/// injected differentiation oracle. One `optimize` call consumes it; the
/// iteration state itself is a value threaded through a pure step function,
/// so nothing here mutates between iterations.
pub struct Optimizer<F, D> {
    pub(crate) residual: F,
    pub(crate) x0: Vec<f64>,
    pub(crate) method: Method,
    pub(crate) config: Config,
    pub(crate) oracle: D,
    /// Residual vector length, discovered at construction.
    pub(crate) n_residuals: usize,
}

impl<F, D> Optimizer<F, D>
where
    F: Fn(&[f64]) -> Vec<f64>,
    D: Differentiator,
{
    /// Set up a run starting from `x0`.
    ///
    /// Evaluates the residual function once; an empty parameter vector or an
    /// empty residual vector is rejected here rather than mid-loop.
    pub fn new(
        residual: F,
        x0: Vec<f64>,
        method: Method,
        config: Config,
        oracle: D,
    ) -> Result<Self, OptimizeError> {
        if x0.is_empty() {
            return Err(OptimizeError::EmptySystemNotAllowed);
        }
        let n_residuals = residual(&x0).len();
        if n_residuals == 0 {
            return Err(OptimizeError::EmptySystemNotAllowed);
        }
        Ok(Self {
            residual,
            x0,
            method,
            config,
            oracle,
            n_residuals,
        })
    }

    /// Run the iteration loop to completion.
    ///
    /// Success means the step norm dropped below the tolerance, or the
    /// iteration budget ran out (the latter adds a
    /// [`crate::WarningContent::DidNotConverge`] warning but still returns
    /// the last iterate). Hard failures (dimension mismatch mid-run,
    /// degenerate BFGS update) return a [`FailureOutcome`] carrying the best
    /// iterate so far.
    pub fn optimize(self) -> Result<OptimizeOutcome, FailureOutcome> {
        self.run()
    }
}

/// Given a residual function and initial guesses, minimize the squared error.
/// Returns the same parameters in the same order, optimized.
///
/// This is the convenience entry point: it uses the central
/// finite-difference oracle. To inject a different differentiation
/// technology, build an [`Optimizer`] directly.
pub fn optimize<F>(
    residual: F,
    x0: Vec<f64>,
    method: Method,
    config: Config,
) -> Result<OptimizeOutcome, FailureOutcome>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let best = x0.clone();
    let optimizer = match Optimizer::new(residual, x0, method, config, FiniteDifference::default())
    {
        Ok(o) => o,
        Err(error) => {
            return Err(FailureOutcome {
                error,
                best,
                iterations: 0,
                warnings: Vec::new(),
            });
        }
    };
    optimizer.optimize()
}
