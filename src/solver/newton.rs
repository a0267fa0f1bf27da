//! Per-iteration numerics for the Newton-type methods.
//!
//! One iteration is a pure function from [`IterationState`] to the next
//! state, so a single step can be tested in isolation without running the
//! whole loop.

use faer::Mat;

use crate::{
    FailureOutcome, OptimizeError, OptimizeOutcome, Warning, WarningContent,
    diff::Differentiator,
    linalg::{dot, norm, pinv},
    solver::{Method, Optimizer},
};

/// BFGS denominators whose magnitude is below this fraction of their
/// factors' scale are treated as zero. Dividing by them would be the start
/// of a NaN cascade. Relative, not absolute: an honest small denominator on
/// a small converging step is fine.
const DEGENERATE_BFGS_TOL: f64 = 1e-12;

/// Iteration-local state. Owned by the loop, threaded through [`Optimizer::step`]
/// as a value, destroyed when the loop terminates.
pub(crate) struct IterationState {
    /// Current iterate.
    pub(crate) x: Vec<f64>,
    /// How many steps have been taken to reach `x`.
    pub(crate) iteration: usize,
    /// The running BFGS curvature approximation. Identity at iteration 0.
    /// Carried but ignored by every method except quasi-Newton.
    pub(crate) curvature: Mat<f64>,
}

impl IterationState {
    pub(crate) fn initial(x: Vec<f64>) -> Self {
        let n = x.len();
        Self {
            x,
            iteration: 0,
            curvature: identity(n),
        }
    }
}

/// What one step produced.
pub(crate) struct StepOutcome {
    /// The state after the step.
    pub(crate) next: IterationState,
    /// Norm of the applied step `dx` (after any line-search scaling);
    /// the loop's convergence test runs on this.
    pub(crate) step_norm: f64,
    /// Warnings raised during the step.
    pub(crate) warnings: Vec<Warning>,
}

fn identity(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
}

impl<F, D> Optimizer<F, D>
where
    F: Fn(&[f64]) -> Vec<f64>,
    D: Differentiator,
{
    /// Evaluate the residual, enforcing the dimension discovered at
    /// construction. A residual function that changes shape mid-run is a
    /// hard error, never a silent reshape.
    fn eval_residual(&self, x: &[f64]) -> Result<Vec<f64>, OptimizeError> {
        let f = (self.residual)(x);
        if f.len() != self.n_residuals {
            return Err(OptimizeError::InvalidDimension {
                expected: self.n_residuals,
                actual: f.len(),
            });
        }
        Ok(f)
    }

    /// The scalar objective `fs(x) = F(x)·F(x)`. Sum, not mean.
    fn squared_error(&self, x: &[f64]) -> f64 {
        (self.residual)(x).iter().map(|r| r * r).sum()
    }

    /// Take one Newton-type step from `state`.
    pub(crate) fn step(&self, state: &IterationState) -> Result<StepOutcome, OptimizeError> {
        let n = state.x.len();
        let f = self.eval_residual(&state.x)?;
        let fs = |x: &[f64]| -> f64 { self.squared_error(x) };

        // Gradient of the active objective, and the curvature matrix B.
        // Gauss-Newton and Levenberg-Marquardt work on the residual Jacobian;
        // the other methods work on the scalar squared-error objective.
        let (g, curvature) = match self.method {
            Method::GradientDescent { step_size } => {
                let g = self.oracle.gradient(&fs, &state.x);
                // B = (1/step_size) * I, so the raw step is -step_size * g:
                // fixed-step gradient descent expressed in Newton form.
                let b = Mat::from_fn(n, n, |i, j| if i == j { 1.0 / step_size } else { 0.0 });
                (g, b)
            }
            Method::GaussNewton => {
                let jac = self
                    .oracle
                    .jacobian(|x: &[f64]| (self.residual)(x), &state.x, self.n_residuals)?;
                let g = jacobian_transpose_times(&jac, &f);
                let jtj = jac.transpose() * jac.as_ref();
                (g, jtj)
            }
            Method::LevenbergMarquardt { damping } => {
                let jac = self
                    .oracle
                    .jacobian(|x: &[f64]| (self.residual)(x), &state.x, self.n_residuals)?;
                let g = jacobian_transpose_times(&jac, &f);
                let mut b = jac.transpose() * jac.as_ref();
                for i in 0..n {
                    b[(i, i)] += damping;
                }
                (g, b)
            }
            Method::ExactNewton => {
                let g = self.oracle.gradient(&fs, &state.x);
                let b = self.oracle.hessian(&fs, &state.x);
                (g, b)
            }
            Method::QuasiNewton => {
                let g = self.oracle.gradient(&fs, &state.x);
                (g, state.curvature.clone())
            }
        };

        // Raw step: dx = -pinv(B) * g. The pseudo-inverse means a singular
        // or ill-conditioned B yields a minimum-norm step, not an error.
        let inverse = pinv(&curvature)?;
        let mut dx = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for (j, g_j) in g.iter().enumerate() {
                acc += inverse[(i, j)] * g_j;
            }
            dx[i] = -acc;
        }

        let mut warnings = Vec::new();

        // Optional Armijo backtracking along dx.
        if let Some(ls) = self.config.line_search {
            let fx = f.iter().map(|r| r * r).sum::<f64>();
            let slope = dot(&g, &dx);
            let mut t = 1.0;
            loop {
                let trial: Vec<f64> = state
                    .x
                    .iter()
                    .zip(dx.iter())
                    .map(|(x_i, d_i)| x_i + t * d_i)
                    .collect();
                if self.squared_error(&trial) < fx + ls.sufficient_decrease * t * slope {
                    break;
                }
                t *= ls.shrink;
                if t < ls.floor {
                    // Accept the sub-floor scale anyway; this caps the
                    // backtracking depth.
                    warnings.push(Warning {
                        about_iteration: Some(state.iteration),
                        content: WarningContent::LineSearchFloor { t },
                    });
                    break;
                }
            }
            for d in dx.iter_mut() {
                *d *= t;
            }
        }

        let x_new: Vec<f64> = state
            .x
            .iter()
            .zip(dx.iter())
            .map(|(x_i, d_i)| x_i + d_i)
            .collect();

        let step_norm = norm(&dx);

        // The prior iterate is only needed for the BFGS secant pair. A step
        // below the tolerance terminates the run, so its (vanishing) secant
        // pair is never used and no update is attempted for it.
        let next_curvature = if self.method == Method::QuasiNewton
            && step_norm >= self.config.step_tolerance
        {
            self.bfgs_update(&state.curvature, &state.x, &x_new, &dx)?
        } else {
            curvature
        };
        Ok(StepOutcome {
            next: IterationState {
                x: x_new,
                iteration: state.iteration + 1,
                curvature: next_curvature,
            },
            step_norm,
            warnings,
        })
    }

    /// The BFGS rank-2 update `B' = B - (Bs)(Bs)'/(s'Bs) + yy'/(s'y)`,
    /// with `s` the applied step and `y` the gradient difference across it.
    fn bfgs_update(
        &self,
        b: &Mat<f64>,
        x_old: &[f64],
        x_new: &[f64],
        s: &[f64],
    ) -> Result<Mat<f64>, OptimizeError> {
        let n = s.len();
        let fs = |x: &[f64]| -> f64 { self.squared_error(x) };
        let g_new = self.oracle.gradient(&fs, x_new);
        let g_old = self.oracle.gradient(&fs, x_old);
        let y: Vec<f64> = g_new
            .iter()
            .zip(g_old.iter())
            .map(|(new, old)| new - old)
            .collect();

        let mut bs = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for (j, s_j) in s.iter().enumerate() {
                acc += b[(i, j)] * s_j;
            }
            bs[i] = acc;
        }
        let s_bs = dot(s, &bs);
        let s_y = dot(s, &y);
        let degenerate = !s_bs.is_finite()
            || !s_y.is_finite()
            || s_bs.abs() <= DEGENERATE_BFGS_TOL * norm(s) * norm(&bs)
            || s_y.abs() <= DEGENERATE_BFGS_TOL * norm(s) * norm(&y);
        if degenerate {
            return Err(OptimizeError::DegenerateBfgsUpdate { s_bs, s_y });
        }

        let mut next = b.clone();
        for i in 0..n {
            for j in 0..n {
                next[(i, j)] += -(bs[i] * bs[j]) / s_bs + (y[i] * y[j]) / s_y;
            }
        }
        Ok(next)
    }

    /// The iteration loop: step until the step norm converges, the budget
    /// runs out, or a step fails hard.
    pub(crate) fn run(self) -> Result<OptimizeOutcome, FailureOutcome> {
        let mut warnings = Vec::new();
        let mut state = IterationState::initial(self.x0.clone());
        let mut converged = false;

        while state.iteration < self.config.max_iterations {
            match self.step(&state) {
                Ok(StepOutcome {
                    next,
                    step_norm,
                    warnings: step_warnings,
                }) => {
                    warnings.extend(step_warnings);
                    state = next;
                    if step_norm < self.config.step_tolerance {
                        converged = true;
                        break;
                    }
                }
                Err(error) => {
                    return Err(FailureOutcome {
                        error,
                        best: state.x,
                        iterations: state.iteration,
                        warnings,
                    });
                }
            }
        }

        if !converged {
            warnings.push(Warning {
                about_iteration: None,
                content: WarningContent::DidNotConverge {
                    iterations: state.iteration,
                },
            });
        }

        let f = (self.residual)(&state.x);
        let objective = f.iter().map(|r| r * r).sum();
        let fitting_error = norm(&f);
        Ok(OptimizeOutcome {
            final_values: state.x,
            iterations: state.iteration,
            objective,
            fitting_error,
            warnings,
        })
    }
}

/// `J' * v` as a plain vector.
fn jacobian_transpose_times(jac: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; jac.ncols()];
    for (col, out_col) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (row, v_row) in v.iter().enumerate() {
            acc += jac[(row, col)] * v_row;
        }
        *out_col = acc;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, FiniteDifference, optimize};

    /// A consistent linear least-squares problem: F(x) = Lx - d with
    /// minimizer (1, 2).
    fn linear_residual(x: &[f64]) -> Vec<f64> {
        vec![
            2.0 * x[0] + x[1] - 4.0,
            x[0] - x[1] + 1.0,
            x[0] + 3.0 * x[1] - 7.0,
        ]
    }

    #[test]
    fn gauss_newton_solves_linear_least_squares_in_one_step() {
        let outcome = optimize(
            linear_residual,
            vec![10.0, -3.0],
            Method::GaussNewton,
            Config::default().with_step_tolerance(1e-6).with_max_iterations(5),
        )
        .unwrap();
        // A quadratic objective has a constant Hessian, so one Newton step
        // lands on the minimizer and the second step just confirms it.
        assert!(outcome.iterations() <= 2, "took {}", outcome.iterations());
        assert!((outcome.final_values()[0] - 1.0).abs() < 1e-4);
        assert!((outcome.final_values()[1] - 2.0).abs() < 1e-4);
        assert!(outcome.fitting_error() < 1e-4);
    }

    #[test]
    fn exact_newton_matches_gauss_newton_on_quadratics() {
        let outcome = optimize(
            linear_residual,
            vec![10.0, -3.0],
            Method::ExactNewton,
            Config::default().with_step_tolerance(1e-4).with_max_iterations(5),
        )
        .unwrap();
        assert!(outcome.iterations() <= 2, "took {}", outcome.iterations());
        assert!((outcome.final_values()[0] - 1.0).abs() < 1e-3);
        assert!((outcome.final_values()[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn levenberg_marquardt_with_tiny_damping_matches_gauss_newton() {
        let outcome = optimize(
            linear_residual,
            vec![10.0, -3.0],
            Method::LevenbergMarquardt { damping: 1e-9 },
            Config::default().with_step_tolerance(1e-6).with_max_iterations(5),
        )
        .unwrap();
        assert!(outcome.iterations() <= 2, "took {}", outcome.iterations());
        assert!((outcome.final_values()[0] - 1.0).abs() < 1e-4);
        assert!((outcome.final_values()[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn gradient_descent_decreases_objective_every_step() {
        // Step size well below the inverse Lipschitz bound of the gradient,
        // so without any line search each iterate must strictly improve.
        let optimizer = Optimizer::new(
            linear_residual,
            vec![10.0, -3.0],
            Method::GradientDescent { step_size: 0.01 },
            Config::default(),
            FiniteDifference::default(),
        )
        .unwrap();

        let mut state = IterationState::initial(vec![10.0, -3.0]);
        let mut prev = optimizer.squared_error(&state.x);
        for _ in 0..20 {
            state = optimizer.step(&state).unwrap().next;
            let current = optimizer.squared_error(&state.x);
            assert!(current < prev, "objective rose from {prev} to {current}");
            prev = current;
        }
    }

    #[test]
    fn armijo_search_keeps_objective_non_increasing() {
        // Rosenbrock in residual form; badly scaled enough that raw Newton
        // steps overshoot from some starts.
        let rosenbrock = |x: &[f64]| vec![1.0 - x[0], 10.0 * (x[1] - x[0] * x[0])];
        let optimizer = Optimizer::new(
            rosenbrock,
            vec![-1.2, 1.0],
            Method::GaussNewton,
            Config::default().globalized(),
            FiniteDifference::default(),
        )
        .unwrap();

        let mut state = IterationState::initial(vec![-1.2, 1.0]);
        let mut prev = optimizer.squared_error(&state.x);
        for _ in 0..15 {
            let outcome = optimizer.step(&state).unwrap();
            state = outcome.next;
            let current = optimizer.squared_error(&state.x);
            // Non-increasing, modulo the floor-acceptance escape hatch.
            let floored = outcome
                .warnings
                .iter()
                .any(|w| matches!(w.content, WarningContent::LineSearchFloor { .. }));
            if !floored {
                assert!(
                    current <= prev + 1e-12,
                    "objective rose from {prev} to {current}"
                );
            }
            prev = current;
            if outcome.step_norm < 1e-12 {
                break;
            }
        }
    }

    #[test]
    fn bfgs_curvature_stays_symmetric() {
        let rosenbrock = |x: &[f64]| vec![1.0 - x[0], 10.0 * (x[1] - x[0] * x[0])];
        let optimizer = Optimizer::new(
            rosenbrock,
            vec![-1.2, 1.0],
            Method::QuasiNewton,
            Config::default().globalized(),
            FiniteDifference::default(),
        )
        .unwrap();

        let mut state = IterationState::initial(vec![-1.2, 1.0]);
        for _ in 0..10 {
            state = optimizer.step(&state).unwrap().next;
            let b = &state.curvature;
            for i in 0..2 {
                for j in 0..2 {
                    assert!(
                        (b[(i, j)] - b[(j, i)]).abs() < 1e-9,
                        "B lost symmetry: {} vs {}",
                        b[(i, j)],
                        b[(j, i)]
                    );
                }
            }
        }
    }

    #[test]
    fn quasi_newton_converges_on_linear_least_squares() {
        // The full run must reach the converged outcome: near the minimum
        // the secant pair shrinks with the step, and an honestly small
        // denominator must not be mistaken for a degenerate one.
        let outcome = optimize(
            linear_residual,
            vec![10.0, -3.0],
            Method::QuasiNewton,
            Config::default(),
        )
        .unwrap();
        assert!(outcome.converged(), "warnings: {:?}", outcome.warnings());
        assert!((outcome.final_values()[0] - 1.0).abs() < 1e-4);
        assert!((outcome.final_values()[1] - 2.0).abs() < 1e-4);
        assert!(outcome.fitting_error() < 1e-4);
    }

    #[test]
    fn constant_residual_converges_without_curvature_update() {
        // Zero gradient everywhere, so the first step is zero and the run
        // terminates immediately; the vanishing secant pair is never used.
        let outcome = optimize(
            |_x: &[f64]| vec![1.0, 2.0],
            vec![0.5, 0.5],
            Method::QuasiNewton,
            Config::default(),
        )
        .unwrap();
        assert!(outcome.converged());
        assert_eq!(outcome.final_values(), &[0.5, 0.5]);
        assert_eq!(outcome.iterations(), 1);
    }

    #[test]
    fn degenerate_bfgs_update_fails_explicitly() {
        // A zero secant pair makes both denominators exactly zero.
        let optimizer = Optimizer::new(
            linear_residual,
            vec![1.0, 2.0],
            Method::QuasiNewton,
            Config::default(),
            FiniteDifference::default(),
        )
        .unwrap();
        let error = optimizer
            .bfgs_update(&identity(2), &[1.0, 2.0], &[1.0, 2.0], &[0.0, 0.0])
            .unwrap_err();
        assert!(matches!(error, OptimizeError::DegenerateBfgsUpdate { .. }));
    }

    #[test]
    fn changing_residual_dimension_is_a_hard_error() {
        // Returns 2 residuals on the first call and 3 afterwards.
        let calls = std::cell::Cell::new(0usize);
        let shifty = move |x: &[f64]| {
            let n = calls.get();
            calls.set(n + 1);
            if n == 0 {
                vec![x[0], x[1]]
            } else {
                vec![x[0], x[1], 1.0]
            }
        };
        let failure = optimize(
            shifty,
            vec![1.0, 1.0],
            Method::GaussNewton,
            Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            failure.error,
            OptimizeError::InvalidDimension {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn singular_curvature_is_not_an_error() {
        // Two copies of the same residual row: J'J is rank 1.
        let redundant = |x: &[f64]| vec![x[0] + x[1] - 2.0, x[0] + x[1] - 2.0];
        let outcome = optimize(
            redundant,
            vec![5.0, 5.0],
            Method::GaussNewton,
            Config::default().with_step_tolerance(1e-10),
        )
        .unwrap();
        // The pseudo-inverse picks the minimum-norm step onto the solution
        // line x + y = 2.
        let total: f64 = outcome.final_values().iter().sum();
        assert!((total - 2.0).abs() < 1e-6, "x + y = {total}");
        assert!(outcome.converged());
    }

    #[test]
    fn iteration_budget_exhaustion_warns_but_returns_iterate() {
        let outcome = optimize(
            linear_residual,
            vec![10.0, -3.0],
            Method::GradientDescent { step_size: 0.001 },
            Config::default()
                .with_step_tolerance(1e-14)
                .with_max_iterations(3),
        )
        .unwrap();
        assert_eq!(outcome.iterations(), 3);
        assert!(!outcome.converged());
        assert!(
            outcome
                .warnings()
                .iter()
                .any(|w| matches!(w.content, WarningContent::DidNotConverge { iterations: 3 }))
        );
    }
}
