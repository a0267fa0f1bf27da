use crate::{OptimizeError, Warning};

/// Data from a successful optimization run.
#[derive(Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct OptimizeOutcome {
    /// Each parameter's final value.
    pub(crate) final_values: Vec<f64>,
    /// How many iterations were required?
    pub(crate) iterations: usize,
    /// Squared-error objective `F(x)·F(x)` at the final iterate.
    pub(crate) objective: f64,
    /// Norm of the residual vector at the final iterate.
    pub(crate) fitting_error: f64,
    /// Anything non-fatal that went wrong during solving.
    pub(crate) warnings: Vec<Warning>,
}

impl OptimizeOutcome {
    /// Each parameter's final value.
    pub fn final_values(&self) -> &[f64] {
        &self.final_values
    }

    /// How many iterations were required?
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Squared-error objective `F(x)·F(x)` at the final iterate.
    ///
    /// This is a sum over residuals, not a mean, so its scale grows with the
    /// residual count. Pick step tolerances accordingly.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Norm of the residual vector at the final iterate,
    /// i.e. how far the model is from fitting its targets.
    pub fn fitting_error(&self) -> f64 {
        self.fitting_error
    }

    /// Anything non-fatal that went wrong during solving.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Did the run stop because the step norm dropped below the tolerance,
    /// rather than because the iteration budget ran out?
    pub fn converged(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w.content, crate::WarningContent::DidNotConverge { .. }))
    }
}

/// Returned when the optimizer could not finish a run.
#[derive(Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct FailureOutcome {
    /// The error that stopped the run.
    pub error: OptimizeError,
    /// The best iterate found before the error. For errors at construction
    /// time this is the initial guess, unchanged.
    pub best: Vec<f64>,
    /// How many iterations completed before the error.
    pub iterations: usize,
    /// Any warnings raised before the error.
    pub warnings: Vec<Warning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WarningContent;

    #[test]
    fn convergence_getter() {
        let converged = OptimizeOutcome {
            final_values: vec![0.3],
            iterations: 4,
            objective: 0.0,
            fitting_error: 0.0,
            warnings: Vec::new(),
        };
        assert!(converged.converged());

        let ran_out = OptimizeOutcome {
            final_values: vec![0.3],
            iterations: 100,
            objective: 1.8,
            fitting_error: 1.3416407864998738,
            warnings: vec![Warning {
                about_iteration: None,
                content: WarningContent::DidNotConverge { iterations: 100 },
            }],
        };
        assert!(!ran_out.converged());
    }
}
