/// A non-fatal diagnostic raised while solving.
///
/// Warnings never abort a solve. They tell the caller about conditions that
/// have a well-defined best-effort answer but might not be what they wanted.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Warning {
    /// Which iteration raised it, if any. `None` for warnings about the
    /// whole problem rather than one iteration.
    pub about_iteration: Option<usize>,
    /// What went wrong.
    pub content: WarningContent,
}

/// The different kinds of warnings.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
#[non_exhaustive]
pub enum WarningContent {
    /// The iteration budget ran out before the step norm dropped below the
    /// tolerance. The last iterate is still returned.
    DidNotConverge {
        /// How many iterations were run.
        iterations: usize,
    },
    /// Backtracking shrank the trial step below the configured floor without
    /// ever satisfying the Armijo test, and the sub-floor step was accepted
    /// anyway. This caps backtracking depth; see [`crate::LineSearch::floor`].
    LineSearchFloor {
        /// The step scale that was accepted.
        t: f64,
    },
    /// The KKT matrix is numerically ill-conditioned. The returned answer is
    /// a minimum-norm least-squares solution and may not be a true
    /// constrained minimum.
    IllConditionedKkt {
        /// Estimated condition number (ratio of extreme singular values).
        condition: f64,
    },
    /// The reduced Hessian `Z'BZ` is numerically ill-conditioned, so the
    /// Second-Order Sufficiency Condition is in doubt.
    IllConditionedReducedHessian {
        /// Estimated condition number (ratio of extreme singular values).
        condition: f64,
    },
}

impl std::fmt::Display for WarningContent {
    #[mutants::skip]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningContent::DidNotConverge { iterations } => write!(
                f,
                "Did not converge within {iterations} iterations. The last iterate is still usable, but consider raising the iteration budget or loosening the step tolerance."
            ),
            WarningContent::LineSearchFloor { t } => write!(
                f,
                "Line search hit its backtracking floor and accepted a step scale of {t} without sufficient decrease"
            ),
            WarningContent::IllConditionedKkt { condition } => write!(
                f,
                "KKT matrix is ill-conditioned (condition estimate {condition:.2e}); the solution is a least-squares best effort"
            ),
            WarningContent::IllConditionedReducedHessian { condition } => write!(
                f,
                "Reduced Hessian is ill-conditioned (condition estimate {condition:.2e}); the solution is a least-squares best effort"
            ),
        }
    }
}
