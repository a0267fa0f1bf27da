use faer::linalg::svd::SvdError;

/// Errors that could occur while running the iterative optimizer.
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum OptimizeError {
    /// The residual function returned a vector whose length doesn't match
    /// what it returned at construction time. We refuse to silently reshape.
    #[error(
        "Residual function returned {actual} values but returned {expected} at construction time"
    )]
    InvalidDimension {
        /// How many residuals the function produced at construction time.
        expected: usize,
        /// How many residuals it produced now.
        actual: usize,
    },
    /// You provided an empty problem (no parameters, or no residuals).
    #[error("Cannot optimize an empty system")]
    EmptySystemNotAllowed,
    /// The BFGS rank-2 update would divide by a numerically-zero denominator.
    /// Dividing through anyway would propagate NaN through every later
    /// iterate, so we abort instead, keeping the best iterate so far.
    #[error("Degenerate BFGS update: s'Bs = {s_bs}, s'y = {s_y}; both must be nonzero")]
    DegenerateBfgsUpdate {
        /// The `s'Bs` denominator of the rank-1 subtraction term.
        s_bs: f64,
        /// The `s'y` denominator of the secant term.
        s_y: f64,
    },
    /// Faer: could not decompose a matrix.
    #[error("Something went wrong doing SVD in faer")]
    FaerSvd(SvdError),
}

/// Errors that could occur while solving an equality-constrained QP.
///
/// Singular or indefinite inputs are deliberately NOT errors: both KKT
/// methods degrade to a minimum-norm least-squares answer. Only structurally
/// invalid shapes are rejected.
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum QpError {
    /// The objective curvature matrix must be square and match the length
    /// of the linear cost vector.
    #[error(
        "Objective shapes don't agree: curvature is {rows}x{cols} but the linear cost has {linear} entries"
    )]
    ObjectiveShape {
        /// Rows of the curvature matrix.
        rows: usize,
        /// Columns of the curvature matrix.
        cols: usize,
        /// Length of the linear cost vector.
        linear: usize,
    },
    /// The constraint Jacobian must have one column per variable and one
    /// offset entry per row.
    #[error(
        "Constraint shapes don't agree: Jacobian is {rows}x{cols}, offset has {offset} entries, problem has {variables} variables"
    )]
    ConstraintShape {
        /// Rows of the constraint Jacobian.
        rows: usize,
        /// Columns of the constraint Jacobian.
        cols: usize,
        /// Length of the constraint offset vector.
        offset: usize,
        /// Number of variables in the objective.
        variables: usize,
    },
    /// More equality constraints than variables. The KKT system would be
    /// overdetermined in a way neither method is meant for.
    #[error("There must be at most as many constraints ({constraints}) as variables ({variables})")]
    TooManyConstraints {
        /// Number of constraint rows.
        constraints: usize,
        /// Number of variables.
        variables: usize,
    },
    /// You provided an empty problem.
    #[error("Cannot solve an empty system")]
    EmptySystemNotAllowed,
    /// Faer: could not decompose a matrix.
    #[error("Something went wrong doing SVD in faer")]
    FaerSvd(SvdError),
}

impl From<SvdError> for OptimizeError {
    fn from(error: SvdError) -> Self {
        Self::FaerSvd(error)
    }
}

impl From<crate::diff::DimensionMismatch> for OptimizeError {
    fn from(error: crate::diff::DimensionMismatch) -> Self {
        Self::InvalidDimension {
            expected: error.expected,
            actual: error.actual,
        }
    }
}

impl From<SvdError> for QpError {
    fn from(error: SvdError) -> Self {
        Self::FaerSvd(error)
    }
}
