mod cg;

pub use cg::*;

use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum Status {
    #[error("Success")]
    Success,
    #[error("Maximum number of linear solver iterations exceeded")]
    MaximumIterationsExceeded,
    #[error("Linear solve interrupted")]
    Interrupted,
    #[error("NaN detected")]
    NanDetected,
    #[error("Singular matrix detected")]
    SingularMatrix,
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

impl Status {
    /// Returns true if the solution is usable, even if the tolerance was not reached.
    pub fn is_usable(&self) -> bool {
        matches!(self, Status::Success | Status::MaximumIterationsExceeded)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct SolveResult {
    /// Number of iterations of an iterative solver.
    pub iterations: u32,
    /// Absolute residual 2-norm.
    pub residual: f64,
    /// Relative residual 2-norm.
    ///
    /// Residual divided by the norm of the right-hand-side.
    pub error: f64,
    /// Final status of the linear solve.
    pub status: Status,
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} after {} iterations (residual: {:.3e}, relative: {:.3e})",
            self.status, self.iterations, self.residual, self.error
        )
    }
}
