//! Error types for the SCF driver and its collaborators

use crate::scf_impl::{EnergyTrace, ScfTimings};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScfError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScfError {
    /// The iteration cap was reached before the commutator error dropped
    /// below tolerance. The caller's electronic state is left untouched;
    /// the per-iteration record of the run is kept for diagnostics.
    #[error(
        "SCF did not converge after {iterations} iterations: error {final_error:.3e} >= tolerance {tolerance:.3e}"
    )]
    ConvergenceFailure {
        iterations: usize,
        final_error: f64,
        tolerance: f64,
        trace: EnergyTrace,
        timings: ScfTimings,
    },

    /// The DIIS linear system has no usable solution.
    #[error("DIIS system of size {size} is singular")]
    SingularSystem { size: usize },

    /// Extrapolation needs at least two stored pairs.
    #[error("DIIS extrapolation needs at least 2 stored vectors, found {len}")]
    InsufficientHistory { len: usize },

    #[error("dimension mismatch in {what}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("diagonalization failed: {0}")]
    Diagonalization(String),
}

impl ScfError {
    /// Errors the driver absorbs locally by skipping extrapolation.
    pub fn is_diis_recoverable(&self) -> bool {
        matches!(
            self,
            ScfError::SingularSystem { .. } | ScfError::InsufficientHistory { .. }
        )
    }
}

/// Ensure a matrix has the expected `rows x cols` shape.
pub(crate) fn check_shape(
    what: &'static str,
    matrix: &nalgebra::DMatrix<f64>,
    expected: (usize, usize),
) -> Result<()> {
    if matrix.shape() != expected {
        return Err(ScfError::DimensionMismatch {
            what,
            expected,
            found: matrix.shape(),
        });
    }
    Ok(())
}
