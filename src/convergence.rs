//! Commutator-based convergence metric
//!
//! At self-consistency the Fock matrix commutes with the density matrix in the
//! metric of the overlap matrix, so `FPS - SPF` vanishes. The largest element
//! of this commutator is the per-channel error used by the SCF driver, and the
//! commutator itself is the DIIS error vector.

use crate::error::{check_shape, Result, ScfError};
use nalgebra::DMatrix;

/// Calculate the error matrix `F·P·S - S·P·F`.
///
/// All three matrices must be square and of the same dimension.
pub fn commutator_error(
    fock: &DMatrix<f64>,
    density: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let n = fock.nrows();
    if !fock.is_square() {
        return Err(ScfError::DimensionMismatch {
            what: "Fock matrix",
            expected: (n, n),
            found: fock.shape(),
        });
    }
    check_shape("density matrix", density, (n, n))?;
    check_shape("overlap matrix", overlap, (n, n))?;

    let fps = fock * density * overlap;
    let spf = overlap * density * fock;
    Ok(fps - spf)
}

/// Largest absolute entry of a matrix, 0 for an empty one.
pub fn max_abs_element(matrix: &DMatrix<f64>) -> f64 {
    matrix.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Error of a single spin channel: `max |FPS - SPF|`.
pub fn density_error(
    fock: &DMatrix<f64>,
    density: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) -> Result<f64> {
    commutator_error(fock, density, overlap).map(|err| max_abs_element(&err))
}

/// Commutator errors of both spin channels for one iteration.
#[derive(Debug, Clone)]
pub struct ChannelErrors {
    pub alpha: DMatrix<f64>,
    pub beta: DMatrix<f64>,
}

impl ChannelErrors {
    pub fn new(
        fock_alpha: &DMatrix<f64>,
        density_alpha: &DMatrix<f64>,
        fock_beta: &DMatrix<f64>,
        density_beta: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
    ) -> Result<Self> {
        Ok(Self {
            alpha: commutator_error(fock_alpha, density_alpha, overlap)?,
            beta: commutator_error(fock_beta, density_beta, overlap)?,
        })
    }

    /// Unweighted sum of the per-channel maxima.
    pub fn total(&self) -> f64 {
        max_abs_element(&self.alpha) + max_abs_element(&self.beta)
    }
}
