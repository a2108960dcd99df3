//! Removal of spin contamination from unrestricted spin densities
//!
//! Applied once after SCF convergence, before the final energy evaluation.

use crate::diagonalize::OVERLAP_THRESHOLD;
use crate::error::{Result, ScfError};
use crate::state::spin_squared;
use nalgebra::DMatrix;
use std::cmp::Ordering;
use tracing::info;

pub trait Annihilator {
    /// Adjust `p_alp` and `p_bet` in place.
    fn annihilate(
        &self,
        nocc_alp: usize,
        nocc_bet: usize,
        p_alp: &mut DMatrix<f64>,
        p_bet: &mut DMatrix<f64>,
    ) -> Result<()>;
}

/// Re-occupies the natural orbitals of the total density in high-spin
/// fashion: the `N_alpha` most occupied natural orbitals carry the alpha
/// electrons and the `N_beta` most occupied ones the beta electrons. The
/// resulting determinant is an eigenfunction of `S^2` with
/// `S = (N_alpha - N_beta) / 2`.
///
/// The densities are assumed to be expressed in an orthonormal basis.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrbitalAnnihilator;

impl Annihilator for NaturalOrbitalAnnihilator {
    fn annihilate(
        &self,
        nocc_alp: usize,
        nocc_bet: usize,
        p_alp: &mut DMatrix<f64>,
        p_bet: &mut DMatrix<f64>,
    ) -> Result<()> {
        let n = p_alp.nrows();
        if !p_alp.is_square() || p_bet.shape() != (n, n) {
            return Err(ScfError::DimensionMismatch {
                what: "annihilation densities",
                expected: (n, n),
                found: p_bet.shape(),
            });
        }
        if nocc_alp > n || nocc_bet > n {
            return Err(ScfError::InvalidParameters(format!(
                "cannot place {} alpha / {} beta electrons in {} orbitals",
                nocc_alp, nocc_bet, n
            )));
        }

        let identity = DMatrix::identity(n, n);
        let before = spin_squared(nocc_alp, nocc_bet, p_alp, p_bet, &identity);

        let total = &*p_alp + &*p_bet;
        let eig = total.symmetric_eigen();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            eig.eigenvalues[b]
                .partial_cmp(&eig.eigenvalues[a])
                .unwrap_or(Ordering::Equal)
        });

        let natural = eig.eigenvectors.select_columns(&order);
        let projector = |count: usize| {
            let c = natural.columns(0, count);
            &c * c.transpose()
        };
        *p_alp = projector(nocc_alp);
        *p_bet = projector(nocc_bet);

        let after = spin_squared(nocc_alp, nocc_bet, p_alp, p_bet, &identity);
        info!("  Spin annihilation: <S^2> {:.6} -> {:.6}", before, after);
        Ok(())
    }
}

/// `(S^{1/2}, S^{-1/2})` of a positive definite overlap matrix.
///
/// Densities map into the orthonormal Löwdin basis as `S^{1/2} P S^{1/2}`
/// and back as `S^{-1/2} P' S^{-1/2}`.
pub fn lowdin_factors(overlap: &DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let eig = overlap.clone().symmetric_eigen();
    if let Some(smallest) = eig
        .eigenvalues
        .iter()
        .copied()
        .find(|&s| s <= OVERLAP_THRESHOLD)
    {
        return Err(ScfError::Diagonalization(format!(
            "overlap matrix is not positive definite (eigenvalue {:.3e})",
            smallest
        )));
    }
    let u = &eig.eigenvectors;
    let half = u * DMatrix::from_diagonal(&eig.eigenvalues.map(f64::sqrt)) * u.transpose();
    let inv_half =
        u * DMatrix::from_diagonal(&eig.eigenvalues.map(|s| 1.0 / s.sqrt())) * u.transpose();
    Ok((half, inv_half))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagonalize::{EigenMethod, SymmetricDiagonalizer};
    use crate::state::ElectronicState;

    fn biased_state(nocc_alp: usize, nocc_bet: usize) -> ElectronicState {
        let h = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, -1.0, 0.0, -1.0, 0.1, -1.0, 0.0, -1.0, 0.3],
        );
        ElectronicState::core_guess(
            DMatrix::identity(3, 3),
            h,
            nocc_alp,
            nocc_bet,
            &SymmetricDiagonalizer::default(),
            EigenMethod::Standard,
            0.7,
        )
        .unwrap()
    }

    #[test]
    fn test_removes_spin_contamination() {
        let state = biased_state(2, 1);
        let identity = DMatrix::identity(3, 3);
        assert!(state.spin_contamination() > 0.75 + 1e-3);

        let (mut pa, mut pb) = (state.p_alp.clone(), state.p_bet.clone());
        NaturalOrbitalAnnihilator
            .annihilate(2, 1, &mut pa, &mut pb)
            .unwrap();

        assert!((spin_squared(2, 1, &pa, &pb, &identity) - 0.75).abs() < 1e-10);
        assert!((pa.trace() - 2.0).abs() < 1e-10);
        assert!((pb.trace() - 1.0).abs() < 1e-10);
        assert!((&pa * &pa - &pa).norm() < 1e-10);
    }

    #[test]
    fn test_closed_shell_is_unchanged() {
        let state = biased_state(1, 1);
        // identical spin densities
        let (mut pa, mut pb) = (state.p_alp.clone(), state.p_alp.clone());
        let original = pa.clone();
        NaturalOrbitalAnnihilator
            .annihilate(1, 1, &mut pa, &mut pb)
            .unwrap();

        assert!((&pa - &original).norm() < 1e-10);
        assert!((&pb - &original).norm() < 1e-10);
    }

    #[test]
    fn test_lowdin_factors_invert_each_other() {
        let s = DMatrix::from_row_slice(2, 2, &[1.0, 0.4, 0.4, 1.0]);
        let (half, inv_half) = lowdin_factors(&s).unwrap();
        assert!((&half * &half - &s).norm() < 1e-12);
        assert!((&half * &inv_half - DMatrix::<f64>::identity(2, 2)).norm() < 1e-12);

        let singular = DMatrix::from_element(2, 2, 1.0);
        assert!(matches!(
            lowdin_factors(&singular),
            Err(ScfError::Diagonalization(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_densities() {
        let mut pa = DMatrix::identity(2, 2);
        let mut pb = DMatrix::identity(3, 3);
        let result = NaturalOrbitalAnnihilator.annihilate(1, 1, &mut pa, &mut pb);
        assert!(matches!(result, Err(ScfError::DimensionMismatch { .. })));
    }
}
