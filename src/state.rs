//! Electronic structure of an unrestricted (spin-resolved) calculation

use crate::diagonalize::{Diagonalizer, EigenMethod, Orbitals, Population};
use crate::error::{check_shape, Result, ScfError};
use nalgebra::{DMatrix, DVector};
use tracing::info;

/// Densities, Fock matrices and orbitals for both spin channels.
///
/// All matrices are `norb x norb`. The overlap `sao` and the core Hamiltonian
/// `hao` stay fixed during a run; the total density `p` always equals
/// `p_alp + p_bet` after [`ElectronicState::set_density`].
#[derive(Debug, Clone, PartialEq)]
pub struct ElectronicState {
    pub norb: usize,
    pub nocc_alp: usize,
    pub nocc_bet: usize,

    pub p: DMatrix<f64>,
    pub p_alp: DMatrix<f64>,
    pub p_bet: DMatrix<f64>,

    pub fao_alp: DMatrix<f64>,
    pub fao_bet: DMatrix<f64>,

    pub c_alp: DMatrix<f64>,
    pub c_bet: DMatrix<f64>,
    pub e_alp: DVector<f64>,
    pub e_bet: DVector<f64>,
    pub occ_alp: DVector<f64>,
    pub occ_bet: DVector<f64>,

    pub sao: DMatrix<f64>,
    pub hao: DMatrix<f64>,
}

impl ElectronicState {
    /// Empty state with zero densities. Fock matrices start as the core
    /// Hamiltonian.
    pub fn new(
        sao: DMatrix<f64>,
        hao: DMatrix<f64>,
        nocc_alp: usize,
        nocc_bet: usize,
    ) -> Result<Self> {
        let norb = sao.nrows();
        if !sao.is_square() {
            return Err(ScfError::DimensionMismatch {
                what: "overlap matrix",
                expected: (norb, norb),
                found: sao.shape(),
            });
        }
        check_shape("core Hamiltonian", &hao, (norb, norb))?;
        if nocc_alp > norb || nocc_bet > norb {
            return Err(ScfError::InvalidParameters(format!(
                "{} alpha / {} beta electrons exceed {} orbitals",
                nocc_alp, nocc_bet, norb
            )));
        }

        Ok(ElectronicState {
            norb,
            nocc_alp,
            nocc_bet,
            p: DMatrix::zeros(norb, norb),
            p_alp: DMatrix::zeros(norb, norb),
            p_bet: DMatrix::zeros(norb, norb),
            fao_alp: hao.clone(),
            fao_bet: hao.clone(),
            c_alp: DMatrix::zeros(norb, norb),
            c_bet: DMatrix::zeros(norb, norb),
            e_alp: DVector::zeros(norb),
            e_bet: DVector::zeros(norb),
            occ_alp: DVector::zeros(norb),
            occ_bet: DVector::zeros(norb),
            sao,
            hao,
        })
    }

    /// Starting guess from the eigenvectors of the core Hamiltonian.
    ///
    /// A non-zero `spin_bias` adds `+bias, -bias, +bias, ...` to the diagonal
    /// of the alpha core Hamiltonian and the opposite pattern to the beta one,
    /// which seeds broken-symmetry (antiferromagnetic) solutions.
    pub fn core_guess(
        sao: DMatrix<f64>,
        hao: DMatrix<f64>,
        nocc_alp: usize,
        nocc_bet: usize,
        diagonalizer: &impl Diagonalizer,
        method: EigenMethod,
        spin_bias: f64,
    ) -> Result<Self> {
        let mut state = Self::new(sao, hao, nocc_alp, nocc_bet)?;
        info!("  Building core-Hamiltonian guess (spin bias {:.3})", spin_bias);

        let mut h_alp = state.hao.clone();
        let mut h_bet = state.hao.clone();
        for i in 0..state.norb {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            h_alp[(i, i)] += sign * spin_bias;
            h_bet[(i, i)] -= sign * spin_bias;
        }

        let alp = diagonalizer.diagonalize(&h_alp, &state.sao, nocc_alp, method, Population::Aufbau)?;
        let bet = diagonalizer.diagonalize(&h_bet, &state.sao, nocc_bet, method, Population::Aufbau)?;
        state.set_orbitals_alp(&alp);
        state.set_orbitals_bet(&bet);
        state.set_density(alp.density, bet.density)?;
        Ok(state)
    }

    /// Replace both spin densities and rebuild the total density.
    pub fn set_density(&mut self, p_alp: DMatrix<f64>, p_bet: DMatrix<f64>) -> Result<()> {
        let shape = (self.norb, self.norb);
        check_shape("alpha density", &p_alp, shape)?;
        check_shape("beta density", &p_bet, shape)?;
        self.p = &p_alp + &p_bet;
        self.p_alp = p_alp;
        self.p_bet = p_bet;
        Ok(())
    }

    pub fn set_orbitals_alp(&mut self, orbitals: &Orbitals) {
        self.c_alp = orbitals.coefficients.clone();
        self.e_alp = orbitals.energies.clone();
        self.occ_alp = orbitals.occupations.clone();
    }

    pub fn set_orbitals_bet(&mut self, orbitals: &Orbitals) {
        self.c_bet = orbitals.coefficients.clone();
        self.e_bet = orbitals.energies.clone();
        self.occ_bet = orbitals.occupations.clone();
    }

    /// `Tr(S·P)`, the number of electrons for a properly normalized density.
    pub fn trace_density(&self) -> f64 {
        (&self.sao * &self.p).trace()
    }

    /// Expectation value `<S^2>` of the unrestricted determinant.
    pub fn spin_contamination(&self) -> f64 {
        spin_squared(
            self.nocc_alp,
            self.nocc_bet,
            &self.p_alp,
            &self.p_bet,
            &self.sao,
        )
    }

    /// Verify that every matrix matches `norb`.
    pub fn check_dimensions(&self) -> Result<()> {
        let shape = (self.norb, self.norb);
        for (what, m) in [
            ("total density", &self.p),
            ("alpha density", &self.p_alp),
            ("beta density", &self.p_bet),
            ("alpha Fock matrix", &self.fao_alp),
            ("beta Fock matrix", &self.fao_bet),
            ("overlap matrix", &self.sao),
            ("core Hamiltonian", &self.hao),
        ] {
            check_shape(what, m, shape)?;
        }
        Ok(())
    }
}

/// `<S^2> = S_z^2 + (N_alpha + N_beta) / 2 - Tr(P_alpha S P_beta S)` with
/// `S_z = (N_alpha - N_beta) / 2`.
pub fn spin_squared(
    nocc_alp: usize,
    nocc_bet: usize,
    p_alp: &DMatrix<f64>,
    p_bet: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) -> f64 {
    let sz = 0.5 * (nocc_alp as f64 - nocc_bet as f64);
    let overlap_term = (p_alp * overlap * p_bet * overlap).trace();
    sz * sz + 0.5 * (nocc_alp + nocc_bet) as f64 - overlap_term
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagonalize::SymmetricDiagonalizer;

    fn chain_hamiltonian(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| if i.abs_diff(j) == 1 { -1.0 } else { 0.0 })
    }

    #[test]
    fn test_new_rejects_mismatched_core_hamiltonian() {
        let result = ElectronicState::new(DMatrix::identity(3, 3), DMatrix::zeros(2, 2), 1, 1);
        assert!(matches!(result, Err(ScfError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_new_rejects_too_many_electrons() {
        let result = ElectronicState::new(DMatrix::identity(2, 2), DMatrix::zeros(2, 2), 3, 0);
        assert!(matches!(result, Err(ScfError::InvalidParameters(_))));
    }

    #[test]
    fn test_set_density_keeps_total_in_sync() {
        let mut state =
            ElectronicState::new(DMatrix::identity(2, 2), DMatrix::zeros(2, 2), 1, 1).unwrap();
        let pa = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let pb = DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 0.5, 0.5]);
        state.set_density(pa.clone(), pb.clone()).unwrap();
        assert_eq!(state.p, pa + pb);

        assert!(state
            .set_density(DMatrix::zeros(3, 3), DMatrix::zeros(2, 2))
            .is_err());
    }

    #[test]
    fn test_core_guess_electron_count() {
        let state = ElectronicState::core_guess(
            DMatrix::identity(4, 4),
            chain_hamiltonian(4),
            2,
            1,
            &SymmetricDiagonalizer::default(),
            EigenMethod::Generalized,
            0.0,
        )
        .unwrap();

        assert!((state.trace_density() - 3.0).abs() < 1e-10);
        assert!((state.p_alp.trace() - 2.0).abs() < 1e-10);
        assert!((state.p_bet.trace() - 1.0).abs() < 1e-10);
        assert!(state.check_dimensions().is_ok());
    }

    #[test]
    fn test_spin_bias_polarizes_guess() {
        let state = ElectronicState::core_guess(
            DMatrix::identity(2, 2),
            chain_hamiltonian(2),
            1,
            1,
            &SymmetricDiagonalizer::default(),
            EigenMethod::Standard,
            0.5,
        )
        .unwrap();

        // alpha prefers site 1 (lowered by the bias), beta site 0
        assert!(state.p_alp[(1, 1)] > state.p_alp[(0, 0)]);
        assert!(state.p_bet[(0, 0)] > state.p_bet[(1, 1)]);
        assert!(state.spin_contamination() > 0.0);
    }

    #[test]
    fn test_closed_shell_has_no_spin_contamination() {
        let state = ElectronicState::core_guess(
            DMatrix::identity(4, 4),
            chain_hamiltonian(4),
            2,
            2,
            &SymmetricDiagonalizer::default(),
            EigenMethod::Standard,
            0.0,
        )
        .unwrap();
        assert!(state.spin_contamination().abs() < 1e-10);
    }
}
