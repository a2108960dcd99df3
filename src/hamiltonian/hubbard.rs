use super::FockBuilder;
use crate::error::{Result, ScfError};
use crate::state::ElectronicState;
use nalgebra::DMatrix;

/// One-band Hubbard chain (or ring) in an orthonormal site basis.
#[derive(Debug, Clone)]
pub struct HubbardModel {
    /// On-site energies, one per site.
    pub onsite: Vec<f64>,
    /// Nearest-neighbour hopping `t`; the matrix element is `-t`.
    pub hopping: f64,
    /// On-site repulsion `U`.
    pub u: f64,
    /// Close the chain into a ring.
    pub periodic: bool,
}

impl HubbardModel {
    pub fn sites(&self) -> usize {
        self.onsite.len()
    }

    pub fn core_hamiltonian(&self) -> DMatrix<f64> {
        let n = self.sites();
        let mut h = DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(&self.onsite));
        for i in 0..n.saturating_sub(1) {
            h[(i, i + 1)] = -self.hopping;
            h[(i + 1, i)] = -self.hopping;
        }
        if self.periodic && n > 2 {
            h[(0, n - 1)] = -self.hopping;
            h[(n - 1, 0)] = -self.hopping;
        }
        h
    }

    pub fn overlap(&self) -> DMatrix<f64> {
        DMatrix::identity(self.sites(), self.sites())
    }

    pub fn fock_builder(&self) -> HubbardFock {
        HubbardFock { u: self.u }
    }
}

/// Mean-field Hubbard Fock matrices
///
/// `F^α = H + U diag(P^β)`, `F^β = H + U diag(P^α)`
#[derive(Debug, Clone, Copy)]
pub struct HubbardFock {
    pub u: f64,
}

impl FockBuilder for HubbardFock {
    fn build_fock(&self, state: &mut ElectronicState) -> Result<()> {
        let n = state.norb;
        if state.p_alp.shape() != (n, n) || state.p_bet.shape() != (n, n) {
            return Err(ScfError::DimensionMismatch {
                what: "Hubbard spin densities",
                expected: (n, n),
                found: state.p_alp.shape(),
            });
        }

        let mut fa = state.hao.clone();
        let mut fb = state.hao.clone();
        for i in 0..n {
            fa[(i, i)] += self.u * state.p_bet[(i, i)];
            fb[(i, i)] += self.u * state.p_alp[(i, i)];
        }
        state.fao_alp = fa;
        state.fao_bet = fb;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamiltonian::{EnergyEvaluator, HartreeFockEnergy};

    fn ring(n: usize) -> HubbardModel {
        HubbardModel {
            onsite: vec![0.0; n],
            hopping: 1.0,
            u: 2.0,
            periodic: true,
        }
    }

    #[test]
    fn test_core_hamiltonian_ring() {
        let h = ring(4).core_hamiltonian();
        assert_eq!(h[(0, 1)], -1.0);
        assert_eq!(h[(3, 0)], -1.0);
        assert_eq!(h[(0, 2)], 0.0);
        assert_eq!(h.transpose(), h);
    }

    #[test]
    fn test_open_chain_has_no_wraparound() {
        let mut model = ring(3);
        model.periodic = false;
        let h = model.core_hamiltonian();
        assert_eq!(h[(0, 2)], 0.0);
        assert_eq!(h[(1, 2)], -1.0);
    }

    #[test]
    fn test_fock_couples_opposite_spin() {
        let model = ring(2);
        let mut state =
            ElectronicState::new(model.overlap(), model.core_hamiltonian(), 1, 1).unwrap();
        let pa = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let pb = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, 1.0]);
        state.set_density(pa, pb).unwrap();

        model.fock_builder().build_fock(&mut state).unwrap();
        assert_eq!(state.fao_alp[(0, 0)], 0.0);
        assert_eq!(state.fao_alp[(1, 1)], 2.0);
        assert_eq!(state.fao_bet[(0, 0)], 2.0);
        assert_eq!(state.fao_bet[(1, 1)], 0.0);

        // fully localized antiparallel spins: no double occupancy, no hopping
        let energy = HartreeFockEnergy.total_energy(&state);
        assert!(energy.abs() < 1e-14);
    }

    #[test]
    fn test_mean_field_energy_counts_double_occupancy() {
        let model = ring(2);
        let mut state =
            ElectronicState::new(model.overlap(), model.core_hamiltonian(), 1, 1).unwrap();
        let half = DMatrix::from_element(2, 2, 0.5);
        state.set_density(half.clone(), half).unwrap();
        model.fock_builder().build_fock(&mut state).unwrap();

        // Tr(P H) + U Σ_i P^α_ii P^β_ii = -2 + 2 * 2 * 0.25
        let energy = HartreeFockEnergy.total_energy(&state);
        assert!((energy + 1.0).abs() < 1e-14);
    }
}
