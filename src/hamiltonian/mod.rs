//! Fock matrix construction and electronic energy evaluation
//!
//! The SCF driver only sees the [`FockBuilder`] and [`EnergyEvaluator`]
//! traits. Two builders are provided: unrestricted Hartree-Fock over a table
//! of two-electron integrals, and the mean-field Hubbard model.

mod hubbard;
mod integrals;

pub use hubbard::{HubbardFock, HubbardModel};
pub use integrals::{IntegralFock, TwoElectronIntegrals};

use crate::error::Result;
use crate::state::ElectronicState;
use nalgebra::DMatrix;

/// Builds the spin Fock matrices from the current spin densities.
///
/// Implementations must be pure functions of the density: calling
/// `build_fock` twice on an unchanged state yields identical matrices.
pub trait FockBuilder {
    /// Refresh `state.fao_alp` and `state.fao_bet` from `state.p_alp` and
    /// `state.p_bet`.
    fn build_fock(&self, state: &mut ElectronicState) -> Result<()>;

    /// Constant energy added to the electronic energy for reporting.
    fn nuclear_repulsion(&self) -> f64 {
        0.0
    }
}

pub trait EnergyEvaluator {
    /// Electronic energy of one spin channel.
    fn energy_elec(&self, density: &DMatrix<f64>, core: &DMatrix<f64>, fock: &DMatrix<f64>) -> f64;

    /// Sum over both spin channels of `state`.
    fn total_energy(&self, state: &ElectronicState) -> f64 {
        self.energy_elec(&state.p_alp, &state.hao, &state.fao_alp)
            + self.energy_elec(&state.p_bet, &state.hao, &state.fao_bet)
    }
}

/// `E = 1/2 Σ_ij P_ij (H_ij + F_ij)`, valid for any Fock matrix that is the
/// core Hamiltonian plus a term linear in the density.
#[derive(Debug, Clone, Copy, Default)]
pub struct HartreeFockEnergy;

impl EnergyEvaluator for HartreeFockEnergy {
    fn energy_elec(&self, density: &DMatrix<f64>, core: &DMatrix<f64>, fock: &DMatrix<f64>) -> f64 {
        0.5 * density.component_mul(&(core + fock)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hartree_fock_energy_without_interaction() {
        // F = H gives E = Tr(P H)
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, -0.5, -0.5, 0.2]);
        let p = DMatrix::from_row_slice(2, 2, &[0.8, 0.4, 0.4, 0.2]);
        let e = HartreeFockEnergy.energy_elec(&p, &h, &h);
        let expected = (&p * &h).trace();
        assert!((e - expected).abs() < 1e-14);
    }
}
