use crate::config::SystemConfig;
use crate::diagonalize::{EigenMethod, SymmetricDiagonalizer};
use crate::hamiltonian::{FockBuilder, HubbardModel, IntegralFock, TwoElectronIntegrals};
use crate::state::ElectronicState;
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::DMatrix;
use tracing::info;

/// Initial electronic state together with the Fock builder of its system.
pub struct PreparedSystem {
    pub state: ElectronicState,
    pub fock: Box<dyn FockBuilder>,
}

pub fn build_system(
    system: &SystemConfig,
    method: EigenMethod,
    spin_bias: f64,
) -> Result<PreparedSystem> {
    let diagonalizer = SymmetricDiagonalizer::default();
    match system {
        SystemConfig::Integrals {
            overlap,
            core_hamiltonian,
            two_electron,
            n_alpha,
            n_beta,
            nuclear_repulsion,
        } => {
            let sao = matrix_from_rows("overlap", overlap)?;
            let hao = matrix_from_rows("core_hamiltonian", core_hamiltonian)?;
            let norb = sao.nrows();
            info!(
                "Integral system: {} basis functions, {} unique two-electron integrals",
                norb,
                two_electron.len()
            );

            let eri = TwoElectronIntegrals::from_unique(norb, two_electron)
                .wrap_err("Invalid two-electron integrals")?;
            let state = ElectronicState::core_guess(
                sao,
                hao,
                *n_alpha,
                *n_beta,
                &diagonalizer,
                method,
                spin_bias,
            )
            .wrap_err("Failed to build the initial guess")?;

            Ok(PreparedSystem {
                state,
                fock: Box::new(IntegralFock::new(eri, *nuclear_repulsion)),
            })
        }
        SystemConfig::Hubbard {
            onsite,
            hopping,
            u,
            periodic,
            n_alpha,
            n_beta,
        } => {
            let model = HubbardModel {
                onsite: onsite.clone(),
                hopping: *hopping,
                u: *u,
                periodic: *periodic,
            };
            info!(
                "Hubbard {}: {} sites, t = {}, U = {}",
                if model.periodic { "ring" } else { "chain" },
                model.sites(),
                model.hopping,
                model.u
            );

            let state = ElectronicState::core_guess(
                model.overlap(),
                model.core_hamiltonian(),
                *n_alpha,
                *n_beta,
                &diagonalizer,
                method,
                spin_bias,
            )
            .wrap_err("Failed to build the initial guess")?;

            Ok(PreparedSystem {
                state,
                fock: Box::new(model.fock_builder()),
            })
        }
    }
}

/// Square matrix from nested YAML rows.
fn matrix_from_rows(name: &str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let n = rows.len();
    if n == 0 {
        return Err(eyre!("Matrix '{}' is empty", name));
    }
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
        return Err(eyre!(
            "Matrix '{}' must be {}x{}, row {} has {} entries",
            name,
            n,
            n,
            i,
            row.len()
        ));
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_from_rows() {
        let m = matrix_from_rows("s", &[vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
        assert_eq!(m[(0, 1)], 0.5);
        assert!(matrix_from_rows("s", &[vec![1.0, 0.5], vec![0.5]]).is_err());
        assert!(matrix_from_rows("s", &[]).is_err());
    }

    #[test]
    fn test_build_hubbard_system() {
        let config = SystemConfig::Hubbard {
            onsite: vec![0.0; 4],
            hopping: 1.0,
            u: 2.0,
            periodic: true,
            n_alpha: 2,
            n_beta: 2,
        };
        let system = build_system(&config, EigenMethod::Standard, 0.0).unwrap();
        assert_eq!(system.state.norb, 4);
        assert!((system.state.trace_density() - 4.0).abs() < 1e-10);
        assert_eq!(system.fock.nuclear_repulsion(), 0.0);
    }

    #[test]
    fn test_too_many_electrons() {
        let config = SystemConfig::Hubbard {
            onsite: vec![0.0; 2],
            hopping: 1.0,
            u: 2.0,
            periodic: false,
            n_alpha: 3,
            n_beta: 0,
        };
        assert!(build_system(&config, EigenMethod::Standard, 0.0).is_err());
    }
}
