use super::FockBuilder;
use crate::error::{Result, ScfError};
use crate::state::ElectronicState;
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Two-electron integrals `(pq|rs)` in chemists' notation, stored densely.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoElectronIntegrals {
    n: usize,
    values: Vec<f64>,
}

impl TwoElectronIntegrals {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            values: vec![0.0; n * n * n * n],
        }
    }

    /// Build the full table from symmetry-unique entries. Every entry is
    /// copied to its 8 permutationally equivalent positions.
    pub fn from_unique(n: usize, entries: &[(usize, usize, usize, usize, f64)]) -> Result<Self> {
        let mut eri = Self::zeros(n);
        for &(p, q, r, s, value) in entries {
            if p.max(q).max(r).max(s) >= n {
                return Err(ScfError::InvalidParameters(format!(
                    "two-electron index ({}, {}, {}, {}) out of range for {} orbitals",
                    p, q, r, s, n
                )));
            }
            for (a, b, c, d) in [
                (p, q, r, s),
                (q, p, r, s),
                (p, q, s, r),
                (q, p, s, r),
                (r, s, p, q),
                (s, r, p, q),
                (r, s, q, p),
                (s, r, q, p),
            ] {
                let idx = eri.index(a, b, c, d);
                eri.values[idx] = value;
            }
        }
        Ok(eri)
    }

    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    fn index(&self, p: usize, q: usize, r: usize, s: usize) -> usize {
        ((p * self.n + q) * self.n + r) * self.n + s
    }

    #[inline]
    pub fn get(&self, p: usize, q: usize, r: usize, s: usize) -> f64 {
        self.values[self.index(p, q, r, s)]
    }
}

/// Unrestricted Hartree-Fock Fock matrices
///
/// `F^σ_pq = H_pq + Σ_rs [(pq|rs) P_rs - (pr|qs) P^σ_rs]`
#[derive(Debug, Clone)]
pub struct IntegralFock {
    eri: TwoElectronIntegrals,
    nuclear_repulsion: f64,
}

impl IntegralFock {
    pub fn new(eri: TwoElectronIntegrals, nuclear_repulsion: f64) -> Self {
        Self {
            eri,
            nuclear_repulsion,
        }
    }

    pub fn integrals(&self) -> &TwoElectronIntegrals {
        &self.eri
    }
}

impl FockBuilder for IntegralFock {
    fn build_fock(&self, state: &mut ElectronicState) -> Result<()> {
        let n = state.norb;
        if self.eri.size() != n {
            return Err(ScfError::DimensionMismatch {
                what: "two-electron integrals",
                expected: (n, n),
                found: (self.eri.size(), self.eri.size()),
            });
        }

        let p_total = &state.p_alp + &state.p_bet;
        let p_alp = &state.p_alp;
        let p_bet = &state.p_bet;

        let pq_pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|p| (0..n).map(move |q| (p, q)))
            .collect();

        // (J, K^alpha, K^beta) for every (p, q), in parallel
        let jk_values: Vec<(f64, f64, f64)> = pq_pairs
            .par_iter()
            .map(|&(p, q)| {
                let mut j = 0.0;
                let mut ka = 0.0;
                let mut kb = 0.0;
                for r in 0..n {
                    for s in 0..n {
                        j += self.eri.get(p, q, r, s) * p_total[(r, s)];
                        let exchange = self.eri.get(p, r, q, s);
                        ka += exchange * p_alp[(r, s)];
                        kb += exchange * p_bet[(r, s)];
                    }
                }
                (j, ka, kb)
            })
            .collect();

        let mut fa = state.hao.clone();
        let mut fb = state.hao.clone();
        for (&(p, q), &(j, ka, kb)) in pq_pairs.iter().zip(jk_values.iter()) {
            fa[(p, q)] += j - ka;
            fb[(p, q)] += j - kb;
        }

        state.fao_alp = fa;
        state.fao_bet = fb;
        Ok(())
    }

    fn nuclear_repulsion(&self) -> f64 {
        self.nuclear_repulsion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// H2 / STO-3G at R = 1.4 bohr (Szabo & Ostlund, Table 3.5 / 3.6).
    fn h2_sto3g() -> (DMatrix<f64>, DMatrix<f64>, TwoElectronIntegrals, f64) {
        let s = DMatrix::from_row_slice(2, 2, &[1.0, 0.6593, 0.6593, 1.0]);
        let h = DMatrix::from_row_slice(2, 2, &[-1.1204, -0.9584, -0.9584, -1.1204]);
        let eri = TwoElectronIntegrals::from_unique(
            2,
            &[
                (0, 0, 0, 0, 0.7746),
                (1, 1, 1, 1, 0.7746),
                (0, 0, 1, 1, 0.5697),
                (1, 0, 0, 0, 0.4441),
                (1, 1, 1, 0, 0.4441),
                (1, 0, 1, 0, 0.2970),
            ],
        )
        .unwrap();
        (s, h, eri, 1.0 / 1.4)
    }

    #[test]
    fn test_eight_fold_symmetry() {
        let (_, _, eri, _) = h2_sto3g();
        assert_eq!(eri.get(1, 0, 0, 0), 0.4441);
        assert_eq!(eri.get(0, 1, 0, 0), 0.4441);
        assert_eq!(eri.get(0, 0, 0, 1), 0.4441);
        assert_eq!(eri.get(0, 0, 1, 0), 0.4441);
        assert_eq!(eri.get(1, 0, 1, 0), 0.2970);
        assert_eq!(eri.get(0, 1, 1, 0), 0.2970);
        assert_eq!(eri.get(1, 1, 0, 0), 0.5697);
    }

    #[test]
    fn test_out_of_range_index() {
        let result = TwoElectronIntegrals::from_unique(2, &[(0, 0, 0, 2, 1.0)]);
        assert!(matches!(result, Err(ScfError::InvalidParameters(_))));
    }

    #[test]
    fn test_zero_density_gives_core_hamiltonian() {
        let (s, h, eri, enuc) = h2_sto3g();
        let mut state = ElectronicState::new(s, h.clone(), 1, 1).unwrap();
        let fock = IntegralFock::new(eri, enuc);
        fock.build_fock(&mut state).unwrap();
        assert_eq!(state.fao_alp, h);
        assert_eq!(state.fao_bet, h);
        assert!((fock.nuclear_repulsion() - 0.7142857142857143).abs() < 1e-12);
    }

    #[test]
    fn test_fock_build_is_idempotent() {
        let (s, h, eri, enuc) = h2_sto3g();
        let mut state = ElectronicState::new(s, h, 1, 1).unwrap();
        let pa = DMatrix::from_row_slice(2, 2, &[0.4, 0.2, 0.2, 0.3]);
        let pb = DMatrix::from_row_slice(2, 2, &[0.3, 0.1, 0.1, 0.4]);
        state.set_density(pa, pb).unwrap();

        let fock = IntegralFock::new(eri, enuc);
        fock.build_fock(&mut state).unwrap();
        let (fa1, fb1) = (state.fao_alp.clone(), state.fao_bet.clone());
        fock.build_fock(&mut state).unwrap();
        assert_eq!(state.fao_alp, fa1);
        assert_eq!(state.fao_bet, fb1);
        // different spin densities give different exchange
        assert!((&fa1 - &fb1).norm() > 1e-6);
    }

    #[test]
    fn test_size_mismatch() {
        let (_, _, eri, enuc) = h2_sto3g();
        let mut state =
            ElectronicState::new(DMatrix::identity(3, 3), DMatrix::zeros(3, 3), 1, 1).unwrap();
        let result = IntegralFock::new(eri, enuc).build_fock(&mut state);
        assert!(matches!(result, Err(ScfError::DimensionMismatch { .. })));
    }
}
