//! Fock matrix diagonalization and orbital population
//!
//! Turns a Fock matrix into orbital coefficients, orbital energies, occupation
//! numbers and the resulting spin density matrix `P = C n C^T`.

use crate::error::{check_shape, Result, ScfError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Eigenvalues of the overlap matrix below this are treated as linear
/// dependencies and dropped from the orthogonal basis.
pub const OVERLAP_THRESHOLD: f64 = 1e-10;

/// Which eigenproblem to solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EigenMethod {
    /// `F C = S C E` for a non-orthogonal basis.
    #[default]
    Generalized,
    /// `F C = C E`; the overlap matrix is ignored.
    Standard,
}

/// How electrons are distributed over the orbitals of one spin channel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Population {
    /// Lowest `nocc` orbitals singly occupied.
    #[default]
    Aufbau,
    /// Fermi–Dirac smearing with `kT = temperature` (Hartree).
    Fermi { temperature: f64 },
}

/// Result of diagonalizing one spin channel. Columns of `coefficients` and
/// entries of `energies`/`occupations` are sorted by ascending energy.
#[derive(Debug, Clone)]
pub struct Orbitals {
    pub coefficients: DMatrix<f64>,
    pub energies: DVector<f64>,
    pub occupations: DVector<f64>,
    pub density: DMatrix<f64>,
}

pub trait Diagonalizer {
    fn diagonalize(
        &self,
        fock: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
        nocc: usize,
        method: EigenMethod,
        population: Population,
    ) -> Result<Orbitals>;
}

/// Dense symmetric eigensolver based on `nalgebra::SymmetricEigen`.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricDiagonalizer {
    pub overlap_threshold: f64,
}

impl Default for SymmetricDiagonalizer {
    fn default() -> Self {
        Self {
            overlap_threshold: OVERLAP_THRESHOLD,
        }
    }
}

impl SymmetricDiagonalizer {
    /// Canonical orthogonalizer `X = U s^{-1/2}` restricted to overlap
    /// eigenvalues above the threshold, so that `X^T S X = 1`.
    pub fn orthogonalizer(&self, overlap: &DMatrix<f64>) -> DMatrix<f64> {
        let eig = overlap.clone().symmetric_eigen();
        let kept: Vec<usize> = (0..eig.eigenvalues.len())
            .filter(|&i| eig.eigenvalues[i] > self.overlap_threshold)
            .collect();

        let mut x = eig.eigenvectors.select_columns(&kept);
        for (col, &i) in kept.iter().enumerate() {
            let inv_sqrt = 1.0 / eig.eigenvalues[i].sqrt();
            x.column_mut(col).scale_mut(inv_sqrt);
        }
        x
    }

    /// Eigenpairs sorted by ascending energy. For a rank-deficient overlap
    /// the missing orbitals are padded with zero columns at `+inf`.
    fn solve(
        &self,
        fock: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
        method: EigenMethod,
    ) -> (DMatrix<f64>, DVector<f64>) {
        let n = fock.nrows();
        let (vectors, values) = match method {
            EigenMethod::Standard => {
                let eig = fock.clone().symmetric_eigen();
                (eig.eigenvectors, eig.eigenvalues)
            }
            EigenMethod::Generalized => {
                let x = self.orthogonalizer(overlap);
                let f_prime = x.transpose() * fock * &x;
                let eig = f_prime.symmetric_eigen();
                (x * eig.eigenvectors, eig.eigenvalues)
            }
        };

        let mut indices: Vec<usize> = (0..values.len()).collect();
        indices.sort_by(|&a, &b| {
            values[a]
                .partial_cmp(&values[b])
                .unwrap_or(Ordering::Equal)
        });

        let mut coefficients = DMatrix::zeros(n, n);
        let mut energies = DVector::from_element(n, f64::INFINITY);
        for (col, &i) in indices.iter().enumerate() {
            coefficients.set_column(col, &vectors.column(i));
            energies[col] = values[i];
        }

        (align_eigenvectors(coefficients), energies)
    }
}

impl Diagonalizer for SymmetricDiagonalizer {
    fn diagonalize(
        &self,
        fock: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
        nocc: usize,
        method: EigenMethod,
        population: Population,
    ) -> Result<Orbitals> {
        let n = fock.nrows();
        if !fock.is_square() {
            return Err(ScfError::DimensionMismatch {
                what: "Fock matrix",
                expected: (n, n),
                found: fock.shape(),
            });
        }
        check_shape("overlap matrix", overlap, (n, n))?;

        let (coefficients, energies) = self.solve(fock, overlap, method);
        let occupations = match population {
            Population::Aufbau => aufbau_occupations(&energies, nocc)?,
            Population::Fermi { temperature } => fermi_occupations(&energies, nocc, temperature)?,
        };
        let density = density_from_orbitals(&coefficients, &occupations);

        Ok(Orbitals {
            coefficients,
            energies,
            occupations,
            density,
        })
    }
}

/// Flip each eigenvector so that its largest-magnitude entry is positive.
pub fn align_eigenvectors(mut eigvecs: DMatrix<f64>) -> DMatrix<f64> {
    for j in 0..eigvecs.ncols() {
        let max_val = eigvecs
            .column(j)
            .iter()
            .copied()
            .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Less))
            .unwrap_or(0.0);
        if max_val < 0.0 {
            eigvecs.column_mut(j).neg_mut();
        }
    }
    eigvecs
}

/// `P = Σ_i n_i c_i c_i^T`.
pub fn density_from_orbitals(coefficients: &DMatrix<f64>, occupations: &DVector<f64>) -> DMatrix<f64> {
    let weighted = coefficients * DMatrix::from_diagonal(occupations);
    weighted * coefficients.transpose()
}

fn available_orbitals(energies: &DVector<f64>) -> usize {
    energies.iter().filter(|e| e.is_finite()).count()
}

fn aufbau_occupations(energies: &DVector<f64>, nocc: usize) -> Result<DVector<f64>> {
    let available = available_orbitals(energies);
    if nocc > available {
        return Err(ScfError::Diagonalization(format!(
            "{} electrons do not fit into {} orbitals",
            nocc, available
        )));
    }
    Ok(DVector::from_fn(energies.len(), |i, _| {
        if i < nocc {
            1.0
        } else {
            0.0
        }
    }))
}

fn fermi_function(energy: f64, mu: f64, kt: f64) -> f64 {
    if !energy.is_finite() {
        return 0.0;
    }
    let x = (energy - mu) / kt;
    if x > 0.0 {
        let e = (-x).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + x.exp())
    }
}

/// Fermi–Dirac occupations with the chemical potential found by bisection so
/// that the occupations sum to `nocc`.
fn fermi_occupations(energies: &DVector<f64>, nocc: usize, kt: f64) -> Result<DVector<f64>> {
    if !(kt > 0.0) {
        return Err(ScfError::InvalidParameters(format!(
            "Fermi temperature must be positive, got {}",
            kt
        )));
    }
    let available = available_orbitals(energies);
    if nocc > available {
        return Err(ScfError::Diagonalization(format!(
            "{} electrons do not fit into {} orbitals",
            nocc, available
        )));
    }
    if nocc == 0 {
        return Ok(DVector::zeros(energies.len()));
    }

    let finite = energies.iter().copied().filter(|e| e.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
        (lo.min(e), hi.max(e))
    });
    let target = nocc as f64;
    let count = |mu: f64| -> f64 { energies.iter().map(|&e| fermi_function(e, mu, kt)).sum() };

    let mut mu_lo = lo - 50.0 * kt - 1.0;
    let mut mu_hi = hi + 50.0 * kt + 1.0;
    if count(mu_lo) > target || count(mu_hi) < target {
        return Err(ScfError::Diagonalization(
            "Fermi level could not be bracketed".to_string(),
        ));
    }
    for _ in 0..200 {
        let mid = 0.5 * (mu_lo + mu_hi);
        if count(mid) < target {
            mu_lo = mid;
        } else {
            mu_hi = mid;
        }
    }
    let mu = 0.5 * (mu_lo + mu_hi);

    Ok(energies.map(|e| fermi_function(e, mu, kt)))
}
