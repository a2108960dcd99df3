//! DIIS (Direct Inversion in the Iterative Subspace) convergence accelerator
//!
//! One accelerator is kept per spin channel. Each stores a bounded history of
//! trial density matrices together with their commutator error matrices and
//! expresses the next trial density as the linear combination of previous ones
//! whose combined error has minimal norm.
//!
//! # Algorithm
//!
//! With `k` stored pairs `(P_i, E_i)` the coefficients solve
//!
//! ```text
//! | B_11 .. B_1k 1 | | c_1 |   | 0 |
//! |  :        :  : | |  :  | = | : |
//! | B_k1 .. B_kk 1 | | c_k |   | 0 |
//! |  1   ..  1   0 | |  λ  |   | 1 |
//! ```
//!
//! where `B_ij = <E_i|E_j>`, and the extrapolated density is `Σ c_i P_i`.
//!
//! References: Pulay, Chem. Phys. Lett. 73, 393 (1980);
//! Pulay, J. Comp. Chem. 3, 556 (1982).

use crate::error::{check_shape, Result, ScfError};
use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use tracing::debug;

/// Relative residual accepted for a solution of the DIIS system.
const RESIDUAL_TOLERANCE: f64 = 1e-8;

#[derive(Clone, Debug)]
struct Sample {
    trial: DMatrix<f64>,
    error: DMatrix<f64>,
}

#[derive(Clone, Debug)]
pub struct Diis {
    history: VecDeque<Sample>,
    capacity: usize,
    norb: usize,
}

impl Diis {
    /// Create an accelerator holding at most `capacity` pairs of
    /// `norb x norb` matrices. A zero capacity is raised to one.
    pub fn new(capacity: usize, norb: usize) -> Self {
        let capacity = capacity.max(1);
        Diis {
            history: VecDeque::with_capacity(capacity),
            capacity,
            norb,
        }
    }

    /// Store a trial/error pair, evicting the oldest pair when full.
    pub fn add(&mut self, trial: DMatrix<f64>, error: DMatrix<f64>) -> Result<()> {
        let shape = (self.norb, self.norb);
        check_shape("DIIS trial matrix", &trial, shape)?;
        check_shape("DIIS error matrix", &error, shape)?;

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Sample { trial, error });
        Ok(())
    }

    /// Solve the DIIS equations for the combination coefficients `c_1..c_k`.
    pub fn coefficients(&self) -> Result<DVector<f64>> {
        let k = self.history.len();
        if k < 2 {
            return Err(ScfError::InsufficientHistory { len: k });
        }

        let mut b = DMatrix::zeros(k + 1, k + 1);
        for (i, si) in self.history.iter().enumerate() {
            for (j, sj) in self.history.iter().enumerate().skip(i) {
                let bij = si.error.dot(&sj.error);
                b[(i, j)] = bij;
                b[(j, i)] = bij;
            }
        }

        // Scaling the error block only rescales the Lagrange multiplier.
        let scale = b.view((0, 0), (k, k)).amax();
        if scale > 0.0 {
            let mut block = b.view_mut((0, 0), (k, k));
            block.unscale_mut(scale);
        }
        for i in 0..k {
            b[(i, k)] = 1.0;
            b[(k, i)] = 1.0;
        }

        if !b.iter().all(|x| x.is_finite()) {
            return Err(ScfError::SingularSystem { size: k + 1 });
        }

        let mut rhs = DVector::zeros(k + 1);
        rhs[k] = 1.0;

        let solution = match b.clone().lu().solve(&rhs) {
            Some(x) if satisfies(&b, &x, &rhs) => x,
            _ => {
                debug!("DIIS: LU solve failed, using minimum-norm solution");
                minimum_norm_solution(b, &rhs)?
            }
        };

        let coeffs = solution.rows(0, k).into_owned();
        debug!("DIIS coefficients: {:?}", coeffs.as_slice());
        Ok(coeffs)
    }

    /// Extrapolated trial matrix `Σ c_i P_i`.
    pub fn extrapolate(&self) -> Result<DMatrix<f64>> {
        let coeffs = self.coefficients()?;
        let mut extrapolated = DMatrix::zeros(self.norb, self.norb);
        for (c, sample) in coeffs.iter().zip(self.history.iter()) {
            extrapolated += &sample.trial * *c;
        }
        Ok(extrapolated)
    }

    /// Clear the history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.history.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored trial matrices, oldest first.
    pub fn trials(&self) -> impl Iterator<Item = &DMatrix<f64>> {
        self.history.iter().map(|s| &s.trial)
    }

    /// Stored error matrices, oldest first.
    pub fn errors(&self) -> impl Iterator<Item = &DMatrix<f64>> {
        self.history.iter().map(|s| &s.error)
    }
}

fn satisfies(b: &DMatrix<f64>, x: &DVector<f64>, rhs: &DVector<f64>) -> bool {
    x.iter().all(|v| v.is_finite()) && (b * x - rhs).norm() <= RESIDUAL_TOLERANCE * (1.0 + x.norm())
}

/// Minimum-norm least-squares solution through the SVD. Degenerate histories
/// (e.g. repeated error vectors) make `B` singular but the system stays
/// consistent, and the minimum-norm solution spreads the weight evenly.
fn minimum_norm_solution(b: DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
    let size = b.nrows();
    let svd = b.clone().svd(true, true);
    let cutoff = svd.singular_values.max() * f64::EPSILON * size as f64;
    let x = svd
        .solve(rhs, cutoff)
        .map_err(|_| ScfError::SingularSystem { size })?;
    if satisfies(&b, &x, rhs) {
        Ok(x)
    } else {
        Err(ScfError::SingularSystem { size })
    }
}
