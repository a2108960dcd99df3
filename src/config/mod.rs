//! Configuration management for SCF calculations
//!
//! This module handles the YAML configuration structures, their defaults and
//! the conversion into the immutable [`ControlParameters`] of a run.

mod args;

pub use args::Args;

use crate::diagonalize::{EigenMethod, Population};
use crate::error::{Result, ScfError};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub scf_params: ScfParams,
    /// Staggered field applied to the core guess to break spin symmetry
    #[serde(default)]
    pub spin_bias: Option<f64>,
}

/// The system whose density is converged
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SystemConfig {
    /// Hartree-Fock over precomputed integrals in a (possibly non-orthogonal) basis
    Integrals {
        overlap: Vec<Vec<f64>>,
        core_hamiltonian: Vec<Vec<f64>>,
        /// Symmetry-unique `[p, q, r, s, value]` entries of `(pq|rs)`
        #[serde(default)]
        two_electron: Vec<(usize, usize, usize, usize, f64)>,
        n_alpha: usize,
        n_beta: usize,
        #[serde(default)]
        nuclear_repulsion: f64,
    },
    /// Mean-field Hubbard chain
    Hubbard {
        onsite: Vec<f64>,
        hopping: f64,
        u: f64,
        #[serde(default)]
        periodic: bool,
        n_alpha: usize,
        n_beta: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PopulationKind {
    Aufbau,
    Fermi,
}

/// SCF-specific parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScfParams {
    #[serde(default)]
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub density_tolerance: Option<f64>,
    #[serde(default)]
    pub use_diis: Option<bool>,
    /// Number of density/error pairs kept per spin channel
    #[serde(default)]
    pub diis_max: Option<usize>,
    /// DIIS is switched on for iterations after this one
    #[serde(default)]
    pub diis_start_iter: Option<usize>,
    #[serde(default)]
    pub annihilate: Option<bool>,
    #[serde(default)]
    pub eigen_method: Option<EigenMethod>,
    #[serde(default)]
    pub population: Option<PopulationKind>,
    /// kT in Hartree for Fermi populations
    #[serde(default)]
    pub fermi_temperature: Option<f64>,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            max_iterations: Some(100),
            density_tolerance: Some(1e-8),
            use_diis: Some(true),
            diis_max: Some(6),
            diis_start_iter: Some(0),
            annihilate: Some(false),
            eigen_method: Some(EigenMethod::Generalized),
            population: Some(PopulationKind::Aufbau),
            fermi_temperature: Some(0.0),
        }
    }
}

impl ScfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        self.max_iterations = self.max_iterations.or(defaults.max_iterations);
        self.density_tolerance = self.density_tolerance.or(defaults.density_tolerance);
        self.use_diis = self.use_diis.or(defaults.use_diis);
        self.diis_max = self.diis_max.or(defaults.diis_max);
        self.diis_start_iter = self.diis_start_iter.or(defaults.diis_start_iter);
        self.annihilate = self.annihilate.or(defaults.annihilate);
        self.eigen_method = self.eigen_method.or(defaults.eigen_method);
        self.population = self.population.or(defaults.population);
        self.fermi_temperature = self.fermi_temperature.or(defaults.fermi_temperature);
        self
    }

    /// Convert into validated run parameters. Missing fields fall back to
    /// the defaults.
    pub fn to_control_parameters(&self) -> Result<ControlParameters> {
        let p = self.clone().with_defaults();
        let defaults = ControlParameters::default();
        let population = match p.population.unwrap_or(PopulationKind::Aufbau) {
            PopulationKind::Aufbau => Population::Aufbau,
            PopulationKind::Fermi => Population::Fermi {
                temperature: p.fermi_temperature.unwrap_or(0.0),
            },
        };

        let params = ControlParameters {
            niter: p.max_iterations.unwrap_or(defaults.niter),
            den_tol: p.density_tolerance.unwrap_or(defaults.den_tol),
            use_diis: p.use_diis.unwrap_or(defaults.use_diis),
            diis_max: p.diis_max.unwrap_or(defaults.diis_max),
            diis_start_iter: p.diis_start_iter.unwrap_or(defaults.diis_start_iter),
            do_annihilate: p.annihilate.unwrap_or(defaults.do_annihilate),
            eigen_method: p.eigen_method.unwrap_or(defaults.eigen_method),
            population,
        };
        params.validate()?;
        Ok(params)
    }
}

impl Config {
    /// Apply default values to any missing configuration fields
    pub fn with_defaults(mut self) -> Self {
        self.scf_params = self.scf_params.with_defaults();
        self
    }
}

/// Immutable parameters of one SCF run
#[derive(Debug, Clone, PartialEq)]
pub struct ControlParameters {
    /// Iteration cap
    pub niter: usize,
    /// Convergence threshold on the summed commutator error
    pub den_tol: f64,
    pub use_diis: bool,
    /// DIIS history length per spin channel
    pub diis_max: usize,
    /// DIIS becomes active for iteration indices greater than this
    pub diis_start_iter: usize,
    pub do_annihilate: bool,
    pub eigen_method: EigenMethod,
    pub population: Population,
}

impl Default for ControlParameters {
    fn default() -> Self {
        ControlParameters {
            niter: 100,
            den_tol: 1e-8,
            use_diis: true,
            diis_max: 6,
            diis_start_iter: 0,
            do_annihilate: false,
            eigen_method: EigenMethod::Generalized,
            population: Population::Aufbau,
        }
    }
}

impl ControlParameters {
    pub fn validate(&self) -> Result<()> {
        if self.niter == 0 {
            return Err(ScfError::InvalidParameters(
                "iteration cap must be at least 1".to_string(),
            ));
        }
        if !(self.den_tol.is_finite() && self.den_tol > 0.0) {
            return Err(ScfError::InvalidParameters(format!(
                "density tolerance must be positive, got {}",
                self.den_tol
            )));
        }
        if self.use_diis && self.diis_max < 2 {
            return Err(ScfError::InvalidParameters(format!(
                "DIIS needs room for at least 2 vectors, got {}",
                self.diis_max
            )));
        }
        if let Population::Fermi { temperature } = self.population {
            if !(temperature.is_finite() && temperature > 0.0) {
                return Err(ScfError::InvalidParameters(format!(
                    "Fermi temperature must be positive, got {}",
                    temperature
                )));
            }
        }
        Ok(())
    }
}
