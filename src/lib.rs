// Main library file for SCF calculations with density-matrix DIIS

pub mod annihilate;
pub mod app;
pub mod config;
pub mod convergence;
pub mod diagonalize;
pub mod diis;
pub mod error;
pub mod hamiltonian;
pub mod io;
pub mod scf_impl;
pub mod state;

pub use config::ControlParameters;
pub use diis::Diis;
pub use error::{Result, ScfError};
pub use scf_impl::{run_scf, EnergyTrace, ScfDriver, ScfOutcome, ScfTimings, TraceRecord};
pub use state::ElectronicState;
