//! Input/Output operations for SCF calculations
//!
//! This module handles logging setup and the per-iteration energy trace file.

mod output;
mod trace;

pub use output::setup_output;
pub use trace::{save_energy_trace, write_energy_trace};
