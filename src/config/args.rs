//! Command-line argument parsing for SCF calculations

use clap::Parser;

/// SCF with density-matrix DIIS, driven by a YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Energy trace file, one line per iteration
    #[arg(long, default_value = "energy.txt")]
    pub trace: String,

    /// Override maximum SCF iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Override commutator convergence threshold
    #[arg(long)]
    pub density_tolerance: Option<f64>,

    /// Override DIIS history length
    #[arg(long)]
    pub diis_max: Option<usize>,

    /// Override the iteration after which DIIS starts
    #[arg(long)]
    pub diis_start_iter: Option<usize>,

    /// Disable DIIS extrapolation
    #[arg(long)]
    pub no_diis: bool,

    /// Annihilate spin contamination after convergence
    #[arg(long)]
    pub annihilate: bool,

    /// Override the staggered spin bias of the initial guess
    #[arg(long)]
    pub spin_bias: Option<f64>,
}
