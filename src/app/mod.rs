//! Command-line application: load a system, converge it, report

mod report;
mod runner;
mod system;

pub use runner::{resolve_parameters, resolve_spin_bias, run_system};
pub use system::{build_system, PreparedSystem};

use self::report::report_summary;
use crate::config::{Args, Config};
use crate::error::ScfError;
use crate::io::{save_energy_trace, setup_output};
use crate::scf_impl::{EnergyTrace, ScfOutcome};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::{info, warn};

pub struct ScfApplication {
    args: Args,
    config: Config,
}

impl ScfApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args.config_file)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from: {}", self.args.config_file);
        self.execute().map(|_| ())
    }

    /// Everything after logging setup; returns the converged result.
    pub fn execute(&self) -> Result<ScfOutcome> {
        let params = resolve_parameters(&self.args, &self.config)?;
        let spin_bias = resolve_spin_bias(&self.args, &self.config);
        let mut system = build_system(&self.config.system, params.eigen_method, spin_bias)?;

        let outcome = match run_system(&mut system, &params) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let ScfError::ConvergenceFailure { trace, .. } = &err {
                    self.write_trace(trace);
                }
                return Err(err).wrap_err("SCF calculation failed");
            }
        };
        report_summary(&system.state, &outcome);
        self.write_trace(&outcome.trace);
        Ok(outcome)
    }

    /// A failed write is logged and does not change the result of the run.
    fn write_trace(&self, trace: &EnergyTrace) {
        if let Err(err) = save_energy_trace(&self.args.trace, trace) {
            warn!("Energy trace not written: {:#}", err);
        } else {
            info!("Energy trace written to: {}", self.args.trace);
        }
    }

    pub fn with_args(args: Args) -> Result<Self> {
        let config = load_config(&args.config_file)?;
        Ok(Self { args, config })
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let config_content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", path))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}
