use super::system::PreparedSystem;
use crate::config::{Args, Config, ControlParameters, ScfParams};
use crate::scf_impl::{ScfDriver, ScfOutcome};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

/// Command-line overrides on top of the configuration file.
pub fn resolve_parameters(args: &Args, config: &Config) -> Result<ControlParameters> {
    let file = &config.scf_params;
    let use_diis = if args.no_diis {
        Some(false)
    } else {
        file.use_diis
    };
    let annihilate = if args.annihilate {
        Some(true)
    } else {
        file.annihilate
    };

    let merged = ScfParams {
        max_iterations: args.max_iterations.or(file.max_iterations),
        density_tolerance: args.density_tolerance.or(file.density_tolerance),
        use_diis,
        diis_max: args.diis_max.or(file.diis_max),
        diis_start_iter: args.diis_start_iter.or(file.diis_start_iter),
        annihilate,
        ..file.clone()
    };

    let params = merged
        .to_control_parameters()
        .wrap_err("Invalid SCF parameters")?;
    info!("SCF parameters:");
    info!("  Max iterations: {}", params.niter);
    info!("  Density tolerance: {:.3e}", params.den_tol);
    if params.use_diis {
        info!(
            "  DIIS: {} vectors, start after iteration {}",
            params.diis_max, params.diis_start_iter
        );
    } else {
        info!("  DIIS acceleration disabled");
    }
    info!("  Eigenproblem: {:?}, population: {:?}", params.eigen_method, params.population);
    Ok(params)
}

pub fn resolve_spin_bias(args: &Args, config: &Config) -> f64 {
    args.spin_bias.or(config.spin_bias).unwrap_or(0.0)
}

/// Run the SCF on `system`. The typed error is kept so callers can still
/// reach the energy trace of a run that did not converge.
pub fn run_system(
    system: &mut PreparedSystem,
    params: &ControlParameters,
) -> crate::error::Result<ScfOutcome> {
    info!("\nStarting SCF cycle...\n");
    ScfDriver::new(params, system.fock.as_ref()).run(&mut system.state)
}
