use crate::scf_impl::ScfOutcome;
use crate::state::ElectronicState;
use nalgebra::DVector;
use tracing::info;

pub fn report_summary(state: &ElectronicState, outcome: &ScfOutcome) {
    info!("\nSCF calculation finished.");
    info!(
        "  Converged in {} iterations, final error {:.3e}",
        outcome.iterations, outcome.final_error
    );

    info!("\nFinal Energy Levels:");
    report_levels("Alpha", &state.e_alp, &state.occ_alp);
    report_levels("Beta", &state.e_bet, &state.occ_bet);

    info!("\n  Tr(S*D) = {:.10}", state.trace_density());
    info!("  <S^2> = {:.6}", state.spin_contamination());
    info!("\nElectronic energy: {:.10} au", outcome.energy);
    if outcome.nuclear_repulsion != 0.0 {
        info!("Nuclear repulsion: {:.10} au", outcome.nuclear_repulsion);
    }
    info!("Total energy: {:.10} au", outcome.total_energy());

    let t = &outcome.timings;
    info!(
        "\nTimings (s): Fock {:.3}, DIIS {:.3}, diagonalization {:.3}, energy {:.3}",
        t.fock.as_secs_f64(),
        t.diis.as_secs_f64(),
        t.diagonalize.as_secs_f64(),
        t.energy.as_secs_f64()
    );
}

fn report_levels(channel: &str, energies: &DVector<f64>, occupations: &DVector<f64>) {
    info!("  {} electrons:", channel);
    for (i, (energy, occ)) in energies.iter().zip(occupations.iter()).enumerate() {
        if energy.is_finite() {
            info!("    Level {}: {:.8} au  occ {:.4}", i + 1, energy, occ);
        }
    }
}
