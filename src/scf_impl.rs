//! SCF driver with density-matrix DIIS acceleration
//!
//! Each iteration builds the Fock matrices from the current spin densities,
//! measures the commutator error `FPS - SPF`, and either stops (converged) or
//! produces a new density by diagonalization. With DIIS enabled, the density
//! is first replaced by the Pulay extrapolation over the stored history and
//! the Fock matrices are rebuilt at that extrapolated density before
//! diagonalizing.
//!
//! The driver works on a private copy of the caller's [`ElectronicState`].
//! Only a converged run writes back into the caller's state; a run that hits
//! the iteration cap returns [`ScfError::ConvergenceFailure`] and leaves it
//! untouched.

use crate::annihilate::{lowdin_factors, Annihilator, NaturalOrbitalAnnihilator};
use crate::config::ControlParameters;
use crate::convergence::ChannelErrors;
use crate::diagonalize::{Diagonalizer, EigenMethod, Population, SymmetricDiagonalizer};
use crate::diis::Diis;
use crate::error::{Result, ScfError};
use crate::hamiltonian::{EnergyEvaluator, FockBuilder, HartreeFockEnergy};
use crate::state::ElectronicState;
use nalgebra::DMatrix;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScfStatus {
    Running,
    Converged,
    Failed,
}

/// One line of the energy trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRecord {
    pub iteration: usize,
    pub energy: f64,
    /// `Tr(S·P)` after the iteration
    pub trace: f64,
}

/// Append-only per-iteration record of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyTrace {
    records: Vec<TraceRecord>,
}

impl EnergyTrace {
    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TraceRecord> {
        self.records.last()
    }
}

/// Wall-clock time spent in each phase of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScfTimings {
    pub fock: Duration,
    pub diis: Duration,
    pub diagonalize: Duration,
    pub energy: Duration,
}

/// Result of a converged run.
#[derive(Debug, Clone)]
pub struct ScfOutcome {
    /// Electronic energy at the final density and refined orbitals
    pub energy: f64,
    pub nuclear_repulsion: f64,
    /// Number of iterations performed, including the converged one
    pub iterations: usize,
    /// Commutator error of the converged iteration
    pub final_error: f64,
    pub trace: EnergyTrace,
    pub timings: ScfTimings,
}

impl ScfOutcome {
    pub fn total_energy(&self) -> f64 {
        self.energy + self.nuclear_repulsion
    }
}

/// Pair of DIIS accelerators, one per spin channel.
struct SpinDiis {
    alpha: Diis,
    beta: Diis,
}

impl SpinDiis {
    fn new(capacity: usize, norb: usize) -> Self {
        SpinDiis {
            alpha: Diis::new(capacity, norb),
            beta: Diis::new(capacity, norb),
        }
    }
}

pub struct ScfDriver<
    'a,
    F: ?Sized,
    D = SymmetricDiagonalizer,
    E = HartreeFockEnergy,
    A = NaturalOrbitalAnnihilator,
> {
    params: &'a ControlParameters,
    fock_builder: &'a F,
    diagonalizer: D,
    energy: E,
    annihilator: A,
}

impl<'a, F: FockBuilder + ?Sized> ScfDriver<'a, F> {
    pub fn new(params: &'a ControlParameters, fock_builder: &'a F) -> Self {
        ScfDriver {
            params,
            fock_builder,
            diagonalizer: SymmetricDiagonalizer::default(),
            energy: HartreeFockEnergy,
            annihilator: NaturalOrbitalAnnihilator,
        }
    }
}

impl<'a, F, D, E, A> ScfDriver<'a, F, D, E, A>
where
    F: FockBuilder + ?Sized,
    D: Diagonalizer,
    E: EnergyEvaluator,
    A: Annihilator,
{
    pub fn with_diagonalizer<D2: Diagonalizer>(self, diagonalizer: D2) -> ScfDriver<'a, F, D2, E, A> {
        ScfDriver {
            params: self.params,
            fock_builder: self.fock_builder,
            diagonalizer,
            energy: self.energy,
            annihilator: self.annihilator,
        }
    }

    pub fn with_energy_evaluator<E2: EnergyEvaluator>(self, energy: E2) -> ScfDriver<'a, F, D, E2, A> {
        ScfDriver {
            params: self.params,
            fock_builder: self.fock_builder,
            diagonalizer: self.diagonalizer,
            energy,
            annihilator: self.annihilator,
        }
    }

    pub fn with_annihilator<A2: Annihilator>(self, annihilator: A2) -> ScfDriver<'a, F, D, E, A2> {
        ScfDriver {
            params: self.params,
            fock_builder: self.fock_builder,
            diagonalizer: self.diagonalizer,
            energy: self.energy,
            annihilator,
        }
    }

    /// Converge `el` to self-consistency.
    pub fn run(&self, el: &mut ElectronicState) -> Result<ScfOutcome> {
        let params = self.params;
        params.validate()?;
        el.check_dimensions()?;

        let mut work = el.clone();
        let mut diis = params
            .use_diis
            .then(|| SpinDiis::new(params.diis_max, work.norb));
        let mut trace = EnergyTrace::default();
        let mut timings = ScfTimings::default();

        info!("#####################################################");
        info!("------------------ Entering SCF cycle ---------------");
        info!("#####################################################");
        info!(
            "  Norb = {}, N_alpha = {}, N_beta = {}, tolerance = {:.1e}",
            work.norb, work.nocc_alp, work.nocc_bet, params.den_tol
        );
        if params.use_diis {
            info!(
                "  DIIS on densities: {} vectors, active after iteration {}",
                params.diis_max, params.diis_start_iter
            );
        }

        let mut iter = 0;
        let (status, den_err) = loop {
            info!("=============== Iteration# {} ===============", iter);

            self.timed_fock(&mut work, &mut timings)?;

            // The error must use the density the Fock matrix was built from.
            let errors = ChannelErrors::new(
                &work.fao_alp,
                &work.p_alp,
                &work.fao_bet,
                &work.p_bet,
                &work.sao,
            )?;
            let den_err = errors.total();
            info!("  commutation error = {:.6e}", den_err);

            let mut status = ScfStatus::Running;
            if den_err < params.den_tol {
                status = ScfStatus::Converged;
            } else {
                if iter > params.diis_start_iter {
                    if let Some(diis) = diis.as_mut() {
                        self.diis_step(&mut work, diis, errors, &mut timings)?;
                    }
                }
                self.update_density(&mut work, &mut timings)?;
            }

            let start = Instant::now();
            let eelec = self.energy.total_energy(&work);
            timings.energy += start.elapsed();
            trace.push(TraceRecord {
                iteration: iter,
                energy: eelec,
                trace: work.trace_density(),
            });
            info!("  Total electronic energy = {:.12}", eelec);

            iter += 1;
            if status == ScfStatus::Running && iter >= params.niter {
                status = ScfStatus::Failed;
            }
            if status != ScfStatus::Running {
                break (status, den_err);
            }
        };

        if status == ScfStatus::Converged {
            info!("SCF converged in {} iterations.", iter);
            return self.finalize(el, work, iter, den_err, trace, timings);
        }

        warn!(
            "Convergence is not achieved after {} iterations, den_err = {:.6e}",
            iter, den_err
        );
        Err(ScfError::ConvergenceFailure {
            iterations: iter,
            final_error: den_err,
            tolerance: params.den_tol,
            trace,
            timings,
        })
    }

    fn timed_fock(&self, work: &mut ElectronicState, timings: &mut ScfTimings) -> Result<()> {
        let start = Instant::now();
        self.fock_builder.build_fock(work)?;
        timings.fock += start.elapsed();
        Ok(())
    }

    /// Store the current densities with their errors and, once the history
    /// is full, move to the extrapolated density and rebuild the Fock matrix
    /// there. The first extrapolation happens on the add that fills the
    /// history, i.e. at iteration `diis_start_iter + diis_max`.
    fn diis_step(
        &self,
        work: &mut ElectronicState,
        diis: &mut SpinDiis,
        errors: ChannelErrors,
        timings: &mut ScfTimings,
    ) -> Result<()> {
        let start = Instant::now();
        diis.alpha.add(work.p_alp.clone(), errors.alpha)?;
        diis.beta.add(work.p_bet.clone(), errors.beta)?;

        if !(diis.alpha.is_full() && diis.beta.is_full()) {
            timings.diis += start.elapsed();
            return Ok(());
        }

        let p_alp = extrapolate_channel(&diis.alpha, "alpha")?;
        let p_bet = extrapolate_channel(&diis.beta, "beta")?;
        timings.diis += start.elapsed();

        if p_alp.is_none() && p_bet.is_none() {
            return Ok(());
        }
        let p_alp = p_alp.unwrap_or_else(|| work.p_alp.clone());
        let p_bet = p_bet.unwrap_or_else(|| work.p_bet.clone());
        work.set_density(p_alp, p_bet)?;
        info!("  DIIS extrapolation with {} vectors", diis.alpha.len());

        self.timed_fock(work, timings)
    }

    fn update_density(&self, work: &mut ElectronicState, timings: &mut ScfTimings) -> Result<()> {
        let start = Instant::now();
        let method = self.params.eigen_method;
        let population = self.params.population;
        let alp = self.diagonalizer.diagonalize(
            &work.fao_alp,
            &work.sao,
            work.nocc_alp,
            method,
            population,
        )?;
        let bet = self.diagonalizer.diagonalize(
            &work.fao_bet,
            &work.sao,
            work.nocc_bet,
            method,
            population,
        )?;
        work.set_orbitals_alp(&alp);
        work.set_orbitals_bet(&bet);
        work.set_density(alp.density, bet.density)?;
        timings.diagonalize += start.elapsed();
        Ok(())
    }

    /// Post-convergence pass: optional annihilation, then Fock matrices and
    /// orbitals refreshed at the final density without changing it.
    fn finalize(
        &self,
        el: &mut ElectronicState,
        mut work: ElectronicState,
        iterations: usize,
        final_error: f64,
        trace: EnergyTrace,
        mut timings: ScfTimings,
    ) -> Result<ScfOutcome> {
        if self.params.do_annihilate {
            // The standard eigenproblem treats the basis as orthonormal.
            let metric = match self.params.eigen_method {
                EigenMethod::Generalized => work.sao.clone(),
                EigenMethod::Standard => DMatrix::identity(work.norb, work.norb),
            };
            let (half, inv_half) = lowdin_factors(&metric)?;
            let mut p_alp = &half * &work.p_alp * &half;
            let mut p_bet = &half * &work.p_bet * &half;
            self.annihilator
                .annihilate(work.nocc_alp, work.nocc_bet, &mut p_alp, &mut p_bet)?;
            work.set_density(
                &inv_half * p_alp * &inv_half,
                &inv_half * p_bet * &inv_half,
            )?;
        }

        self.timed_fock(&mut work, &mut timings)?;

        let start = Instant::now();
        let method = self.params.eigen_method;
        let alp = self.diagonalizer.diagonalize(
            &work.fao_alp,
            &work.sao,
            work.nocc_alp,
            method,
            Population::Aufbau,
        )?;
        let bet = self.diagonalizer.diagonalize(
            &work.fao_bet,
            &work.sao,
            work.nocc_bet,
            method,
            Population::Aufbau,
        )?;
        work.set_orbitals_alp(&alp);
        work.set_orbitals_bet(&bet);
        timings.diagonalize += start.elapsed();

        let energy = self.energy.total_energy(&work);
        info!("  Final electronic energy = {:.12}", energy);
        *el = work;

        Ok(ScfOutcome {
            energy,
            nuclear_repulsion: self.fock_builder.nuclear_repulsion(),
            iterations,
            final_error,
            trace,
            timings,
        })
    }
}

/// Extrapolated density of one channel, or `None` when the DIIS system
/// cannot be solved and the current density has to be kept.
fn extrapolate_channel(diis: &Diis, channel: &str) -> Result<Option<DMatrix<f64>>> {
    match diis.extrapolate() {
        Ok(p) => Ok(Some(p)),
        Err(err) if err.is_diis_recoverable() => {
            warn!("  DIIS ({}) skipped: {}", channel, err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Run an SCF with the default diagonalizer, energy and annihilation.
pub fn run_scf<F: FockBuilder + ?Sized>(
    el: &mut ElectronicState,
    fock_builder: &F,
    params: &ControlParameters,
) -> Result<ScfOutcome> {
    ScfDriver::new(params, fock_builder).run(el)
}
