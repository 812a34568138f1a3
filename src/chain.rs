//! One run of the sampling loop: propose, evaluate, accept or reject.

use log::trace;
use rand::Rng;

use crate::{
    bounds::FlatBounds,
    error::Result,
    hamiltonian::{acceptance_probability, energy_change, PhasePoint},
    integrator::Leapfrog,
    mass_matrix::MassMatrix,
    posterior::{FlatPosterior, LogpFunc, Posterior},
    position::ParameterLayout,
    telemetry::Telemetry,
};

/// Outcome of a single trajectory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transition {
    pub(crate) energy_change: f64,
    pub(crate) accept_prob: f64,
    pub(crate) accepted: bool,
}

/// The state of one sampling loop. Counters and the current point are local
/// to the loop, only the posterior, mass matrix and bounds are shared.
pub(crate) struct Chain<'a, F: LogpFunc, R: Rng> {
    logp: F,
    mass_matrix: &'a MassMatrix,
    leapfrog: Leapfrog<'a>,
    current: PhasePoint,
    proposal: PhasePoint,
    rng: R,
    jump_attempts: u64,
    jump_acceptances: u64,
}

impl<'a, P: Posterior, R: Rng> Chain<'a, FlatPosterior<'a, P>, R> {
    pub(crate) fn for_posterior(
        posterior: &'a P,
        layout: &'a ParameterLayout,
        mass_matrix: &'a MassMatrix,
        bounds: &'a FlatBounds,
        init: &[f64],
        rng: R,
    ) -> Result<Self> {
        let logp = FlatPosterior::new(posterior, layout);
        Chain::new(logp, mass_matrix, bounds, init, rng)
    }
}

impl<'a, F: LogpFunc, R: Rng> Chain<'a, F, R> {
    pub(crate) fn new(
        logp: F,
        mass_matrix: &'a MassMatrix,
        bounds: &'a FlatBounds,
        init: &[f64],
        rng: R,
    ) -> Result<Self> {
        let current = PhasePoint::init(&logp, init)?;
        let proposal = PhasePoint::new(logp.dim());
        Ok(Chain {
            logp,
            mass_matrix,
            leapfrog: Leapfrog::new(mass_matrix, bounds),
            current,
            proposal,
            rng,
            jump_attempts: 0,
            jump_acceptances: 0,
        })
    }

    /// Run one trajectory from the current point and accept or reject it.
    ///
    /// Rejections keep the current position, log density and gradient.
    pub(crate) fn transition(&mut self, step_size: f64, num_steps: u64) -> Result<Transition> {
        self.current.copy_into(&mut self.proposal);
        self.mass_matrix
            .randomize_momentum(&mut self.proposal.momentum, &mut self.rng);
        self.proposal.update_kinetic_energy(self.mass_matrix);
        let initial_energy = self.proposal.energy();

        self.leapfrog
            .trajectory(&self.logp, &mut self.proposal, step_size, num_steps)?;

        let energy_change = energy_change(initial_energy, self.proposal.energy());
        let accept_prob = acceptance_probability(energy_change);
        let draw: f64 = self.rng.random();
        let accepted = (energy_change < 0.) | (draw < (-energy_change).exp());

        self.jump_attempts += 1;
        if accepted {
            self.jump_acceptances += 1;
            std::mem::swap(&mut self.current, &mut self.proposal);
        } else if energy_change == f64::INFINITY {
            trace!("Rejected diverging trajectory with step size {}", step_size);
        }

        Ok(Transition {
            energy_change,
            accept_prob,
            accepted,
        })
    }

    pub(crate) fn position(&self) -> &[f64] {
        &self.current.position
    }

    pub(crate) fn log_pdf(&self) -> f64 {
        self.current.log_pdf
    }

    pub(crate) fn telemetry(&self, samples_remaining: u64, last: &Transition) -> Telemetry {
        Telemetry {
            samples_remaining,
            jump_attempts: self.jump_attempts,
            jump_acceptances: self.jump_acceptances,
            hamiltonian_differential: last.energy_change,
        }
    }
}
