use crate::{error::Result, mass_matrix::MassMatrix, posterior::LogpFunc};

/// A point in phase space together with the cached log density and its
/// gradient at the position.
#[derive(Debug, Clone)]
pub(crate) struct PhasePoint {
    pub(crate) position: Box<[f64]>,
    pub(crate) momentum: Box<[f64]>,
    pub(crate) velocity: Box<[f64]>,
    /// Gradient of the log density, ie `-grad U`.
    pub(crate) gradient: Box<[f64]>,
    pub(crate) log_pdf: f64,
    pub(crate) kinetic_energy: f64,
}

impl PhasePoint {
    pub(crate) fn new(dim: usize) -> Self {
        PhasePoint {
            position: vec![0f64; dim].into(),
            momentum: vec![0f64; dim].into(),
            velocity: vec![0f64; dim].into(),
            gradient: vec![0f64; dim].into(),
            log_pdf: f64::NEG_INFINITY,
            kinetic_energy: 0.,
        }
    }

    /// Move the point to `position` and evaluate the density there.
    pub(crate) fn init<F: LogpFunc>(logp: &F, position: &[f64]) -> Result<Self> {
        let mut point = PhasePoint::new(position.len());
        point.position.copy_from_slice(position);
        point.update_potential_gradient(logp)?;
        Ok(point)
    }

    pub(crate) fn update_potential_gradient<F: LogpFunc>(&mut self, logp: &F) -> Result<()> {
        self.log_pdf = logp.logp(&self.position, &mut self.gradient)?;
        Ok(())
    }

    pub(crate) fn update_kinetic_energy(&mut self, mass: &MassMatrix) {
        self.kinetic_energy = mass.kinetic_energy(&self.momentum);
    }

    /// `U(x) = -log p(x)`
    pub(crate) fn potential_energy(&self) -> f64 {
        -self.log_pdf
    }

    /// The total energy `H(x, p) = K(p) + U(x)`.
    pub(crate) fn energy(&self) -> f64 {
        self.potential_energy() + self.kinetic_energy
    }

    pub(crate) fn copy_into(&self, other: &mut PhasePoint) {
        other.position.copy_from_slice(&self.position);
        other.momentum.copy_from_slice(&self.momentum);
        other.velocity.copy_from_slice(&self.velocity);
        other.gradient.copy_from_slice(&self.gradient);
        other.log_pdf = self.log_pdf;
        other.kinetic_energy = self.kinetic_energy;
    }
}

/// The change of the total energy along a trajectory.
///
/// Any non-finite energy, at the start or at the end of the trajectory,
/// counts as an infinite increase, so that the proposal is always rejected.
pub fn energy_change(initial_energy: f64, final_energy: f64) -> f64 {
    let diff = final_energy - initial_energy;
    if !diff.is_finite() | !initial_energy.is_finite() | !final_energy.is_finite() {
        f64::INFINITY
    } else {
        diff
    }
}

/// Metropolis acceptance probability `min(1, exp(-dH))` for an energy change `dH`.
pub fn acceptance_probability(energy_change: f64) -> f64 {
    if energy_change.is_nan() {
        return 0.;
    }
    if energy_change <= 0. {
        return 1.;
    }
    (-energy_change).exp()
}
