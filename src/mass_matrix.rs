use rand_distr::StandardNormal;

use crate::{
    error::{HmcError, Result},
    math::{multiply, vector_dot, weighted_square_sum},
};

/// A fixed diagonal mass matrix, or the identity.
///
/// The inverse of the diagonal is computed once at construction and
/// never changes afterwards.
#[derive(Debug, Clone)]
pub(crate) enum MassMatrix {
    Unit,
    Diag(DiagMassMatrix),
}

#[derive(Debug, Clone)]
pub(crate) struct DiagMassMatrix {
    inv_mass: Box<[f64]>,
    stds: Box<[f64]>,
}

impl DiagMassMatrix {
    pub(crate) fn new(mass: &[f64]) -> Result<Self> {
        if let Some(&val) = mass.iter().find(|&&val| !(val.is_finite() & (val > 0.))) {
            return Err(HmcError::InvalidMass(format!(
                "entries must be positive and finite, got {}",
                val
            )));
        }
        Ok(DiagMassMatrix {
            inv_mass: mass.iter().map(|&val| val.recip()).collect(),
            stds: mass.iter().map(|&val| val.sqrt()).collect(),
        })
    }
}

impl MassMatrix {
    pub(crate) fn new(mass: Option<&[f64]>, dim: usize) -> Result<Self> {
        let Some(mass) = mass else {
            return Ok(MassMatrix::Unit);
        };
        if mass.len() != dim {
            return Err(HmcError::InvalidMass(format!(
                "expected {} diagonal entries, got {}",
                dim,
                mass.len()
            )));
        }
        Ok(MassMatrix::Diag(DiagMassMatrix::new(mass)?))
    }

    /// Compute the velocity `M^{-1} p`.
    pub(crate) fn update_velocity(&self, momentum: &[f64], velocity: &mut [f64]) {
        match self {
            MassMatrix::Unit => velocity.copy_from_slice(momentum),
            MassMatrix::Diag(diag) => multiply(&diag.inv_mass, momentum, velocity),
        }
    }

    /// `K(p) = p^T M^{-1} p / 2`
    pub(crate) fn kinetic_energy(&self, momentum: &[f64]) -> f64 {
        match self {
            MassMatrix::Unit => 0.5 * vector_dot(momentum, momentum),
            MassMatrix::Diag(diag) => 0.5 * weighted_square_sum(momentum, &diag.inv_mass),
        }
    }

    /// Draw a momentum from `N(0, M)`.
    pub(crate) fn randomize_momentum<R: rand::Rng + ?Sized>(
        &self,
        momentum: &mut [f64],
        rng: &mut R,
    ) {
        match self {
            MassMatrix::Unit => momentum.iter_mut().for_each(|p| {
                *p = rng.sample(StandardNormal);
            }),
            MassMatrix::Diag(diag) => {
                momentum
                    .iter_mut()
                    .zip(diag.stds.iter())
                    .for_each(|(p, &s)| {
                        let norm: f64 = rng.sample(StandardNormal);
                        *p = s * norm;
                    })
            }
        }
    }
}
