//! The interface through which the sampler sees the target density.

use anyhow::Result;
use rand::Rng;

use crate::{
    bounds::BoundTable,
    error::HmcError,
    position::{ParameterLayout, Position},
};

/// An unnormalized, differentiable log density over keyed parameters.
///
/// Implementations may combine any number of priors and likelihoods
/// internally, the sampler only uses the methods below. The trait is
/// thread-safe so that several sampling requests can share one posterior.
pub trait Posterior: Send + Sync + 'static {
    /// The identifiers of the parameters with their dimensions, in
    /// canonical order.
    fn layout(&self) -> ParameterLayout;

    /// Total number of flat coordinates.
    fn dim(&self) -> usize {
        self.layout().dim()
    }

    /// Evaluate the log density at `position`.
    ///
    /// Positions outside of the support should return `-inf`.
    fn log_pdf(&self, position: &Position) -> f64;

    /// Evaluate the gradient of the log density at `position`.
    ///
    /// The result must have the same identifiers and dimensions as `position`.
    fn log_pdf_gradient(&self, position: &Position) -> Position;

    /// Box constraints of bounded parameters. Unconstrained by default.
    fn bounds(&self) -> BoundTable {
        BoundTable::new()
    }

    /// Draw an initial position from the priors.
    fn sample_priors<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Position>;
}

/// Evaluate a log density and its gradient on flat vectors.
pub(crate) trait LogpFunc {
    fn logp(&self, position: &[f64], gradient: &mut [f64]) -> crate::error::Result<f64>;
    fn dim(&self) -> usize;
}

/// Presents a [`Posterior`] as a function of the flat coordinates.
pub(crate) struct FlatPosterior<'a, P: Posterior> {
    posterior: &'a P,
    layout: &'a ParameterLayout,
}

impl<'a, P: Posterior> FlatPosterior<'a, P> {
    pub(crate) fn new(posterior: &'a P, layout: &'a ParameterLayout) -> Self {
        Self { posterior, layout }
    }
}

impl<P: Posterior> LogpFunc for FlatPosterior<'_, P> {
    fn logp(&self, position: &[f64], gradient: &mut [f64]) -> crate::error::Result<f64> {
        let keyed = self.layout.unflatten(position)?;
        let logp = self.posterior.log_pdf(&keyed);
        if !logp.is_finite() {
            // The gradient is meaningless outside of the support, the
            // trajectory will be rejected anyway.
            gradient.fill(f64::NAN);
            return Ok(logp);
        }
        let keyed_grad = self.posterior.log_pdf_gradient(&keyed);
        self.layout.flatten_into(&keyed_grad, gradient)?;
        Ok(logp)
    }

    fn dim(&self) -> usize {
        self.layout.dim()
    }
}

/// Draw an initial position and check it against the layout.
pub(crate) fn sample_initial_position<P: Posterior, R: Rng + ?Sized>(
    posterior: &P,
    layout: &ParameterLayout,
    rng: &mut R,
) -> crate::error::Result<Box<[f64]>> {
    let position = posterior
        .sample_priors(rng)
        .map_err(|err| HmcError::PriorSample(err.into()))?;
    layout.flatten(&position)
}

#[cfg(test)]
pub mod test_logps {
    use anyhow::Result;
    use rand::Rng;
    use rand_distr::StandardNormal;

    use super::Posterior;
    use crate::{
        bounds::BoundTable,
        position::{ParameterId, ParameterLayout, Position},
    };

    /// Independent normal distributions for a single vector parameter `x`.
    #[derive(Clone, Debug)]
    pub struct NormalPosterior {
        pub dim: usize,
        pub mu: f64,
        pub sigma: f64,
        pub bounds: Option<(f64, f64)>,
    }

    impl NormalPosterior {
        pub fn new(dim: usize, mu: f64, sigma: f64) -> Self {
            Self {
                dim,
                mu,
                sigma,
                bounds: None,
            }
        }

        fn values<'a>(&self, position: &'a Position) -> &'a [f64] {
            position
                .get(&ParameterId::new("x"))
                .expect("Position without x")
        }
    }

    impl Posterior for NormalPosterior {
        fn layout(&self) -> ParameterLayout {
            ParameterLayout::new([("x", self.dim)])
        }

        fn log_pdf(&self, position: &Position) -> f64 {
            let values = self.values(position);
            if let Some((lower, upper)) = self.bounds {
                if values.iter().any(|&x| (x < lower) | (x > upper)) {
                    return f64::NEG_INFINITY;
                }
            }
            values
                .iter()
                .map(|&x| {
                    let z = (x - self.mu) / self.sigma;
                    -0.5 * z * z
                })
                .sum()
        }

        fn log_pdf_gradient(&self, position: &Position) -> Position {
            let grad: Vec<f64> = self
                .values(position)
                .iter()
                .map(|&x| -(x - self.mu) / (self.sigma * self.sigma))
                .collect();
            [("x", grad)].into_iter().collect()
        }

        fn bounds(&self) -> BoundTable {
            let mut table = BoundTable::new();
            if let Some((lower, upper)) = self.bounds {
                table.insert("x", vec![lower; self.dim], vec![upper; self.dim]);
            }
            table
        }

        fn sample_priors<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Position> {
            let values: Vec<f64> = (0..self.dim)
                .map(|_| {
                    let norm: f64 = rng.sample(StandardNormal);
                    let x = self.mu + self.sigma * norm;
                    match self.bounds {
                        Some((lower, upper)) => x.clamp(lower, upper),
                        None => x,
                    }
                })
                .collect();
            Ok([("x", values)].into_iter().collect())
        }
    }
}
