//! Sample from differentiable, optionally box-constrained densities with
//! Hamiltonian Monte Carlo.
//!
//! Trajectories use a fixed number of leapfrog steps. Coordinates with
//! bounds are reflected at the walls. The step size is tuned by dual
//! averaging during a warm-up that runs once per sampler, however many
//! sampling requests share it.
//!
//! ```
//! use hmc_rs::{HmcSampler, HmcSettings, ParameterLayout, Position, Posterior};
//! use rand::Rng;
//! use rand_distr::StandardNormal;
//!
//! struct StandardNormalPosterior;
//!
//! impl Posterior for StandardNormalPosterior {
//!     fn layout(&self) -> ParameterLayout {
//!         ParameterLayout::new([("mu", 2)])
//!     }
//!
//!     fn log_pdf(&self, position: &Position) -> f64 {
//!         let mu = position.get(&"mu".into()).unwrap_or(&[]);
//!         -0.5 * mu.iter().map(|x| x * x).sum::<f64>()
//!     }
//!
//!     fn log_pdf_gradient(&self, position: &Position) -> Position {
//!         position.scale(-1.)
//!     }
//!
//!     fn sample_priors<R: Rng + ?Sized>(&self, rng: &mut R) -> anyhow::Result<Position> {
//!         let mu: Vec<f64> = (0..2).map(|_| rng.sample(StandardNormal)).collect();
//!         Ok([("mu", mu)].into_iter().collect())
//!     }
//! }
//!
//! let sampler = HmcSampler::new(StandardNormalPosterior, HmcSettings::default())?;
//! let runtime = tokio::runtime::Builder::new_current_thread().build()?;
//! let samples = runtime.block_on(sampler.sample(100))?;
//! assert_eq!(samples.len(), 100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub(crate) mod bounds;
pub(crate) mod burn_in;
pub(crate) mod chain;
pub(crate) mod error;
pub(crate) mod hamiltonian;
pub(crate) mod integrator;
pub(crate) mod mass_matrix;
pub(crate) mod math;
pub(crate) mod position;
pub(crate) mod posterior;
pub(crate) mod sampler;
pub(crate) mod stepsize;
pub(crate) mod telemetry;

pub use bounds::{reflect, BoundTable};
pub use error::{HmcError, Result};
pub use hamiltonian::{acceptance_probability, energy_change};
pub use position::{ParameterId, ParameterLayout, Position};
pub use posterior::Posterior;
pub use sampler::{HmcSampler, HmcSettings};
pub use stepsize::{DualAverage, DualAverageOptions};
pub use telemetry::Telemetry;
