use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::task::yield_now;

use crate::{
    bounds::FlatBounds,
    burn_in::BurnIn,
    chain::Chain,
    error::{HmcError, Result},
    mass_matrix::MassMatrix,
    posterior::{sample_initial_position, Posterior},
    position::{ParameterLayout, Position},
    stepsize::{DualAverage, DualAverageOptions, StepSizeCell},
    telemetry::{Telemetry, TelemetrySink},
};

/// Settings for the HMC sampler
#[derive(Debug, Clone)]
pub struct HmcSettings {
    /// The number of trajectories between two collected samples.
    pub steps_between_samples: u64,
    /// The number of leapfrog steps in each trajectory.
    pub num_leapfrog_steps: u64,
    /// The step size at the start of warm-up. If adaptation is disabled this
    /// step size is used for all trajectories.
    pub initial_step_size: f64,
    /// The number of warm-up trajectories before the first sample.
    pub num_burn_in: u64,
    /// Diagonal of a fixed mass matrix. Unit mass if `None`.
    pub mass: Option<Box<[f64]>>,
    /// Adapt the step size during warm-up.
    pub adapt_step_size: bool,
    /// The acceptance rate the step size adaptation aims for.
    pub target_accept: f64,
    /// Constants of the dual averaging. The defaults `gamma = 0.05`,
    /// `t0 = 10` and `k = 0.75` are the standard values; other values
    /// change how fast and how smoothly the step size adapts.
    pub dual_average: DualAverageOptions,
    pub seed: u64,
}

impl Default for HmcSettings {
    fn default() -> Self {
        Self {
            steps_between_samples: 1,
            num_leapfrog_steps: 10,
            initial_step_size: 0.1,
            num_burn_in: 100,
            mass: None,
            adapt_step_size: true,
            target_accept: 0.8,
            dual_average: DualAverageOptions::default(),
            seed: 0,
        }
    }
}

impl HmcSettings {
    /// Check the settings that do not depend on the posterior.
    pub fn validate(&self) -> Result<()> {
        if self.steps_between_samples == 0 {
            return Err(HmcError::InvalidStepsBetweenSamples);
        }
        if self.num_leapfrog_steps == 0 {
            return Err(HmcError::InvalidLeapfrogSteps);
        }
        if !(self.initial_step_size.is_finite() & (self.initial_step_size > 0.)) {
            return Err(HmcError::InvalidStepSize(self.initial_step_size));
        }
        if !((self.target_accept > 0.) & (self.target_accept < 1.)) {
            return Err(HmcError::InvalidTargetAccept(self.target_accept));
        }
        Ok(())
    }
}

/// Put the initial step size back if a warm-up did not finish, so that the
/// sampler never reports a half-adapted value.
struct RestoreStepSize<'a> {
    step_size: &'a StepSizeCell,
    initial: f64,
    armed: bool,
}

impl Drop for RestoreStepSize<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.step_size.set(self.initial);
        }
    }
}

/// Hamiltonian Monte Carlo with a fixed number of leapfrog steps.
///
/// The sampler can be shared between any number of concurrent sampling
/// requests. The first request runs the warm-up, all requests start from
/// its final position and use the step size it found.
pub struct HmcSampler<P: Posterior> {
    posterior: P,
    settings: HmcSettings,
    layout: ParameterLayout,
    bounds: FlatBounds,
    mass_matrix: MassMatrix,
    step_size: StepSizeCell,
    dual_average: Mutex<DualAverage>,
    burn_in: BurnIn,
    seed_position: Option<Box<[f64]>>,
    telemetry: Option<TelemetrySink>,
    next_stream: AtomicU64,
}

impl<P: Posterior> HmcSampler<P> {
    pub fn new(posterior: P, settings: HmcSettings) -> Result<Self> {
        settings.validate()?;
        let layout = posterior.layout();
        let bounds = FlatBounds::new(&layout, &posterior.bounds())?;
        let mass_matrix = MassMatrix::new(settings.mass.as_deref(), layout.dim())?;
        let dual_average = DualAverage::new(settings.dual_average, settings.initial_step_size);
        debug!(
            "Created sampler for {} coordinates in {} parameters (bounded: {})",
            layout.dim(),
            layout.len(),
            bounds.is_bounded()
        );

        Ok(Self {
            step_size: StepSizeCell::new(settings.initial_step_size),
            dual_average: Mutex::new(dual_average),
            burn_in: BurnIn::new(),
            seed_position: None,
            telemetry: None,
            // Stream 0 belongs to the warm-up
            next_stream: AtomicU64::new(1),
            posterior,
            settings,
            layout,
            bounds,
            mass_matrix,
        })
    }

    /// Start the warm-up at `position` instead of a draw from the priors.
    pub fn with_seed(mut self, position: &Position) -> Result<Self> {
        self.seed_position = Some(self.layout.flatten(position)?);
        Ok(self)
    }

    /// Report the progress of every sampling request to `callback`.
    ///
    /// The callback runs on a separate thread and never delays sampling.
    pub fn with_telemetry<F>(mut self, callback: F) -> Result<Self>
    where
        F: FnMut(Telemetry) + Send + 'static,
    {
        self.telemetry = Some(TelemetrySink::spawn(callback)?);
        Ok(self)
    }

    pub fn posterior(&self) -> &P {
        &self.posterior
    }

    pub fn settings(&self) -> &HmcSettings {
        &self.settings
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn dim(&self) -> usize {
        self.layout.dim()
    }

    /// The step size of the next trajectory.
    pub fn step_size(&self) -> f64 {
        self.step_size.get()
    }

    pub fn is_burned_in(&self) -> bool {
        self.burn_in.is_completed()
    }

    /// The position at the end of the warm-up.
    ///
    /// Runs the warm-up if no other request did so yet, otherwise waits for
    /// its result.
    pub async fn burn_in(&self) -> Result<Position> {
        let start = self.burn_in_flat().await?;
        self.layout.unflatten(&start)
    }

    /// Draw `count` samples, starting at the end of the warm-up.
    pub async fn sample(&self, count: usize) -> Result<Vec<Position>> {
        if count == 0 {
            return Ok(vec![]);
        }
        let start = self.burn_in_flat().await?;

        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let step_size = self.step_size.get();
        let mut chain = Chain::for_posterior(
            &self.posterior,
            &self.layout,
            &self.mass_matrix,
            &self.bounds,
            &start,
            self.rng(stream),
        )?;

        let mut samples = Vec::with_capacity(count);
        while samples.len() < count {
            let remaining = (count - samples.len()) as u64;
            for _ in 0..self.settings.steps_between_samples {
                let transition = chain.transition(step_size, self.settings.num_leapfrog_steps)?;
                if let Some(sink) = &self.telemetry {
                    sink.emit(chain.telemetry(remaining, &transition));
                }
                yield_now().await;
            }
            samples.push(self.layout.unflatten(chain.position())?);
        }
        Ok(samples)
    }

    async fn burn_in_flat(&self) -> Result<Arc<[f64]>> {
        if let Some(start) = self.burn_in.outcome() {
            return Ok(start);
        }
        self.burn_in.get_or_run(|| self.warm_up()).await
    }

    async fn warm_up(&self) -> Result<Box<[f64]>> {
        let mut rng = self.rng(0);
        let init = match &self.seed_position {
            Some(seed) => seed.clone(),
            None => sample_initial_position(&self.posterior, &self.layout, &mut rng)?,
        };

        // A cancelled earlier run may have left its state behind
        self.reset_step_size();
        let mut restore = RestoreStepSize {
            step_size: &self.step_size,
            initial: self.settings.initial_step_size,
            armed: true,
        };

        if self.settings.num_burn_in == 0 {
            restore.armed = false;
            return Ok(init);
        }

        debug!(
            "Starting warm-up with {} trajectories and step size {}",
            self.settings.num_burn_in,
            self.step_size.get()
        );

        let mut chain = Chain::for_posterior(
            &self.posterior,
            &self.layout,
            &self.mass_matrix,
            &self.bounds,
            &init,
            rng,
        )?;
        for _ in 0..self.settings.num_burn_in {
            let transition =
                chain.transition(self.step_size.get(), self.settings.num_leapfrog_steps)?;
            if self.settings.adapt_step_size {
                self.adapt_step_size(transition.accept_prob);
            }
            yield_now().await;
        }

        if self.settings.adapt_step_size {
            let final_step = self
                .dual_average
                .lock()
                .expect("Poisoned lock")
                .current_step_size_adapted();
            self.step_size.set(final_step);
        }
        restore.armed = false;
        debug!(
            "Finished warm-up with step size {} and log density {}",
            self.step_size.get(),
            chain.log_pdf()
        );
        Ok(chain.position().into())
    }

    fn reset_step_size(&self) {
        let mut dual_average = self.dual_average.lock().expect("Poisoned lock");
        *dual_average =
            DualAverage::new(self.settings.dual_average, self.settings.initial_step_size);
        self.step_size.set(self.settings.initial_step_size);
    }

    fn adapt_step_size(&self, accept_prob: f64) {
        let mut dual_average = self.dual_average.lock().expect("Poisoned lock");
        dual_average.advance(accept_prob, self.settings.target_accept);
        self.step_size.set(dual_average.current_step_size());
    }

    fn rng(&self, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed);
        rng.set_stream(stream);
        rng
    }
}
