use std::sync::atomic::{AtomicU64, Ordering};

/// Settings for step size adaptation
#[derive(Debug, Clone, Copy)]
pub struct DualAverageOptions {
    pub k: f64,
    pub t0: f64,
    pub gamma: f64,
}

impl Default for DualAverageOptions {
    fn default() -> DualAverageOptions {
        DualAverageOptions {
            k: 0.75,
            t0: 10.,
            gamma: 0.05,
        }
    }
}

/// Nesterov dual averaging of the log step size towards a target
/// acceptance rate.
#[derive(Debug, Clone)]
pub struct DualAverage {
    log_step: f64,
    log_step_adapted: f64,
    hbar: f64,
    mu: f64,
    count: u64,
    settings: DualAverageOptions,
}

impl DualAverage {
    pub fn new(settings: DualAverageOptions, initial_step: f64) -> DualAverage {
        DualAverage {
            log_step: initial_step.ln(),
            log_step_adapted: initial_step.ln(),
            hbar: 0.,
            mu: (10. * initial_step).ln(),
            count: 0,
            settings,
        }
    }

    /// Incorporate the acceptance probability of one trajectory.
    pub fn advance(&mut self, accept_stat: f64, target: f64) {
        let m = (self.count + 1) as f64;
        let w = 1. / (m + self.settings.t0);
        self.hbar = (1. - w) * self.hbar + w * (target - accept_stat);
        self.log_step = self.mu - self.hbar * m.sqrt() / self.settings.gamma;
        let mk = m.powf(-self.settings.k);
        self.log_step_adapted = mk * self.log_step + (1. - mk) * self.log_step_adapted;
        self.count += 1;
    }

    /// The step size to use for the next trajectory.
    pub fn current_step_size(&self) -> f64 {
        self.log_step.exp()
    }

    /// The smoothed step size, used after warm-up.
    pub fn current_step_size_adapted(&self) -> f64 {
        self.log_step_adapted.exp()
    }

    pub fn hbar(&self) -> f64 {
        self.hbar
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// A step size shared between all sampling requests of one sampler.
///
/// Reads and writes are atomic, so a cancelled warm-up can never leave a
/// partially written value behind.
#[derive(Debug)]
pub(crate) struct StepSizeCell(AtomicU64);

impl StepSizeCell {
    pub(crate) fn new(step_size: f64) -> Self {
        StepSizeCell(AtomicU64::new(step_size.to_bits()))
    }

    pub(crate) fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, step_size: f64) {
        self.0.store(step_size.to_bits(), Ordering::Release);
    }
}
