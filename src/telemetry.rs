use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Sender},
    },
    thread,
};

use log::warn;

use crate::error::{HmcError, Result};

/// Diagnostic counters of one sampling request after one trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct Telemetry {
    /// Number of samples the request still has to collect.
    pub samples_remaining: u64,
    /// Trajectories computed so far, accepted or not.
    pub jump_attempts: u64,
    pub jump_acceptances: u64,
    /// Energy change of the last trajectory. Infinite if it diverged.
    pub hamiltonian_differential: f64,
}

impl Telemetry {
    pub fn acceptance_rate(&self) -> f64 {
        if self.jump_attempts == 0 {
            return 0.;
        }
        self.jump_acceptances as f64 / self.jump_attempts as f64
    }
}

/// Delivers telemetry to a user callback on a separate thread.
///
/// Sending never blocks. If the callback panics, the remaining events
/// are dropped.
pub(crate) struct TelemetrySink {
    sender: Sender<Telemetry>,
    disconnected: AtomicBool,
}

impl TelemetrySink {
    pub(crate) fn spawn<F>(mut callback: F) -> Result<Self>
    where
        F: FnMut(Telemetry) + Send + 'static,
    {
        let (sender, receiver) = channel::<Telemetry>();
        thread::Builder::new()
            .name("hmc-telemetry".to_string())
            .spawn(move || {
                for event in receiver {
                    callback(event);
                }
            })
            .map_err(HmcError::TelemetryThread)?;
        Ok(TelemetrySink {
            sender,
            disconnected: AtomicBool::new(false),
        })
    }

    pub(crate) fn emit(&self, event: Telemetry) {
        let sent = self.sender.send(event).is_ok();
        if !sent && !self.disconnected.swap(true, Ordering::Relaxed) {
            warn!("Telemetry callback stopped, dropping further telemetry");
        }
    }
}
