//! Run the warm-up phase of a sampler exactly once.
//!
//! The first caller that finds the coordinator in the not-started state
//! runs the warm-up, everybody else waits for its result. The outcome is
//! assigned once and shared by all later callers.

use std::{future::Future, sync::Arc};

use tokio::sync::watch;

use crate::error::{HmcError, Result};

#[derive(Debug, Clone)]
enum BurnInState {
    NotStarted,
    Running,
    Completed(Arc<[f64]>),
    Failed(Arc<HmcError>),
}

pub(crate) struct BurnIn {
    state: watch::Sender<BurnInState>,
}

/// Return the coordinator to not-started if the warm-up future is dropped
/// before it finished, so that a later caller can run it.
struct ResetOnDrop<'a> {
    state: &'a watch::Sender<BurnInState>,
    armed: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(BurnInState::NotStarted);
        }
    }
}

impl BurnIn {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(BurnInState::NotStarted);
        BurnIn { state }
    }

    pub(crate) fn is_completed(&self) -> bool {
        matches!(*self.state.borrow(), BurnInState::Completed(_))
    }

    /// The final warm-up position, if the warm-up already finished.
    pub(crate) fn outcome(&self) -> Option<Arc<[f64]>> {
        match &*self.state.borrow() {
            BurnInState::Completed(position) => Some(position.clone()),
            _ => None,
        }
    }

    /// Return the warm-up result, running `warm_up` if nobody else did yet.
    pub(crate) async fn get_or_run<F, Fut>(&self, warm_up: F) -> Result<Arc<[f64]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Box<[f64]>>>,
    {
        let mut receiver = self.state.subscribe();
        loop {
            let claimed = self.state.send_if_modified(|state| {
                if let BurnInState::NotStarted = state {
                    *state = BurnInState::Running;
                    true
                } else {
                    false
                }
            });

            if claimed {
                let mut guard = ResetOnDrop {
                    state: &self.state,
                    armed: true,
                };
                let result = warm_up().await;
                guard.armed = false;
                return self.publish(result);
            }

            let state = receiver
                .wait_for(|state| !matches!(state, BurnInState::Running))
                .await
                .map(|state| (*state).clone());
            match state {
                Ok(BurnInState::Completed(position)) => return Ok(position),
                Ok(BurnInState::Failed(err)) => return Err(HmcError::BurnInFailed(err)),
                // The previous runner was cancelled
                Ok(BurnInState::NotStarted) => continue,
                Ok(BurnInState::Running) => unreachable!("wait_for returned a running state"),
                Err(_) => unreachable!("Burn-in state sender dropped while borrowed"),
            }
        }
    }

    fn publish(&self, result: Result<Box<[f64]>>) -> Result<Arc<[f64]>> {
        let (state, output) = match result {
            Ok(position) => {
                let position: Arc<[f64]> = position.into();
                (BurnInState::Completed(position.clone()), Ok(position))
            }
            Err(err) => {
                let err = Arc::new(err);
                (
                    BurnInState::Failed(err.clone()),
                    Err(HmcError::BurnInFailed(err)),
                )
            }
        };
        self.state.send_modify(|current| {
            assert!(
                matches!(current, BurnInState::Running),
                "Burn-in outcome was published twice"
            );
            *current = state;
        });
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_exactly_once() {
        let burn_in = Arc::new(BurnIn::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let burn_in = burn_in.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                burn_in
                    .get_or_run(|| async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(vec![1., 2.].into())
                    })
                    .await
            }));
        }

        for handle in handles {
            let position = handle.await.unwrap().unwrap();
            assert_eq!(&position[..], &[1., 2.]);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(burn_in.is_completed());
        assert_eq!(burn_in.outcome().as_deref(), Some(&[1., 2.][..]));
    }

    #[tokio::test]
    async fn failure_is_shared() {
        let burn_in = BurnIn::new();
        let err = burn_in
            .get_or_run(|| async { Err(HmcError::MissingParameter("x".into())) })
            .await
            .unwrap_err();
        assert!(err.is_dimension_mismatch());

        let err = burn_in
            .get_or_run(|| async { Ok(vec![0.].into()) })
            .await
            .unwrap_err();
        assert!(matches!(err, HmcError::BurnInFailed(_)));
        assert!(!burn_in.is_completed());
    }

    #[tokio::test]
    async fn cancelled_run_can_be_restarted() {
        let burn_in = BurnIn::new();
        let pending = burn_in.get_or_run(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![0.].into())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        let position = burn_in
            .get_or_run(|| async { Ok(vec![3.].into()) })
            .await
            .unwrap();
        assert_eq!(&position[..], &[3.]);
    }
}
