//! Derived geometry maintenance.
//!
//! A single background worker runs store passes until one reports no
//! changed rows. Requests arriving while the worker runs set a rerun flag,
//! so at most one invocation is active and at most one is queued. When no
//! store is attached yet the worker parks on the statement slot and the
//! queued request is replayed once the store arrives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cosm_core::{SpatialStore, StoreError};
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::deferred::{Readiness, StatementSlot};
use crate::error::ReplicaError;

/// Outcome of one maintainer invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Store passes executed, including the final zero-change pass.
    pub passes: usize,
    /// Rows changed across all passes.
    pub rows_changed: usize,
}

#[derive(Debug, Clone, Default)]
struct Progress {
    completed: u64,
    outcome: Option<Result<PassReport, Arc<StoreError>>>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct RunState {
    requested: u64,
    running: bool,
    rerun: bool,
    invocations: u64,
}

#[derive(Debug)]
struct Inner {
    slot: Arc<StatementSlot>,
    state: Mutex<RunState>,
    progress: watch::Sender<Progress>,
}

/// Coalescing driver for the store's derived-geometry pass.
#[derive(Debug, Clone)]
pub struct Maintainer {
    inner: Arc<Inner>,
}

impl Maintainer {
    /// Create a maintainer over `slot`. No task runs until a pass is
    /// requested.
    #[must_use]
    pub fn new(slot: Arc<StatementSlot>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            inner: Arc::new(Inner {
                slot,
                state: Mutex::new(RunState::default()),
                progress,
            }),
        }
    }

    /// Request a pass without waiting for it; returns the request's
    /// generation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_pass(&self) -> u64 {
        let (generation, spawn) = {
            let mut state = self.inner.lock();
            state.requested += 1;
            let spawn = if state.running {
                state.rerun = true;
                false
            } else {
                state.running = true;
                true
            };
            (state.requested, spawn)
        };
        if spawn {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.work().await });
        } else {
            debug!("Derived geometry pass coalesced: generation={generation}");
        }
        generation
    }

    /// Run derived geometry to a fixed point and wait for the result.
    ///
    /// Safe to call concurrently and with no pending work. Before a store
    /// is attached the call waits until one is.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::Store`] if a pass failed, or
    /// [`ReplicaError::MaintainerStopped`] if the store was released first.
    pub async fn recompute_derived_geometry(&self) -> Result<PassReport, ReplicaError> {
        let mut progress = self.inner.progress.subscribe();
        let generation = self.request_pass();
        let seen = progress
            .wait_for(|p| p.stopped || p.completed >= generation)
            .await
            .map_err(|_| ReplicaError::MaintainerStopped)?;
        if seen.completed < generation {
            return Err(ReplicaError::MaintainerStopped);
        }
        match &seen.outcome {
            Some(Ok(report)) => Ok(*report),
            Some(Err(err)) => Err(ReplicaError::Store(Arc::clone(err))),
            None => Err(ReplicaError::MaintainerStopped),
        }
    }

    /// Number of worker invocations started so far.
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.inner.lock().invocations
    }

    /// Whether an invocation is running or queued.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.lock().running
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn work(&self) {
        loop {
            let generation = {
                let mut state = self.lock();
                state.rerun = false;
                state.invocations += 1;
                state.requested
            };

            let Some(store) = self.await_store().await else {
                self.lock().running = false;
                self.progress.send_modify(|p| p.stopped = true);
                return;
            };
            let outcome = run_to_fixed_point(store.as_ref()).await;
            match &outcome {
                Ok(report) => info!(
                    "Derived geometry at fixed point: passes={}, rows_changed={}",
                    report.passes, report.rows_changed
                ),
                Err(err) => warn!("Derived geometry pass failed: {err}"),
            }
            self.progress.send_modify(|p| {
                p.completed = p.completed.max(generation);
                p.outcome = Some(outcome.map_err(Arc::new));
            });

            let mut state = self.lock();
            if !state.rerun {
                state.running = false;
                return;
            }
        }
    }

    async fn await_store(&self) -> Option<Arc<dyn SpatialStore>> {
        match self.slot.defer() {
            Readiness::Ready(store) => Some(store),
            Readiness::Pending(waiter) => {
                debug!("Derived geometry pass deferred until a store is attached");
                waiter.await.ok()
            }
            Readiness::Closed => None,
        }
    }
}

async fn run_to_fixed_point(store: &dyn SpatialStore) -> Result<PassReport, StoreError> {
    let mut report = PassReport::default();
    loop {
        let changed = store.compute_missing_derived_geometry().await?;
        report.passes += 1;
        report.rows_changed += changed;
        debug!("Derived geometry pass {}: changed={changed}", report.passes);
        if changed == 0 {
            return Ok(report);
        }
        tokio::task::yield_now().await;
    }
}
