//! Deferred readiness of the shared spatial store handle.
//!
//! The engine is constructed before its store is opened. Components that
//! must not lose work (the derived-geometry maintainer) park a one-shot
//! waiter on the slot; the waiters are drained exactly once when a store is
//! installed. Everything else treats a missing store as a precondition
//! failure.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cosm_core::SpatialStore;
use log::debug;
use tokio::sync::oneshot;

use crate::error::ReplicaError;

type Waiter = oneshot::Sender<Arc<dyn SpatialStore>>;

enum SlotState {
    Uninitialized(Vec<Waiter>),
    Ready(Arc<dyn SpatialStore>),
    Closed,
}

/// What a caller gets when asking for the store.
pub enum Readiness {
    /// The store is available now.
    Ready(Arc<dyn SpatialStore>),
    /// The store will be delivered on install; the sender is dropped if the
    /// slot closes first.
    Pending(oneshot::Receiver<Arc<dyn SpatialStore>>),
    /// The store has been released.
    Closed,
}

/// Lifecycle of the shared store: uninitialised, ready, then closed.
pub struct StatementSlot {
    state: Mutex<SlotState>,
}

impl fmt::Debug for StatementSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            SlotState::Uninitialized(waiters) => format!("Uninitialized({} waiting)", waiters.len()),
            SlotState::Ready(_) => "Ready".to_owned(),
            SlotState::Closed => "Closed".to_owned(),
        };
        f.debug_struct("StatementSlot").field("state", &state).finish()
    }
}

impl Default for StatementSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementSlot {
    /// An uninitialised slot with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Uninitialized(Vec::new())),
        }
    }

    // The state is a plain enum; a panic mid-update cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `store` and release every parked waiter.
    ///
    /// # Errors
    ///
    /// [`ReplicaError::AlreadyAttached`] if a store is installed, or
    /// [`ReplicaError::StaleStatement`] once the slot has closed.
    pub fn install(&self, store: Arc<dyn SpatialStore>) -> Result<(), ReplicaError> {
        let waiters = {
            let mut state = self.lock();
            match &mut *state {
                SlotState::Uninitialized(waiters) => {
                    let waiters = mem::take(waiters);
                    *state = SlotState::Ready(Arc::clone(&store));
                    waiters
                }
                SlotState::Ready(_) => return Err(ReplicaError::AlreadyAttached),
                SlotState::Closed => {
                    return Err(ReplicaError::StaleStatement { operation: "attach" });
                }
            }
        };
        debug!("Spatial store attached; replaying {} deferred requests", waiters.len());
        for waiter in waiters {
            // A dropped receiver means the requester no longer cares.
            let _ = waiter.send(Arc::clone(&store));
        }
        Ok(())
    }

    /// The store, if ready.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn SpatialStore>> {
        match &*self.lock() {
            SlotState::Ready(store) => Some(Arc::clone(store)),
            SlotState::Uninitialized(_) | SlotState::Closed => None,
        }
    }

    /// The store, or [`ReplicaError::StaleStatement`] naming `operation`.
    pub fn require(&self, operation: &'static str) -> Result<Arc<dyn SpatialStore>, ReplicaError> {
        self.get()
            .ok_or(ReplicaError::StaleStatement { operation })
    }

    /// The store now, or a receiver that yields it on install.
    #[must_use]
    pub fn defer(&self) -> Readiness {
        let mut state = self.lock();
        match &mut *state {
            SlotState::Ready(store) => Readiness::Ready(Arc::clone(store)),
            SlotState::Uninitialized(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Readiness::Pending(rx)
            }
            SlotState::Closed => Readiness::Closed,
        }
    }

    /// Whether a store is installed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), SlotState::Ready(_))
    }

    /// Close the slot, returning the store that was installed, if any.
    ///
    /// Parked waiters are dropped and observe a closed channel.
    pub fn close(&self) -> Option<Arc<dyn SpatialStore>> {
        match mem::replace(&mut *self.lock(), SlotState::Closed) {
            SlotState::Ready(store) => Some(store),
            SlotState::Uninitialized(_) | SlotState::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosm_data::{SqliteSpatialStore, StoreOptions};
    use rstest::rstest;

    fn store() -> Arc<dyn SpatialStore> {
        Arc::new(SqliteSpatialStore::open_in_memory(StoreOptions::default()).expect("open store"))
    }

    #[rstest]
    #[tokio::test]
    async fn pending_waiters_are_released_on_install() {
        let slot = StatementSlot::new();
        let Readiness::Pending(first) = slot.defer() else {
            panic!("expected pending readiness");
        };
        let Readiness::Pending(second) = slot.defer() else {
            panic!("expected pending readiness");
        };
        assert!(!slot.is_ready());

        slot.install(store()).expect("install");
        assert!(first.await.is_ok());
        assert!(second.await.is_ok());
        assert!(matches!(slot.defer(), Readiness::Ready(_)));
    }

    #[rstest]
    fn second_install_is_rejected() {
        let slot = StatementSlot::new();
        slot.install(store()).expect("install");
        let err = slot.install(store()).expect_err("second install");
        assert!(matches!(err, ReplicaError::AlreadyAttached));
    }

    #[rstest]
    fn require_names_the_operation() {
        let slot = StatementSlot::new();
        let Err(err) = slot.require("nearest_lines") else {
            panic!("no store is installed yet");
        };
        assert!(matches!(
            err,
            ReplicaError::StaleStatement {
                operation: "nearest_lines"
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn closing_drops_parked_waiters() {
        let slot = StatementSlot::new();
        let Readiness::Pending(waiter) = slot.defer() else {
            panic!("expected pending readiness");
        };
        assert!(slot.close().is_none());
        assert!(waiter.await.is_err());
        assert!(matches!(slot.defer(), Readiness::Closed));
        assert!(slot.install(store()).is_err());
    }
}
