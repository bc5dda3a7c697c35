//! Keyed single-flight registry.
//!
//! The first caller for a key leads and runs the work; callers arriving
//! while it runs park a one-shot waiter and receive a clone of the leader's
//! result. Entries are removed as soon as the work finishes, so a later
//! call for the same key runs again.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

type Shared<T, E> = Result<T, Arc<E>>;
type Waiters<T, E> = Vec<oneshot::Sender<Shared<T, E>>>;

/// Deduplicates concurrent work by key.
pub struct SingleFlight<K, T, E> {
    in_flight: Mutex<HashMap<K, Waiters<T, E>>>,
}

impl<K, T, E> fmt::Debug for SingleFlight<K, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.lock().len())
            .finish()
    }
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T, E> SingleFlight<K, T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Waiters<T, E>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys with work in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless it is already running, in which case wait
    /// for and share that run's result.
    ///
    /// If the leading caller is dropped before finishing, its waiters retry
    /// and one of them takes over.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Shared<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        while let Some(waiter) = self.join_or_lead(&key) {
            if let Ok(result) = waiter.await {
                return result;
            }
        }

        let mut lead = Lead {
            flight: self,
            key: Some(key),
        };
        let result = work().await.map_err(Arc::new);
        lead.complete(&result);
        result
    }

    // `None` means the caller now leads `key`.
    fn join_or_lead(&self, key: &K) -> Option<oneshot::Receiver<Shared<T, E>>> {
        let mut in_flight = self.lock();
        if let Some(waiters) = in_flight.get_mut(key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            Some(rx)
        } else {
            in_flight.insert(key.clone(), Vec::new());
            None
        }
    }
}

/// Removes the leader's entry when it finishes or is dropped.
struct Lead<'a, K, T, E>
where
    K: Eq + Hash,
{
    flight: &'a SingleFlight<K, T, E>,
    key: Option<K>,
}

impl<K, T, E> Lead<'_, K, T, E>
where
    K: Eq + Hash,
    T: Clone,
{
    fn complete(&mut self, result: &Shared<T, E>) {
        let Some(key) = self.key.take() else {
            return;
        };
        let waiters = self.flight.lock().remove(&key).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl<K, T, E> Drop for Lead<'_, K, T, E>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            // Dropping the senders wakes the waiters so one can take over.
            self.flight.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;
    use rstest::rstest;
    use tokio::sync::Notify;

    #[rstest]
    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let flight: SingleFlight<u32, usize, String> = SingleFlight::new();
        let runs = AtomicUsize::new(0);
        let gate = Notify::new();

        let callers = (0..5).map(|_| {
            flight.run(7, || async {
                runs.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(42)
            })
        });
        let release = async {
            while flight.is_empty() {
                tokio::task::yield_now().await;
            }
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            gate.notify_one();
        };
        let (results, ()) = tokio::join!(join_all(callers), release);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().ok() == Some(&42)));
        assert!(flight.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flight: SingleFlight<u32, u32, String> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flight.run(1, || async { Ok(1) }),
            flight.run(2, || async { Ok(2) })
        );
        assert_eq!(a.ok(), Some(1));
        assert_eq!(b.ok(), Some(2));
    }

    #[rstest]
    #[tokio::test]
    async fn errors_are_shared_and_not_cached() {
        let flight: SingleFlight<u32, u32, String> = SingleFlight::new();
        let failed = flight.run(1, || async { Err("boom".to_owned()) }).await;
        assert_eq!(failed.err().as_deref().map(String::as_str), Some("boom"));

        let retried = flight.run(1, || async { Ok(5) }).await;
        assert_eq!(retried.ok(), Some(5));
    }

    #[rstest]
    #[tokio::test]
    async fn dropped_leader_hands_over_to_a_waiter() {
        let flight: SingleFlight<u32, u32, String> = SingleFlight::new();
        let mut leader = Box::pin(flight.run(3, || std::future::pending::<Result<u32, String>>()));
        let mut follower = Box::pin(flight.run(3, || async { Ok(9) }));

        // Poll both once so the leader registers and the follower parks.
        tokio::select! {
            biased;
            _ = &mut leader => panic!("leader never finishes"),
            _ = &mut follower => panic!("follower must wait for the leader"),
            () = tokio::task::yield_now() => {}
        }
        drop(leader);

        assert_eq!(follower.await.ok(), Some(9));
    }
}
