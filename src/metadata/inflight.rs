//! Single-flight registry
//!
//! Concurrent callers for the same key share one computation. The first
//! caller runs it; everyone else awaits the same cell. Entries are removed
//! once the computation settles, so a later miss starts a fresh flight.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// In-flight computations keyed by `K`
pub struct InFlight<K, T> {
    flights: DashMap<K, Arc<OnceCell<T>>>,
}

impl<K, T> Default for InFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> InFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    /// Run `init` unless a flight for `key` is already underway, then share its result
    ///
    /// If the running caller is cancelled, the next waiter takes over.
    pub async fn run<F, Fut>(&self, key: &K, init: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The shard guard must not be held across the await
        let cell = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let value = cell.get_or_init(init).await.clone();

        self.flights
            .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));
        value
    }

    /// Number of keys with a computation underway
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
