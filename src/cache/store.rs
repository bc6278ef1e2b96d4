//! Bounded cache store
//!
//! Sharded map for the values, plus a background bookkeeping task that owns
//! the [`AdmissionPolicy`]. Writes for new keys are queued and only become
//! visible once the task admits them; call [`BoundedCache::wait`] when a
//! read-after-write must observe the value.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use super::policy::{Admission, AdmissionPolicy};
use super::CacheConfig;

/// Read accesses forwarded to the sketch per batch
const ACCESS_BATCH: usize = 64;

// ============================================================================
// Entries & Events
// ============================================================================

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

enum Event<K, V> {
    Insert {
        key: K,
        hash: u64,
        value: V,
        cost: u64,
        expires_at: Option<Instant>,
    },
    Update {
        key: K,
        cost: u64,
    },
    Barrier(oneshot::Sender<()>),
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
    dropped_sets: AtomicU64,
    dropped_accesses: AtomicU64,
    cost_used: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub cost_used: u64,
    pub max_cost: u64,
    pub hits: u64,
    pub misses: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub expired: u64,
    /// Writes dropped because the bookkeeping queue was full
    pub dropped_sets: u64,
    /// Read accesses never counted by the sketch
    pub dropped_accesses: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

// ============================================================================
// Bounded Cache
// ============================================================================

/// Cost-bounded, TTL-aware concurrent cache
///
/// Safe to share across tasks (`Arc<BoundedCache<K, V>>`). `get` never blocks
/// on writers; `set` never blocks at all. Dropping the cache stops its
/// bookkeeping task.
pub struct BoundedCache<K, V> {
    storage: Arc<DashMap<K, Entry<V>>>,
    events: mpsc::Sender<Event<K, V>>,
    accesses: mpsc::Sender<Vec<u64>>,
    pending_accesses: Mutex<Vec<u64>>,
    hasher: RandomState,
    counters: Arc<Counters>,
    config: CacheConfig,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache and spawn its bookkeeping task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: CacheConfig) -> Self {
        let buffer = config.buffer_items.max(1);
        let (events_tx, events_rx) = mpsc::channel(buffer);
        let (accesses_tx, accesses_rx) = mpsc::channel(buffer);
        let storage = Arc::new(DashMap::new());
        let counters = Arc::new(Counters::default());
        let hasher = RandomState::new();

        let processor = Processor {
            policy: AdmissionPolicy::new(config.num_counters.max(1), config.max_cost),
            storage: Arc::clone(&storage),
            counters: Arc::clone(&counters),
            events: events_rx,
            accesses: accesses_rx,
            cleanup_interval: config.cleanup_interval.max(Duration::from_millis(1)),
        };
        tokio::spawn(processor.run());

        info!(
            num_counters = config.num_counters,
            max_cost = config.max_cost,
            buffer_items = config.buffer_items,
            default_ttl_secs = config.default_ttl.as_secs(),
            "BoundedCache initialized"
        );

        Self {
            storage,
            events: events_tx,
            accesses: accesses_tx,
            pending_accesses: Mutex::new(Vec::with_capacity(ACCESS_BATCH)),
            hasher,
            counters,
            config,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live value. Expired entries read as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        self.record_access(self.hasher.hash_one(key));

        if let Some(entry) = self.storage.get(key) {
            if !entry.is_expired(Instant::now()) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Cache hit");
                return Some(entry.value.clone());
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = ?key, "Cache miss");
        None
    }

    /// Propose an entry with the default TTL
    pub fn set(&self, key: K, value: V, cost: u64) -> bool {
        self.set_with_ttl(key, value, cost, Duration::ZERO)
    }

    /// Propose an entry that expires after `ttl` (zero means the default TTL)
    ///
    /// Returns `false` when the write was dropped up front: the cost alone is
    /// over budget or the bookkeeping queue is full. `true` does not guarantee
    /// admission; a new key can still lose the frequency contest.
    pub fn set_with_ttl(&self, key: K, value: V, cost: u64, ttl: Duration) -> bool {
        if cost > self.config.max_cost {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = ?key, cost = cost, "Cache set rejected, cost over budget");
            return false;
        }

        let ttl = if ttl.is_zero() {
            self.config.default_ttl
        } else {
            ttl
        };
        // A TTL past the end of the clock never expires
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };

        // Resident keys are refreshed in place; only the cost goes through the queue
        if let Some(mut entry) = self.storage.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            drop(entry);
            if self.events.try_send(Event::Update { key, cost }).is_err() {
                self.counters.dropped_sets.fetch_add(1, Ordering::Relaxed);
            }
            return true;
        }

        let hash = self.hasher.hash_one(&key);
        match self.events.try_send(Event::Insert {
            key,
            hash,
            value,
            cost,
            expires_at,
        }) {
            Ok(()) => true,
            Err(_) => {
                self.counters.dropped_sets.fetch_add(1, Ordering::Relaxed);
                debug!("Cache set dropped, bookkeeping queue full");
                false
            }
        }
    }

    /// Block until every write issued before this call has been processed
    pub async fn wait(&self) {
        let pending = self.take_pending_accesses();
        if !pending.is_empty() && self.accesses.send(pending).await.is_err() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        if self.events.send(Event::Barrier(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Number of stored entries (including expired ones not yet swept)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            entries: self.storage.len(),
            cost_used: c.cost_used.load(Ordering::Relaxed),
            max_cost: self.config.max_cost,
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            admitted: c.admitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
            dropped_sets: c.dropped_sets.load(Ordering::Relaxed),
            dropped_accesses: c.dropped_accesses.load(Ordering::Relaxed),
        }
    }

    fn record_access(&self, hash: u64) {
        // Lossy: a contended buffer just skips this sample
        let Ok(mut pending) = self.pending_accesses.try_lock() else {
            self.counters.dropped_accesses.fetch_add(1, Ordering::Relaxed);
            return;
        };
        pending.push(hash);
        if pending.len() < ACCESS_BATCH {
            return;
        }

        let batch = std::mem::replace(&mut *pending, Vec::with_capacity(ACCESS_BATCH));
        drop(pending);
        let len = batch.len() as u64;
        if self.accesses.try_send(batch).is_err() {
            self.counters.dropped_accesses.fetch_add(len, Ordering::Relaxed);
        }
    }

    fn take_pending_accesses(&self) -> Vec<u64> {
        match self.pending_accesses.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

// ============================================================================
// Bookkeeping Task
// ============================================================================

struct Processor<K, V> {
    policy: AdmissionPolicy<K>,
    storage: Arc<DashMap<K, Entry<V>>>,
    counters: Arc<Counters>,
    events: mpsc::Receiver<Event<K, V>>,
    accesses: mpsc::Receiver<Vec<u64>>,
    cleanup_interval: Duration,
}

impl<K, V> Processor<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.cleanup_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                Some(batch) = self.accesses.recv() => self.policy.record_access(&batch),
                _ = sweep.tick() => self.sweep_expired(),
            }
        }

        debug!("Cache bookkeeping task stopped");
    }

    fn handle(&mut self, event: Event<K, V>) {
        match event {
            Event::Insert {
                key,
                hash,
                value,
                cost,
                expires_at,
            } => {
                if self.policy.contains(&key) {
                    // Raced with another insert of the same key: last writer wins
                    if let Some(mut entry) = self.storage.get_mut(&key) {
                        entry.value = value;
                        entry.expires_at = expires_at;
                    }
                    let victims = self.policy.update(&key, cost);
                    self.evict(victims);
                } else {
                    match self.policy.admit(key.clone(), hash, cost) {
                        Admission::Admitted { victims } => {
                            self.evict(victims);
                            self.storage.insert(key, Entry { value, expires_at });
                            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                        }
                        Admission::Rejected => {
                            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                            trace!(key = ?key, "Cache admission rejected");
                        }
                    }
                }
            }
            Event::Update { key, cost } => {
                let victims = self.policy.update(&key, cost);
                self.evict(victims);
            }
            Event::Barrier(done) => {
                while let Ok(batch) = self.accesses.try_recv() {
                    self.policy.record_access(&batch);
                }
                let _ = done.send(());
            }
        }
        self.publish_cost();
    }

    fn evict(&self, victims: Vec<K>) {
        if victims.is_empty() {
            return;
        }
        self.counters
            .evicted
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        for victim in victims {
            self.storage.remove(&victim);
        }
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<K> = self
            .storage
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        if expired.is_empty() {
            return;
        }

        let mut removed = 0u64;
        for key in &expired {
            // Re-check under the shard lock; a concurrent set may have refreshed it
            if self
                .storage
                .remove_if(key, |_, entry| entry.is_expired(now))
                .is_some()
            {
                self.policy.remove(key);
                removed += 1;
            }
        }

        self.counters.expired.fetch_add(removed, Ordering::Relaxed);
        self.publish_cost();
        debug!(count = removed, "Swept expired cache entries");
    }

    fn publish_cost(&self) {
        self.counters
            .cost_used
            .store(self.policy.used_cost(), Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(max_cost: u64) -> CacheConfig {
        CacheConfig {
            num_counters: 1024,
            max_cost,
            buffer_items: 1024,
            default_ttl: Duration::from_secs(60),
            cleanup_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_get_set_after_wait() {
        let cache: BoundedCache<String, String> = BoundedCache::new(small_config(100));

        assert!(cache.get(&"k".to_string()).is_none());
        assert!(cache.set("k".into(), "v".into(), 1));
        cache.wait().await;

        assert_eq!(cache.get(&"k".to_string()), Some("v".to_string()));
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.cost_used, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.admitted, 1);
    }

    #[tokio::test]
    async fn test_update_in_place_is_immediate() {
        let cache: BoundedCache<&'static str, u32> = BoundedCache::new(small_config(100));
        cache.set("k", 1, 1);
        cache.wait().await;

        // No wait needed for a resident key
        cache.set("k", 2, 1);
        assert_eq!(cache.get(&"k"), Some(2));
        cache.wait().await;
        assert_eq!(cache.stats().cost_used, 1);
    }

    #[tokio::test]
    async fn test_oversized_cost_rejected() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(small_config(10));
        assert!(!cache.set(1, 1, 11));
        cache.wait().await;
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(small_config(10));
        cache.set_with_ttl(1, 1, 1, Duration::from_millis(50));
        cache.wait().await;
        assert_eq!(cache.get(&1), Some(1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&1).is_none());

        // Sweeper releases the cost
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.wait().await;
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.cost_used, 0);
        assert_eq!(stats.expired, 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(small_config(10));
        assert!(cache.set_with_ttl(1, 1, 1, Duration::MAX));
        cache.wait().await;
        assert_eq!(cache.get(&1), Some(1));

        // Same for the default TTL
        let config = CacheConfig {
            default_ttl: Duration::from_secs(u64::MAX),
            ..small_config(10)
        };
        let cache: BoundedCache<u32, u32> = BoundedCache::new(config);
        assert!(cache.set(2, 2, 1));
        cache.wait().await;
        assert_eq!(cache.get(&2), Some(2));
    }

    #[tokio::test]
    async fn test_zero_default_ttl_never_expires() {
        let config = CacheConfig {
            default_ttl: Duration::ZERO,
            ..small_config(10)
        };
        let cache: BoundedCache<u32, u32> = BoundedCache::new(config);
        cache.set(1, 1, 1);
        cache.wait().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&1), Some(1));
    }

    #[tokio::test]
    async fn test_cost_bound_holds() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(small_config(50));

        let mut accepted = 0;
        for round in 0..10u32 {
            for i in 0..40u32 {
                if cache.set(round * 40 + i, i, 1) {
                    accepted += 1;
                }
            }
            cache.wait().await;
            let stats = cache.stats();
            assert!(stats.cost_used <= 50, "cost {} over budget", stats.cost_used);
            assert!(cache.len() <= 50);
        }
        assert!(accepted > 0);
    }

    #[tokio::test]
    async fn test_hot_keys_survive_pressure() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(small_config(10));
        for i in 0..10u32 {
            cache.set(i, i, 1);
        }
        cache.wait().await;

        for _ in 0..10 {
            for i in 0..10u32 {
                assert_eq!(cache.get(&i), Some(i));
            }
        }
        cache.wait().await;

        for i in 100..200u32 {
            cache.set(i, i, 1);
        }
        cache.wait().await;

        for i in 0..10u32 {
            assert_eq!(cache.get(&i), Some(i), "hot key {} evicted", i);
        }
        assert!(cache.stats().rejected >= 100);
    }

    #[tokio::test]
    async fn test_full_queue_drops_sets() {
        let config = CacheConfig {
            buffer_items: 1,
            ..small_config(1000)
        };
        let cache: BoundedCache<u32, u32> = BoundedCache::new(config);

        // The task cannot run until we yield, so the second new key finds the queue full
        assert!(cache.set(1, 1, 1));
        assert!(!cache.set(2, 2, 1));
        assert_eq!(cache.stats().dropped_sets, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
