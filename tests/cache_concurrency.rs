//! Concurrency tests for the bounded cache.
//!
//! Many tasks on a multi-threaded runtime hammer one shared instance; the cost
//! bound and TTL must hold throughout.

use std::sync::Arc;
use std::time::Duration;

use warden::cache::{BoundedCache, CacheConfig};

fn config(max_cost: u64) -> CacheConfig {
    CacheConfig {
        num_counters: 4096,
        max_cost,
        buffer_items: 256,
        default_ttl: Duration::from_secs(60),
        cleanup_interval: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_respect_cost_bound() {
    let cache: Arc<BoundedCache<u64, u64>> = Arc::new(BoundedCache::new(config(100)));

    let mut handles = Vec::new();
    for worker in 0..8u64 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..500u64 {
                let key = worker * 10_000 + i;
                cache.set(key, i, 1);
                let _ = cache.get(&(worker * 10_000 + i / 2));
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    cache.wait().await;
    let stats = cache.stats();
    assert!(stats.cost_used <= 100, "cost {} over budget", stats.cost_used);
    assert!(cache.len() <= 100);
    assert!(stats.admitted > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_expired_values() {
    let cache: Arc<BoundedCache<u64, u64>> = Arc::new(BoundedCache::new(config(1000)));
    for key in 0..50u64 {
        cache.set_with_ttl(key, key, 1, Duration::from_millis(40));
    }
    cache.wait().await;
    assert_eq!(cache.get(&7), Some(7));

    tokio::time::sleep(Duration::from_millis(60)).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            (0..50u64).filter(|k| cache.get(k).is_some()).count()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_wait_makes_writes_visible() {
    let cache: BoundedCache<String, String> = BoundedCache::new(config(10));
    for i in 0..5 {
        cache.set(format!("k{}", i), format!("v{}", i), 1);
    }
    cache.wait().await;
    for i in 0..5 {
        assert_eq!(cache.get(&format!("k{}", i)), Some(format!("v{}", i)));
    }
}
