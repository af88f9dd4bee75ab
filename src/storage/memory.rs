//! In-process storage backed by a `DashMap`.
//!
//! Every bucket carries the expiry its algorithm asked for. Expired buckets
//! read as absent immediately and are swept out of the map in batches: every
//! [`SWEEP_EVERY`] writes, on demand through [`MemoryStorage::purge_expired`],
//! or on a timer started with [`MemoryStorage::with_sweep_interval`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;
use crate::storage::{current_timestamp_ms, Storage, StorageEntry};

/// Number of writes between two sweeps of expired buckets.
pub const SWEEP_EVERY: u64 = 10_000;

type Buckets = DashMap<String, Bucket>;

#[derive(Debug)]
struct Bucket {
    entry: StorageEntry,
    /// Unix milliseconds after which the bucket is dead.
    expires_at: u64,
}

impl Bucket {
    fn live(&self, now: u64) -> Option<&StorageEntry> {
        (self.expires_at > now).then_some(&self.entry)
    }
}

/// Deadline `ttl` from `now`, clamped to the end of time.
fn deadline(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}

/// Drop every bucket whose expiry has passed.
fn sweep(buckets: &Buckets, now: u64) -> usize {
    let before = buckets.len();
    buckets.retain(|_, bucket| bucket.expires_at > now);

    let removed = before.saturating_sub(buckets.len());
    if removed > 0 {
        tracing::trace!(removed, remaining = buckets.len(), "swept expired buckets");
    }
    removed
}

/// In-memory [`Storage`].
///
/// Counters live in this process only, so limits are enforced per instance.
///
/// ```ignore
/// use std::time::Duration;
/// use routelimit::MemoryStorage;
///
/// // Sweeps every `SWEEP_EVERY` writes
/// let storage = MemoryStorage::new();
///
/// // Also sweeps once a minute, even without traffic
/// let storage = MemoryStorage::with_sweep_interval(Duration::from_secs(60));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Arc<Buckets>,
    writes: AtomicU64,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store swept every `interval` by a background task.
    ///
    /// The task ends once the store is dropped. Must be called from within
    /// a Tokio runtime.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let storage = Self::new();
        let buckets = Arc::downgrade(&storage.buckets);

        tokio::spawn(sweep_periodically(buckets, interval));
        storage
    }

    /// Remove expired buckets now, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        sweep(&self.buckets, current_timestamp_ms())
    }

    /// Number of buckets held, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket is held.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn record_write(&self, now: u64) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            sweep(&self.buckets, now);
        }
    }
}

async fn sweep_periodically(buckets: Weak<Buckets>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(buckets) = buckets.upgrade() else {
            tracing::debug!("memory storage dropped, stopping sweeper");
            break;
        };
        sweep(&buckets, current_timestamp_ms());
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        let now = current_timestamp_ms();
        Ok(self
            .buckets
            .get(key)
            .and_then(|bucket| bucket.live(now).cloned()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.buckets.remove(key);
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        delta: u64,
        window_start: u64,
        ttl: Duration,
    ) -> Result<u64> {
        let now = current_timestamp_ms();
        let expires_at = deadline(now, ttl);

        let count = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let bucket = occupied.get_mut();
                let count = match bucket.live(now) {
                    Some(entry) if entry.window_start == window_start => {
                        entry.count.saturating_add(delta)
                    }
                    _ => delta,
                };
                bucket.entry = StorageEntry::new(count, window_start);
                bucket.expires_at = expires_at;
                count
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Bucket {
                    entry: StorageEntry::new(delta, window_start),
                    expires_at,
                });
                delta
            }
        };

        self.record_write(now);
        Ok(count)
    }

    async fn execute_atomic<F, T>(&self, key: &str, ttl: Duration, operation: F) -> Result<T>
    where
        F: FnOnce(Option<StorageEntry>) -> (StorageEntry, T) + Send,
        T: Send,
    {
        let now = current_timestamp_ms();
        let expires_at = deadline(now, ttl);

        // The shard stays locked from read to write
        let result = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let (entry, result) = operation(occupied.get().live(now).cloned());
                occupied.insert(Bucket { entry, expires_at });
                result
            }
            Entry::Vacant(vacant) => {
                let (entry, result) = operation(None);
                vacant.insert(Bucket { entry, expires_at });
                result
            }
        };

        self.record_write(now);
        Ok(result)
    }
}
