use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::key::QueryKey;

/// A cached value plus its freshness window.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub key: QueryKey,
    pub value: Arc<V>,
    pub created_at: Instant,
    pub fresh_until: Instant,
    /// Set by [`CacheStore::mark_stale`]; the value stays servable.
    pub invalidated: bool,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        !self.invalidated && now < self.fresh_until
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        !self.is_fresh(now)
    }
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            created_at: self.created_at,
            fresh_until: self.fresh_until,
            invalidated: self.invalidated,
        }
    }
}

/// Shared key-addressed store. Operations are in-memory and infallible.
pub trait CacheStore<V>: Send + Sync {
    fn get(&self, key: &QueryKey) -> Option<CacheEntry<V>>;

    /// Insert or replace the entry under `key`; replacing clears any stale mark.
    fn set(&self, key: QueryKey, value: Arc<V>, fresh_until: Instant);

    /// Remove every entry whose key starts with `prefix`. Returns the number removed.
    fn remove(&self, prefix: &QueryKey) -> usize;

    /// Mark every entry under `prefix` stale without dropping its value.
    fn mark_stale(&self, prefix: &QueryKey) -> usize;

    fn keys(&self) -> Vec<QueryKey>;

    /// Write epoch covering `key`. Moves forward whenever a prefix of `key`
    /// is removed or marked stale.
    fn epoch(&self, key: &QueryKey) -> u64;

    /// Like [`CacheStore::set`], but only while `epoch(&key)` still equals
    /// `epoch`. Returns whether the value was written.
    fn set_if_current(&self, key: QueryKey, value: Arc<V>, fresh_until: Instant, epoch: u64)
        -> bool;

    fn clear(&self) -> usize {
        self.remove(&QueryKey::root())
    }
}

#[derive(Debug)]
struct Entries<V> {
    map: HashMap<QueryKey, CacheEntry<V>>,
    /// Last epoch at which each prefix was removed or marked stale.
    epochs: HashMap<QueryKey, u64>,
    counter: u64,
}

impl<V> Entries<V> {
    fn epoch(&self, key: &QueryKey) -> u64 {
        self.epochs
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, epoch)| *epoch)
            .max()
            .unwrap_or(0)
    }

    fn bump(&mut self, prefix: &QueryKey) {
        self.counter += 1;
        self.epochs.insert(prefix.clone(), self.counter);
    }

    fn insert(&mut self, key: QueryKey, value: Arc<V>, fresh_until: Instant) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: Instant::now(),
            fresh_until,
            invalidated: false,
        };
        self.map.insert(key, entry);
    }
}

/// Process-wide in-memory store.
#[derive(Debug)]
pub struct InMemoryCacheStore<V> {
    entries: RwLock<Entries<V>>,
}

impl<V> Default for InMemoryCacheStore<V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                epochs: HashMap::new(),
                counter: 0,
            }),
        }
    }
}

impl<V> InMemoryCacheStore<V> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }
}

impl<V: Send + Sync> CacheStore<V> for InMemoryCacheStore<V> {
    fn get(&self, key: &QueryKey) -> Option<CacheEntry<V>> {
        self.entries.read().map.get(key).cloned()
    }

    fn set(&self, key: QueryKey, value: Arc<V>, fresh_until: Instant) {
        self.entries.write().insert(key, value, fresh_until);
    }

    fn remove(&self, prefix: &QueryKey) -> usize {
        let mut guard = self.entries.write();
        guard.bump(prefix);
        let before = guard.map.len();
        guard.map.retain(|key, _| !key.starts_with(prefix));
        let removed = before - guard.map.len();
        tracing::debug!(prefix = %prefix, removed, "cache entries removed");
        removed
    }

    fn mark_stale(&self, prefix: &QueryKey) -> usize {
        let mut guard = self.entries.write();
        guard.bump(prefix);
        let mut marked = 0;
        for entry in guard.map.values_mut().filter(|e| e.key.starts_with(prefix)) {
            entry.invalidated = true;
            marked += 1;
        }
        tracing::debug!(prefix = %prefix, marked, "cache entries marked stale");
        marked
    }

    fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self.entries.read().map.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn epoch(&self, key: &QueryKey) -> u64 {
        self.entries.read().epoch(key)
    }

    fn set_if_current(
        &self,
        key: QueryKey,
        value: Arc<V>,
        fresh_until: Instant,
        epoch: u64,
    ) -> bool {
        let mut guard = self.entries.write();
        if guard.epoch(&key) != epoch {
            tracing::debug!(key = %key, "cache write skipped; prefix cleared since fetch start");
            return false;
        }
        guard.insert(key, value, fresh_until);
        true
    }
}
