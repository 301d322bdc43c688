use std::sync::Arc;

use tracing::info;

use crate::key::QueryKey;
use crate::store::CacheStore;

/// First segment of every key written by a grid engine.
pub const GRID_NAMESPACE: &str = "grid";

/// Prefix covering every cached result of one grid.
pub fn grid_prefix(grid_id: &str) -> QueryKey {
    QueryKey::new([GRID_NAMESPACE, grid_id])
}

/// Named clear/invalidate operations over a shared store.
///
/// "Clear" drops entries. "Invalidate" only marks them stale so the last
/// known rows can still be shown while a refetch runs.
pub struct CacheFacade<V> {
    store: Arc<dyn CacheStore<V>>,
}

impl<V> Clone for CacheFacade<V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<V> CacheFacade<V> {
    pub fn new(store: Arc<dyn CacheStore<V>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn CacheStore<V>> {
        Arc::clone(&self.store)
    }

    pub fn clear_grid_cache(&self, grid_id: &str) -> usize {
        let removed = self.store.remove(&grid_prefix(grid_id));
        info!(grid_id, removed, "cleared grid cache");
        removed
    }

    pub fn clear_all_grid_cache(&self) -> usize {
        let removed = self.store.remove(&QueryKey::new([GRID_NAMESPACE]));
        info!(removed, "cleared cache for all grids");
        removed
    }

    pub fn invalidate_grid_cache(&self, grid_id: &str) -> usize {
        let marked = self.store.mark_stale(&grid_prefix(grid_id));
        info!(grid_id, marked, "invalidated grid cache");
        marked
    }

    pub fn invalidate_all_grid_cache(&self) -> usize {
        let marked = self.store.mark_stale(&QueryKey::new([GRID_NAMESPACE]));
        info!(marked, "invalidated cache for all grids");
        marked
    }

    /// Drops every entry in the store, grid or not.
    pub fn clear_all_cache(&self) -> usize {
        let removed = self.store.clear();
        info!(removed, "cleared entire cache");
        removed
    }

    pub fn clear_by_key(&self, prefix: &QueryKey) -> usize {
        let removed = self.store.remove(prefix);
        info!(prefix = %prefix, removed, "cleared cache by key");
        removed
    }

    pub fn invalidate_by_key(&self, prefix: &QueryKey) -> usize {
        let marked = self.store.mark_stale(prefix);
        info!(prefix = %prefix, marked, "invalidated cache by key");
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCacheStore;
    use parking_lot::Mutex;
    use std::io;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn seeded() -> (Arc<InMemoryCacheStore<u32>>, CacheFacade<u32>) {
        let store = InMemoryCacheStore::new();
        let far = Instant::now() + Duration::from_secs(300);
        for (grid, page) in [("users", "1"), ("users", "2"), ("orders", "1")] {
            store.set(grid_prefix(grid).with(page), Arc::new(1), far);
        }
        store.set(QueryKey::new(["profile", "me"]), Arc::new(2), far);
        let facade = CacheFacade::new(store.clone() as Arc<dyn CacheStore<u32>>);
        (store, facade)
    }

    #[tokio::test]
    async fn grid_scoped_operations_leave_other_grids_alone() {
        let (store, facade) = seeded();

        assert_eq!(facade.invalidate_grid_cache("users"), 2);
        let orders = store.get(&grid_prefix("orders").with("1")).expect("orders");
        assert!(!orders.invalidated);

        assert_eq!(facade.clear_grid_cache("users"), 2);
        assert!(store
            .keys()
            .iter()
            .all(|k| !k.starts_with(&grid_prefix("users"))));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn all_grid_operations_skip_foreign_namespaces() {
        let (store, facade) = seeded();

        assert_eq!(facade.invalidate_all_grid_cache(), 3);
        assert!(!store
            .get(&QueryKey::new(["profile", "me"]))
            .expect("profile")
            .invalidated);

        assert_eq!(facade.clear_all_grid_cache(), 3);
        assert_eq!(store.keys(), vec![QueryKey::new(["profile", "me"])]);

        assert_eq!(facade.invalidate_by_key(&QueryKey::new(["profile"])), 1);
        assert_eq!(facade.clear_by_key(&QueryKey::new(["profile"])), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn key_scoped_operations_are_logged() {
        let (_store, facade) = seeded();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(facade.invalidate_by_key(&QueryKey::new(["profile"])), 1);
            assert_eq!(facade.clear_by_key(&QueryKey::new(["profile"])), 1);
        });

        let logs = String::from_utf8(captured.0.lock().clone()).expect("utf8 logs");
        assert!(logs.contains("invalidated cache by key"), "{logs}");
        assert!(logs.contains("marked=1"), "{logs}");
        assert!(logs.contains("cleared cache by key"), "{logs}");
        assert!(logs.contains("removed=1"), "{logs}");
    }

    #[tokio::test]
    async fn clear_all_cache_drops_everything() {
        let (store, facade) = seeded();
        assert_eq!(facade.clear_all_cache(), 4);
        assert!(store.is_empty());
    }
}
