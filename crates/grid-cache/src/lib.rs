//! Key-addressed result cache shared by grid instances.
//!
//! Entries are addressed by hierarchical [`QueryKey`]s so whole families of
//! results (every page of one grid, every grid) can be cleared or marked
//! stale with a single prefix. The store is process-wide and safe to share
//! between independently running grid engines; writes are last-write-wins
//! per key.

pub mod facade;
pub mod key;
pub mod store;

pub use facade::{grid_prefix, CacheFacade, GRID_NAMESPACE};
pub use key::QueryKey;
pub use store::{CacheEntry, CacheStore, InMemoryCacheStore};
