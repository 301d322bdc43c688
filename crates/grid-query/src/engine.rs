use std::sync::Arc;

use grid_cache::{CacheFacade, CacheStore};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{EngineConfig, PaginationOptions, SelectionOptions, SortOptions, StalePolicy};
use crate::error::{GridError, TransportError};
use crate::filter::FilterEncoder;
use crate::key::{RequestKey, RequestKeyBuilder};
use crate::params::{ParamsPatch, ServerParams, ServerParamsStore};
use crate::request::RequestBuilder;
use crate::selection::{RowId, SelectionStore};
use crate::transport::{GridPayload, Transport};

/// Background fetch spawned by a state change. Awaiting it is optional;
/// dropping it detaches the fetch.
pub type FetchTask = JoinHandle<()>;

/// One fetched page as stored in the cache. Never mutated after insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridResult {
    pub rows: Vec<Value>,
    pub total: u64,
}

impl From<GridPayload> for GridResult {
    fn from(payload: GridPayload) -> Self {
        Self {
            rows: payload.data,
            total: payload.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Idle,
    Fetching,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub data: Value,
    /// `None` when row selection is disabled for the grid.
    pub selected: Option<bool>,
}

/// Read-only view handed to the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub grid_id: String,
    pub status: GridStatus,
    pub rows: Vec<GridRow>,
    pub total: u64,
    pub params: ServerParams,
    /// Fetching and nothing is shown for the current key yet.
    pub is_loading: bool,
    pub is_fetching: bool,
    /// Shown rows are stale or belong to a previous key.
    pub is_stale: bool,
    pub error: Option<TransportError>,
    pub selected: Vec<RowId>,
}

impl GridSnapshot {
    pub fn page(&self) -> u32 {
        self.params.page
    }

    pub fn per_page(&self) -> u32 {
        self.params.per_page
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(u64::from(self.params.per_page.max(1)))
    }
}

struct InFlight {
    key: RequestKey,
    generation: u64,
}

struct EngineState {
    grid_id: String,
    mounted: bool,
    extra_params: Option<String>,
    params: ServerParamsStore,
    selection: SelectionStore,
    status: GridStatus,
    generation: u64,
    in_flight: Option<InFlight>,
    served: Option<(RequestKey, Arc<GridResult>)>,
    served_stale: bool,
    error: Option<TransportError>,
}

impl EngineState {
    fn request_key(&self) -> RequestKey {
        RequestKeyBuilder::build(&self.grid_id, self.params.get(), self.extra_params.as_deref())
    }

    fn served_key(&self) -> Option<&RequestKey> {
        self.served.as_ref().map(|(key, _)| key)
    }

    fn serve(&mut self, key: RequestKey, result: Arc<GridResult>, stale: bool) {
        self.served = Some((key, result));
        self.served_stale = stale;
    }

    /// Bumps the generation so any outstanding fetch resolves into the void.
    fn supersede_in_flight(&mut self) {
        self.generation += 1;
        self.in_flight = None;
    }

    fn snapshot(&self, selection_enabled: bool) -> GridSnapshot {
        let key = self.request_key();
        let (rows, total, current) = match &self.served {
            Some((served_key, result)) => {
                let rows = result
                    .rows
                    .iter()
                    .map(|row| GridRow {
                        data: row.clone(),
                        selected: selection_enabled.then(|| self.selection.contains(row)),
                    })
                    .collect();
                (rows, result.total, served_key == &key)
            }
            None => (Vec::new(), 0, false),
        };
        let fetching = self.in_flight.is_some();
        GridSnapshot {
            grid_id: self.grid_id.clone(),
            status: self.status,
            rows,
            total,
            params: self.params.get().clone(),
            is_loading: fetching && !current,
            is_fetching: fetching,
            is_stale: self.served.is_some() && (!current || self.served_stale),
            error: self.error.clone(),
            selected: self.selection.ids(),
        }
    }
}

struct Inner {
    config: EngineConfig,
    base_url: String,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore<GridResult>>,
    encoder: FilterEncoder,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<GridSnapshot>,
}

impl Inner {
    fn publish(&self, state: &EngineState) {
        self.snapshot_tx
            .send_replace(state.snapshot(self.config.selection_enabled));
    }

    fn request_url(&self, state: &EngineState) -> String {
        RequestBuilder {
            base_url: &self.base_url,
            path: &self.config.path,
            default_sort: self.config.default_sort.as_deref(),
            columns: &self.config.columns,
            encoder: &self.encoder,
        }
        .build(state.params.get(), state.extra_params.as_deref())
    }

    async fn run_fetch(
        self: Arc<Self>,
        key: RequestKey,
        generation: u64,
        epoch: u64,
        url: String,
    ) {
        let outcome = self.transport.fetch(&url).await.map(|payload| {
            let result = Arc::new(GridResult::from(payload));
            // A result is valid for its own key even if the grid moved on,
            // but not once its prefix was cleared or invalidated mid-flight.
            let written = self.cache.set_if_current(
                key.clone(),
                Arc::clone(&result),
                Instant::now() + self.config.stale_after,
                epoch,
            );
            (result, written)
        });
        self.complete(key, generation, url, outcome);
    }

    fn complete(
        &self,
        key: RequestKey,
        generation: u64,
        url: String,
        outcome: Result<(Arc<GridResult>, bool), TransportError>,
    ) {
        let mut state = self.state.lock();
        if state.in_flight.as_ref().map(|f| f.generation) != Some(generation) {
            debug!(
                grid_id = %state.grid_id,
                key = %key,
                generation,
                "discarding superseded fetch result"
            );
            return;
        }
        state.in_flight = None;
        match outcome {
            Ok((result, cached)) => {
                debug!(grid_id = %state.grid_id, key = %key, total = result.total, cached, "fetch resolved");
                state.serve(key, result, !cached);
                state.error = None;
                state.status = GridStatus::Ready;
            }
            Err(err) => {
                warn!(grid_id = %state.grid_id, url = %url, error = %err, "grid fetch failed");
                state.error = Some(err);
                state.status = GridStatus::Failed;
            }
        }
        self.publish(&state);
    }
}

/// Query/cache engine for one grid instance.
///
/// Cheap to clone; clones share state. Operations that may fetch spawn onto
/// the ambient tokio runtime and must be called from within one.
#[derive(Clone)]
pub struct GridQueryEngine {
    inner: Arc<Inner>,
}

impl GridQueryEngine {
    /// Fails with [`GridError::Configuration`] when the transport has no
    /// usable base URL or the grid id is blank.
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn CacheStore<GridResult>>,
    ) -> Result<Self, GridError> {
        let base_url = transport
            .base_url()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                GridError::Configuration(format!(
                    "grid `{}` requires a transport with a base URL",
                    config.grid_id
                ))
            })?;
        if config.grid_id.trim().is_empty() {
            return Err(GridError::Configuration("grid id must not be empty".into()));
        }

        let state = EngineState {
            grid_id: config.grid_id.clone(),
            mounted: false,
            extra_params: config.extra_params.clone(),
            params: ServerParamsStore::new(config.default_params()),
            selection: SelectionStore::default(),
            status: GridStatus::Idle,
            generation: 0,
            in_flight: None,
            served: None,
            served_stale: false,
            error: None,
        };
        let (snapshot_tx, _) = watch::channel(state.snapshot(config.selection_enabled));
        let encoder = config
            .filter_offset
            .map(FilterEncoder::new)
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                base_url,
                transport,
                cache,
                encoder,
                state: Mutex::new(state),
                snapshot_tx,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn grid_id(&self) -> String {
        self.inner.state.lock().grid_id.clone()
    }

    pub fn params(&self) -> ServerParams {
        self.inner.state.lock().params.get().clone()
    }

    pub fn request_key(&self) -> RequestKey {
        self.inner.state.lock().request_key()
    }

    /// URL the current parameters translate to.
    pub fn request_url(&self) -> String {
        let state = self.inner.state.lock();
        self.inner.request_url(&state)
    }

    pub fn snapshot(&self) -> GridSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GridSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Waits until no fetch is outstanding.
    pub async fn settled(&self) -> GridSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| !snapshot.is_fetching)
            .await
            .map(|snapshot| snapshot.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Initial load: leaves `Idle` by serving from cache or fetching.
    /// Until then, parameter changes are only staged.
    pub fn mount(&self) -> Option<FetchTask> {
        let mut state = self.inner.state.lock();
        state.mounted = true;
        self.schedule(state, false)
    }

    pub fn update_params(&self, patch: ParamsPatch) -> Option<FetchTask> {
        let mut state = self.inner.state.lock();
        state.params.update(patch);
        self.schedule(state, false)
    }

    /// Fetches the current key even when a fresh entry is cached.
    pub fn refetch(&self) -> Option<FetchTask> {
        let state = self.inner.state.lock();
        self.schedule(state, true)
    }

    /// Replaces the selection; never fetches.
    pub fn update_selected_rows(&self, rows: &[Value]) {
        let mut state = self.inner.state.lock();
        state.selection.update(rows);
        self.inner.publish(&state);
    }

    pub fn selected_rows(&self) -> Vec<RowId> {
        self.inner.state.lock().selection.ids()
    }

    /// Grid identity change: parameters go back to their defaults.
    pub fn set_grid_id(&self, grid_id: impl Into<String>) -> Option<FetchTask> {
        let mut state = self.inner.state.lock();
        state.grid_id = grid_id.into();
        state.params.reset(self.inner.config.default_params());
        self.schedule(state, false)
    }

    pub fn set_extra_params(&self, extra_params: Option<String>) -> Option<FetchTask> {
        let mut state = self.inner.state.lock();
        state.extra_params = extra_params;
        self.schedule(state, false)
    }

    pub fn cache_facade(&self) -> CacheFacade<GridResult> {
        CacheFacade::new(Arc::clone(&self.inner.cache))
    }

    /// Drops every cached page of this grid. A fetch still outstanding
    /// started before the clear, so it is superseded by a fresh one.
    pub fn clear_cache(&self) -> usize {
        let state = self.inner.state.lock();
        let removed = self.cache_facade().clear_grid_cache(&state.grid_id);
        if state.in_flight.is_some() {
            // Detached; progress is visible through the snapshot.
            drop(self.schedule(state, true));
        }
        removed
    }

    /// Marks this grid's pages stale and refetches the current one.
    pub fn invalidate_cache(&self) -> Option<FetchTask> {
        let grid_id = self.grid_id();
        self.cache_facade().invalidate_grid_cache(&grid_id);
        self.refetch()
    }

    pub fn pagination_options(&self) -> PaginationOptions {
        self.inner.config.pagination_options(&self.params())
    }

    pub fn sort_options(&self) -> SortOptions {
        self.inner.config.sort_options()
    }

    pub fn selection_options(&self) -> SelectionOptions {
        self.inner.config.selection_options()
    }

    fn schedule(&self, mut state: MutexGuard<'_, EngineState>, force: bool) -> Option<FetchTask> {
        let inner = &self.inner;
        if !state.mounted {
            inner.publish(&state);
            return None;
        }
        let key = state.request_key();

        if !force {
            if state.in_flight.as_ref().is_some_and(|f| f.key == key) {
                debug!(key = %key, "fetch already in flight");
                return None;
            }
            match inner.cache.get(&key) {
                Some(entry) if entry.is_fresh(Instant::now()) => {
                    if state.in_flight.is_none()
                        && state.status == GridStatus::Ready
                        && state.served_key() == Some(&key)
                        && !state.served_stale
                    {
                        return None;
                    }
                    debug!(grid_id = %state.grid_id, key = %key, "serving fresh cache entry");
                    state.supersede_in_flight();
                    state.serve(key, entry.value, false);
                    state.error = None;
                    state.status = GridStatus::Ready;
                    inner.publish(&state);
                    return None;
                }
                Some(entry) if inner.config.stale_policy == StalePolicy::ServeStaleAndRevalidate => {
                    debug!(grid_id = %state.grid_id, key = %key, "serving stale entry while revalidating");
                    state.serve(key.clone(), entry.value, true);
                }
                _ => {
                    // Rows on screen for this key are no longer backed by a fresh entry.
                    if state.served_key() == Some(&key) {
                        state.served_stale = true;
                    }
                }
            }
        }

        state.generation += 1;
        let generation = state.generation;
        let epoch = inner.cache.epoch(&key);
        state.in_flight = Some(InFlight {
            key: key.clone(),
            generation,
        });
        state.status = GridStatus::Fetching;
        let url = inner.request_url(&state);
        inner.publish(&state);
        debug!(grid_id = %state.grid_id, key = %key, generation, url = %url, "scheduling fetch");
        drop(state);

        Some(tokio::spawn(Arc::clone(inner).run_fetch(key, generation, epoch, url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grid_cache::InMemoryCacheStore;

    struct NoBase;

    #[async_trait]
    impl Transport for NoBase {
        fn base_url(&self) -> Option<&str> {
            Some("   ")
        }

        async fn fetch(&self, _url: &str) -> Result<GridPayload, TransportError> {
            Err(TransportError::Unavailable("never called".into()))
        }
    }

    #[test]
    fn blank_base_url_is_a_configuration_error() {
        let result = GridQueryEngine::new(
            EngineConfig::new("users", "/users"),
            Arc::new(NoBase),
            InMemoryCacheStore::<GridResult>::new(),
        );
        assert!(matches!(result, Err(GridError::Configuration(_))));
    }

    #[test]
    fn page_count_rounds_up() {
        let snapshot = GridSnapshot {
            grid_id: "g".into(),
            status: GridStatus::Ready,
            rows: Vec::new(),
            total: 21,
            params: ServerParams::with_per_page(10),
            is_loading: false,
            is_fetching: false,
            is_stale: false,
            error: None,
            selected: Vec::new(),
        };
        assert_eq!(snapshot.page_count(), 3);
    }
}
