#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use grid_cache::{CacheStore, InMemoryCacheStore};
use grid_query::{
    EngineConfig, FetchTask, GridPayload, GridQueryEngine, GridResult, Transport, TransportError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

pub const BASE_URL: &str = "https://api.test";

/// In-memory [`Transport`] serving numbered rows for whatever page and
/// limit the URL asks for. Requests can be held back or failed by URL
/// substring.
pub struct ScriptedTransport {
    base_url: Option<String>,
    total: u64,
    calls: Mutex<Vec<String>>,
    gates: Mutex<Vec<(String, Arc<Semaphore>)>>,
    failing: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_base(Some(BASE_URL))
    }

    pub fn with_base(base_url: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            base_url: base_url.map(str::to_string),
            total: 42,
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_call(&self) -> Option<String> {
        self.calls.lock().last().cloned()
    }

    /// Requests whose URL contains `pattern` wait until [`release`](Self::release).
    pub fn hold(&self, pattern: &str) {
        self.gates
            .lock()
            .push((pattern.to_string(), Arc::new(Semaphore::new(0))));
    }

    pub fn release(&self, pattern: &str) {
        for (gate_pattern, gate) in self.gates.lock().iter() {
            if gate_pattern == pattern {
                gate.add_permits(1);
            }
        }
    }

    /// Requests whose URL contains `pattern` fail with a 500.
    pub fn fail_matching(&self, pattern: &str) {
        self.failing.lock().push(pattern.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn page_of(&self, url: &str) -> GridPayload {
        let page = query_param(url, "page")
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(1);
        let limit = query_param(url, "limit")
            .and_then(|l| l.parse::<u64>().ok())
            .unwrap_or(10);
        let first = (page - 1) * limit + 1;
        let last = (page * limit).min(self.total);
        GridPayload {
            data: (first..=last).map(row).collect(),
            total: self.total,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    async fn fetch(&self, url: &str) -> Result<GridPayload, TransportError> {
        self.calls.lock().push(url.to_string());

        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        }

        if self.failing.lock().iter().any(|p| url.contains(p.as_str())) {
            return Err(TransportError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        Ok(self.page_of(url))
    }
}

pub fn row(id: u64) -> Value {
    json!({ "id": id, "name": format!("row {id}") })
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

pub fn cache() -> Arc<InMemoryCacheStore<GridResult>> {
    InMemoryCacheStore::new()
}

pub fn engine(
    config: EngineConfig,
    transport: &Arc<ScriptedTransport>,
    cache: &Arc<InMemoryCacheStore<GridResult>>,
) -> GridQueryEngine {
    let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    let cache: Arc<dyn CacheStore<GridResult>> =
        Arc::clone(cache) as Arc<dyn CacheStore<GridResult>>;
    GridQueryEngine::new(config, transport, cache).expect("engine")
}

pub fn users() -> EngineConfig {
    EngineConfig::new("users", "/users")
}

/// Awaits a scheduled fetch; panics when nothing was scheduled.
pub async fn settle(task: Option<FetchTask>) {
    task.expect("fetch scheduled").await.expect("fetch task panicked");
}

pub fn ids(engine: &GridQueryEngine) -> Vec<u64> {
    engine
        .snapshot()
        .rows
        .iter()
        .filter_map(|row| row.data.get("id").and_then(Value::as_u64))
        .collect()
}
