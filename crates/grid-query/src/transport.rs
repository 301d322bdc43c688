use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Response body of a grid endpoint: one page of records plus the total count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridPayload {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub total: u64,
}

/// Remote fetch used by the engine. Retries and timeouts belong here, not in
/// the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address every request URL is composed against. `None` or blank means
    /// the transport cannot be used.
    fn base_url(&self) -> Option<&str>;

    async fn fetch(&self, url: &str) -> Result<GridPayload, TransportError>;
}
