use serde::Serialize;
use serde_json::Value;

use crate::engine::{FetchTask, GridQueryEngine};
use crate::request::join_base;

/// Context handed to row-action callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParams {
    pub url: String,
    pub host: String,
    pub path: String,
    pub update_route: Option<String>,
    pub view_route: Option<String>,
    pub extra_data: Option<Value>,
}

impl GridQueryEngine {
    pub fn action_params(&self) -> ActionParams {
        let config = self.config();
        let host = self.base_url().to_string();
        ActionParams {
            url: join_base(&host, &config.path),
            host,
            path: config.path.clone(),
            update_route: config.update_route.clone(),
            view_route: config.view_route.clone(),
            extra_data: config.extra_data.clone(),
        }
    }

    /// Reloads the current page after a row action changed server data.
    pub fn load_items(&self) -> Option<FetchTask> {
        self.refetch()
    }
}
