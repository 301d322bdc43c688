use std::time::Duration;

use chrono::FixedOffset;
use serde_json::Value;

use crate::filter::ColumnSpec;
use crate::params::{ServerParams, SortSpec};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// What to do when the cache holds a stale entry for the requested key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StalePolicy {
    /// Publish the stale rows right away and refetch in the background.
    #[default]
    ServeStaleAndRevalidate,
    /// Keep showing the previous rows and wait for the refetch.
    Refetch,
}

/// Static configuration of one grid instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub grid_id: String,
    pub path: String,
    pub columns: Vec<ColumnSpec>,
    pub default_per_page: u32,
    /// Fixed page size; disables the page-size dropdown.
    pub per_page: Option<u32>,
    /// `"<field>,<ASC|DESC>"`, sent verbatim while no sort is chosen.
    pub default_sort: Option<String>,
    pub extra_params: Option<String>,
    pub selection_enabled: bool,
    pub stale_after: Duration,
    pub stale_policy: StalePolicy,
    pub filter_offset: Option<FixedOffset>,
    pub update_route: Option<String>,
    pub view_route: Option<String>,
    pub extra_data: Option<Value>,
}

impl EngineConfig {
    pub fn new(grid_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            grid_id: grid_id.into(),
            path: path.into(),
            columns: Vec::new(),
            default_per_page: DEFAULT_PER_PAGE,
            per_page: None,
            default_sort: None,
            extra_params: None,
            selection_enabled: false,
            stale_after: DEFAULT_STALE_AFTER,
            stale_policy: StalePolicy::default(),
            filter_offset: None,
            update_route: None,
            view_route: None,
            extra_data: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page.max(1));
        self
    }

    pub fn with_default_sort(mut self, sort: impl Into<String>) -> Self {
        self.default_sort = Some(sort.into());
        self
    }

    pub fn with_extra_params(mut self, extra: impl Into<String>) -> Self {
        self.extra_params = Some(extra.into());
        self
    }

    pub fn with_selection(mut self, enabled: bool) -> Self {
        self.selection_enabled = enabled;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_filter_offset(mut self, offset: FixedOffset) -> Self {
        self.filter_offset = Some(offset);
        self
    }

    pub fn with_routes(mut self, update: Option<String>, view: Option<String>) -> Self {
        self.update_route = update;
        self.view_route = view;
        self
    }

    pub fn with_extra_data(mut self, data: Value) -> Self {
        self.extra_data = Some(data);
        self
    }

    pub fn effective_per_page(&self) -> u32 {
        self.per_page.unwrap_or(self.default_per_page).max(1)
    }

    /// State a grid starts from on mount and on identity change.
    pub fn default_params(&self) -> ServerParams {
        ServerParams::with_per_page(self.effective_per_page())
    }

    pub fn pagination_options(&self, params: &ServerParams) -> PaginationOptions {
        PaginationOptions {
            per_page: self.per_page.unwrap_or(params.per_page),
            per_page_dropdown_enabled: self.per_page.is_none(),
            current_page: params.page,
        }
    }

    pub fn sort_options(&self) -> SortOptions {
        SortOptions {
            initial_sort: self
                .default_sort
                .as_deref()
                .and_then(SortSpec::parse_default),
        }
    }

    pub fn selection_options(&self) -> SelectionOptions {
        SelectionOptions {
            enabled: self.selection_enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    pub per_page: u32,
    pub per_page_dropdown_enabled: bool,
    pub current_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOptions {
    pub initial_sort: Option<SortSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOptions {
    pub enabled: bool,
}
