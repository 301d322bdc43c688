//! Server-driven data grid query engine.
//!
//! A [`GridQueryEngine`] owns the pagination, sort, filter and selection
//! state of one grid, turns it into request URLs and cache keys, and keeps
//! a [`GridSnapshot`] of the rows to render. Results are cached in a shared
//! [`grid_cache::CacheStore`] keyed by [`RequestKey`], so revisiting a page
//! within the freshness window costs no network round trip.
//!
//! Fetching goes through the [`Transport`] trait; `grid-http` provides the
//! reqwest implementation.

pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod format;
pub mod key;
pub mod params;
pub mod request;
pub mod selection;
pub mod transport;

pub use actions::ActionParams;
pub use config::{
    EngineConfig, PaginationOptions, SelectionOptions, SortOptions, StalePolicy, DEFAULT_PER_PAGE,
    DEFAULT_STALE_AFTER,
};
pub use engine::{FetchTask, GridQueryEngine, GridResult, GridRow, GridSnapshot, GridStatus};
pub use error::{GridError, TransportError};
pub use events::{column_filter_patch, sort_patch, GridEvent};
pub use filter::{
    resolve_column, ColumnSpec, FilterEncoder, FilterExpression, FilterOp, FilterOptions,
    FilterType,
};
pub use format::{
    AvailableFormatters, ColumnIssue, Formatter, FormatterOptions, FormatterRegistry,
    FormatterResolver, ResolvedColumn,
};
pub use key::{RequestKey, RequestKeyBuilder};
pub use params::{ColumnFilters, ParamsPatch, ServerParams, ServerParamsStore, SortDirection, SortSpec};
pub use request::RequestBuilder;
pub use selection::{RowId, SelectionStore};
pub use transport::{GridPayload, Transport};
