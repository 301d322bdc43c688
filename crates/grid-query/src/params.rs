use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Lenient parse; anything other than `asc` (any case) is descending.
    pub fn parse_or_desc(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Parses a `"<field>,<ASC|DESC>"` default-sort string. A missing or
    /// unknown direction falls back to descending.
    pub fn parse_default(raw: &str) -> Option<Self> {
        let (field, direction) = match raw.split_once(',') {
            Some((field, dir)) => (field.trim(), SortDirection::parse_or_desc(dir)),
            None => (raw.trim(), SortDirection::Desc),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, direction))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.field, self.direction.as_wire())
    }
}

/// Filter values keyed by column field. Ordered, so equality and
/// serialization never depend on insertion order.
pub type ColumnFilters = BTreeMap<String, String>;

/// Everything that determines one remote query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerParams {
    pub page: u32,
    pub per_page: u32,
    pub sort: Vec<SortSpec>,
    pub column_filters: ColumnFilters,
}

impl ServerParams {
    pub fn with_per_page(per_page: u32) -> Self {
        Self {
            page: 1,
            per_page: per_page.max(1),
            sort: Vec::new(),
            column_filters: ColumnFilters::new(),
        }
    }
}

impl Default for ServerParams {
    fn default() -> Self {
        Self::with_per_page(10)
    }
}

/// Field-by-field partial update of [`ServerParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamsPatch {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort: Option<Vec<SortSpec>>,
    pub column_filters: Option<ColumnFilters>,
}

impl ParamsPatch {
    pub fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn per_page(per_page: u32) -> Self {
        Self {
            per_page: Some(per_page),
            ..Self::default()
        }
    }

    pub fn sort(sort: Vec<SortSpec>) -> Self {
        Self {
            sort: Some(sort),
            ..Self::default()
        }
    }

    pub fn column_filters<I, K, V>(filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            column_filters: Some(
                filters
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::default()
        }
    }
}

/// Owns the mutable query state of one grid instance.
#[derive(Debug, Clone, Default)]
pub struct ServerParamsStore {
    current: ServerParams,
}

impl ServerParamsStore {
    pub fn new(initial: ServerParams) -> Self {
        Self { current: initial }
    }

    pub fn get(&self) -> &ServerParams {
        &self.current
    }

    /// Shallow merge. A change of the filter set always lands on page 1,
    /// even when the patch also names a page.
    pub fn update(&mut self, patch: ParamsPatch) -> &ServerParams {
        let filters_changed = patch
            .column_filters
            .as_ref()
            .is_some_and(|filters| filters != &self.current.column_filters);

        if let Some(page) = patch.page {
            self.current.page = page.max(1);
        }
        if let Some(per_page) = patch.per_page {
            self.current.per_page = per_page.max(1);
        }
        if let Some(sort) = patch.sort {
            self.current.sort = sort;
        }
        if let Some(filters) = patch.column_filters {
            self.current.column_filters = filters;
        }
        if filters_changed {
            self.current.page = 1;
        }
        &self.current
    }

    pub fn reset(&mut self, defaults: ServerParams) {
        self.current = defaults;
    }
}
