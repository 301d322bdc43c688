//! Table UI events translated into parameter patches.

use serde_json::Value;
use tracing::debug;

use crate::engine::{FetchTask, GridQueryEngine};
use crate::filter::ColumnSpec;
use crate::params::{ColumnFilters, ParamsPatch, SortDirection, SortSpec};

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    PageChanged { page: u32 },
    PerPageChanged { per_page: u32 },
    SortChanged { field: String, direction: SortDirection },
    /// Raw filter inputs keyed by column field; `None` or blank means cleared.
    ColumnFilter { filters: Vec<(String, Option<String>)> },
    SelectionChanged { rows: Vec<Value> },
}

/// Sorting is restricted to configured columns; other fields are ignored.
pub fn sort_patch(columns: &[ColumnSpec], field: &str, direction: SortDirection) -> Option<ParamsPatch> {
    let column = columns.iter().find(|c| c.field == field)?;
    Some(ParamsPatch::sort(vec![SortSpec::new(column.field.clone(), direction)]))
}

/// Drops blank inputs and renames each remaining key to the column's
/// filter field when one is configured.
pub fn column_filter_patch(columns: &[ColumnSpec], filters: &[(String, Option<String>)]) -> ParamsPatch {
    let filters: ColumnFilters = filters
        .iter()
        .filter_map(|(field, value)| {
            let value = value.as_deref().filter(|v| !v.is_empty())?;
            let name = columns
                .iter()
                .find(|c| &c.field == field)
                .map(ColumnSpec::wire_field)
                .unwrap_or(field.as_str());
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    ParamsPatch {
        column_filters: Some(filters),
        ..ParamsPatch::default()
    }
}

impl GridQueryEngine {
    /// Applies a UI event. Selection changes never fetch.
    pub fn handle_event(&self, event: GridEvent) -> Option<FetchTask> {
        let patch = match event {
            GridEvent::PageChanged { page } => ParamsPatch::page(page),
            GridEvent::PerPageChanged { per_page } => ParamsPatch::per_page(per_page),
            GridEvent::SortChanged { field, direction } => {
                match sort_patch(&self.config().columns, &field, direction) {
                    Some(patch) => patch,
                    None => {
                        debug!(field = %field, "ignoring sort on unknown column");
                        return None;
                    }
                }
            }
            GridEvent::ColumnFilter { filters } => column_filter_patch(&self.config().columns, &filters),
            GridEvent::SelectionChanged { rows } => {
                self.update_selected_rows(&rows);
                return None;
            }
        };
        self.update_params(patch)
    }
}
