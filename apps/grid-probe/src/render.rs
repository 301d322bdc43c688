use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use grid_query::{ColumnSpec, FormatterResolver, GridSnapshot};
use tracing::warn;

/// Renders the snapshot's rows through the columns' formatters. Without
/// declared columns, the fields of the first row are shown as-is.
pub fn render_rows(snapshot: &GridSnapshot, columns: &[ColumnSpec]) -> Table {
    let resolver = FormatterResolver::default();
    let columns = if columns.is_empty() {
        inferred_columns(snapshot)
    } else {
        columns.to_vec()
    };
    for issue in columns.iter().flat_map(|c| resolver.validate_column(c)) {
        warn!(%issue, "column issue");
    }
    let resolved = resolver.resolve_columns(&columns);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(resolved.iter().map(|c| {
        Cell::new(c.column.label.as_deref().unwrap_or(&c.column.field))
            .add_attribute(Attribute::Bold)
    }));
    for row in &snapshot.rows {
        table.add_row(resolved.iter().map(|c| c.render(&row.data)));
    }
    table
}

fn inferred_columns(snapshot: &GridSnapshot) -> Vec<ColumnSpec> {
    snapshot
        .rows
        .first()
        .and_then(|row| row.data.as_object())
        .map(|fields| fields.keys().map(ColumnSpec::new).collect())
        .unwrap_or_default()
}

pub fn summary_line(snapshot: &GridSnapshot) -> String {
    format!(
        "total: {} (page {} of {}, {} per page)",
        snapshot.total,
        snapshot.page(),
        snapshot.page_count().max(1),
        snapshot.per_page()
    )
}
