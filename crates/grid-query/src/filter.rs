use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Text,
    Select,
    DateRange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[serde(default)]
    pub filter_type: Option<FilterType>,
    #[serde(default)]
    pub strict: bool,
}

/// Column definition supplied by the caller; immutable for a grid's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub field: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Server-side field name used for filtering instead of `field`.
    #[serde(default)]
    pub filter_field: Option<String>,
    #[serde(default)]
    pub filter_options: Option<FilterOptions>,
    #[serde(default)]
    pub formatter: Option<String>,
    #[serde(default)]
    pub formatter_options: Map<String, Value>,
}

impl ColumnSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter_type: FilterType) -> Self {
        self.filter_options.get_or_insert_with(FilterOptions::default).filter_type =
            Some(filter_type);
        self
    }

    pub fn strict(mut self) -> Self {
        self.filter_options.get_or_insert_with(FilterOptions::default).strict = true;
        self
    }

    pub fn with_filter_field(mut self, filter_field: impl Into<String>) -> Self {
        self.filter_field = Some(filter_field.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_formatter(mut self, name: impl Into<String>, options: Map<String, Value>) -> Self {
        self.formatter = Some(name.into());
        self.formatter_options = options;
        self
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_options
            .as_ref()
            .and_then(|o| o.filter_type)
            .unwrap_or_default()
    }

    pub fn is_strict(&self) -> bool {
        self.filter_options.as_ref().is_some_and(|o| o.strict)
    }

    /// Field name sent to the server.
    pub fn wire_field(&self) -> &str {
        self.filter_field.as_deref().unwrap_or(&self.field)
    }
}

/// Finds the column a filter key refers to, by display field or by its
/// server-side filter field.
pub fn resolve_column<'a>(columns: &'a [ColumnSpec], name: &str) -> Option<&'a ColumnSpec> {
    columns
        .iter()
        .find(|c| c.field == name)
        .or_else(|| columns.iter().find(|c| c.filter_field.as_deref() == Some(name)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Contains,
    Equals,
    Between,
}

impl FilterOp {
    pub fn as_wire(self) -> &'static str {
        match self {
            FilterOp::Contains => "cont",
            FilterOp::Equals => "eq",
            FilterOp::Between => "between",
        }
    }
}

/// One `filter=<field>||<op>||<value>` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterExpression {
    pub fn query_pair(&self) -> String {
        format!("filter={self}")
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}||{}||{}", self.field, self.op.as_wire(), self.value)
    }
}

/// Maps a raw filter value to a wire expression according to its column.
///
/// Calendar dates in date-range filters are read in `offset` (UTC unless
/// configured) and emitted as UTC instants.
#[derive(Debug, Clone, Copy)]
pub struct FilterEncoder {
    offset: FixedOffset,
}

impl Default for FilterEncoder {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl FilterEncoder {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn encode(&self, name: &str, column: Option<&ColumnSpec>, raw: &str) -> FilterExpression {
        let Some(column) = column else {
            return FilterExpression {
                field: name.to_string(),
                op: FilterOp::Contains,
                value: encode_value(raw),
            };
        };
        let field = column.wire_field().to_string();

        match column.filter_type() {
            FilterType::Select => FilterExpression {
                field,
                op: FilterOp::Equals,
                value: encode_value(raw),
            },
            FilterType::DateRange => match self.date_span(raw) {
                Some((start, end)) => FilterExpression {
                    field,
                    op: FilterOp::Between,
                    value: format!("{},{}", encode_instant(start), encode_instant(end)),
                },
                None => {
                    warn!(field = %field, value = raw, "unparseable date range; using contains");
                    FilterExpression {
                        field,
                        op: FilterOp::Contains,
                        value: encode_value(raw),
                    }
                }
            },
            FilterType::Text => FilterExpression {
                field,
                op: if column.is_strict() {
                    FilterOp::Equals
                } else {
                    FilterOp::Contains
                },
                value: encode_value(raw),
            },
        }
    }

    /// `"a,b"` spans start of day `a` to end of day `b`; a single date spans that day.
    fn date_span(&self, raw: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let (first, second) = match raw.split_once(',') {
            Some((first, second)) if !second.trim().is_empty() => (first, second),
            Some((first, _)) => (first, first),
            None => (raw, raw),
        };
        let start_day = parse_calendar_date(first)?;
        let end_day = parse_calendar_date(second)?;
        let start = self.local_to_utc(start_day, NaiveTime::from_hms_opt(0, 0, 0)?)?;
        let end = self.local_to_utc(end_day, NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?)?;
        Some((start, end))
    }

    fn local_to_utc(&self, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&day.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part which is ignored.
fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Values are percent-encoded so they cannot end their query parameter.
fn encode_value(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

fn encode_instant(instant: DateTime<Utc>) -> String {
    encode_value(&instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daterange() -> ColumnSpec {
        ColumnSpec::new("created_at").with_filter(FilterType::DateRange)
    }

    #[test]
    fn unresolved_column_uses_contains_on_literal_name() {
        let expr = FilterEncoder::default().encode("nickname", None, "bob");
        assert_eq!(expr.query_pair(), "filter=nickname||cont||bob");
    }

    #[test]
    fn select_columns_use_equals() {
        let column = ColumnSpec::new("status").with_filter(FilterType::Select);
        let expr = FilterEncoder::default().encode("status", Some(&column), "active");
        assert_eq!(expr.to_string(), "status||eq||active");
    }

    #[test]
    fn text_columns_respect_strict() {
        let encoder = FilterEncoder::default();
        let loose = ColumnSpec::new("name").with_filter(FilterType::Text);
        let strict = ColumnSpec::new("name").with_filter(FilterType::Text).strict();
        let untyped = ColumnSpec::new("name");

        assert_eq!(encoder.encode("name", Some(&strict), "abc").op, FilterOp::Equals);
        assert_eq!(encoder.encode("name", Some(&loose), "abc").op, FilterOp::Contains);
        assert_eq!(encoder.encode("name", Some(&untyped), "abc").op, FilterOp::Contains);
    }

    #[test]
    fn filter_field_overrides_wire_name() {
        let column = ColumnSpec::new("author")
            .with_filter_field("author.name")
            .with_filter(FilterType::Select);
        let expr = FilterEncoder::default().encode("author", Some(&column), "ann");
        assert_eq!(expr.to_string(), "author.name||eq||ann");
    }

    #[test]
    fn date_range_spans_both_days() {
        let column = daterange();
        let expr = FilterEncoder::default().encode("created_at", Some(&column), "2024-01-01,2024-01-31");
        assert_eq!(expr.op, FilterOp::Between);
        assert_eq!(
            expr.value,
            "2024-01-01T00%3A00%3A00.000Z,2024-01-31T23%3A59%3A59.999Z"
        );
    }

    #[test]
    fn single_date_spans_one_day() {
        let column = daterange();
        let expr = FilterEncoder::default().encode("created_at", Some(&column), "2024-03-05");
        assert_eq!(
            expr.to_string(),
            "created_at||between||2024-03-05T00%3A00%3A00.000Z,2024-03-05T23%3A59%3A59.999Z"
        );
    }

    #[test]
    fn local_offset_shifts_bounds_to_utc() {
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
        let column = daterange();
        let expr = FilterEncoder::new(plus_two).encode("created_at", Some(&column), "2024-03-05");
        assert_eq!(
            expr.value,
            "2024-03-04T22%3A00%3A00.000Z,2024-03-05T21%3A59%3A59.999Z"
        );
    }

    #[test]
    fn garbage_dates_fall_back_to_contains() {
        let column = daterange();
        let expr = FilterEncoder::default().encode("created_at", Some(&column), "last week");
        assert_eq!(expr.op, FilterOp::Contains);
        assert_eq!(expr.value, "last%20week");
    }

    #[test]
    fn text_and_select_values_cannot_break_out_of_their_parameter() {
        let encoder = FilterEncoder::default();
        let text = ColumnSpec::new("name").with_filter(FilterType::Text);
        let select = ColumnSpec::new("status").with_filter(FilterType::Select);

        let expr = encoder.encode("name", Some(&text), "a&b#c");
        assert_eq!(expr.query_pair(), "filter=name||cont||a%26b%23c");
        let expr = encoder.encode("status", Some(&select), "on|off");
        assert_eq!(expr.to_string(), "status||eq||on%7Coff");
        let expr = encoder.encode("tag", None, "ø x");
        assert_eq!(expr.value, "%C3%B8%20x");
        assert_eq!(encoder.encode("tag", None, "plain-value_1").value, "plain-value_1");
    }

    #[test]
    fn resolves_columns_by_field_or_filter_field() {
        let columns = vec![
            ColumnSpec::new("author").with_filter_field("author.name"),
            ColumnSpec::new("status"),
        ];
        assert_eq!(resolve_column(&columns, "status").map(|c| c.field.as_str()), Some("status"));
        assert_eq!(
            resolve_column(&columns, "author.name").map(|c| c.field.as_str()),
            Some("author")
        );
        assert!(resolve_column(&columns, "missing").is_none());
    }

    #[test]
    fn columns_deserialize_from_camel_case() {
        let column: ColumnSpec = serde_json::from_value(serde_json::json!({
            "field": "created_at",
            "filterField": "createdAt",
            "filterOptions": {"filterType": "daterange"}
        }))
        .expect("column");
        assert_eq!(column.filter_type(), FilterType::DateRange);
        assert_eq!(column.wire_field(), "createdAt");
    }
}
