//! Named cell formatters.
//!
//! Registries are plain per-instance maps; nothing here is global, so two
//! grids can register different formatters under the same name.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::filter::ColumnSpec;

pub type FormatterOptions = Map<String, Value>;

pub type Formatter = Arc<dyn Fn(&Value, &FormatterOptions) -> String + Send + Sync>;

const EMPTY: &str = "-";

#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: BTreeMap<String, Formatter>,
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the `Common*` formatters.
    pub fn with_common() -> Self {
        let mut registry = Self::new();
        registry.register("CommonDateFormatter", |v, o| format_date(v, o, "%d.%m.%Y"));
        registry.register("CommonDateTimeFormatter", |v, o| {
            format_date(v, o, "%d.%m.%Y %H:%M")
        });
        registry.register("CommonCurrencyFormatter", format_currency);
        registry.register("CommonNumberFormatter", |v, o| {
            match as_number(v) {
                Some(n) => group_thousands(n, opt_usize(o, "decimals").unwrap_or(2)),
                None => EMPTY.to_string(),
            }
        });
        registry.register("CommonTruncateFormatter", format_truncate);
        registry.register("CommonUppercaseFormatter", |v, _| {
            if is_falsy(v) {
                EMPTY.to_string()
            } else {
                plain(v).to_uppercase()
            }
        });
        registry.register("CommonLowercaseFormatter", |v, _| {
            if is_falsy(v) {
                EMPTY.to_string()
            } else {
                plain(v).to_lowercase()
            }
        });
        registry.register("CommonBooleanFormatter", |v, o| {
            if is_falsy(v) {
                opt_str(o, "falseText").unwrap_or("No").to_string()
            } else {
                opt_str(o, "trueText").unwrap_or("Yes").to_string()
            }
        });
        registry.register("CommonStatusFormatter", |v, o| {
            let key = plain(v);
            o.get("mapping")
                .and_then(|m| m.get(&key))
                .map(plain)
                .unwrap_or(key)
        });
        registry.register("CommonPercentageFormatter", |v, o| match as_number(v) {
            Some(n) => format!(
                "{:.*}%",
                opt_usize(o, "decimals").unwrap_or(1),
                n * 100.0
            ),
            None => EMPTY.to_string(),
        });
        registry.register("CommonFileSizeFormatter", format_file_size);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, formatter: F)
    where
        F: Fn(&Value, &FormatterOptions) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(name.into(), Arc::new(formatter));
    }

    pub fn get(&self, name: &str) -> Option<Formatter> {
        self.formatters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.formatters.keys().cloned().collect()
    }
}

/// Reported for columns whose configuration cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnIssue {
    #[error("formatter `{formatter}` not found for column `{column}`")]
    FormatterMissing { column: String, formatter: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableFormatters {
    pub common: Vec<String>,
    pub module: Vec<String>,
    pub all: Vec<String>,
}

/// A column with its formatter looked up once.
#[derive(Clone)]
pub struct ResolvedColumn {
    pub column: ColumnSpec,
    format: Option<Formatter>,
}

impl fmt::Debug for ResolvedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedColumn")
            .field("column", &self.column.field)
            .field("formatted", &self.format.is_some())
            .finish()
    }
}

impl ResolvedColumn {
    pub fn has_formatter(&self) -> bool {
        self.format.is_some()
    }

    /// Renders the column's cell of `row`; untransformed when no formatter resolved.
    pub fn render(&self, row: &Value) -> String {
        let value = row.get(&self.column.field).unwrap_or(&Value::Null);
        match &self.format {
            Some(format) => format(value, &self.column.formatter_options),
            None => plain(value),
        }
    }
}

/// Module formatters first, common formatters as fallback.
#[derive(Debug, Clone)]
pub struct FormatterResolver {
    module: FormatterRegistry,
    common: FormatterRegistry,
}

impl Default for FormatterResolver {
    fn default() -> Self {
        Self::new(FormatterRegistry::new())
    }
}

impl FormatterResolver {
    pub fn new(module: FormatterRegistry) -> Self {
        Self {
            module,
            common: FormatterRegistry::with_common(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Formatter> {
        self.module.get(name).or_else(|| self.common.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.module.contains(name) || self.common.contains(name)
    }

    pub fn resolve_column(&self, column: &ColumnSpec) -> ResolvedColumn {
        let format = column.formatter.as_deref().and_then(|name| {
            let found = self.get(name);
            if found.is_none() {
                warn!(column = %column.field, formatter = name, "formatter not found");
            }
            found
        });
        ResolvedColumn {
            column: column.clone(),
            format,
        }
    }

    pub fn resolve_columns(&self, columns: &[ColumnSpec]) -> Vec<ResolvedColumn> {
        columns.iter().map(|c| self.resolve_column(c)).collect()
    }

    /// Binds a formatter to fixed options.
    pub fn create(
        &self,
        name: &str,
        options: FormatterOptions,
    ) -> Option<impl Fn(&Value) -> String + Send + Sync> {
        let format = self.get(name)?;
        Some(move |value: &Value| format(value, &options))
    }

    pub fn validate_column(&self, column: &ColumnSpec) -> Vec<ColumnIssue> {
        match column.formatter.as_deref() {
            Some(name) if !self.contains(name) => vec![ColumnIssue::FormatterMissing {
                column: column.field.clone(),
                formatter: name.to_string(),
            }],
            _ => Vec::new(),
        }
    }

    pub fn available(&self) -> AvailableFormatters {
        let common = self.common.names();
        let module = self.module.names();
        let all = common.iter().chain(module.iter()).cloned().collect();
        AvailableFormatters {
            common,
            module,
            all,
        }
    }
}

/// Text of a cell as-is: strings unquoted, null empty.
pub fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0 || f.is_nan()),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn opt_str<'a>(options: &'a FormatterOptions, name: &str) -> Option<&'a str> {
    options.get(name).and_then(Value::as_str)
}

fn opt_usize(options: &FormatterOptions, name: &str) -> Option<usize> {
    options
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.naive_utc())
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
                .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        _ => None,
    }
}

fn format_date(value: &Value, options: &FormatterOptions, default_format: &str) -> String {
    if is_falsy(value) {
        return EMPTY.to_string();
    }
    let Some(datetime) = parse_datetime(value) else {
        return EMPTY.to_string();
    };
    let pattern = opt_str(options, "format").unwrap_or(default_format);
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        warn!(format = pattern, "invalid date format");
        return EMPTY.to_string();
    }
    // Zone items like `%z` parse fine but cannot render a naive datetime.
    let mut out = String::new();
    if write!(out, "{}", datetime.format_with_items(items.into_iter())).is_err() {
        warn!(format = pattern, "date format cannot render a naive datetime");
        return EMPTY.to_string();
    }
    out
}

fn format_currency(value: &Value, options: &FormatterOptions) -> String {
    let Some(amount) = as_number(value) else {
        return EMPTY.to_string();
    };
    let currency = opt_str(options, "currency").unwrap_or("USD");
    let symbol = match currency {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => format!("{other} "),
    };
    let grouped = group_thousands(amount.abs(), 2);
    if amount < 0.0 {
        format!("-{symbol}{grouped}")
    } else {
        format!("{symbol}{grouped}")
    }
}

fn format_truncate(value: &Value, options: &FormatterOptions) -> String {
    if is_falsy(value) {
        return EMPTY.to_string();
    }
    let text = plain(value);
    let max_length = opt_usize(options, "maxLength").unwrap_or(50);
    let suffix = opt_str(options, "suffix").unwrap_or("...");
    if text.chars().count() <= max_length {
        return text;
    }
    let keep = max_length.saturating_sub(suffix.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(suffix);
    truncated
}

fn format_file_size(value: &Value, options: &FormatterOptions) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let Some(mut size) = as_number(value) else {
        return EMPTY.to_string();
    };
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let decimals = opt_usize(options, "decimals").unwrap_or(1);
    format!("{size:.decimals$} {}", UNITS[unit])
}

/// `1234567.891` with 2 decimals renders as `1,234,567.89`.
fn group_thousands(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        grouped.insert(0, '-');
    }
    grouped
}
