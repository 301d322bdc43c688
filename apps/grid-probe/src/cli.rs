use clap::Parser;
use grid_query::{ColumnSpec, FilterType};

#[derive(Parser, Debug)]
#[command(name = "grid-probe")]
#[command(about = "Fetch one page of a grid endpoint the way the grid engine would")]
pub struct Cli {
    /// API base URL
    #[arg(long, env = "GRID_API_BASE_URL")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "GRID_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "GRID_API_TIMEOUT_MS", default_value_t = 30_000)]
    pub timeout_ms: u64,

    #[arg(long, env = "GRID_API_MAX_RETRIES", default_value_t = 1)]
    pub max_retries: u32,

    /// Endpoint path, appended to the base URL
    #[arg(long)]
    pub path: String,

    #[arg(long, default_value = "probe")]
    pub grid_id: String,

    #[arg(long)]
    pub page: Option<u32>,

    #[arg(long)]
    pub per_page: Option<u32>,

    /// Default sort, `<field>,<ASC|DESC>`
    #[arg(long)]
    pub sort: Option<String>,

    /// Column filter, `<field>=<value>`; repeatable
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Column definition, `<field>[:text|select|daterange[:strict]]`; repeatable
    #[arg(long = "column", value_parser = parse_column)]
    pub columns: Vec<ColumnSpec>,

    /// Formatter for a column, `<field>=<FormatterName>`; repeatable
    #[arg(long = "format", value_parser = parse_filter)]
    pub formats: Vec<(String, String)>,

    /// Raw query suffix appended after the filters, e.g. `&include=roles`
    #[arg(long)]
    pub extra: Option<String>,

    /// Print the request URL without fetching
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info,grid_query=debug")]
    pub log_filter: String,
}

pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <field>=<value>, got `{raw}`"))?;
    if field.trim().is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((field.trim().to_string(), value.to_string()))
}

pub fn parse_column(raw: &str) -> Result<ColumnSpec, String> {
    let mut parts = raw.split(':');
    let field = parts
        .next()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| format!("missing field name in `{raw}`"))?;
    let mut column = ColumnSpec::new(field);
    if let Some(kind) = parts.next() {
        let filter_type = match kind.trim().to_ascii_lowercase().as_str() {
            "text" => FilterType::Text,
            "select" => FilterType::Select,
            "daterange" => FilterType::DateRange,
            other => return Err(format!("unknown filter type `{other}`")),
        };
        column = column.with_filter(filter_type);
    }
    match parts.next() {
        None => {}
        Some("strict") => column = column.strict(),
        Some(other) => return Err(format!("unexpected column flag `{other}`")),
    }
    Ok(column)
}
