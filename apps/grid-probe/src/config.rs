use std::time::Duration;

use grid_http::{HttpTransportConfig, RetryPolicy};
use grid_query::{ColumnSpec, EngineConfig, ParamsPatch};
use serde_json::Map;

use crate::cli::Cli;

/// Everything needed to run one probe, resolved from the command line.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub transport: HttpTransportConfig,
    pub engine: EngineConfig,
    pub filters: ParamsPatch,
    pub page: Option<u32>,
    pub dry_run: bool,
}

impl ProbeConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let mut transport = HttpTransportConfig::new(cli.base_url)
            .with_timeout(Duration::from_millis(cli.timeout_ms))
            .with_retry(RetryPolicy {
                max_retries: cli.max_retries,
                ..RetryPolicy::default()
            });
        transport.token = cli.token.filter(|t| !t.is_empty());

        let mut columns = cli.columns;
        for (field, formatter) in cli.formats {
            match columns.iter_mut().find(|c| c.field == field) {
                Some(column) => column.formatter = Some(formatter),
                None => columns.push(ColumnSpec::new(field).with_formatter(formatter, Map::new())),
            }
        }

        let mut engine = EngineConfig::new(cli.grid_id, cli.path).with_columns(columns);
        if let Some(per_page) = cli.per_page {
            engine.default_per_page = per_page.max(1);
        }
        if let Some(sort) = cli.sort {
            engine = engine.with_default_sort(sort);
        }
        if let Some(extra) = cli.extra {
            engine = engine.with_extra_params(extra);
        }

        Self {
            transport,
            engine,
            filters: ParamsPatch::column_filters(cli.filters),
            page: cli.page,
            dry_run: cli.dry_run,
        }
    }
}
