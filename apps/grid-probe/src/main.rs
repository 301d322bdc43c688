mod cli;
mod config;
mod render;
mod telemetry;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use grid_cache::InMemoryCacheStore;
use grid_http::HttpTransport;
use grid_query::{GridQueryEngine, GridResult, GridStatus, ParamsPatch};
use tracing::info;

use crate::cli::Cli;
use crate::config::ProbeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_filter);
    let config = ProbeConfig::from_cli(cli);

    let transport = HttpTransport::new(config.transport.clone()).context("building transport")?;
    let grid = GridQueryEngine::new(
        config.engine.clone(),
        Arc::new(transport),
        InMemoryCacheStore::<GridResult>::new(),
    )?;

    grid.update_params(config.filters.clone());
    if let Some(page) = config.page {
        grid.update_params(ParamsPatch::page(page));
    }

    let url = grid.request_url();
    println!("{url}");
    if config.dry_run {
        return Ok(());
    }

    info!(grid_id = %grid.grid_id(), "fetching");
    if let Some(task) = grid.mount() {
        task.await.context("fetch task")?;
    }
    let snapshot = grid.settled().await;
    if snapshot.status == GridStatus::Failed {
        match &snapshot.error {
            Some(err) => bail!("fetch failed: {err}"),
            None => bail!("fetch failed"),
        }
    }

    println!("{}", render::render_rows(&snapshot, &config.engine.columns));
    println!("{}", render::summary_line(&snapshot));
    Ok(())
}
