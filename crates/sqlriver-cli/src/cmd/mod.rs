//! Subcommand implementations

pub mod once;
pub mod run;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlriver_core::{ProgressContext, River};
use sqlriver_duckdb::DuckDbDriver;
use sqlriver_elastic::ElasticClient;

use crate::config::Config;

pub type SqlRiver = River<DuckDbDriver, ElasticClient>;

/// Wire the configured driver and Elasticsearch client into a river.
///
/// An unknown driver identifier is rejected here, before anything starts.
pub fn build_river(config: &Config, progress: &ProgressContext) -> Result<SqlRiver> {
    config.validate()?;
    let driver = sqlriver_duckdb::driver(&config.source.driver).context("invalid [source] driver")?;
    let backend = ElasticClient::new(&config.elastic_settings())
        .context("failed to build Elasticsearch client")?;
    Ok(River::with_status_line(
        driver,
        Arc::new(backend),
        config.river_settings(),
        progress.river_line(&config.index.name),
    ))
}
