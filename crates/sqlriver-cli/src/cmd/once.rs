//! `sqlriver once` - a single cycle, then exit

use anyhow::{Context, Result};
use sqlriver_core::{ProgressContext, fmt_num};

use crate::config::Config;

pub fn run(config: &Config, progress: &ProgressContext) -> Result<()> {
    let mut config = config.clone();
    config.source.poll_interval_secs = 0;

    let river = super::build_river(&config, progress)?;
    river.prepare_index().context("failed to prepare index")?;
    let stats = river.run_once()?;

    progress.println(format!(
        "Indexed {} rows into [{}] with {} bulk requests in {:.1}s",
        fmt_num(stats.rows as usize),
        river.settings().target,
        stats.batches,
        stats.elapsed.as_secs_f64()
    ));
    Ok(())
}
