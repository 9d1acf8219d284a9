//! `sqlriver run` - poll until interrupted or the river stops itself

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use sqlriver_core::{Lifecycle, ProgressContext};

use super::SqlRiver;
use crate::config::Config;

pub fn run(config: &Config, progress: &ProgressContext) -> Result<()> {
    let river = Arc::new(super::build_river(config, progress)?);
    river.start().context("failed to start river")?;
    let interrupted = Arc::new(AtomicBool::new(false));
    watch_signals(Arc::clone(&river), Arc::clone(&interrupted))?;

    river.join();
    stopped(&config.index.name, interrupted.load(Ordering::SeqCst))
}

/// A river that stops without being signalled disabled itself after a
/// failed cycle.
fn stopped(name: &str, interrupted: bool) -> Result<()> {
    if !interrupted {
        anyhow::bail!("river [{name}] disabled itself after a failed cycle");
    }
    log::info!("river [{name}] stopped");
    Ok(())
}

/// First SIGINT/SIGTERM closes the river (in-flight batches drain),
/// a second one exits immediately.
fn watch_signals(river: Arc<SqlRiver>, interrupted: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;
    let handle = std::thread::Builder::new()
        .name("sqlriver-signals".to_string())
        .spawn(move || {
            let mut received = 0u32;
            for signal in signals.forever() {
                received += 1;
                if received > 1 {
                    log::warn!("second signal, exiting without drain");
                    std::process::exit(130);
                }
                log::info!("received signal {signal}, closing river");
                interrupted.store(true, Ordering::SeqCst);
                river.close();
            }
        })
        .context("failed to spawn signal thread")?;
    Ok(handle)
}
