//! sqlriver - continuously index SQL query results into Elasticsearch
//!
//! Re-runs a query on a fixed poll interval and submits every row as a
//! document through the `_bulk` API.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "sqlriver")]
#[command(about = "Continuously index SQL query results into Elasticsearch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./sqlriver.toml or ~/.config/sqlriver/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index and poll until interrupted
    Run,
    /// Run a single cycle and exit
    Once,
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = sqlriver_core::ProgressContext::new();
    let multi = progress.is_tty().then(|| progress.multi());
    sqlriver_core::init_logging(cli.quiet, cli.debug, multi);

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Run => cmd::run::run(&config, &progress),
        Command::Once => cmd::once::run(&config, &progress),
        Command::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    fn secret(value: &Option<String>) -> &'static str {
        if value.is_some() {
            "configured"
        } else {
            "not set"
        }
    }

    let source = &config.source;
    let index = &config.index;
    let es = &config.elasticsearch;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Driver", source.driver.as_str()]);
    table.add_row(vec!["URL", source.url.as_str()]);
    table.add_row(vec![
        "Username",
        source.username.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec!["Password", secret(&source.password)]);
    table.add_row(vec!["SQL", source.sql.as_str()]);
    table.add_row(vec!["Poll interval", &format!("{}s", source.poll_interval_secs)]);
    table.add_row(vec!["Index", &format!("{}/{}", index.name, index.doc_type)]);
    table.add_row(vec!["Bulk size", &index.bulk_size.to_string()]);
    table.add_row(vec![
        "Max bulk requests",
        &index.max_bulk_requests.to_string(),
    ]);
    table.add_row(vec!["Bulk timeout", &format!("{}ms", index.bulk_timeout_ms)]);
    table.add_row(vec!["Overload", &format!("{:?}", index.overload).to_lowercase()]);
    table.add_row(vec![
        "Submit retries",
        &format!("{} (backoff {}ms)", index.submit_retries, index.retry_backoff_ms),
    ]);
    table.add_row(vec![
        "On cycle error",
        &format!("{:?}", index.on_cycle_error).to_lowercase(),
    ]);
    table.add_row(vec![
        "Fail on submission error",
        &index.fail_on_submission_error.to_string(),
    ]);
    table.add_row(vec![
        "Shutdown timeout",
        &format!("{}ms", index.shutdown_timeout_ms),
    ]);
    table.add_row(vec!["Elasticsearch URL", es.url.as_str()]);
    table.add_row(vec!["ES username", es.username.as_deref().unwrap_or("not set")]);
    table.add_row(vec!["ES password", secret(&es.password)]);
    table.add_row(vec!["Legacy types", &es.legacy_types.to_string()]);
    table.add_row(vec!["ES timeout", &format!("{}s", es.timeout_secs)]);

    eprintln!("\n{table}");
}
