//! Command-line surface.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use console::style;

use crate::config::Settings;
use crate::extractor::BrowserSession;
use crate::orchestrator::{Orchestrator, RunSummary, SUCCESS_RATE_FLOOR};

#[derive(Parser)]
#[command(name = "cartelera")]
#[command(about = "Cinema showtime scraper with IMDb cross-referencing")]
#[command(version)]
pub struct Cli {
    /// Browser binary override (discovered from well-known paths when unset)
    #[arg(long = "chromedriver-path", value_name = "PATH")]
    chromedriver_path: Option<PathBuf>,

    /// Light pre-check: enumerate only, re-scrape when the billboard changed
    #[arg(long)]
    light: bool,

    /// Config file path (default: ./cartelera.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog output path (overrides config)
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// Billboard URL (overrides config)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(path) = cli.chromedriver_path {
        settings.browser.binary_path = Some(path);
    }
    if let Some(path) = cli.catalog {
        settings.catalog_path = path;
    }
    if let Some(url) = cli.base_url {
        settings.base_url = url;
    }

    // The only unrecoverable failure: no browser session at all.
    let session = BrowserSession::launch(settings.browser.clone())
        .await
        .context("browser session could not be initialized")?;

    let mut orchestrator = Orchestrator::new(session, settings);
    let result = orchestrator.run(cli.light).await;
    orchestrator.into_extractor().close().await;

    // Run-level degradation still exits zero; the summary says what
    // happened.
    match result {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            tracing::error!("Run failed: {:#}", e);
            println!("{} Run failed: {:#}", style("✗").red(), e);
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    if summary.skipped {
        println!(
            "{} Billboard unchanged, catalog left as-is",
            style("→").cyan()
        );
    } else if summary.persisted {
        println!(
            "{} Persisted {} of {} listings ({:.0}% success)",
            style("✓").green(),
            summary.succeeded,
            summary.total,
            summary.success_rate * 100.0
        );
    } else {
        println!(
            "{} Success rate {:.0}% below {:.0}%, previous catalog kept ({} of {} listings failed)",
            style("✗").red(),
            summary.success_rate * 100.0,
            SUCCESS_RATE_FLOOR * 100.0,
            summary.failed,
            summary.total
        );
    }
}
