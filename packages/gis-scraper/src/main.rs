use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gis_scraper::browser::CdpBrowser;
use gis_scraper::config::JsonConfigStore;
use gis_scraper::orchestrator::run_batch;

#[derive(Parser, Debug)]
#[command(
    name = "scrape",
    about = "Scrape dataset API endpoints from a GIS data portal"
)]
struct Cli {
    /// Path to the scrape configuration file
    #[arg(default_value = "config/scrape_targets.json")]
    config: PathBuf,

    /// Run the browser with a visible window
    #[arg(long)]
    headful: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gis_scraper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), "starting GIS scraper");

    let store = JsonConfigStore::new(&cli.config);
    let browser = CdpBrowser::launch(!cli.headful)
        .await
        .context("failed to start the browser")?;

    // The browser is shut down whether or not the batch succeeded.
    let result = run_batch(&browser, &store).await;
    if let Err(error) = browser.shutdown().await {
        tracing::warn!(error = %format!("{error:#}"), "browser did not shut down cleanly");
    }

    let report = result?;
    tracing::info!(?report, "scrape run finished");
    Ok(())
}
