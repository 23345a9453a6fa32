//! The two-stage scrape loop: search results to details URL, details page to
//! API URL, one dataset at a time on a fresh page.

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::cards::{card_link_url, find_card};
use crate::config::{geojson_query_url, ConfigStore};
use crate::details::extract_api_url;
use crate::dom::{Browser, PageSession};
use crate::pagination::load_all_results;
use crate::resolver::wait_resolve_on_page;
use crate::types::SourceDescriptor;

/// Bound on the origin-page navigation; exceeding it fails the dataset.
const NAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on the results container appearing after navigation.
const CONTAINER_TIMEOUT: Duration = Duration::from_secs(20);

/// Per-run outcome tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub imported: usize,
    pub skipped: usize,
    pub stage1_failures: usize,
    pub stage2_failures: usize,
    pub persist_failures: usize,
    pub unexpected_failures: usize,
}

enum SourceOutcome {
    Scraped(String),
    Stage1Failed,
    Stage2Failed,
}

/// Process every dataset not yet marked imported. Per-dataset failures are
/// logged and tallied; only session acquisition or the initial configuration
/// load abort the batch.
pub async fn run_batch(browser: &impl Browser, store: &impl ConfigStore) -> Result<RunReport> {
    let sources = store
        .load_sources()
        .await
        .context("failed to load source configuration")?;
    tracing::info!(datasets = sources.len(), "starting scrape batch");

    let mut report = RunReport::default();
    for source in &sources {
        if source.imported {
            tracing::debug!(id = %source.id, "already imported, skipping");
            report.skipped += 1;
            continue;
        }

        let page = browser
            .new_page()
            .await
            .context("failed to acquire a browser page")?;
        let outcome = scrape_source(page.as_ref(), source).await;
        // The page is released no matter how the dataset fared.
        if let Err(error) = page.close().await {
            tracing::warn!(id = %source.id, error = %error, "failed to close page");
        }

        match outcome {
            Ok(SourceOutcome::Scraped(url)) => {
                let url = if source.append_geojson_query {
                    geojson_query_url(&url)
                } else {
                    url
                };
                match store.record_scraped(&source.id, &url).await {
                    Ok(()) => {
                        tracing::info!(id = %source.id, url = %url, "dataset imported");
                        report.imported += 1;
                    }
                    Err(error) => {
                        tracing::warn!(id = %source.id, error = %format!("{error:#}"), "scraped URL could not be persisted");
                        report.persist_failures += 1;
                    }
                }
            }
            Ok(SourceOutcome::Stage1Failed) => {
                tracing::warn!(id = %source.id, stage = 1, "dataset card yielded no details URL");
                report.stage1_failures += 1;
            }
            Ok(SourceOutcome::Stage2Failed) => {
                tracing::warn!(id = %source.id, stage = 2, "details page yielded no API URL");
                report.stage2_failures += 1;
            }
            Err(error) => {
                tracing::warn!(id = %source.id, error = %format!("{error:#}"), "dataset failed unexpectedly");
                report.unexpected_failures += 1;
            }
        }
    }

    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        stage1_failures = report.stage1_failures,
        stage2_failures = report.stage2_failures,
        persist_failures = report.persist_failures,
        unexpected_failures = report.unexpected_failures,
        "scrape batch complete"
    );
    Ok(report)
}

async fn scrape_source(page: &dyn PageSession, source: &SourceDescriptor) -> Result<SourceOutcome> {
    tracing::info!(id = %source.id, origin = %source.origin_url, "stage 1: searching catalog");

    if let Err(error) = page.goto(&source.origin_url, NAV_TIMEOUT).await {
        tracing::warn!(id = %source.id, error = %format!("{error:#}"), "search page never settled");
        return Ok(SourceOutcome::Stage1Failed);
    }

    let Some(container) =
        wait_resolve_on_page(page, &source.locators.catalog_container, CONTAINER_TIMEOUT).await?
    else {
        tracing::warn!(id = %source.id, "results container did not appear");
        return Ok(SourceOutcome::Stage1Failed);
    };

    // Try the card on the initial result set; on a miss, one pagination pass
    // and one retry, never an unbounded loop.
    let mut card = find_card(
        container.as_ref(),
        &source.locators.gallery_card,
        &source.search_term,
    )
    .await?;
    if card.is_none() {
        tracing::debug!(id = %source.id, "card not in initial results, paginating");
        load_all_results(container.as_ref(), &source.locators).await?;
        card = find_card(
            container.as_ref(),
            &source.locators.gallery_card,
            &source.search_term,
        )
        .await?;
    }
    let Some(card) = card else {
        return Ok(SourceOutcome::Stage1Failed);
    };

    let base = Url::parse(&source.origin_url)
        .with_context(|| format!("origin URL {} is invalid", source.origin_url))?;
    let Some(details_url) = card_link_url(card.as_ref(), &source.locators.card_url, &base).await?
    else {
        return Ok(SourceOutcome::Stage1Failed);
    };

    tracing::info!(id = %source.id, details_url = %details_url, "stage 2: extracting API endpoint");
    match extract_api_url(page, details_url.as_str(), &source.locators.details_page).await {
        Some(url) => Ok(SourceOutcome::Scraped(url)),
        None => Ok(SourceOutcome::Stage2Failed),
    }
}
