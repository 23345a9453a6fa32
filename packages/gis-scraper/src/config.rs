//! The scrape configuration file: dataset list in, scraped URLs out.
//!
//! The file doubles as the run's durable status store. It is read once at
//! batch start and rewritten whole (read-modify-write) after each dataset
//! succeeds, so re-runs skip anything already marked imported.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{SearchLocators, SourceDescriptor};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub source_definitions: Vec<SourceDefinition>,
}

/// One portal: its locator bag plus the categories to search within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    /// Category token is appended to this to form each origin URL.
    pub search_url_base: String,
    /// Rewrite scraped ArcGIS service URLs into GeoJSON query URLs before
    /// persisting.
    #[serde(default)]
    pub append_geojson_query: bool,
    pub locators: SearchLocators,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub category: String,
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    pub search_term: String,
    #[serde(default)]
    pub imported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_url: Option<String>,
}

/// Flatten definition x category x dataset into per-dataset descriptors.
/// Each descriptor inherits its definition's locator bag and derives its
/// origin URL from the definition's base plus the category token.
pub fn flatten_sources(config: &ScrapeConfig) -> Vec<SourceDescriptor> {
    let mut sources = Vec::new();
    for definition in &config.source_definitions {
        for category in &definition.categories {
            for dataset in &category.datasets {
                sources.push(SourceDescriptor {
                    id: dataset.id.clone(),
                    search_term: dataset.search_term.clone(),
                    origin_url: format!("{}{}", definition.search_url_base, category.category),
                    locators: definition.locators.clone(),
                    append_geojson_query: definition.append_geojson_query,
                    scraped_url: dataset.scraped_url.clone(),
                    imported: dataset.imported,
                });
            }
        }
    }
    sources
}

/// Turn an ArcGIS REST service URL into a ready-to-fetch GeoJSON query URL.
pub fn geojson_query_url(base: &str) -> String {
    format!(
        "{}/0/query?where=1%3D1&outFields=*&outSR=4326&f=geojson",
        base.trim_end_matches('/')
    )
}

/// Persistence collaborator for the orchestrator.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_sources(&self) -> Result<Vec<SourceDescriptor>>;

    /// Record a successful scrape: set the dataset's `scraped_url` and mark
    /// it imported. An unknown id is logged and ignored, not an error.
    async fn record_scraped(&self, id: &str, url: &str) -> Result<()>;
}

/// JSON-file-backed store.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read(&self) -> Result<ScrapeConfig> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load_sources(&self) -> Result<Vec<SourceDescriptor>> {
        let config = self.read().await?;
        Ok(flatten_sources(&config))
    }

    async fn record_scraped(&self, id: &str, url: &str) -> Result<()> {
        let mut config = self.read().await?;

        let entry = config
            .source_definitions
            .iter_mut()
            .flat_map(|definition| definition.categories.iter_mut())
            .flat_map(|category| category.datasets.iter_mut())
            .find(|dataset| dataset.id == id);
        let Some(entry) = entry else {
            tracing::warn!(id = %id, "dataset not found in configuration, skipping write-back");
            return Ok(());
        };

        entry.scraped_url = Some(url.to_string());
        entry.imported = true;

        let serialized =
            serde_json::to_string_pretty(&config).context("failed to serialize configuration")?;
        tokio::fs::write(&self.path, serialized)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        tracing::info!(id = %id, url = %url, "configuration updated");
        Ok(())
    }
}
