//! GIS portal dataset API scraper.
//!
//! Drives a headless browser through a government GIS data portal to turn a
//! list of dataset search terms into machine-readable API endpoints: search
//! results -> dataset details -> API resource panel. Scraped URLs are written
//! back into the JSON configuration that feeds the rest of the
//! agroforestry-planning platform.
//!
//! # Modules
//!
//! - [`dom`] - trait seam over the browser automation surface
//! - [`resolver`] - locator resolution through nested shadow trees
//! - [`pagination`] - load-more pagination from the "X - Y of Z" count
//! - [`cards`] - result-card lookup and link extraction
//! - [`details`] - details-page extraction (primary + fallback strategy)
//! - [`orchestrator`] - the per-dataset two-stage run loop
//! - [`config`] - JSON configuration store with imported/scraped_url tracking
//! - [`browser`] - chromiumoxide implementation of the `dom` traits
//! - [`testing`] - in-memory fake DOM and browser for tests

pub mod browser;
pub mod cards;
pub mod config;
pub mod details;
pub mod dom;
pub mod orchestrator;
pub mod pagination;
pub mod resolver;
pub mod testing;
pub mod types;

pub use config::{ConfigStore, JsonConfigStore, ScrapeConfig};
pub use dom::{Browser, Element, PageSession};
pub use orchestrator::{run_batch, RunReport};
pub use types::{DetailsLocators, Locator, ResultCount, SearchLocators, SourceDescriptor};
