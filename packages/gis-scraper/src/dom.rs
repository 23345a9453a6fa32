//! Trait seam over the browser automation surface (to allow faking the DOM).
//!
//! Not-found is always `Ok(None)` / an empty vec; an `Err` from any of these
//! methods means the driver itself misbehaved and is handled by the
//! orchestrator's per-dataset guard.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// A live handle to one element in the page.
#[async_trait]
pub trait Element: Send + Sync {
    /// The element's isolated sub-document, if it hosts one.
    async fn shadow_root(&self) -> Result<Option<Box<dyn Element>>>;

    /// First match for `selector` within this element's subtree.
    async fn query(&self, selector: &str) -> Result<Option<Box<dyn Element>>>;

    /// Every match for `selector` within this element's subtree.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>>;

    async fn text(&self) -> Result<Option<String>>;

    /// The element's value property, for input-like widgets.
    async fn value(&self) -> Result<Option<String>>;

    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    async fn click(&self) -> Result<()>;
}

/// One browser page/tab for the duration of one dataset's processing.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and wait for the page to settle, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Bounded wait for a document-level selector to appear. Returns
    /// `Ok(None)` when the deadline passes without a match.
    async fn wait_for(&self, selector: &str, timeout: Duration)
        -> Result<Option<Box<dyn Element>>>;

    /// Point-in-time document-level lookup, no waiting.
    async fn find(&self, selector: &str) -> Result<Option<Box<dyn Element>>>;

    async fn current_url(&self) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

/// Factory for fresh pages; one page per dataset isolates failures.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageSession>>;
}
