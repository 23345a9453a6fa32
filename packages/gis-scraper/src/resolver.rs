//! Locator resolution through chains of nested shadow trees.
//!
//! Resolution is a pure lookup: no waits, no retries. Callers are responsible
//! for making sure prerequisite content has rendered before resolving.

use std::time::Duration;

use anyhow::Result;

use crate::dom::{Element, PageSession};
use crate::types::Locator;

/// Poll interval for the bounded waits layered on top of resolution.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Walk `locator` from `start`: at every step (path steps and the terminal
/// query alike) descend into the current element's shadow tree and apply the
/// next selector. A missing shadow tree or an unmatched selector short-circuits
/// to `Ok(None)` without evaluating the remaining steps.
pub async fn resolve(start: &dyn Element, locator: &Locator) -> Result<Option<Box<dyn Element>>> {
    let mut current: Option<Box<dyn Element>> = None;
    for selector in locator.path.iter().chain(std::iter::once(&locator.query)) {
        let host: &dyn Element = current.as_deref().unwrap_or(start);
        let Some(root) = host.shadow_root().await? else {
            tracing::trace!(selector = %selector, "no shadow tree to descend into");
            return Ok(None);
        };
        let Some(next) = root.query(selector).await? else {
            tracing::trace!(selector = %selector, "selector unmatched in shadow scope");
            return Ok(None);
        };
        current = Some(next);
    }
    Ok(current)
}

/// Same traversal as [`resolve`], but the terminal selector collects every
/// match instead of the first. A broken path yields an empty vec.
pub async fn resolve_all(start: &dyn Element, locator: &Locator) -> Result<Vec<Box<dyn Element>>> {
    let mut current: Option<Box<dyn Element>> = None;
    for selector in &locator.path {
        let host: &dyn Element = current.as_deref().unwrap_or(start);
        let Some(root) = host.shadow_root().await? else {
            return Ok(Vec::new());
        };
        let Some(next) = root.query(selector).await? else {
            return Ok(Vec::new());
        };
        current = Some(next);
    }
    let host: &dyn Element = current.as_deref().unwrap_or(start);
    let Some(root) = host.shadow_root().await? else {
        return Ok(Vec::new());
    };
    root.query_all(&locator.query).await
}

/// Resolve a locator whose first hop is a document-level host: the head of
/// the path is looked up in the light DOM, the rest pierces shadow trees.
pub async fn resolve_on_page(
    page: &dyn PageSession,
    locator: &Locator,
) -> Result<Option<Box<dyn Element>>> {
    match locator.path.split_first() {
        None => page.find(&locator.query).await,
        Some((head, rest)) => {
            let Some(host) = page.find(head).await? else {
                return Ok(None);
            };
            let tail = Locator::new(rest.to_vec(), locator.query.clone());
            resolve(host.as_ref(), &tail).await
        }
    }
}

/// Bounded cooperative wait for [`resolve_on_page`] to succeed. Returns
/// `Ok(None)` once the deadline passes.
pub async fn wait_resolve_on_page(
    page: &dyn PageSession,
    locator: &Locator,
    timeout: Duration,
) -> Result<Option<Box<dyn Element>>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(found) = resolve_on_page(page, locator).await? {
            return Ok(Some(found));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
