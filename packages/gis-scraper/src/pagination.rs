//! Load-more pagination driven by the portal's "X - Y of Z" status string.

use std::time::Duration;

use anyhow::Result;

use crate::dom::Element;
use crate::resolver::{resolve, POLL_INTERVAL};
use crate::types::{ResultCount, SearchLocators};

/// How long to wait for the count widget to hydrate before giving up on
/// pagination entirely.
const COUNT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the settle wait after each load-more activation. The wait
/// ends early once the count widget reflects the newly appended results.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Bring every paginated result into the document. Returns the number of
/// load-more activations performed.
///
/// The click budget is computed once from the initial count reading; the
/// early stop on a vanished load-more control is the termination guard if the
/// live count drifts. Calling this again on a fully loaded result set
/// performs zero activations.
pub async fn load_all_results(
    container: &dyn Element,
    locators: &SearchLocators,
) -> Result<u32> {
    wait_for_count(container, locators).await?;

    let Some(count_element) = resolve(container, &locators.results_count).await? else {
        tracing::debug!("results count not resolvable, nothing to paginate");
        return Ok(0);
    };
    let text = count_element.text().await?.unwrap_or_default();
    let Some(count) = ResultCount::parse(&text) else {
        tracing::debug!(text = %text, "count text did not match, treating results as fully loaded");
        return Ok(0);
    };

    let budget = count.clicks_needed();
    let mut performed = 0;
    for _ in 0..budget {
        let Some(button) = resolve(container, &locators.more_results_button).await? else {
            tracing::debug!(performed, budget, "load-more control gone, stopping early");
            break;
        };
        let before = count_text(container, locators).await?;
        button.click().await?;
        performed += 1;
        settle_after_click(container, locators, &before).await?;
    }

    tracing::debug!(
        total = count.total,
        page_size = count.page_size(),
        performed,
        "pagination complete"
    );
    Ok(performed)
}

async fn count_text(container: &dyn Element, locators: &SearchLocators) -> Result<String> {
    match resolve(container, &locators.results_count).await? {
        Some(element) => Ok(element.text().await?.unwrap_or_default()),
        None => Ok(String::new()),
    }
}

/// Wait for appended content to render: returns as soon as the count widget's
/// text moves on from its pre-click reading, falling back to a fixed delay
/// when it never does.
async fn settle_after_click(
    container: &dyn Element,
    locators: &SearchLocators,
    before: &str,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + SETTLE_DELAY;
    loop {
        if count_text(container, locators).await? != before {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Bounded wait until the count element resolves and its text contains the
/// literal "of" separator, guarding against reading a half-hydrated widget.
async fn wait_for_count(container: &dyn Element, locators: &SearchLocators) -> Result<()> {
    let deadline = tokio::time::Instant::now() + COUNT_READY_TIMEOUT;
    loop {
        if let Some(element) = resolve(container, &locators.results_count).await? {
            if element.text().await?.unwrap_or_default().contains("of") {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::debug!("count widget never hydrated");
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
