//! Stage 2: extract the machine-readable API URL from a dataset's details
//! page, with a primary (API resources panel) and a fallback (direct link)
//! strategy tried in order.

use std::time::Duration;

use anyhow::Result;
use url::Url;

use crate::dom::{Element, PageSession};
use crate::resolver::{resolve_all, resolve_on_page, wait_resolve_on_page};
use crate::types::DetailsLocators;

/// Navigation must settle within this bound; exceeding it fails the dataset.
const NAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded wait for the API resources control only; a timeout here falls
/// through to the fallback strategy.
const PANEL_TIMEOUT: Duration = Duration::from_secs(15);

/// URL fragment indicating the portal moved dataset content into a side
/// panel on an explore view.
const EXPLORE_PATTERN: &str = "/explore";

/// Sentinel recorded for a candidate field that could not be read.
const MISSING: &str = "not found";

#[derive(Debug, Clone, Copy)]
enum ExtractionStrategy {
    ApiPanel,
    DirectLink,
}

const STRATEGIES: [ExtractionStrategy; 2] =
    [ExtractionStrategy::ApiPanel, ExtractionStrategy::DirectLink];

/// Run the details-page state machine. DOM-traversal errors never escape:
/// they are logged here and reported as not-found.
pub async fn extract_api_url(
    page: &dyn PageSession,
    details_url: &str,
    locators: &DetailsLocators,
) -> Option<String> {
    match run(page, details_url, locators).await {
        Ok(found) => found,
        Err(error) => {
            tracing::warn!(url = %details_url, error = %format!("{error:#}"), "details extraction aborted");
            None
        }
    }
}

async fn run(
    page: &dyn PageSession,
    details_url: &str,
    locators: &DetailsLocators,
) -> Result<Option<String>> {
    if let Err(error) = page.goto(details_url, NAV_TIMEOUT).await {
        tracing::warn!(url = %details_url, error = %format!("{error:#}"), "details page never settled");
        return Ok(None);
    }

    let landed = page.current_url().await?;
    if landed.contains(EXPLORE_PATTERN) && !open_side_panel(page, locators).await? {
        tracing::error!(url = %landed, "explore view detected but side panel could not be opened");
        return Ok(None);
    }

    for strategy in STRATEGIES {
        if let Some(url) = try_strategy(page, strategy, locators).await? {
            return Ok(Some(url));
        }
    }
    Ok(None)
}

/// On an explore view the dataset details hide behind an info toggle.
/// Activation is idempotent: an already-active toggle is left alone so the
/// panel is not accidentally closed again.
async fn open_side_panel(page: &dyn PageSession, locators: &DetailsLocators) -> Result<bool> {
    let Some(toggle) = resolve_on_page(page, &locators.info_button).await? else {
        return Ok(false);
    };
    if toggle.attribute("active").await?.is_none() {
        toggle.click().await?;
    }
    let Some(details) = resolve_on_page(page, &locators.details_link).await? else {
        return Ok(false);
    };
    details.click().await?;
    Ok(true)
}

async fn try_strategy(
    page: &dyn PageSession,
    strategy: ExtractionStrategy,
    locators: &DetailsLocators,
) -> Result<Option<String>> {
    match strategy {
        // Failures inside the primary strategy are recoverable: log and let
        // the fallback have its turn.
        ExtractionStrategy::ApiPanel => match api_panel(page, locators).await {
            Ok(found) => Ok(found),
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "API panel strategy failed, falling back");
                Ok(None)
            }
        },
        ExtractionStrategy::DirectLink => direct_link(page, locators).await,
    }
}

/// Primary strategy: open the API resources panel and pick the first input
/// whose value carries the configured match token.
async fn api_panel(page: &dyn PageSession, locators: &DetailsLocators) -> Result<Option<String>> {
    let Some(button) =
        wait_resolve_on_page(page, &locators.api_resources_button, PANEL_TIMEOUT).await?
    else {
        tracing::debug!("API resources control did not appear, falling back");
        return Ok(None);
    };
    button.click().await?;

    let Some(container) = resolve_on_page(page, &locators.api_container).await? else {
        tracing::debug!("API container did not resolve");
        return Ok(None);
    };

    let widgets = resolve_all(container.as_ref(), &locators.api_input).await?;
    let mut candidates = Vec::with_capacity(widgets.len());
    for widget in &widgets {
        candidates.push(read_candidate(widget.as_ref()).await);
    }

    if let Some((_, value)) = candidates
        .iter()
        .find(|(_, value)| value.contains(&locators.api_input_value_match))
    {
        return Ok(Some(value.clone()));
    }

    tracing::warn!(
        token = %locators.api_input_value_match,
        candidates = ?candidates,
        "no API input matched the configured token"
    );
    Ok(None)
}

/// Read a candidate's (label, value) pair: the label from the widget's own
/// shadow tree, the value from the widget itself.
async fn read_candidate(widget: &dyn Element) -> (String, String) {
    let label = match widget.shadow_root().await {
        Ok(Some(root)) => root
            .text()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| MISSING.to_string()),
        _ => MISSING.to_string(),
    };
    let value = widget
        .value()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| MISSING.to_string());
    (label, value)
}

/// Fallback strategy: a direct data-source link somewhere in the document.
async fn direct_link(page: &dyn PageSession, locators: &DetailsLocators) -> Result<Option<String>> {
    let Some(link) = page.find(&locators.fallback_api_selector).await? else {
        return Ok(None);
    };
    let Some(href) = link.attribute("href").await? else {
        return Ok(None);
    };
    let absolute = match Url::parse(&page.current_url().await?) {
        Ok(base) => base.join(&href).map(String::from).unwrap_or(href),
        Err(_) => href,
    };
    Ok(Some(absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNode, FakePage};
    use crate::types::Locator;
    use std::sync::Arc;

    const DETAILS_URL: &str = "https://portal.test/maps/dams";

    fn locators() -> DetailsLocators {
        DetailsLocators {
            info_button: Locator::query("button.info"),
            details_link: Locator::query("a.full-details"),
            api_resources_button: Locator::query("button.api"),
            api_container: Locator::query("div.api-panel"),
            api_input: Locator::query("calcite-input"),
            api_input_value_match: "FeatureServer".into(),
            fallback_api_selector: "a[data-test-id=\"item-api-link\"]".into(),
        }
    }

    fn input_widget(label: &str, value: &str) -> Arc<FakeNode> {
        let widget = FakeNode::new();
        widget.set_value(value);
        let shadow = widget.attach_shadow();
        shadow.set_text(label);
        widget
    }

    /// Document exposing the API resources panel with the given inputs.
    fn document_with_panel(inputs: Vec<Arc<FakeNode>>) -> Arc<FakeNode> {
        let document = FakeNode::new();
        document.add_child("button.api", FakeNode::new());
        let panel = FakeNode::new();
        let panel_shadow = panel.attach_shadow();
        for input in inputs {
            panel_shadow.add_child("calcite-input", input);
        }
        document.add_child("div.api-panel", panel);
        document
    }

    #[tokio::test(start_paused = true)]
    async fn primary_strategy_returns_matching_value() {
        let page = FakePage::new();
        let document = document_with_panel(vec![
            input_widget("GeoService", "https://host/arcgis/rest/services/Dams/MapServer"),
            input_widget(
                "GeoJSON",
                "https://host/arcgis/rest/services/Dams/FeatureServer",
            ),
        ]);
        page.install(DETAILS_URL, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert_eq!(
            found.as_deref(),
            Some("https://host/arcgis/rest/services/Dams/FeatureServer")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_widget_falls_back_to_sentinels() {
        let page = FakePage::new();
        // One widget with no shadow tree and no value, one good widget.
        let blank = FakeNode::new();
        let document = document_with_panel(vec![
            blank,
            input_widget("GeoJSON", "https://host/FeatureServer"),
        ]);
        page.install(DETAILS_URL, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert_eq!(found.as_deref(), Some("https://host/FeatureServer"));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_direct_link_when_no_input_matches() {
        let page = FakePage::new();
        let document = document_with_panel(vec![input_widget("CSV", "https://host/download.csv")]);
        let link = FakeNode::new();
        link.set_attr("href", "/arcgis/rest/services/Dams/FeatureServer");
        document.add_child("a[data-test-id=\"item-api-link\"]", link);
        page.install(DETAILS_URL, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert_eq!(
            found.as_deref(),
            Some("https://portal.test/arcgis/rest/services/Dams/FeatureServer")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_panel_and_missing_link_is_not_found() {
        let page = FakePage::new();
        page.install(DETAILS_URL, FakeNode::new());

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert!(found.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn explore_redirect_opens_side_panel_before_extracting() {
        let page = FakePage::new();
        let explore_url = "https://portal.test/maps/dams/explore";
        page.redirect(DETAILS_URL, explore_url);

        let document = document_with_panel(vec![input_widget(
            "GeoJSON",
            "https://host/FeatureServer",
        )]);
        let toggle = FakeNode::new();
        document.add_child("button.info", toggle.clone());
        let details = FakeNode::new();
        document.add_child("a.full-details", details.clone());
        page.install(explore_url, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert_eq!(found.as_deref(), Some("https://host/FeatureServer"));
        assert_eq!(toggle.clicks(), 1);
        assert_eq!(details.clicks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn active_toggle_is_not_clicked_again() {
        let page = FakePage::new();
        let explore_url = "https://portal.test/maps/dams/explore";
        page.redirect(DETAILS_URL, explore_url);

        let document = document_with_panel(vec![input_widget(
            "GeoJSON",
            "https://host/FeatureServer",
        )]);
        let toggle = FakeNode::new();
        toggle.set_attr("active", "");
        document.add_child("button.info", toggle.clone());
        document.add_child("a.full-details", FakeNode::new());
        page.install(explore_url, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert!(found.is_some());
        assert_eq!(toggle.clicks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_explore_locators_abort_even_with_fallback_present() {
        let page = FakePage::new();
        let explore_url = "https://portal.test/maps/dams/explore";
        page.redirect(DETAILS_URL, explore_url);

        // No info toggle in the document, but a fallback link exists. The
        // redirect sub-state is critical: extraction must abort anyway.
        let document = FakeNode::new();
        let link = FakeNode::new();
        link.set_attr("href", "https://host/FeatureServer");
        document.add_child("a[data-test-id=\"item-api-link\"]", link);
        page.install(explore_url, document);

        let found = extract_api_url(&page, DETAILS_URL, &locators()).await;
        assert!(found.is_none());
    }
}
