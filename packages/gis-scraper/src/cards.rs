//! Result-card lookup and link extraction within the loaded result set.

use anyhow::Result;
use url::Url;

use crate::dom::Element;
use crate::resolver::resolve;
use crate::types::Locator;

/// Placeholder token substituted with the dataset's search key in the
/// card locator's terminal selector template.
pub const SEARCH_TERM_TOKEN: &str = "{search_term}";

/// Point-in-time lookup of the result card matching `search_term`. Never
/// waits or paginates; the orchestrator decides when to retry.
pub async fn find_card(
    container: &dyn Element,
    locator: &Locator,
    search_term: &str,
) -> Result<Option<Box<dyn Element>>> {
    let card_locator = locator.with_query(locator.query.replace(SEARCH_TERM_TOKEN, search_term));
    resolve(container, &card_locator).await
}

/// Pull the navigable URL out of a located result card, absolutized against
/// the page the card lives on.
pub async fn card_link_url(
    card: &dyn Element,
    locator: &Locator,
    base: &Url,
) -> Result<Option<Url>> {
    let Some(link) = resolve(card, locator).await? else {
        return Ok(None);
    };
    let Some(href) = link.attribute("href").await? else {
        return Ok(None);
    };
    match base.join(&href) {
        Ok(url) => Ok(Some(url)),
        Err(error) => {
            tracing::warn!(href = %href, error = %error, "card link is not a usable URL");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, FakeNode};
    use std::sync::Arc;

    fn container_with_card(selector: &str) -> (Arc<FakeNode>, Arc<FakeNode>) {
        let container = FakeNode::new();
        let card = FakeNode::new();
        container.attach_shadow().add_child(selector, card.clone());
        (container, card)
    }

    #[tokio::test]
    async fn substitutes_search_term_into_template() {
        let (container, _card) = container_with_card("card[data-test=\"Dams\"]");
        let locator = Locator::query("card[data-test=\"{search_term}\"]");

        let found = find_card(&FakeElement(container), &locator, "Dams")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn missing_card_is_not_found_not_an_error() {
        let (container, _card) = container_with_card("card[data-test=\"Dams\"]");
        let locator = Locator::query("card[data-test=\"{search_term}\"]");

        let found = find_card(&FakeElement(container), &locator, "Wetlands")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn extracts_and_absolutizes_relative_href() {
        let card = FakeNode::new();
        let link = FakeNode::new();
        link.set_attr("href", "/maps/dams-inventory");
        card.attach_shadow().add_child("a.title", link);

        let base = Url::parse("https://portal.test/search?categories=water").unwrap();
        let url = card_link_url(&FakeElement(card), &Locator::query("a.title"), &base)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url.as_str(), "https://portal.test/maps/dams-inventory");
    }

    #[tokio::test]
    async fn absolute_href_passes_through() {
        let card = FakeNode::new();
        let link = FakeNode::new();
        link.set_attr("href", "https://elsewhere.test/maps/dams");
        card.attach_shadow().add_child("a.title", link);

        let base = Url::parse("https://portal.test/search").unwrap();
        let url = card_link_url(&FakeElement(card), &Locator::query("a.title"), &base)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url.as_str(), "https://elsewhere.test/maps/dams");
    }

    #[tokio::test]
    async fn link_without_href_is_not_found() {
        let card = FakeNode::new();
        card.attach_shadow().add_child("a.title", FakeNode::new());

        let base = Url::parse("https://portal.test/search").unwrap();
        let url = card_link_url(&FakeElement(card), &Locator::query("a.title"), &base)
            .await
            .unwrap();
        assert!(url.is_none());
    }
}
