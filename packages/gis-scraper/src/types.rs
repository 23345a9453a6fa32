use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How to find one element: an ordered chain of intermediate host selectors
/// ("path"), each entered through its isolated shadow tree, plus one terminal
/// selector ("query"). An empty path applies the terminal selector to the
/// starting element's own shadow tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locator {
    #[serde(default)]
    pub path: Vec<String>,
    pub query: String,
}

impl Locator {
    pub fn new(path: Vec<String>, query: impl Into<String>) -> Self {
        Self {
            path,
            query: query.into(),
        }
    }

    /// Terminal-only locator with no intermediate hosts.
    pub fn query(query: impl Into<String>) -> Self {
        Self::new(Vec::new(), query)
    }

    /// Same path, different terminal selector.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self::new(self.path.clone(), query)
    }
}

/// Locator bag for the search-results stage, keyed by role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLocators {
    pub catalog_container: Locator,
    /// Terminal selector is a template; `{search_term}` is substituted before
    /// resolution.
    pub gallery_card: Locator,
    pub more_results_button: Locator,
    pub results_count: Locator,
    pub card_url: Locator,
    pub details_page: DetailsLocators,
}

/// Locator bag for the dataset details page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsLocators {
    pub info_button: Locator,
    pub details_link: Locator,
    pub api_resources_button: Locator,
    pub api_container: Locator,
    pub api_input: Locator,
    /// A candidate input counts as a hit when its value contains this token.
    pub api_input_value_match: String,
    /// Document-level selector for the direct data-source link fallback.
    pub fallback_api_selector: String,
}

/// One dataset to scrape: per-dataset configuration plus the mutable result
/// fields written back after a successful run.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: String,
    pub search_term: String,
    pub origin_url: String,
    pub locators: SearchLocators,
    pub append_geojson_query: bool,
    pub scraped_url: Option<String>,
    pub imported: bool,
}

/// The (rangeStart, rangeEnd, total) triple parsed from a pagination status
/// string like `"1 - 12 of 26"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCount {
    pub start: u32,
    pub end: u32,
    pub total: u32,
}

fn count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)\s*-\s*(\d+)\s*of\s*(\d+)").expect("count pattern is valid")
    })
}

impl ResultCount {
    /// Parse the triple out of a status string. Returns `None` when the text
    /// does not match, which callers treat as "already fully loaded".
    pub fn parse(text: &str) -> Option<Self> {
        let caps = count_pattern().captures(text)?;
        Some(Self {
            start: caps[1].parse().ok()?,
            end: caps[2].parse().ok()?,
            total: caps[3].parse().ok()?,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }

    /// Number of additional load-more activations required to bring every
    /// result into the document: `ceil(total / page_size) - 1`.
    pub fn clicks_needed(&self) -> u32 {
        let size = self.page_size();
        if size == 0 || self.total == 0 {
            return 0;
        }
        self.total.div_ceil(size).saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_count_with_loose_whitespace() {
        let count = ResultCount::parse("Showing 1 - 12 of 26 results").unwrap();
        assert_eq!(
            count,
            ResultCount {
                start: 1,
                end: 12,
                total: 26
            }
        );
        assert_eq!(ResultCount::parse("3-4 of 9"), Some(ResultCount {
            start: 3,
            end: 4,
            total: 9
        }));
    }

    #[test]
    fn rejects_non_matching_text() {
        assert_eq!(ResultCount::parse("Loading results"), None);
        assert_eq!(ResultCount::parse("12 of"), None);
        assert_eq!(ResultCount::parse(""), None);
    }

    #[test]
    fn derives_page_size_and_click_budget() {
        let count = ResultCount::parse("1 - 12 of 26").unwrap();
        assert_eq!(count.page_size(), 12);
        // ceil(26 / 12) - 1: two more loads bring in results 13-24 and 25-26.
        assert_eq!(count.clicks_needed(), 2);
    }

    #[test]
    fn fully_loaded_set_needs_no_clicks() {
        let count = ResultCount::parse("1 - 26 of 26").unwrap();
        assert_eq!(count.clicks_needed(), 0);
    }

    #[test]
    fn exact_page_multiple() {
        let count = ResultCount::parse("1 - 12 of 24").unwrap();
        assert_eq!(count.clicks_needed(), 1);
    }

    #[test]
    fn locator_query_substitution() {
        let template = Locator::new(
            vec!["arcgis-hub-gallery".into()],
            "arcgis-hub-entity-card[data-test=\"{search_term}\"]",
        );
        let resolved = template.with_query(template.query.replace("{search_term}", "Dams"));
        assert_eq!(resolved.path, template.path);
        assert_eq!(resolved.query, "arcgis-hub-entity-card[data-test=\"Dams\"]");
    }
}
