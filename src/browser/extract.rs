use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::ScrapingError;

/// Pulls tweet texts out of a rendered search results page.
pub struct TweetExtractor {
    text_selector: Selector,
    fallback_selector: Selector,
}

impl TweetExtractor {
    pub fn new(text_selector: &str, fallback_selector: &str) -> Result<Self, ScrapingError> {
        Ok(Self {
            text_selector: Selector::parse(text_selector)
                .map_err(|e| ScrapingError::BrowserError(format!("Invalid text selector '{}': {}", text_selector, e)))?,
            fallback_selector: Selector::parse(fallback_selector)
                .map_err(|e| ScrapingError::BrowserError(format!("Invalid fallback selector '{}': {}", fallback_selector, e)))?,
        })
    }

    /// First `limit` non-blank texts, trying the primary selector before the fallback.
    pub fn extract(&self, html: &str, limit: usize) -> Vec<String> {
        let document = Html::parse_document(html);

        let primary = Self::collect(&document, &self.text_selector, limit);
        debug!("Primary selector found {} texts", primary.len());
        if !primary.is_empty() {
            return primary;
        }

        let fallback = Self::collect(&document, &self.fallback_selector, limit);
        debug!("Fallback selector found {} texts", fallback.len());
        fallback
    }

    fn collect(document: &Html, selector: &Selector, limit: usize) -> Vec<String> {
        document
            .select(selector)
            .map(Self::own_text)
            .filter(|text| !text.is_empty())
            .take(limit)
            .collect()
    }

    // direct text children only, nested links and mentions are skipped
    fn own_text(element: ElementRef) -> String {
        let text: String = element
            .children()
            .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
            .collect();
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
