pub mod chromium;
pub mod extract;
pub mod stealth;


use async_trait::async_trait;

use crate::error::{Result, SearchFault};

pub use chromium::{ChromiumBackend, ChromiumFactory};
pub use extract::TweetExtractor;
pub use stealth::{UserAgentGenerator, ViewportSize};

/// A live automation handle that can search one keyword at a time.
///
/// A backend that reported a navigation or transport fault is considered
/// poisoned and is closed by the worker before a fresh one is acquired.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Returns up to the configured number of texts for `keyword`.
    async fn search_and_extract(&mut self, keyword: &str) -> std::result::Result<Vec<String>, SearchFault>;

    async fn close(&mut self) -> Result<()>;
}

/// Builds fresh backends; one call per (re)acquisition.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn SearchBackend>>;
}

/// Truncate to `count` entries and blank-pad up to exactly `count`.
pub fn pad_results(mut texts: Vec<String>, count: usize) -> Vec<String> {
    texts.truncate(count);
    for text in texts.iter_mut() {
        let trimmed = text.trim();
        if trimmed.len() != text.len() {
            *text = trimmed.to_string();
        }
    }
    texts.resize(count, String::new());
    texts
}
