use std::sync::Arc;

use crate::config::Config;
use crate::crawler::{CrawlDeps, CrawlManager};
use crate::keywords::{sanitize_keywords, KeywordLimits};
use crate::relevance::RelevanceCheck;
use crate::storage::RecordStore;

/// Everything the HTTP layer needs, built once at startup and shared by handlers.
pub struct AppContext {
    pub manager: Arc<CrawlManager>,
    pub store: Arc<dyn RecordStore>,
    pub relevance: Arc<dyn RelevanceCheck>,
    pub default_keywords: Vec<String>,
    pub limits: KeywordLimits,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(config: Arc<Config>, deps: CrawlDeps, default_keywords: Vec<String>) -> Arc<Self> {
        let limits = KeywordLimits {
            max_count: config.keywords.max_count,
            max_length: config.keywords.max_length,
        };
        let default_keywords = sanitize_keywords(default_keywords, limits);

        Arc::new(Self {
            manager: CrawlManager::new(deps.clone(), config.crawler.clone()),
            store: deps.store,
            relevance: deps.relevance,
            default_keywords,
            limits,
            config,
        })
    }
}
