pub mod api;
pub mod browser;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod keywords;
pub mod relevance;
pub mod storage;

pub use config::Config;
pub use context::AppContext;
pub use crawler::CrawlManager;
pub use error::{ControlError, Result, ScrapingError, SearchFault};
