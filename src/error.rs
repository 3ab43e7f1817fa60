use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Error, Debug)]
pub enum ScrapingError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Classification error: {0}")]
    ClassificationError(String),

    #[error("Browser init error: {0}")]
    InitError(String),
}

/// Failures surfaced to callers of the session control surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Scraping already running")]
    AlreadyRunning,

    #[error("Scraping is not running")]
    NotRunning,

    #[error("No keywords to restart")]
    NoKeywords,
}

/// Closed set of faults a search backend can report for a single keyword.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchFault {
    #[error("no results located: {0}")]
    NotFound(String),

    #[error("navigation fault: {0}")]
    Navigation(String),

    #[error("transport fault: {0}")]
    Transport(String),

    #[error("unexpected fault: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Log, wait briefly, move on to the next keyword.
    SkipKeyword,
    /// Discard the backend and re-acquire after a short randomized delay.
    DiscardAndRetry,
    /// Discard the backend and wait out the escalating backoff.
    DiscardAndBackoff,
}

impl SearchFault {
    pub fn recovery(&self) -> Recovery {
        match self {
            SearchFault::NotFound(_) => Recovery::SkipKeyword,
            SearchFault::Navigation(_) => Recovery::DiscardAndRetry,
            SearchFault::Transport(_) => Recovery::DiscardAndBackoff,
            SearchFault::Unexpected(_) => Recovery::DiscardAndRetry,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SearchFault::NotFound(_) => "not_found",
            SearchFault::Navigation(_) => "navigation",
            SearchFault::Transport(_) => "transport",
            SearchFault::Unexpected(_) => "unexpected",
        }
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for ScrapingError {
    fn from(err: std::io::Error) -> Self {
        ScrapingError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapingError {
    fn from(err: serde_json::Error) -> Self {
        ScrapingError::StorageError(err.to_string())
    }
}

impl From<toml::de::Error> for ScrapingError {
    fn from(err: toml::de::Error) -> Self {
        ScrapingError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for ScrapingError {
    fn from(err: reqwest::Error) -> Self {
        ScrapingError::NetworkError(err.to_string())
    }
}
