use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapingError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub keywords: KeywordConfig,
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    pub classifier: ClassifierConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeywordConfig {
    pub defaults: Vec<String>,
    pub defaults_file: Option<PathBuf>,
    pub max_count: usize,
    pub max_length: usize,
}

/// Timing and backoff knobs for the worker loop and the supervisor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub supervisor_tick: Duration,
    #[serde(with = "humantime_serde")]
    pub stop_join_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub keyword_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub not_found_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub pass_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub fault_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
    pub results_per_keyword: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub search_url: String,
    pub headless: bool,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    pub randomize_user_agents: bool,
    pub text_selector: String,
    pub fallback_selector: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    pub url: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            stall_timeout: Duration::from_secs(180),
            supervisor_tick: Duration::from_secs(10),
            stop_join_timeout: Duration::from_secs(5),
            keyword_delay: Duration::from_millis(500),
            not_found_delay: Duration::from_millis(300),
            pass_delay: Duration::from_secs(1),
            fault_delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
            results_per_keyword: 5,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            search_url: "https://xcancel.com/search".to_string(),
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            randomize_user_agents: true,
            text_selector: "div.timeline-item div.tweet-content.media-body".to_string(),
            fallback_selector: "span".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: KeywordConfig {
                defaults: vec![],
                defaults_file: Some(PathBuf::from("data/keywords.json")),
                max_count: 50,
                max_length: 64,
            },
            crawler: CrawlerConfig::default(),
            browser: BrowserConfig::default(),
            storage: StorageConfig {
                enabled: true,
                directory: PathBuf::from("./scraped_data"),
                file_name: "tweets.jsonl".to_string(),
            },
            classifier: ClassifierConfig {
                url: "http://localhost:8000".to_string(),
                timeout: Duration::from_secs(10),
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                api_token: None,
            },
        }
    }
}

impl Config {
    /// Apply `CLASSIFIER_URL` and `PORT` from the environment on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::var("CLASSIFIER_URL").ok(), std::env::var("PORT").ok());
    }

    fn apply_overrides(&mut self, classifier_url: Option<String>, port: Option<String>) {
        if let Some(url) = classifier_url.filter(|u| !u.trim().is_empty()) {
            info!("Using classifier URL from environment: {}", url);
            self.classifier.url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(port) = port {
            match port.trim().parse::<u16>() {
                Ok(port) => self.api.port = port,
                Err(e) => warn!("Ignoring invalid PORT '{}': {}", port, e),
            }
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // create a default config on first run
        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // keyword limits
        if config.keywords.max_count == 0 {
            return Err(ScrapingError::ConfigError("keywords.max_count must be greater than 0".to_string()).into());
        }
        if config.keywords.max_length == 0 {
            return Err(ScrapingError::ConfigError("keywords.max_length must be greater than 0".to_string()).into());
        }

        // backoff policy
        let crawler = &config.crawler;
        if crawler.backoff_base.is_zero() {
            return Err(ScrapingError::ConfigError("backoff_base must be greater than 0".to_string()).into());
        }
        if crawler.backoff_base > crawler.backoff_cap {
            return Err(ScrapingError::ConfigError("backoff_base cannot exceed backoff_cap".to_string()).into());
        }
        if crawler.backoff_cap > Duration::from_secs(3600) {
            return Err(ScrapingError::ConfigError("backoff_cap cannot exceed 1 hour".to_string()).into());
        }

        // supervisor must tick faster than the stall threshold or stalls go unnoticed
        if crawler.supervisor_tick.is_zero() {
            return Err(ScrapingError::ConfigError("supervisor_tick must be greater than 0".to_string()).into());
        }
        if crawler.stall_timeout <= crawler.supervisor_tick {
            return Err(ScrapingError::ConfigError("stall_timeout must be longer than supervisor_tick".to_string()).into());
        }
        if crawler.results_per_keyword == 0 || crawler.results_per_keyword > 20 {
            return Err(ScrapingError::ConfigError("results_per_keyword must be between 1 and 20".to_string()).into());
        }

        if !config.browser.search_url.starts_with("http://") && !config.browser.search_url.starts_with("https://") {
            return Err(ScrapingError::ConfigError("browser.search_url must start with http:// or https://".to_string()).into());
        }
        if config.browser.text_selector.trim().is_empty() {
            return Err(ScrapingError::ConfigError("browser.text_selector cannot be empty".to_string()).into());
        }

        if config.storage.enabled && config.storage.file_name.trim().is_empty() {
            return Err(ScrapingError::ConfigError("storage.file_name cannot be empty".to_string()).into());
        }

        if !config.classifier.url.starts_with("http://") && !config.classifier.url.starts_with("https://") {
            return Err(ScrapingError::ConfigError("classifier.url must start with http:// or https://".to_string()).into());
        }

        if config.api.port < 1024 {
            return Err(ScrapingError::ConfigError("api.port must be between 1024 and 65535".to_string()).into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    async fn create_default_config(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ScrapingError::ConfigError(format!("Failed to create config directory: {}", e)))?;
            }
        }

        self.save_config(&Config::default()).await?;
        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}
