use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use hazard_tweet_scraper::api::start_api_server;
use hazard_tweet_scraper::browser::ChromiumFactory;
use hazard_tweet_scraper::config::{ConfigManager, FileConfigManager};
use hazard_tweet_scraper::crawler::CrawlDeps;
use hazard_tweet_scraper::keywords::load_keywords_from_file;
use hazard_tweet_scraper::relevance::ClassifierClient;
use hazard_tweet_scraper::storage::{FileRecordStore, RecordStore};
use hazard_tweet_scraper::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("CRAWLER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let config_manager = FileConfigManager::new(config_path.clone());
    let mut config = config_manager
        .load_config()
        .await
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.apply_env_overrides();

    tracing::info!("Starting hazard tweet scraper");

    let mut default_keywords = config.keywords.defaults.clone();
    if let Some(path) = &config.keywords.defaults_file {
        default_keywords.extend(load_keywords_from_file(path));
    }

    let store: Arc<dyn RecordStore> = if config.storage.enabled {
        Arc::new(FileRecordStore::open(&config.storage.directory, &config.storage.file_name))
    } else {
        tracing::warn!("Record storage disabled by configuration");
        Arc::new(FileRecordStore::disabled())
    };

    let relevance = ClassifierClient::new(&config.classifier).map_err(|e| anyhow!(e))?;
    tracing::info!("Classifier endpoint: {}", relevance.endpoint());
    let factory =
        ChromiumFactory::new(config.browser.clone(), config.crawler.results_per_keyword).map_err(|e| anyhow!(e))?;

    let deps = CrawlDeps {
        factory: Arc::new(factory),
        store,
        relevance: Arc::new(relevance),
    };
    let ctx = AppContext::new(Arc::new(config), deps, default_keywords);
    tracing::info!("Loaded {} default keywords", ctx.default_keywords.len());

    start_api_server(ctx).await.map_err(|e| anyhow!(e))?;

    tracing::info!("Hazard tweet scraper stopped.");
    Ok(())
}
