use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::extract::TweetExtractor;
use crate::browser::stealth::{UserAgentGenerator, ViewportSize};
use crate::browser::{BackendFactory, SearchBackend};
use crate::config::BrowserConfig;
use crate::error::{Result, ScrapingError, SearchFault};

/// Launches a dedicated headless Chromium per acquisition.
pub struct ChromiumFactory {
    config: BrowserConfig,
    results_per_keyword: usize,
    user_agents: UserAgentGenerator,
}

impl ChromiumFactory {
    pub fn new(config: BrowserConfig, results_per_keyword: usize) -> Result<Self> {
        // fail early on bad selectors instead of on every acquisition
        TweetExtractor::new(&config.text_selector, &config.fallback_selector)?;

        Ok(Self {
            config,
            results_per_keyword,
            user_agents: UserAgentGenerator::new(),
        })
    }
}

#[async_trait]
impl BackendFactory for ChromiumFactory {
    async fn acquire(&self) -> Result<Box<dyn SearchBackend>> {
        let (user_agent, viewport) = if self.config.randomize_user_agents {
            (self.user_agents.random_user_agent().to_string(), ViewportSize::random())
        } else {
            (self.user_agents.default_user_agent().to_string(), ViewportSize::desktop())
        };

        let backend = ChromiumBackend::launch(&self.config, self.results_per_keyword, user_agent, viewport).await?;
        Ok(Box::new(backend))
    }
}

pub struct ChromiumBackend {
    id: Uuid,
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
    extractor: TweetExtractor,
    search_url: String,
    navigation_timeout: Duration,
    settle_delay: Duration,
    results_per_keyword: usize,
}

impl ChromiumBackend {
    async fn launch(
        config: &BrowserConfig,
        results_per_keyword: usize,
        user_agent: String,
        viewport: ViewportSize,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let extractor = TweetExtractor::new(&config.text_selector, &config.fallback_selector)?;

        // unique profile dir per instance to avoid singleton lock issues
        let user_data_dir = std::env::temp_dir().join(format!("keyword-crawler-{}-{}", std::process::id(), id));
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .map_err(|e| ScrapingError::InitError(format!("Failed to create profile dir: {}", e)))?;

        let mut builder = CdpBrowserConfig::builder()
            .no_sandbox()
            .window_size(viewport.width, viewport.height)
            .args(vec![
                format!("--user-data-dir={}", user_data_dir.display()),
                format!("--user-agent={}", user_agent),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-extensions".to_string(),
                "--mute-audio".to_string(),
                "--no-first-run".to_string(),
                "--disable-default-apps".to_string(),
                "--disable-sync".to_string(),
                "--disable-background-networking".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
                "--log-level=3".to_string(),
            ]);
        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScrapingError::InitError(format!("Failed to create browser config: {}", e)))?;

        info!("Launching browser instance {}", id);
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapingError::InitError(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // websocket decode noise from newer chrome builds
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant") || error_msg.contains("untagged enum Message") {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let mut backend = Self {
            id,
            browser,
            page: None,
            handler_task,
            user_data_dir,
            extractor,
            search_url: config.search_url.clone(),
            navigation_timeout: config.navigation_timeout,
            settle_delay: config.settle_delay,
            results_per_keyword,
        };

        match backend.open_page(&user_agent, viewport).await {
            Ok(page) => {
                backend.page = Some(page);
                info!("Browser instance {} ready", id);
                Ok(backend)
            }
            Err(e) => {
                if let Err(close_err) = backend.close().await {
                    debug!("Cleanup after failed launch: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn open_page(&self, user_agent: &str, viewport: ViewportSize) -> Result<Page> {
        let page = match tokio::time::timeout(Duration::from_secs(10), self.browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(ScrapingError::InitError(format!("Failed to create new page: {}", e)).into()),
            Err(_) => return Err(ScrapingError::InitError("Timeout creating new page".to_string()).into()),
        };

        let device_metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| ScrapingError::InitError(format!("Failed to build device metrics: {}", e)))?;
        page.execute(device_metrics)
            .await
            .map_err(|e| ScrapingError::InitError(format!("Failed to set viewport: {}", e)))?;

        let user_agent_params = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ScrapingError::InitError(format!("Failed to build user agent params: {}", e)))?;
        page.execute(user_agent_params)
            .await
            .map_err(|e| ScrapingError::InitError(format!("Failed to set user agent: {}", e)))?;

        Ok(page)
    }

}

#[async_trait]
impl SearchBackend for ChromiumBackend {
    async fn search_and_extract(&mut self, keyword: &str) -> std::result::Result<Vec<String>, SearchFault> {
        let url = build_search_url(&self.search_url, keyword)?;
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| SearchFault::Navigation(format!("browser instance {} has no open page", self.id)))?;

        debug!("Browser instance {} navigating to {}", self.id, url);
        match tokio::time::timeout(self.navigation_timeout, page.goto(url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(classify_cdp_error(e)),
            Err(_) => {
                return Err(SearchFault::Navigation(format!(
                    "navigation to {} timed out after {:?}",
                    url, self.navigation_timeout
                )))
            }
        }

        // results render after a client-side wait screen
        tokio::time::sleep(self.settle_delay).await;

        let html = page.content().await.map_err(classify_cdp_error)?;
        let texts = self.extractor.extract(&html, self.results_per_keyword);
        if texts.is_empty() {
            return Err(SearchFault::NotFound(format!("no tweet elements for '{}'", keyword)));
        }

        Ok(texts)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page of browser instance {}: {}", self.id, e);
            }
        }

        let result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            debug!("Failed to remove profile dir {}: {}", self.user_data_dir.display(), e);
        }

        result.map_err(|e| ScrapingError::BrowserError(format!("Failed to close browser instance {}: {}", self.id, e)))?;
        info!("Closed browser instance {}", self.id);
        Ok(())
    }
}

/// Latest-tweets search URL for `keyword` with the query percent-encoded.
pub(crate) fn build_search_url(base: &str, keyword: &str) -> std::result::Result<String, SearchFault> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| SearchFault::Unexpected(format!("invalid search url {}: {}", base, e)))?;
    url.query_pairs_mut().append_pair("f", "tweets").append_pair("q", keyword);
    Ok(url.to_string())
}

/// Single place where automation errors become fault kinds.
pub(crate) fn classify_cdp_error(err: CdpError) -> SearchFault {
    match err {
        CdpError::NotFound => SearchFault::NotFound(err.to_string()),
        CdpError::Timeout | CdpError::NoResponse | CdpError::FrameNotFound(_) => SearchFault::Navigation(err.to_string()),
        CdpError::Ws(_) | CdpError::Io(_) => SearchFault::Transport(err.to_string()),
        other => {
            let message = other.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("target closed") || lowered.contains("no such window") {
                SearchFault::Navigation(message)
            } else {
                SearchFault::Unexpected(message)
            }
        }
    }
}
