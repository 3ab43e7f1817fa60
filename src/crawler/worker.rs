use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::{pad_results, BackendFactory, SearchBackend};
use crate::config::CrawlerConfig;
use crate::crawler::backoff::{with_jitter, Backoff};
use crate::crawler::session::{CrawlSession, SharedResults};
use crate::error::{Recovery, SearchFault};
use crate::relevance::RelevanceCheck;
use crate::storage::RecordStore;

/// Collaborators shared by every worker the manager spawns.
#[derive(Clone)]
pub struct CrawlDeps {
    pub factory: Arc<dyn BackendFactory>,
    pub store: Arc<dyn RecordStore>,
    pub relevance: Arc<dyn RelevanceCheck>,
}

enum PassOutcome {
    Completed,
    Interrupted,
    Cancelled,
}

pub(crate) struct CrawlWorker {
    session_id: Uuid,
    keywords: Vec<String>,
    session: Arc<Mutex<CrawlSession>>,
    results: SharedResults,
    cancel: CancellationToken,
    deps: CrawlDeps,
    settings: CrawlerConfig,
    backoff: Backoff,
    backend: Option<Box<dyn SearchBackend>>,
}

impl CrawlWorker {
    pub(crate) fn new(
        session_id: Uuid,
        keywords: Vec<String>,
        session: Arc<Mutex<CrawlSession>>,
        results: SharedResults,
        cancel: CancellationToken,
        deps: CrawlDeps,
        settings: CrawlerConfig,
    ) -> Self {
        let backoff = Backoff::new(settings.backoff_base, settings.backoff_cap);
        Self {
            session_id,
            keywords,
            session,
            results,
            cancel,
            deps,
            settings,
            backoff,
            backend: None,
        }
    }

    /// Runs until cancelled. Always releases the backend and clears the
    /// running flag of its own session on the way out, even after a panic.
    pub(crate) async fn run(mut self) {
        info!(
            "Crawl worker for session {} started with {} keywords",
            self.session_id,
            self.keywords.len()
        );

        if AssertUnwindSafe(self.crawl()).catch_unwind().await.is_err() {
            error!("Crawl worker for session {} panicked", self.session_id);
        }

        self.release_backend().await;

        let mut session = self.session.lock().await;
        if session.owned_by(self.session_id) {
            session.running = false;
        }
        info!("Crawl worker for session {} stopped", self.session_id);
    }

    async fn crawl(&mut self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            if self.backend.is_none() && !self.acquire_backend().await {
                return;
            }
            if self.backend.is_none() {
                continue;
            }

            match self.run_pass().await {
                PassOutcome::Cancelled => return,
                PassOutcome::Interrupted => {}
                PassOutcome::Completed => {
                    if !self.pause(self.settings.pass_delay).await {
                        return;
                    }
                }
            }
        }
    }

    /// One acquisition attempt. Returns false only if cancelled while backing off.
    async fn acquire_backend(&mut self) -> bool {
        match self.deps.factory.acquire().await {
            Ok(backend) => {
                self.backend = Some(backend);
                self.backoff.reset();
                self.publish_backoff().await;
                debug!("Session {} acquired a search backend", self.session_id);
                true
            }
            Err(e) => {
                let delay = self.backoff.escalate();
                self.publish_backoff().await;
                warn!(
                    "Failed to acquire search backend for session {}: {} (retrying in {:?})",
                    self.session_id, e, delay
                );
                self.pause(with_jitter(delay, self.settings.jitter)).await
            }
        }
    }

    async fn run_pass(&mut self) -> PassOutcome {
        let keywords = self.keywords.clone();

        for keyword in &keywords {
            if self.cancel.is_cancelled() {
                return PassOutcome::Cancelled;
            }

            self.touch_progress().await;
            let outcome = match self.backend.as_mut() {
                Some(backend) => backend.search_and_extract(keyword).await,
                None => return PassOutcome::Interrupted,
            };
            self.touch_progress().await;

            match outcome {
                Ok(texts) => {
                    self.record_results(keyword, texts).await;
                    if !self.pause(self.settings.keyword_delay).await {
                        return PassOutcome::Cancelled;
                    }
                }
                Err(fault) => {
                    if let Some(outcome) = self.handle_fault(keyword, fault).await {
                        return outcome;
                    }
                }
            }
        }

        PassOutcome::Completed
    }

    /// `None` means move on to the next keyword of the pass.
    async fn handle_fault(&mut self, keyword: &str, fault: SearchFault) -> Option<PassOutcome> {
        let delay = match fault.recovery() {
            Recovery::SkipKeyword => {
                info!("No results for '{}': {}", keyword, fault);
                return if self.pause(self.settings.not_found_delay).await {
                    None
                } else {
                    Some(PassOutcome::Cancelled)
                };
            }
            Recovery::DiscardAndRetry => {
                warn!("{} fault on '{}', discarding backend: {}", fault.kind(), keyword, fault);
                with_jitter(self.settings.fault_delay, self.settings.jitter)
            }
            Recovery::DiscardAndBackoff => {
                let delay = self.backoff.escalate();
                self.publish_backoff().await;
                warn!(
                    "{} fault on '{}', discarding backend and backing off {:?}: {}",
                    fault.kind(),
                    keyword,
                    delay,
                    fault
                );
                with_jitter(delay, self.settings.jitter)
            }
        };

        self.release_backend().await;
        if self.pause(delay).await {
            Some(PassOutcome::Interrupted)
        } else {
            Some(PassOutcome::Cancelled)
        }
    }

    async fn record_results(&self, keyword: &str, texts: Vec<String>) {
        let texts = pad_results(texts, self.settings.results_per_keyword);
        if texts.iter().all(|text| text.is_empty()) {
            debug!("Only blank results for '{}'", keyword);
            return;
        }

        self.results.write().await.insert(keyword.to_string(), texts.clone());
        debug!("Stored {} results for '{}'", texts.iter().filter(|t| !t.is_empty()).count(), keyword);

        if !self.deps.store.is_enabled() {
            return;
        }

        for text in texts.iter().filter(|text| !text.is_empty()) {
            let relevant = self.deps.relevance.check_relevance(text).await;
            if !self.deps.store.upsert_record(keyword, text, relevant).await {
                debug!("Record for '{}' was not persisted", keyword);
            }
        }
    }

    async fn release_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.close().await {
                debug!("Ignoring backend close error for session {}: {}", self.session_id, e);
            }
        }
    }

    /// Sleeps unless cancelled first. Returns false when cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn touch_progress(&self) {
        let mut session = self.session.lock().await;
        if session.owned_by(self.session_id) {
            session.last_progress = Some(Instant::now());
        }
    }

    async fn publish_backoff(&self) {
        let mut session = self.session.lock().await;
        if session.owned_by(self.session_id) {
            session.backoff = self.backoff.current();
        }
    }
}
