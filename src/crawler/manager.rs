use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::crawler::session::{CrawlSession, ResultMap, SessionStatus, SharedResults};
use crate::crawler::supervisor;
use crate::crawler::worker::{CrawlDeps, CrawlWorker};
use crate::error::ControlError;
use crate::storage::RecordStore;

/// Control surface for the single crawl session.
///
/// Start, stop and restart (from the API or the supervisor) all hold
/// `control_lock` for their whole duration, so a restart's stop-then-start
/// is never interleaved with another transition. Status only takes the
/// session mutex.
pub struct CrawlManager {
    session: Arc<Mutex<CrawlSession>>,
    control_lock: Mutex<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    deps: CrawlDeps,
    settings: CrawlerConfig,
    supervisor_restarts: AtomicU64,
}

impl CrawlManager {
    pub fn new(deps: CrawlDeps, settings: CrawlerConfig) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(CrawlSession::idle(settings.backoff_base))),
            control_lock: Mutex::new(()),
            supervisor: Mutex::new(None),
            deps,
            settings,
            supervisor_restarts: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.deps.store
    }

    /// Install a new session and spawn its worker. Echoes the keywords back.
    pub async fn start(self: &Arc<Self>, keywords: Vec<String>) -> Result<Vec<String>, ControlError> {
        let _guard = self.control_lock.lock().await;
        self.start_locked(keywords).await
    }

    async fn start_locked(self: &Arc<Self>, keywords: Vec<String>) -> Result<Vec<String>, ControlError> {
        if keywords.is_empty() {
            return Err(ControlError::NoKeywords);
        }

        let session_id = {
            let mut session = self.session.lock().await;
            if session.running {
                return Err(ControlError::AlreadyRunning);
            }

            let session_id = Uuid::new_v4();
            let cancel = CancellationToken::new();
            let results: SharedResults = Arc::new(RwLock::new(HashMap::new()));

            session.id = Some(session_id);
            session.keywords = keywords.clone();
            session.running = true;
            session.last_progress = None;
            session.backoff = self.settings.backoff_base;
            session.cancel = cancel.clone();
            session.results = results.clone();

            let worker = CrawlWorker::new(
                session_id,
                keywords.clone(),
                self.session.clone(),
                results,
                cancel,
                self.deps.clone(),
                self.settings.clone(),
            );
            session.worker = Some(tokio::spawn(worker.run()));
            session_id
        };

        self.ensure_supervisor().await;
        info!("Started crawl session {} with keywords {:?}", session_id, keywords);
        Ok(keywords)
    }

    /// Signal cancellation and wait a bounded time for the worker to exit.
    pub async fn stop(&self) -> Result<(), ControlError> {
        let _guard = self.control_lock.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> Result<(), ControlError> {
        let (session_id, handle) = {
            let mut session = self.session.lock().await;
            if !session.running {
                return Err(ControlError::NotRunning);
            }
            session.cancel.cancel();
            session.running = false;
            (session.id, session.worker.take())
        };

        info!("Stopping crawl session {:?}", session_id);
        if let Some(handle) = handle {
            match timeout(self.settings.stop_join_timeout, handle).await {
                Ok(Ok(())) => debug!("Worker for session {:?} joined", session_id),
                Ok(Err(e)) => warn!("Worker for session {:?} ended abnormally: {}", session_id, e),
                Err(_) => warn!(
                    "Worker for session {:?} did not exit within {:?}, detaching it",
                    session_id, self.settings.stop_join_timeout
                ),
            }
        }
        Ok(())
    }

    /// Stop then start as one transition. `None` or an empty list reuses
    /// the last session's keywords.
    pub async fn restart(self: &Arc<Self>, keywords: Option<Vec<String>>) -> Result<Vec<String>, ControlError> {
        let _guard = self.control_lock.lock().await;
        self.restart_locked(keywords).await
    }

    /// Supervisor path: restart only if `session_id` is still the active
    /// session, so a stop or restart that raced the check wins.
    pub(crate) async fn restart_session(self: &Arc<Self>, session_id: Uuid) -> Result<Option<Vec<String>>, ControlError> {
        let _guard = self.control_lock.lock().await;
        {
            let session = self.session.lock().await;
            if !session.running || !session.owned_by(session_id) {
                return Ok(None);
            }
        }

        let keywords = self.restart_locked(None).await?;
        self.supervisor_restarts.fetch_add(1, Ordering::Relaxed);
        Ok(Some(keywords))
    }

    async fn restart_locked(self: &Arc<Self>, keywords: Option<Vec<String>>) -> Result<Vec<String>, ControlError> {
        let keywords = match keywords.filter(|k| !k.is_empty()) {
            Some(keywords) => keywords,
            None => self.session.lock().await.keywords.clone(),
        };
        if keywords.is_empty() {
            return Err(ControlError::NoKeywords);
        }

        match self.stop_locked().await {
            Ok(()) | Err(ControlError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start_locked(keywords).await
    }

    pub async fn status(&self) -> SessionStatus {
        let session = self.session.lock().await;
        SessionStatus {
            running: session.running,
            worker_alive: session.worker_alive(),
            progress_age_seconds: session.progress_age().map(|age| age.as_secs_f64()),
            keywords: session.keywords.clone(),
            session_id: session.id,
            backoff_seconds: session.backoff.as_secs_f64(),
            supervisor_restarts: self.supervisor_restarts.load(Ordering::Relaxed),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.running
    }

    /// Copy of the current session's results; never the live map.
    pub async fn results(&self) -> ResultMap {
        let results = self.session.lock().await.results.clone();
        let snapshot = results.read().await.clone();
        snapshot
    }

    /// Kill the worker task without touching `running`, as a crash outside
    /// the worker's own guard would.
    #[cfg(test)]
    pub(crate) async fn abort_worker(&self) {
        if let Some(handle) = self.session.lock().await.worker.as_ref() {
            handle.abort();
        }
    }

    async fn ensure_supervisor(self: &Arc<Self>) {
        let mut slot = self.supervisor.lock().await;
        if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }
        *slot = Some(supervisor::spawn(
            Arc::downgrade(self),
            self.settings.supervisor_tick,
            self.settings.stall_timeout,
        ));
    }
}
