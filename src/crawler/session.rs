use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// keyword -> last full extraction, blank-padded
pub type ResultMap = HashMap<String, Vec<String>>;
pub type SharedResults = Arc<RwLock<ResultMap>>;

/// The single session slot owned by the manager.
///
/// `id` changes on every start, so a worker that outlived its session can
/// tell that it no longer owns the slot and leaves it alone.
pub struct CrawlSession {
    pub id: Option<Uuid>,
    pub keywords: Vec<String>,
    pub running: bool,
    pub last_progress: Option<Instant>,
    pub backoff: Duration,
    pub(crate) cancel: CancellationToken,
    pub(crate) worker: Option<JoinHandle<()>>,
    pub(crate) results: SharedResults,
}

impl CrawlSession {
    pub fn idle(backoff: Duration) -> Self {
        Self {
            id: None,
            keywords: Vec::new(),
            running: false,
            last_progress: None,
            backoff,
            cancel: CancellationToken::new(),
            worker: None,
            results: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn owned_by(&self, session_id: Uuid) -> bool {
        self.id == Some(session_id)
    }

    pub fn worker_alive(&self) -> bool {
        self.worker.as_ref().map_or(false, |handle| !handle.is_finished())
    }

    pub fn progress_age(&self) -> Option<Duration> {
        self.last_progress.map(|at| at.elapsed())
    }
}

/// Point-in-time view returned by `CrawlManager::status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub worker_alive: bool,
    pub progress_age_seconds: Option<f64>,
    pub keywords: Vec<String>,
    pub session_id: Option<Uuid>,
    pub backoff_seconds: f64,
    pub supervisor_restarts: u64,
}
