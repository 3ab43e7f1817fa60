use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::crawler::manager::CrawlManager;
use crate::crawler::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Stalled,
    WorkerDead,
}

/// Decide whether a running session needs a restart.
pub fn assess(status: &SessionStatus, stall_timeout: Duration) -> Option<RestartReason> {
    if !status.running {
        return None;
    }

    let stalled = status
        .progress_age_seconds
        .map_or(false, |age| age > stall_timeout.as_secs_f64());
    if stalled {
        Some(RestartReason::Stalled)
    } else if !status.worker_alive {
        Some(RestartReason::WorkerDead)
    } else {
        None
    }
}

/// One watchdog tick. Returns the reason if a restart was attempted.
pub async fn supervise_once(manager: &Arc<CrawlManager>, stall_timeout: Duration) -> Option<RestartReason> {
    let status = manager.status().await;
    let reason = assess(&status, stall_timeout)?;
    let session_id = status.session_id?;

    match reason {
        RestartReason::Stalled => warn!(
            "Session {} made no progress for {:.0}s, restarting",
            session_id,
            status.progress_age_seconds.unwrap_or_default()
        ),
        RestartReason::WorkerDead => warn!("Worker for session {} is gone, restarting", session_id),
    }

    match manager.restart_session(session_id).await {
        Ok(Some(keywords)) => info!("Supervisor restarted crawl with {} keywords", keywords.len()),
        Ok(None) => debug!("Session {} changed before the supervisor could restart it", session_id),
        Err(e) => error!("Supervisor restart of session {} failed: {}", session_id, e),
    }
    Some(reason)
}

/// Spawn the watchdog. It holds only a weak reference and exits once the
/// manager is dropped.
pub(crate) fn spawn(manager: Weak<CrawlManager>, tick: Duration, stall_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Supervisor started (tick {:?}, stall threshold {:?})", tick, stall_timeout);
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                debug!("Crawl manager dropped, supervisor exiting");
                break;
            };
            supervise_once(&manager, stall_timeout).await;
        }
    })
}
