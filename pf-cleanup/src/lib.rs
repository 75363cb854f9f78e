//! Cleanup Jobs (C11, §4.11): two independent periodic sweepers, one for
//! expired sessions and one for expired import jobs. Each owns its own
//! ticker and idempotent sweep function; they never coordinate (§9).

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use pf_cache::KeyValueCache;
use pf_errors::Error;
use pf_importqueue::ImportJobQueue;
use pf_session::DurableSessionRepository;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

fn session_token_key(session_id: pf_primitives::SessionId) -> String {
    format!("session:{session_id}")
}

/// Scans durable sessions past `expires_at`, evicts them from the cache,
/// then deletes the durable row. Continues past per-item errors (§4.11).
pub struct SessionSweeper {
    durable: Arc<dyn DurableSessionRepository>,
    cache: Arc<dyn KeyValueCache>,
}

impl SessionSweeper {
    pub fn new(durable: Arc<dyn DurableSessionRepository>, cache: Arc<dyn KeyValueCache>) -> Self {
        Self { durable, cache }
    }

    /// One idempotent pass. Returns the number of sessions removed.
    pub async fn sweep_once(&self) -> u64 {
        let expired = match self.durable.find_expired(Utc::now()).await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(target: "pf::cleanup", error = %e, "session sweeper failed to list expired sessions");
                return 0;
            }
        };

        let mut removed = 0;
        for session in expired {
            if let Err(e) = self.cache.delete(&session_token_key(session.session_id)).await {
                error!(target: "pf::cleanup", session_id = %session.session_id, error = %e, "session sweeper cache eviction failed");
            }
            match self.durable.delete(session.session_id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(target: "pf::cleanup", session_id = %session.session_id, error = %e, "session sweeper failed to delete durable row");
                }
            }
        }
        if removed > 0 {
            info!(target: "pf::cleanup", removed, "session sweeper pass complete");
        }
        removed
    }
}

/// Deletes job hash + user index + processing-set entries for any job
/// past `expires_at`, via the queue's own atomic cleanup operation.
pub struct JobSweeper {
    queue: Arc<dyn ImportJobQueue>,
}

impl JobSweeper {
    pub fn new(queue: Arc<dyn ImportJobQueue>) -> Self {
        Self { queue }
    }

    pub async fn sweep_once(&self) -> u64 {
        match self.queue.cleanup_expired_jobs(Utc::now()).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(target: "pf::cleanup", removed, "job sweeper pass complete");
                }
                removed
            }
            Err(e) => {
                error!(target: "pf::cleanup", error = %e, "job sweeper failed");
                0
            }
        }
    }
}

/// Runs a sweeper's `sweep_once` on startup and then at `interval`, until
/// `shutdown` flips to `true`.
fn spawn_ticker<F, Fut>(interval: Duration, mut shutdown: watch::Receiver<bool>, sweep: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = u64> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // `interval` fires immediately on its first tick, giving us the
        // "run on startup, then every interval" behaviour for free.
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Starts both sweepers as independent background tasks.
pub fn spawn(
    session_sweeper: Arc<SessionSweeper>,
    job_sweeper: Arc<JobSweeper>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_ticker(interval, shutdown.clone(), move || {
            let sweeper = session_sweeper.clone();
            async move { sweeper.sweep_once().await }
        }),
        spawn_ticker(interval, shutdown, move || {
            let sweeper = job_sweeper.clone();
            async move { sweeper.sweep_once().await }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_cache::InMemoryCache;
    use pf_importqueue::{InMemoryImportQueue, NewImportJob};
    use pf_primitives::{ImportJobId, UserId, WalletId};
    use pf_session::{InMemorySessionRepository, NewSession};

    #[tokio::test]
    async fn session_sweeper_removes_expired_and_keeps_live() {
        let store: Arc<dyn DurableSessionRepository> = Arc::new(InMemorySessionRepository::new());
        let cache: Arc<dyn KeyValueCache> = Arc::new(InMemoryCache::new());
        let sweeper = SessionSweeper::new(store.clone(), cache);

        let user_id = UserId::new();
        let expired = store
            .insert(NewSession {
                session_id: pf_primitives::SessionId::new(),
                user_id,
                token: "expired-tok".into(),
                device_name: "old phone".into(),
                device_type: "mobile".into(),
                ip_address: None,
                user_agent: None,
                expires_at: Utc::now() - chrono::Duration::hours(1),
            })
            .await
            .unwrap();
        let live = store
            .insert(NewSession {
                session_id: pf_primitives::SessionId::new(),
                user_id,
                token: "live-tok".into(),
                device_name: "new phone".into(),
                device_type: "mobile".into(),
                ip_address: None,
                user_agent: None,
                expires_at: Utc::now() + chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let removed = sweeper.sweep_once().await;
        assert_eq!(removed, 1);
        assert!(store.find_by_id(expired.session_id).await.unwrap().is_none());
        assert!(store.find_by_id(live.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn session_sweep_is_idempotent() {
        let store: Arc<dyn DurableSessionRepository> = Arc::new(InMemorySessionRepository::new());
        let cache: Arc<dyn KeyValueCache> = Arc::new(InMemoryCache::new());
        let sweeper = SessionSweeper::new(store, cache);

        assert_eq!(sweeper.sweep_once().await, 0);
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn job_sweeper_removes_expired_jobs() {
        let queue: Arc<dyn ImportJobQueue> = Arc::new(InMemoryImportQueue::new());
        let sweeper = JobSweeper::new(queue.clone());

        queue
            .enqueue(NewImportJob {
                job_id: ImportJobId::new(),
                user_id: UserId::new(),
                file_id: "f1".into(),
                wallet_id: WalletId::new(),
                request: serde_json::Value::Null,
                total_count: 1,
                expires_at: Utc::now() - chrono::Duration::hours(1),
            })
            .await
            .unwrap();

        let removed = sweeper.sweep_once().await;
        assert_eq!(removed, 1);
    }
}
