//! Worker Pool (C7, §4.7): a fixed-size set of cooperating consumers
//! that dequeue import jobs and run them through the Import Executor
//! under a per-job deadline.

use std::{sync::Arc, time::Duration};

use pf_importer::{ExecuteImportRequest, ImportExecutor};
use pf_importqueue::{ImportJob, ImportJobQueue, JobStatus, JobUpdate};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

/// Tunables named in §4.7/§5: pool size, the per-job execution deadline,
/// how long a single blocking dequeue waits before looping, and the
/// fixed backoff after a non-queue error.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub per_job_deadline: Duration,
    pub dequeue_timeout: Duration,
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            per_job_deadline: Duration::from_secs(5 * 60),
            dequeue_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(2),
        }
    }
}

/// Fixed-size pool of structurally identical workers sharing one queue
/// (§9 design note: tasks + channels, no per-user affinity).
pub struct WorkerPool {
    queue: Arc<dyn ImportJobQueue>,
    executor: Arc<ImportExecutor>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn ImportJobQueue>, executor: Arc<ImportExecutor>, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    /// Spawns `config.pool_size` worker tasks. Each exits once `shutdown`
    /// is set to `true` and its in-flight job (if any) has finished —
    /// workers never abandon a job mid-commit.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.pool_size)
            .map(|index| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run(index, shutdown).await })
            })
            .collect()
    }

    async fn run(&self, index: usize, mut shutdown: watch::Receiver<bool>) {
        info!(worker = index, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.dequeue(self.config.dequeue_timeout).await {
                Ok(Some(job)) => self.process(index, job).await,
                // Timeout elapsed with nothing queued — loop immediately,
                // not an error (§4.7).
                Ok(None) => {}
                Err(e) => {
                    error!(worker = index, error = %e, "dequeue failed, backing off");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
        info!(worker = index, "worker stopped");
    }

    async fn process(&self, worker_index: usize, job: ImportJob) {
        let job_id = job.job_id;

        // Cooperative cancellation checkpoint: a job cancelled between
        // enqueue and dequeue is already terminal — never start it.
        if job.status == JobStatus::Cancelled {
            return;
        }

        if let Err(e) = self
            .queue
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    started_at: Some(chrono::Utc::now()),
                    progress: Some(0),
                    ..Default::default()
                },
            )
            .await
        {
            error!(worker = worker_index, job_id = %job_id, error = %e, "failed to mark job processing");
            return;
        }

        let request: ExecuteImportRequest = match serde_json::from_value(job.request.clone()) {
            Ok(request) => request,
            Err(e) => {
                self.fail(job_id, format!("malformed job request: {e}")).await;
                return;
            }
        };

        // Re-check cancellation right before the commit-bearing call —
        // the last checkpoint before work becomes irreversible.
        match self.queue.get_job(job_id).await {
            Ok(Some(current)) if current.status == JobStatus::Cancelled => return,
            Ok(_) => {}
            Err(e) => {
                warn!(worker = worker_index, job_id = %job_id, error = %e, "failed to re-check job status before commit");
            }
        }

        let outcome = tokio::time::timeout(
            self.config.per_job_deadline,
            self.executor.execute_import(request),
        )
        .await;

        match outcome {
            Ok(Ok(result)) => {
                let processed = result.total_imported() as u32;
                let result_json = serde_json::to_value(&result)
                    .unwrap_or_else(|e| serde_json::json!({"serialize_error": e.to_string()}));
                let _ = self
                    .queue
                    .update_job(
                        job_id,
                        JobUpdate {
                            status: Some(JobStatus::Completed),
                            progress: Some(100),
                            processed_count: Some(processed),
                            result: Some(result_json),
                            completed_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await;
                info!(worker = worker_index, job_id = %job_id, "job completed");
            }
            Ok(Err(e)) => {
                self.fail(job_id, e.to_string()).await;
            }
            Err(_elapsed) => {
                warn!(worker = worker_index, job_id = %job_id, "job exceeded its deadline");
                self.fail(job_id, "job exceeded its deadline".to_string()).await;
            }
        }
    }

    async fn fail(&self, job_id: pf_primitives::ImportJobId, message: String) {
        if let Err(e) = self
            .queue
            .update_job(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    error: Some(message),
                    completed_at: Some(chrono::Utc::now()),
                    ..Default::default()
                },
            )
            .await
        {
            error!(job_id = %job_id, error = %e, "failed to persist job failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_importer::{ExecuteImportRequestBuilder, ParsedTransactionRow};
    use pf_importqueue::{InMemoryImportQueue, NewImportJob};
    use pf_primitives::{Currency, ImportJobId};
    use pf_store::{InMemoryStore, UserRepository, WalletRepository, WalletType};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn happy_job_reaches_completed_with_progress_100() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();

        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .rows(vec![ParsedTransactionRow {
                row_number: 1,
                amount_minor: -1000,
                currency: Currency::Vnd,
                occurred_at: chrono::Utc::now(),
                note: "coffee".into(),
                category_id: None,
            }])
            .build();

        let queue = Arc::new(InMemoryImportQueue::new());
        let executor = Arc::new(ImportExecutor::new(store.clone(), store.clone(), store.clone()));
        let pool = Arc::new(WorkerPool::new(
            queue.clone(),
            executor,
            WorkerConfig {
                pool_size: 1,
                dequeue_timeout: StdDuration::from_millis(50),
                ..Default::default()
            },
        ));

        let job = queue
            .enqueue(NewImportJob {
                job_id: ImportJobId::new(),
                user_id: user.id,
                file_id: "f1".into(),
                wallet_id: wallet.id,
                request: serde_json::to_value(&request).unwrap(),
                total_count: 1,
                expires_at: chrono::Utc::now() + chrono::Duration::hours(24),
            })
            .await
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let dequeued = queue.dequeue(StdDuration::from_millis(200)).await.unwrap().unwrap();
        pool.process(0, dequeued).await;
        let _ = rx;

        let stored = queue.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.progress, 100);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn job_cancelled_before_dequeue_is_never_started() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();

        let queue = Arc::new(InMemoryImportQueue::new());
        let executor = Arc::new(ImportExecutor::new(store.clone(), store.clone(), store));
        let pool = WorkerPool::new(queue.clone(), executor, WorkerConfig::default());

        let job = queue
            .enqueue(NewImportJob {
                job_id: ImportJobId::new(),
                user_id: user.id,
                file_id: "f1".into(),
                wallet_id: wallet.id,
                request: serde_json::Value::Null,
                total_count: 1,
                expires_at: chrono::Utc::now() + chrono::Duration::hours(24),
            })
            .await
            .unwrap();

        queue.cancel_job(job.job_id, user.id).await.unwrap();
        let dequeued = queue.dequeue(StdDuration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(dequeued.status, JobStatus::Cancelled);

        pool.process(0, dequeued).await;

        let stored = queue.get_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.progress, 0);
    }
}
