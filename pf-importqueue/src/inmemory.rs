//! In-memory stand-in for the Redis-shaped job queue, for worker/executor
//! tests that don't need an actual Redis instance.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use pf_errors::Error;
use pf_primitives::{ImportJobId, UserId};
use tokio::sync::Notify;

use crate::{
    model::{ImportJob, JobStatus, NewImportJob},
    queue::{ImportJobQueue, JobUpdate},
};

struct State {
    jobs: HashMap<ImportJobId, ImportJob>,
    queue: VecDeque<ImportJobId>,
    processing_since: HashMap<ImportJobId, std::time::Instant>,
}

pub struct InMemoryImportQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl Default for InMemoryImportQueue {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                jobs: HashMap::new(),
                queue: VecDeque::new(),
                processing_since: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }
}

impl InMemoryImportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ImportJobQueue for InMemoryImportQueue {
    async fn enqueue(&self, new_job: NewImportJob) -> Result<ImportJob, Error> {
        let job = ImportJob {
            job_id: new_job.job_id,
            user_id: new_job.user_id,
            file_id: new_job.file_id,
            wallet_id: new_job.wallet_id,
            request: new_job.request,
            status: JobStatus::Queued,
            progress: 0,
            processed_count: 0,
            total_count: new_job.total_count,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            expires_at: new_job.expires_at,
        };

        {
            let mut state = self.lock();
            state.queue.push_back(job.job_id);
            state.jobs.insert(job.job_id, job.clone());
        }
        self.notify.notify_one();
        Ok(job)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ImportJob>, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.lock();
                if let Some(job_id) = state.queue.pop_front() {
                    state.processing_since.insert(job_id, std::time::Instant::now());
                    return Ok(state.jobs.get(&job_id).cloned());
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn get_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error> {
        Ok(self.lock().jobs.get(&job_id).cloned())
    }

    async fn update_job(&self, job_id: ImportJobId, update: JobUpdate) -> Result<(), Error> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::not_found("import job not found"))?;

        if let Some(status) = update.status {
            job.status = status;
            if status.is_terminal() {
                state.processing_since.remove(&job_id);
            }
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        if let Some(processed_count) = update.processed_count {
            job.processed_count = processed_count;
        }
        if update.result.is_some() {
            job.result = update.result;
        }
        if update.error.is_some() {
            job.error = update.error;
        }
        if update.started_at.is_some() {
            job.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            job.completed_at = update.completed_at;
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::not_found("import job not found"))?;
        if job.user_id != user_id {
            return Err(Error::forbidden("job does not belong to caller"));
        }
        if !job.status.is_cancellable() {
            return Err(Error::conflict("job is already in a terminal state"));
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error> {
        Ok(self
            .lock()
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn cleanup_expired_jobs(&self, now: chrono::DateTime<Utc>) -> Result<u64, Error> {
        let mut state = self.lock();
        let expired: Vec<ImportJobId> = state
            .jobs
            .values()
            .filter(|j| j.expires_at < now)
            .map(|j| j.job_id)
            .collect();

        for job_id in &expired {
            state.jobs.remove(job_id);
            state.processing_since.remove(job_id);
            state.queue.retain(|id| id != job_id);
        }
        Ok(expired.len() as u64)
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, Error> {
        let mut state = self.lock();
        let stale: Vec<ImportJobId> = state
            .processing_since
            .iter()
            .filter(|(_, since)| since.elapsed() >= older_than)
            .map(|(id, _)| *id)
            .collect();

        for job_id in &stale {
            state.processing_since.remove(job_id);
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status == JobStatus::Processing {
                    job.status = JobStatus::Queued;
                    job.started_at = None;
                    state.queue.push_back(*job_id);
                }
            }
        }
        self.notify.notify_waiters();
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_primitives::WalletId;

    fn job(user_id: UserId) -> NewImportJob {
        NewImportJob {
            job_id: ImportJobId::new(),
            user_id,
            file_id: "f1".into(),
            wallet_id: WalletId::new(),
            request: serde_json::Value::Null,
            total_count: 2,
            expires_at: Utc::now() + chrono::Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_is_fifo() {
        let queue = InMemoryImportQueue::new();
        let user_id = UserId::new();
        let j1 = queue.enqueue(job(user_id)).await.unwrap();
        let j2 = queue.enqueue(job(user_id)).await.unwrap();

        let first = queue.dequeue(Duration::from_millis(50)).await.unwrap().unwrap();
        let second = queue.dequeue(Duration::from_millis(50)).await.unwrap().unwrap();
        assert_eq!(first.job_id, j1.job_id);
        assert_eq!(second.job_id, j2.job_id);
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let queue = InMemoryImportQueue::new();
        let result = queue.dequeue(Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_terminal() {
        let queue = InMemoryImportQueue::new();
        let user_id = UserId::new();
        let created = queue.enqueue(job(user_id)).await.unwrap();

        queue
            .update_job(
                created.job_id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(queue.cancel_job(created.job_id, user_id).await.is_err());
    }
}
