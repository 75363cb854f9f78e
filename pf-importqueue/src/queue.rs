//! The `ImportJobQueue` contract (§4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{ImportJobId, UserId};
use std::{sync::Arc, time::Duration};

use crate::model::{ImportJob, NewImportJob, JobStatus};

/// Fields a caller may update on an in-flight job. `None` leaves the
/// field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub processed_count: Option<u32>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ImportJobQueue: Send + Sync {
    async fn enqueue(&self, job: NewImportJob) -> Result<ImportJob, Error>;

    /// Blocking pop with a timeout; `Ok(None)` means the timeout elapsed
    /// with nothing to dequeue — callers loop immediately on that case
    /// (§4.7), not treat it as an error.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<ImportJob>, Error>;

    async fn get_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error>;
    async fn update_job(&self, job_id: ImportJobId, update: JobUpdate) -> Result<(), Error>;

    /// Cancellable iff `status ∈ {QUEUED, PROCESSING}`; returns a
    /// `Conflict` error otherwise.
    async fn cancel_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error>;

    async fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error>;

    /// Deletes job hash, user index, and processing-set entries for any
    /// job whose `expires_at < now`. Returns the number removed.
    async fn cleanup_expired_jobs(&self, now: DateTime<Utc>) -> Result<u64, Error>;

    /// Jobs left in the `processing` set whose worker died without
    /// completing them — recovery hook a worker can call on startup so
    /// an orphaned job doesn't sit `PROCESSING` forever.
    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, Error>;
}

#[async_trait]
impl<T: ImportJobQueue + ?Sized> ImportJobQueue for Arc<T> {
    async fn enqueue(&self, job: NewImportJob) -> Result<ImportJob, Error> {
        (**self).enqueue(job).await
    }
    async fn dequeue(&self, timeout: Duration) -> Result<Option<ImportJob>, Error> {
        (**self).dequeue(timeout).await
    }
    async fn get_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error> {
        (**self).get_job(job_id).await
    }
    async fn update_job(&self, job_id: ImportJobId, update: JobUpdate) -> Result<(), Error> {
        (**self).update_job(job_id, update).await
    }
    async fn cancel_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error> {
        (**self).cancel_job(job_id, user_id).await
    }
    async fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error> {
        (**self).get_user_jobs(user_id).await
    }
    async fn cleanup_expired_jobs(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        (**self).cleanup_expired_jobs(now).await
    }
    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, Error> {
        (**self).requeue_stale(older_than).await
    }
}
