//! Redis-backed `ImportJobQueue` (§4.6): a FIFO list for the queue
//! itself, a hash per job, a set per user, and two sorted sets —
//! `processing` (member -> dequeue time, for stale-job recovery) and
//! `expiry` (member -> `expires_at`, so the cleanup sweeper does not need
//! to scan every job to find the ones past their TTL).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{ImportJobId, UserId};
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use crate::{
    model::{ImportJob, JobStatus, NewImportJob},
    queue::{ImportJobQueue, JobUpdate},
};

fn queue_key() -> String {
    "pf:importqueue:queue".to_string()
}

fn job_key(id: ImportJobId) -> String {
    format!("pf:importqueue:job:{id}")
}

fn user_jobs_key(user_id: UserId) -> String {
    format!("pf:importqueue:user_jobs:{user_id}")
}

fn processing_key() -> String {
    "pf:importqueue:processing".to_string()
}

fn expiry_key() -> String {
    "pf:importqueue:expiry".to_string()
}

/// Redis-shaped durable job queue. Every job is stored as a single JSON
/// blob in its hash (`data` field) — the queue only needs to move jobs
/// around, not query their individual columns, so there is no value in
/// exploding them into separate hash fields the way a relational table
/// would.
#[derive(Clone)]
pub struct RedisImportQueue {
    conn: ConnectionManager,
}

impl RedisImportQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::internal(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::internal(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn })
    }

    async fn load(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(job_key(job_id), "data")
            .await
            .map_err(|e| Error::internal(format!("importqueue hget({job_id}): {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| Error::internal(format!("importqueue corrupt job {job_id}: {e}")))
        })
        .transpose()
    }

    async fn save(&self, job: &ImportJob) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(job)
            .map_err(|e| Error::internal(format!("importqueue serialize job: {e}")))?;
        conn.hset::<_, _, _, ()>(job_key(job.job_id), "data", raw)
            .await
            .map_err(|e| Error::internal(format!("importqueue hset({}): {e}", job.job_id)))
    }
}

#[async_trait]
impl ImportJobQueue for RedisImportQueue {
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
        let raw = serde_json::to_string(&job)
            .map_err(|e| Error::internal(format!("importqueue serialize job: {e}")))?;

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset(job_key(job.job_id), "data", raw)
            .ignore()
            .sadd(user_jobs_key(job.user_id), job.job_id.to_string())
            .ignore()
            .zadd(expiry_key(), job.job_id.to_string(), job.expires_at.timestamp())
            .ignore()
            .rpush(queue_key(), job.job_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::internal(format!("importqueue enqueue({}): {e}", job.job_id)))?;

        Ok(job)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ImportJob>, Error> {
        let mut conn = self.conn.clone();
        // `0` means "block forever" in Redis BLPOP; round up so a
        // sub-second budget still blocks briefly rather than returning
        // immediately.
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = conn
            .blpop(queue_key(), timeout_secs)
            .await
            .map_err(|e| Error::internal(format!("importqueue blpop: {e}")))?;

        let Some((_key, job_id_str)) = popped else {
            return Ok(None);
        };
        let job_id = job_id_str
            .parse::<uuid::Uuid>()
            .map_err(|e| Error::internal(format!("importqueue malformed queued id: {e}")))?
            .into();

        conn.zadd::<_, _, _, ()>(processing_key(), job_id_str, Utc::now().timestamp())
            .await
            .map_err(|e| Error::internal(format!("importqueue zadd processing({job_id}): {e}")))?;

        self.load(job_id).await
    }

    async fn get_job(&self, job_id: ImportJobId) -> Result<Option<ImportJob>, Error> {
        self.load(job_id).await
    }

    async fn update_job(&self, job_id: ImportJobId, update: JobUpdate) -> Result<(), Error> {
        let mut job = self
            .load(job_id)
            .await?
            .ok_or_else(|| Error::not_found("import job not found"))?;

        if let Some(status) = update.status {
            job.status = status;
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

        self.save(&job).await?;

        if job.status.is_terminal() {
            let mut conn = self.conn.clone();
            conn.zrem::<_, _, ()>(processing_key(), job_id.to_string())
                .await
                .map_err(|e| Error::internal(format!("importqueue zrem processing({job_id}): {e}")))?;
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: ImportJobId, user_id: UserId) -> Result<(), Error> {
        let mut job = self
            .load(job_id)
            .await?
            .ok_or_else(|| Error::not_found("import job not found"))?;
        if job.user_id != user_id {
            return Err(Error::forbidden("job does not belong to caller"));
        }
        if !job.status.is_cancellable() {
            return Err(Error::conflict("job is already in a terminal state"));
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.save(&job).await?;

        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(processing_key(), job_id.to_string())
            .await
            .map_err(|e| Error::internal(format!("importqueue zrem processing({job_id}): {e}")))
    }

    async fn get_user_jobs(&self, user_id: UserId) -> Result<Vec<ImportJob>, Error> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .smembers(user_jobs_key(user_id))
            .await
            .map_err(|e| Error::internal(format!("importqueue smembers user_jobs({user_id}): {e}")))?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(uuid) = id.parse::<uuid::Uuid>() else { continue };
            if let Some(job) = self.load(uuid.into()).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn cleanup_expired_jobs(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let expired: Vec<String> = conn
            .zrangebyscore(expiry_key(), 0, now.timestamp())
            .await
            .map_err(|e| Error::internal(format!("importqueue zrangebyscore expiry: {e}")))?;

        let mut removed = 0u64;
        for id_str in expired {
            let Ok(uuid) = id_str.parse::<uuid::Uuid>() else { continue };
            let job_id: ImportJobId = uuid.into();
            let job = match self.load(job_id).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "cleanup: failed to load expired job, skipping");
                    continue;
                }
            };

            let mut pipe = redis::pipe();
            pipe.atomic()
                .del(job_key(job_id))
                .ignore()
                .zrem(processing_key(), &id_str)
                .ignore()
                .zrem(expiry_key(), &id_str)
                .ignore()
                .lrem(queue_key(), 0, &id_str)
                .ignore();
            if let Some(job) = &job {
                pipe.srem(user_jobs_key(job.user_id), &id_str).ignore();
            }

            if let Err(e) = pipe.query_async::<_, ()>(&mut conn).await {
                tracing::warn!(job_id = %job_id, error = %e, "cleanup: failed to delete expired job, continuing sweep");
                continue;
            }
            removed += 1;
        }
        Ok(removed)
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, Error> {
        let mut conn = self.conn.clone();
        let cutoff = Utc::now().timestamp() - older_than.as_secs() as i64;
        let stale: Vec<String> = conn
            .zrangebyscore(processing_key(), 0, cutoff)
            .await
            .map_err(|e| Error::internal(format!("importqueue zrangebyscore processing: {e}")))?;

        let mut requeued = 0u64;
        for id_str in &stale {
            let Ok(uuid) = id_str.parse::<uuid::Uuid>() else { continue };
            let job_id: ImportJobId = uuid.into();

            conn.zrem::<_, _, ()>(processing_key(), id_str)
                .await
                .map_err(|e| Error::internal(format!("importqueue zrem stale({job_id}): {e}")))?;

            let Some(mut job) = self.load(job_id).await? else { continue };
            if job.status != JobStatus::Processing {
                continue;
            }
            job.status = JobStatus::Queued;
            job.started_at = None;
            self.save(&job).await?;

            conn.rpush::<_, _, ()>(queue_key(), id_str)
                .await
                .map_err(|e| Error::internal(format!("importqueue requeue({job_id}): {e}")))?;
            requeued += 1;
        }
        Ok(requeued)
    }
}
