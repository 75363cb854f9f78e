//! The `ImportJob` record (§3 DATA MODEL).

use chrono::{DateTime, Utc};
use pf_primitives::{ImportJobId, UserId, WalletId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

/// `request` and `result`/`error` are opaque JSON from this crate's point
/// of view — the import executor (C9) defines their shape; the queue
/// only needs to move them around durably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: ImportJobId,
    pub user_id: UserId,
    pub file_id: String,
    pub wallet_id: WalletId,
    pub request: Value,
    pub status: JobStatus,
    pub progress: u8,
    pub processed_count: u32,
    pub total_count: u32,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl ImportJob {
    /// `status ∈ {COMPLETED, FAILED, CANCELLED} ⇔ completed_at IS NOT
    /// NULL`; `progress == 100 ⇒ status == COMPLETED` (§3 invariant).
    pub fn invariant_holds(&self) -> bool {
        let completed_iff_terminal = self.status.is_terminal() == self.completed_at.is_some();
        let full_progress_implies_completed = self.progress != 100 || self.status == JobStatus::Completed;
        completed_iff_terminal && full_progress_implies_completed
    }
}

#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub job_id: ImportJobId,
    pub user_id: UserId,
    pub file_id: String,
    pub wallet_id: WalletId,
    pub request: Value,
    pub total_count: u32,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_requires_completed_at() {
        let job = ImportJob {
            job_id: ImportJobId::new(),
            user_id: UserId::new(),
            file_id: "f".into(),
            wallet_id: WalletId::new(),
            request: Value::Null,
            status: JobStatus::Completed,
            progress: 100,
            processed_count: 1,
            total_count: 1,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            expires_at: Utc::now(),
        };
        assert!(!job.invariant_holds());
    }
}
