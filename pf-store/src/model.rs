//! Entities owned by the ledger/wallet store (C12, §3 DATA MODEL).

use chrono::{DateTime, Utc};
use pf_primitives::{CategoryId, Currency, ImportBatchId, TransactionId, UserId, WalletId};
use serde::{Deserialize, Serialize};

/// Closed set of wallet kinds — a finite tag rather than a free string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    Cash,
    Bank,
    Investment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub preferred_currency: Currency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub name: String,
    pub wallet_type: WalletType,
    pub currency: Currency,
    pub balance_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub user_id: UserId,
    pub name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub category_id: Option<CategoryId>,
    pub amount_minor: i64,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub import_batch_id: Option<ImportBatchId>,
}

/// A transaction not yet assigned an id/`created_at` — what callers build
/// before a bulk insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub category_id: Option<CategoryId>,
    pub amount_minor: i64,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub import_batch_id: Option<ImportBatchId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: ImportBatchId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub file_name: String,
    pub imported_at: DateTime<Utc>,
    pub total_rows: i32,
    pub valid_rows: i32,
    pub skipped_rows: i32,
    pub duplicates_merged: i32,
    pub duplicates_skipped: i32,
    pub total_income_minor: i64,
    pub total_expenses_minor: i64,
    pub net_change_minor: i64,
    pub date_range_start: Option<DateTime<Utc>>,
    pub date_range_end: Option<DateTime<Utc>>,
    pub can_undo: bool,
    pub undo_expires_at: DateTime<Utc>,
    pub undone_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    /// Invariant from §3: `can_undo == true` iff `undone_at` is unset and
    /// the undo window has not elapsed.
    pub fn is_undoable_at(&self, now: DateTime<Utc>) -> bool {
        self.can_undo && self.undone_at.is_none() && now < self.undo_expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewImportBatch {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub file_name: String,
    pub imported_at: DateTime<Utc>,
    pub total_rows: i32,
    pub valid_rows: i32,
    pub skipped_rows: i32,
    pub duplicates_merged: i32,
    pub duplicates_skipped: i32,
    pub total_income_minor: i64,
    pub total_expenses_minor: i64,
    pub net_change_minor: i64,
    pub date_range_start: Option<DateTime<Utc>>,
    pub date_range_end: Option<DateTime<Utc>>,
    pub undo_expires_at: DateTime<Utc>,
}
