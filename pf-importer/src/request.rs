//! `ExecuteImportRequest` and its builder (§4.9, §9 design note: the
//! builder assembles exclusions and per-row duplicate policies up front
//! so the executor is pure with respect to its input).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use pf_primitives::{CategoryId, Currency, UserId, WalletId};
use serde::{Deserialize, Serialize};

/// A single parsed row from the uploaded statement, before any
/// validation or duplicate resolution. Parsing itself is an external
/// collaborator (§1); this is the shape it hands to the executor.
///
/// Derives `Serialize`/`Deserialize` because the worker pool (C7) carries
/// the whole request as the opaque JSON payload of an `ImportJob` — the
/// queue never looks inside it, but the worker needs to round-trip it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTransactionRow {
    pub row_number: u32,
    pub amount_minor: i64,
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub category_id: Option<CategoryId>,
}

/// The caller's decision for a row the duplicate detector flagged as a
/// likely match against an existing transaction (§4.8, §4.9 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    Skip,
    Keep,
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteImportRequest {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub file_name: String,
    pub parsed_transactions: Vec<ParsedTransactionRow>,
    pub excluded_row_numbers: HashSet<u32>,
    pub duplicate_policy: HashMap<u32, DuplicatePolicy>,
}

#[derive(Debug, Default)]
pub struct ExecuteImportRequestBuilder {
    user_id: Option<UserId>,
    wallet_id: Option<WalletId>,
    file_name: String,
    parsed_transactions: Vec<ParsedTransactionRow>,
    excluded_row_numbers: HashSet<u32>,
    duplicate_policy: HashMap<u32, DuplicatePolicy>,
}

impl ExecuteImportRequestBuilder {
    pub fn new(user_id: UserId, wallet_id: WalletId) -> Self {
        Self {
            user_id: Some(user_id),
            wallet_id: Some(wallet_id),
            ..Default::default()
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn rows(mut self, rows: Vec<ParsedTransactionRow>) -> Self {
        self.parsed_transactions = rows;
        self
    }

    pub fn exclude_row(mut self, row_number: u32) -> Self {
        self.excluded_row_numbers.insert(row_number);
        self
    }

    pub fn duplicate_policy(mut self, row_number: u32, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy.insert(row_number, policy);
        self
    }

    pub fn build(self) -> ExecuteImportRequest {
        ExecuteImportRequest {
            user_id: self.user_id.expect("user_id is required"),
            wallet_id: self.wallet_id.expect("wallet_id is required"),
            file_name: self.file_name,
            parsed_transactions: self.parsed_transactions,
            excluded_row_numbers: self.excluded_row_numbers,
            duplicate_policy: self.duplicate_policy,
        }
    }
}
