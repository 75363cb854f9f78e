//! Import Executor (C9, §4.9): validates an `ExecuteImportRequest`,
//! resolves duplicates against the existing ledger, and commits the
//! surviving rows as one atomic batch.

use std::sync::Arc;

use pf_dedup::{fingerprint, DuplicateDetector};
use pf_errors::Error;
use pf_primitives::{Currency, TransactionId, WalletId};
use pf_store::{
    ImportBatch, LedgerStore, NewImportBatch, NewTransaction, TransactionRepository, WalletRepository,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::request::{DuplicatePolicy, ExecuteImportRequest, ParsedTransactionRow};

const UNDO_WINDOW_HOURS: i64 = 24;

/// What became of a single input row (§3 supplement: the data model only
/// aggregates these into `ImportBatch`'s counters; this is the per-row
/// detail behind them).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Committed { transaction_id: TransactionId },
    SkippedExcluded,
    SkippedDuplicate,
    MergedIntoExisting { existing_id: TransactionId },
    Invalid { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub batch: ImportBatch,
    pub wallet_balance_minor: i64,
    /// One entry per input row, in the row numbers' natural order.
    pub row_outcomes: Vec<(u32, RowOutcome)>,
}

impl ImportResult {
    pub fn total_imported(&self) -> usize {
        self.row_outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RowOutcome::Committed { .. }))
            .count()
    }
}

pub struct ImportExecutor {
    wallets: Arc<dyn WalletRepository>,
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn LedgerStore>,
}

impl ImportExecutor {
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            wallets,
            transactions,
            ledger,
        }
    }

    /// Runs the full protocol of §4.9: authorize, filter, resolve
    /// duplicates, aggregate, then commit everything that survives in a
    /// single atomic unit.
    pub async fn execute_import(&self, request: ExecuteImportRequest) -> Result<ImportResult, Error> {
        // Step 1: authorization.
        let wallet = self
            .wallets
            .find_by_id(request.wallet_id)
            .await?
            .ok_or_else(|| Error::not_found("wallet not found"))?;
        if wallet.user_id != request.user_id {
            return Err(Error::forbidden("wallet does not belong to caller"));
        }

        let mut row_outcomes: Vec<(u32, RowOutcome)> = Vec::new();

        // Step 2: filter excluded and invalid rows.
        let mut candidates = Vec::with_capacity(request.parsed_transactions.len());
        for row in request.parsed_transactions {
            if request.excluded_row_numbers.contains(&row.row_number) {
                row_outcomes.push((row.row_number, RowOutcome::SkippedExcluded));
                continue;
            }
            if let Some(reason) = invalid_reason(&row, wallet.currency) {
                row_outcomes.push((row.row_number, RowOutcome::Invalid { reason }));
                continue;
            }
            candidates.push(row);
        }

        // Step 3: duplicate resolution.
        let detector = DuplicateDetector::new(self.transactions.clone());
        let mut pending_rows: Vec<u32> = Vec::new();
        let mut pending_transactions: Vec<NewTransaction> = Vec::new();
        let mut merge_targets: Vec<TransactionId> = Vec::new();
        let mut duplicates_merged = 0i32;
        let mut duplicates_skipped = 0i32;

        for row in candidates {
            let print = fingerprint(wallet.id, row.occurred_at, row.amount_minor, &row.note);
            let matches = detector.find_matches(&print).await?;

            let policy = if matches.is_empty() {
                DuplicatePolicy::Keep
            } else {
                request
                    .duplicate_policy
                    .get(&row.row_number)
                    .copied()
                    .unwrap_or(DuplicatePolicy::Keep)
            };

            match policy {
                DuplicatePolicy::Keep => {
                    pending_rows.push(row.row_number);
                    pending_transactions.push(to_new_transaction(wallet.id, row));
                }
                DuplicatePolicy::Skip => {
                    duplicates_skipped += 1;
                    row_outcomes.push((row.row_number, RowOutcome::SkippedDuplicate));
                }
                DuplicatePolicy::Merge => {
                    let best = matches
                        .iter()
                        .max_by_key(|m| m.confidence)
                        .expect("policy is Merge only when matches is non-empty");
                    duplicates_merged += 1;
                    merge_targets.push(best.existing_transaction_id);
                    row_outcomes.push((
                        row.row_number,
                        RowOutcome::MergedIntoExisting {
                            existing_id: best.existing_transaction_id,
                        },
                    ));
                }
            }
        }

        if pending_transactions.is_empty() {
            return Err(Error::validation("import contains no valid rows to commit"));
        }

        // Step 4: aggregate.
        let total_income_minor: i64 = pending_transactions
            .iter()
            .filter(|t| t.amount_minor > 0)
            .map(|t| t.amount_minor)
            .sum();
        let total_expenses_minor: i64 = pending_transactions
            .iter()
            .filter(|t| t.amount_minor < 0)
            .map(|t| -t.amount_minor)
            .sum();
        let net_change_minor = total_income_minor - total_expenses_minor;
        let date_range_start = pending_transactions.iter().map(|t| t.occurred_at).min();
        let date_range_end = pending_transactions.iter().map(|t| t.occurred_at).max();

        let now = chrono::Utc::now();
        let total_rows = row_outcomes.len() + pending_rows.len();
        let skipped_rows = row_outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RowOutcome::SkippedExcluded | RowOutcome::Invalid { .. }))
            .count();

        let new_batch = NewImportBatch {
            user_id: request.user_id,
            wallet_id: request.wallet_id,
            file_name: request.file_name,
            imported_at: now,
            total_rows: total_rows as i32,
            valid_rows: pending_transactions.len() as i32,
            skipped_rows: skipped_rows as i32,
            duplicates_merged,
            duplicates_skipped,
            total_income_minor,
            total_expenses_minor,
            net_change_minor,
            date_range_start,
            date_range_end,
            undo_expires_at: now + chrono::Duration::hours(UNDO_WINDOW_HOURS),
        };

        // Step 5: commit — batch, transactions, wallet balance, and the
        // merge annotations on rows this batch matched against, all as one
        // atomic unit.
        let merge_annotations: Vec<(TransactionId, String)> = merge_targets
            .iter()
            .map(|existing_id| (*existing_id, " (merged duplicate import)".to_string()))
            .collect();
        let (batch, transaction_ids, wallet_balance_minor) = self
            .ledger
            .commit_import(new_batch, pending_transactions, merge_annotations)
            .await?;

        for (row_number, transaction_id) in pending_rows.into_iter().zip(transaction_ids) {
            row_outcomes.push((row_number, RowOutcome::Committed { transaction_id }));
        }

        info!(
            batch_id = %batch.id,
            imported = batch.valid_rows,
            net_change_minor,
            "import batch committed"
        );

        row_outcomes.sort_by_key(|(row_number, _)| *row_number);

        Ok(ImportResult {
            batch,
            wallet_balance_minor,
            row_outcomes,
        })
    }
}

fn to_new_transaction(wallet_id: WalletId, row: ParsedTransactionRow) -> NewTransaction {
    NewTransaction {
        wallet_id,
        category_id: row.category_id,
        amount_minor: row.amount_minor,
        currency: row.currency,
        occurred_at: row.occurred_at,
        note: row.note,
        import_batch_id: None,
    }
}

/// Excluded rows that are also flagged `merge` never reach duplicate
/// resolution — the filter step (§4.9 step 2) drops them before step 3
/// runs, so an excluded+merge row is simply dropped, not merged. The
/// source's two controls are independent in that sense (§9 open question
/// a); this is the only ordering consistent with the protocol's own
/// step numbering.
fn invalid_reason(row: &ParsedTransactionRow, wallet_currency: Currency) -> Option<String> {
    if row.amount_minor == 0 {
        return Some("zero-amount row".to_string());
    }
    if row.currency != wallet_currency {
        return Some(format!(
            "row currency {} does not match wallet currency {wallet_currency}",
            row.currency
        ));
    }
    None
}
