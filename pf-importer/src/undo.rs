//! Undo Manager (C10, §4.10): rolls back an import batch within its
//! 24-hour undo window.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{ImportBatchId, UserId, WalletId};
use pf_store::{ImportBatchRepository, LedgerStore, TransactionRepository};

#[derive(Debug, Clone)]
pub struct UndoResult {
    pub batch_id: ImportBatchId,
    /// Per-wallet balance deltas applied to reverse the batch.
    pub wallet_reversals: Vec<(WalletId, i64)>,
}

pub struct UndoManager {
    batches: Arc<dyn ImportBatchRepository>,
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<dyn LedgerStore>,
}

impl UndoManager {
    pub fn new(
        batches: Arc<dyn ImportBatchRepository>,
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            batches,
            transactions,
            ledger,
        }
    }

    /// `UndoImport` (§4.10): load the batch, enforce ownership and the
    /// undo window, then reverse every transaction it created in the
    /// same atomic unit that created them.
    pub async fn undo_import(&self, user_id: UserId, batch_id: ImportBatchId) -> Result<UndoResult, Error> {
        self.undo_import_at(user_id, batch_id, Utc::now()).await
    }

    /// Same as [`Self::undo_import`] but with an explicit `now`, so tests
    /// can exercise the expiry boundary (§8 scenario 3) deterministically.
    pub async fn undo_import_at(
        &self,
        user_id: UserId,
        batch_id: ImportBatchId,
        now: DateTime<Utc>,
    ) -> Result<UndoResult, Error> {
        let batch = self
            .batches
            .find_by_id(batch_id)
            .await?
            .ok_or_else(|| Error::not_found("import batch not found"))?;

        if batch.user_id != user_id {
            return Err(Error::forbidden("import batch does not belong to caller"));
        }
        if !batch.is_undoable_at(now) {
            return Err(Error::undo_expired());
        }

        let transactions = self.transactions.find_by_import_batch(batch_id).await?;

        let mut deltas: HashMap<WalletId, i64> = HashMap::new();
        for tx in &transactions {
            *deltas.entry(tx.wallet_id).or_insert(0) -= tx.amount_minor;
        }
        let wallet_reversals: Vec<(WalletId, i64)> = deltas.into_iter().collect();

        self.ledger
            .undo_import(batch_id, wallet_reversals.clone(), now)
            .await?;

        Ok(UndoResult {
            batch_id,
            wallet_reversals,
        })
    }
}
