//! In-memory fake of the store traits, for tests that exercise the
//! import/undo/dedup logic without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{CategoryId, Currency, ImportBatchId, TransactionId, UserId, WalletId};

use crate::{
    model::{
        Category, ImportBatch, NewImportBatch, NewTransaction, Transaction, User, Wallet, WalletType,
    },
    repo::{
        CategoryRepository, ImportBatchRepository, LedgerStore, TransactionRepository,
        UserRepository, WalletRepository,
    },
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    wallets: Vec<Wallet>,
    categories: Vec<Category>,
    transactions: Vec<Transaction>,
    batches: Vec<ImportBatch>,
}

/// A `Mutex`-guarded in-process stand-in for [`crate::postgres::PgStore`].
/// Not concurrency-optimized — it exists for deterministic unit tests, not
/// for load.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<&str>,
        preferred_currency: Currency,
    ) -> Result<User, Error> {
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            picture_url: picture_url.map(str::to_string),
            preferred_currency,
            created_at: Utc::now(),
        };
        self.lock().users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, Error> {
        Ok(self.lock().wallets.iter().find(|w| w.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Wallet>, Error> {
        Ok(self
            .lock()
            .wallets
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error> {
        let wallet = Wallet {
            id: WalletId::new(),
            user_id,
            name: name.to_string(),
            wallet_type,
            currency,
            balance_minor: 0,
        };
        self.lock().wallets.push(wallet.clone());
        Ok(wallet)
    }

    async fn apply_balance_delta(&self, id: WalletId, delta_minor: i64) -> Result<i64, Error> {
        let mut state = self.lock();
        let wallet = state
            .wallets
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| Error::not_found("wallet not found"))?;
        wallet.balance_minor += delta_minor;
        Ok(wallet.balance_minor)
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Category>, Error> {
        Ok(self
            .lock()
            .categories
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, user_id: UserId, name: &str, icon: Option<&str>) -> Result<Category, Error> {
        let category = Category {
            id: CategoryId::new(),
            user_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
        };
        self.lock().categories.push(category.clone());
        Ok(category)
    }

    async fn seed_defaults(&self, user_id: UserId) -> Result<(), Error> {
        for (name, icon) in [
            ("Food & Drink", "utensils"),
            ("Transport", "car"),
            ("Shopping", "bag"),
            ("Bills & Utilities", "receipt"),
            ("Salary", "banknote"),
            ("Other", "circle"),
        ] {
            self.create(user_id, name, Some(icon)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn bulk_create(&self, transactions: Vec<NewTransaction>) -> Result<Vec<TransactionId>, Error> {
        let mut state = self.lock();
        let mut ids = Vec::with_capacity(transactions.len());
        for new_tx in transactions {
            let id = TransactionId::new();
            state.transactions.push(Transaction {
                id,
                wallet_id: new_tx.wallet_id,
                category_id: new_tx.category_id,
                amount_minor: new_tx.amount_minor,
                currency: new_tx.currency,
                occurred_at: new_tx.occurred_at,
                note: new_tx.note,
                created_at: Utc::now(),
                import_batch_id: new_tx.import_batch_id,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find_by_import_batch(&self, batch_id: ImportBatchId) -> Result<Vec<Transaction>, Error> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.import_batch_id == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn find_candidates(
        &self,
        wallet_id: WalletId,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, Error> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .filter(|t| {
                t.wallet_id == wallet_id
                    && t.amount_minor == amount_minor
                    && t.occurred_at >= from
                    && t.occurred_at <= to
            })
            .cloned()
            .collect())
    }

    async fn delete_by_import_batch(&self, batch_id: ImportBatchId) -> Result<(), Error> {
        self.lock().transactions.retain(|t| t.import_batch_id != Some(batch_id));
        Ok(())
    }
}

#[async_trait]
impl ImportBatchRepository for InMemoryStore {
    async fn find_by_id(&self, id: ImportBatchId) -> Result<Option<ImportBatch>, Error> {
        Ok(self.lock().batches.iter().find(|b| b.id == id).cloned())
    }

    async fn mark_undone(&self, id: ImportBatchId, undone_at: DateTime<Utc>) -> Result<(), Error> {
        let mut state = self.lock();
        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == id) {
            batch.undone_at = Some(undone_at);
            batch.can_undo = false;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit_import(
        &self,
        batch: NewImportBatch,
        transactions: Vec<NewTransaction>,
        merge_annotations: Vec<(TransactionId, String)>,
    ) -> Result<(ImportBatch, Vec<TransactionId>, i64), Error> {
        let id = ImportBatchId::new();
        let mut state = self.lock();

        let wallet = state
            .wallets
            .iter_mut()
            .find(|w| w.id == batch.wallet_id)
            .ok_or_else(|| Error::not_found("wallet not found"))?;
        wallet.balance_minor += batch.net_change_minor;
        let new_balance = wallet.balance_minor;

        let mut transaction_ids = Vec::with_capacity(transactions.len());
        for new_tx in transactions {
            let tx_id = TransactionId::new();
            state.transactions.push(Transaction {
                id: tx_id,
                wallet_id: new_tx.wallet_id,
                category_id: new_tx.category_id,
                amount_minor: new_tx.amount_minor,
                currency: new_tx.currency,
                occurred_at: new_tx.occurred_at,
                note: new_tx.note,
                created_at: Utc::now(),
                import_batch_id: Some(id),
            });
            transaction_ids.push(tx_id);
        }

        for (existing_id, note_suffix) in merge_annotations {
            if let Some(tx) = state.transactions.iter_mut().find(|t| t.id == existing_id) {
                tx.note.push_str(&note_suffix);
            }
        }

        let stored = ImportBatch {
            id,
            user_id: batch.user_id,
            wallet_id: batch.wallet_id,
            file_name: batch.file_name,
            imported_at: Utc::now(),
            total_rows: batch.total_rows,
            valid_rows: batch.valid_rows,
            skipped_rows: batch.skipped_rows,
            duplicates_merged: batch.duplicates_merged,
            duplicates_skipped: batch.duplicates_skipped,
            total_income_minor: batch.total_income_minor,
            total_expenses_minor: batch.total_expenses_minor,
            net_change_minor: batch.net_change_minor,
            date_range_start: batch.date_range_start,
            date_range_end: batch.date_range_end,
            can_undo: true,
            undo_expires_at: batch.undo_expires_at,
            undone_at: None,
        };
        state.batches.push(stored.clone());

        Ok((stored, transaction_ids, new_balance))
    }

    async fn undo_import(
        &self,
        batch_id: ImportBatchId,
        reversals: Vec<(WalletId, i64)>,
        undone_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut state = self.lock();
        state.transactions.retain(|t| t.import_batch_id != Some(batch_id));

        for (wallet_id, delta_minor) in reversals {
            if let Some(wallet) = state.wallets.iter_mut().find(|w| w.id == wallet_id) {
                wallet.balance_minor += delta_minor;
            }
        }

        if let Some(batch) = state.batches.iter_mut().find(|b| b.id == batch_id) {
            batch.undone_at = Some(undone_at);
            batch.can_undo = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_primitives::Currency;

    #[tokio::test]
    async fn commit_then_undo_restores_wallet_balance() {
        let store = InMemoryStore::new();
        let user = store.create("a@b.com", "A", None, Currency::Usd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Usd)
            .await
            .unwrap();

        let now = Utc::now();
        let batch = NewImportBatch {
            user_id: user.id,
            wallet_id: wallet.id,
            file_name: "statement.csv".into(),
            imported_at: now,
            total_rows: 1,
            valid_rows: 1,
            skipped_rows: 0,
            duplicates_merged: 0,
            duplicates_skipped: 0,
            total_income_minor: 0,
            total_expenses_minor: 500,
            net_change_minor: -500,
            date_range_start: Some(now),
            date_range_end: Some(now),
            undo_expires_at: now + chrono::Duration::hours(1),
        };
        let new_tx = NewTransaction {
            wallet_id: wallet.id,
            category_id: None,
            amount_minor: -500,
            currency: Currency::Usd,
            occurred_at: now,
            note: "coffee".into(),
            import_batch_id: None,
        };

        let (stored_batch, tx_ids, balance_after) =
            store.commit_import(batch, vec![new_tx], vec![]).await.unwrap();
        assert_eq!(balance_after, -500);
        assert_eq!(tx_ids.len(), 1);

        store
            .undo_import(stored_batch.id, vec![(wallet.id, 500)], Utc::now())
            .await
            .unwrap();

        let wallet_after = store.find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet_after.balance_minor, 0);
        assert!(store
            .find_by_import_batch(stored_batch.id)
            .await
            .unwrap()
            .is_empty());
    }
}
