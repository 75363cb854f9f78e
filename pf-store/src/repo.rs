//! Repository traits exposed by the ledger/wallet store (C12).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{Currency, ImportBatchId, TransactionId, UserId, WalletId};

use crate::model::{Category, ImportBatch, NewImportBatch, NewTransaction, Transaction, User, Wallet, WalletType};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    async fn create(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<&str>,
        preferred_currency: Currency,
    ) -> Result<User, Error>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, Error>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Wallet>, Error>;
    async fn create(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error>;

    /// Atomically add `delta_minor` to the wallet's balance and return
    /// the new balance. This is the serialization point for concurrent
    /// writers named in the concurrency model — implementations must use
    /// a single conditional UPDATE (or an equivalent row lock), never a
    /// read-then-write pair.
    async fn apply_balance_delta(&self, id: WalletId, delta_minor: i64) -> Result<i64, Error>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Category>, Error>;
    async fn create(&self, user_id: UserId, name: &str, icon: Option<&str>) -> Result<Category, Error>;

    /// Seed the default category set for a newly created user (§4.5).
    async fn seed_defaults(&self, user_id: UserId) -> Result<(), Error>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert all `transactions`, returning their generated ids in input
    /// order.
    async fn bulk_create(&self, transactions: Vec<NewTransaction>) -> Result<Vec<TransactionId>, Error>;

    async fn find_by_import_batch(&self, batch_id: ImportBatchId) -> Result<Vec<Transaction>, Error>;

    /// Candidate rows for duplicate detection: same wallet and exact
    /// signed amount, within the given inclusive date window.
    async fn find_candidates(
        &self,
        wallet_id: WalletId,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, Error>;

    async fn delete_by_import_batch(&self, batch_id: ImportBatchId) -> Result<(), Error>;
}

#[async_trait]
pub trait ImportBatchRepository: Send + Sync {
    async fn find_by_id(&self, id: ImportBatchId) -> Result<Option<ImportBatch>, Error>;
    async fn mark_undone(&self, id: ImportBatchId, undone_at: DateTime<Utc>) -> Result<(), Error>;
}

/// The atomic, multi-table operations at the heart of the import
/// pipeline (§4.9 step 5) and the undo manager (§4.10): these cross the
/// batch, transaction, and wallet tables and must commit or fail as one
/// unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist `batch`, bulk-insert `transactions` with `batch.id` set as
    /// their `import_batch_id`, apply `net_change_minor` to the wallet's
    /// balance, and append `merge_annotations` (existing transaction id,
    /// note suffix) to the rows the `merge` duplicate policy matched
    /// against — all in the same atomic unit. `merge_annotations` is
    /// side information about rows this batch chose not to create; it
    /// must commit or fail with the rest, not as a follow-up write.
    async fn commit_import(
        &self,
        batch: NewImportBatch,
        transactions: Vec<NewTransaction>,
        merge_annotations: Vec<(TransactionId, String)>,
    ) -> Result<(ImportBatch, Vec<TransactionId>, i64), Error>;

    /// Delete the batch's transactions, apply `reversals` (wallet id,
    /// signed delta) to the affected wallets, and mark the batch as
    /// undone — all in the same atomic unit as `commit_import`.
    async fn undo_import(
        &self,
        batch_id: ImportBatchId,
        reversals: Vec<(WalletId, i64)>,
        undone_at: DateTime<Utc>,
    ) -> Result<(), Error>;
}

/// Forwarding impls so callers that compose several services over one
/// store (worker pool, executor, cleanup sweeper) can all hold the same
/// `Arc<dyn Trait>` rather than each requiring its own generic parameter.
#[async_trait]
impl<T: UserRepository + ?Sized> UserRepository for Arc<T> {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        (**self).find_by_id(id).await
    }
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        (**self).find_by_email(email).await
    }
    async fn create(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<&str>,
        preferred_currency: Currency,
    ) -> Result<User, Error> {
        (**self).create(email, display_name, picture_url, preferred_currency).await
    }
}

#[async_trait]
impl<T: WalletRepository + ?Sized> WalletRepository for Arc<T> {
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, Error> {
        (**self).find_by_id(id).await
    }
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Wallet>, Error> {
        (**self).list_for_user(user_id).await
    }
    async fn create(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error> {
        (**self).create(user_id, name, wallet_type, currency).await
    }
    async fn apply_balance_delta(&self, id: WalletId, delta_minor: i64) -> Result<i64, Error> {
        (**self).apply_balance_delta(id, delta_minor).await
    }
}

#[async_trait]
impl<T: CategoryRepository + ?Sized> CategoryRepository for Arc<T> {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Category>, Error> {
        (**self).list_for_user(user_id).await
    }
    async fn create(&self, user_id: UserId, name: &str, icon: Option<&str>) -> Result<Category, Error> {
        (**self).create(user_id, name, icon).await
    }
    async fn seed_defaults(&self, user_id: UserId) -> Result<(), Error> {
        (**self).seed_defaults(user_id).await
    }
}

#[async_trait]
impl<T: TransactionRepository + ?Sized> TransactionRepository for Arc<T> {
    async fn bulk_create(&self, transactions: Vec<NewTransaction>) -> Result<Vec<TransactionId>, Error> {
        (**self).bulk_create(transactions).await
    }
    async fn find_by_import_batch(&self, batch_id: ImportBatchId) -> Result<Vec<Transaction>, Error> {
        (**self).find_by_import_batch(batch_id).await
    }
    async fn find_candidates(
        &self,
        wallet_id: WalletId,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, Error> {
        (**self).find_candidates(wallet_id, amount_minor, from, to).await
    }
    async fn delete_by_import_batch(&self, batch_id: ImportBatchId) -> Result<(), Error> {
        (**self).delete_by_import_batch(batch_id).await
    }
}

#[async_trait]
impl<T: ImportBatchRepository + ?Sized> ImportBatchRepository for Arc<T> {
    async fn find_by_id(&self, id: ImportBatchId) -> Result<Option<ImportBatch>, Error> {
        (**self).find_by_id(id).await
    }
    async fn mark_undone(&self, id: ImportBatchId, undone_at: DateTime<Utc>) -> Result<(), Error> {
        (**self).mark_undone(id, undone_at).await
    }
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for Arc<T> {
    async fn commit_import(
        &self,
        batch: NewImportBatch,
        transactions: Vec<NewTransaction>,
        merge_annotations: Vec<(TransactionId, String)>,
    ) -> Result<(ImportBatch, Vec<TransactionId>, i64), Error> {
        (**self).commit_import(batch, transactions, merge_annotations).await
    }
    async fn undo_import(
        &self,
        batch_id: ImportBatchId,
        reversals: Vec<(WalletId, i64)>,
        undone_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        (**self).undo_import(batch_id, reversals, undone_at).await
    }
}
