//! Import Executor (C9) and Undo Manager (C10): the two operations that
//! touch a committed import batch, both built on the atomic
//! `LedgerStore` primitive in `pf-store`.

pub mod executor;
pub mod request;
pub mod undo;

pub use executor::{ImportExecutor, ImportResult, RowOutcome};
pub use request::{DuplicatePolicy, ExecuteImportRequest, ExecuteImportRequestBuilder, ParsedTransactionRow};
pub use undo::{UndoManager, UndoResult};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pf_primitives::Currency;
    use pf_store::{InMemoryStore, UserRepository, WalletRepository, WalletType};
    use std::sync::Arc;

    fn executor(store: Arc<InMemoryStore>) -> ImportExecutor {
        ImportExecutor::new(store.clone(), store.clone(), store)
    }

    fn undo_manager(store: Arc<InMemoryStore>) -> UndoManager {
        UndoManager::new(store.clone(), store.clone(), store)
    }

    #[tokio::test]
    async fn happy_import_updates_balance_and_aggregates() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();
        store.apply_balance_delta(wallet.id, 1_000_000).await.unwrap();

        let now = Utc::now();
        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .file_name("statement.csv")
            .rows(vec![
                ParsedTransactionRow {
                    row_number: 1,
                    amount_minor: -200_000,
                    currency: Currency::Vnd,
                    occurred_at: now,
                    note: "coffee".into(),
                    category_id: None,
                },
                ParsedTransactionRow {
                    row_number: 2,
                    amount_minor: 500_000,
                    currency: Currency::Vnd,
                    occurred_at: now,
                    note: "salary".into(),
                    category_id: None,
                },
            ])
            .build();

        let result = executor(store.clone()).execute_import(request).await.unwrap();

        assert_eq!(result.total_imported(), 2);
        assert_eq!(result.wallet_balance_minor, 1_300_000);
        assert_eq!(result.batch.total_income_minor, 500_000);
        assert_eq!(result.batch.total_expenses_minor, 200_000);
        assert_eq!(result.batch.net_change_minor, 300_000);
        assert!(result.batch.can_undo);
    }

    #[tokio::test]
    async fn undo_within_window_restores_balance() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();
        store.apply_balance_delta(wallet.id, 1_000_000).await.unwrap();

        let now = Utc::now();
        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .rows(vec![ParsedTransactionRow {
                row_number: 1,
                amount_minor: -200_000,
                currency: Currency::Vnd,
                occurred_at: now,
                note: "coffee".into(),
                category_id: None,
            }])
            .build();

        let result = executor(store.clone()).execute_import(request).await.unwrap();
        assert_eq!(result.wallet_balance_minor, 800_000);

        undo_manager(store.clone())
            .undo_import(user.id, result.batch.id)
            .await
            .unwrap();

        let wallet_after = store.find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet_after.balance_minor, 1_000_000);
    }

    #[tokio::test]
    async fn undo_after_window_expires_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();

        let now = Utc::now();
        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .rows(vec![ParsedTransactionRow {
                row_number: 1,
                amount_minor: -200_000,
                currency: Currency::Vnd,
                occurred_at: now,
                note: "coffee".into(),
                category_id: None,
            }])
            .build();

        let result = executor(store.clone()).execute_import(request).await.unwrap();

        let far_future = result.batch.imported_at + Duration::hours(24) + Duration::seconds(1);
        let err = undo_manager(store.clone())
            .undo_import_at(user.id, result.batch.id, far_future)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), pf_errors::ErrorKind::UndoExpired);

        let wallet_after = store.find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(wallet_after.balance_minor, -200_000);
    }

    #[tokio::test]
    async fn excluded_row_is_dropped_before_duplicate_resolution() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();

        let now = Utc::now();
        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .rows(vec![
                ParsedTransactionRow {
                    row_number: 1,
                    amount_minor: -200_000,
                    currency: Currency::Vnd,
                    occurred_at: now,
                    note: "coffee".into(),
                    category_id: None,
                },
                ParsedTransactionRow {
                    row_number: 2,
                    amount_minor: 300_000,
                    currency: Currency::Vnd,
                    occurred_at: now,
                    note: "salary".into(),
                    category_id: None,
                },
            ])
            .exclude_row(1)
            .duplicate_policy(1, DuplicatePolicy::Merge)
            .build();

        let result = executor(store).execute_import(request).await.unwrap();
        assert_eq!(result.total_imported(), 1);
        assert_eq!(
            result.row_outcomes.iter().find(|(n, _)| *n == 1).unwrap().1,
            RowOutcome::SkippedExcluded
        );
    }

    #[tokio::test]
    async fn import_with_only_excluded_rows_is_validation_error() {
        let store = Arc::new(InMemoryStore::new());
        let user = store.create("a@b.com", "A", None, Currency::Vnd).await.unwrap();
        let wallet = store
            .create(user.id, "Cash", WalletType::Cash, Currency::Vnd)
            .await
            .unwrap();

        let now = Utc::now();
        let request = ExecuteImportRequestBuilder::new(user.id, wallet.id)
            .rows(vec![ParsedTransactionRow {
                row_number: 1,
                amount_minor: -200_000,
                currency: Currency::Vnd,
                occurred_at: now,
                note: "coffee".into(),
                category_id: None,
            }])
            .exclude_row(1)
            .build();

        let err = executor(store).execute_import(request).await.unwrap_err();
        assert_eq!(err.kind(), pf_errors::ErrorKind::Validation);
    }
}
