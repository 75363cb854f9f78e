//! Postgres-backed implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_errors::Error;
use pf_primitives::{CategoryId, Currency, ImportBatchId, TransactionId, UserId, WalletId};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    model::{
        Category, ImportBatch, NewImportBatch, NewTransaction, Transaction, User, Wallet, WalletType,
    },
    repo::{
        CategoryRepository, ImportBatchRepository, LedgerStore, TransactionRepository,
        UserRepository, WalletRepository,
    },
};

const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Food & Drink", "utensils"),
    ("Transport", "car"),
    ("Shopping", "bag"),
    ("Bills & Utilities", "receipt"),
    ("Salary", "banknote"),
    ("Other", "circle"),
];

fn wallet_type_to_str(t: WalletType) -> &'static str {
    match t {
        WalletType::Cash => "cash",
        WalletType::Bank => "bank",
        WalletType::Investment => "investment",
    }
}

fn wallet_type_from_str(s: &str) -> Result<WalletType, Error> {
    match s {
        "cash" => Ok(WalletType::Cash),
        "bank" => Ok(WalletType::Bank),
        "investment" => Ok(WalletType::Investment),
        other => Err(Error::internal(format!("unknown wallet_type in store: {other}"))),
    }
}

fn currency_from_str(s: &str) -> Result<Currency, Error> {
    Currency::parse_code(s).ok_or_else(|| Error::internal(format!("unknown currency in store: {s}")))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: uuid::Uuid,
    email: String,
    display_name: String,
    picture_url: Option<String>,
    preferred_currency: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self, Error> {
        Ok(User {
            id: row.id.into(),
            email: row.email,
            display_name: row.display_name,
            picture_url: row.picture_url,
            preferred_currency: currency_from_str(&row.preferred_currency)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    name: String,
    wallet_type: String,
    currency: String,
    balance_minor: i64,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = Error;

    fn try_from(row: WalletRow) -> Result<Self, Error> {
        Ok(Wallet {
            id: row.id.into(),
            user_id: row.user_id.into(),
            name: row.name,
            wallet_type: wallet_type_from_str(&row.wallet_type)?,
            currency: currency_from_str(&row.currency)?,
            balance_minor: row.balance_minor,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    name: String,
    icon: Option<String>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id.into(),
            user_id: row.user_id.into(),
            name: row.name,
            icon: row.icon,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: uuid::Uuid,
    wallet_id: uuid::Uuid,
    category_id: Option<uuid::Uuid>,
    amount_minor: i64,
    currency: String,
    occurred_at: DateTime<Utc>,
    note: String,
    created_at: DateTime<Utc>,
    import_batch_id: Option<uuid::Uuid>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self, Error> {
        Ok(Transaction {
            id: row.id.into(),
            wallet_id: row.wallet_id.into(),
            category_id: row.category_id.map(CategoryId::from),
            amount_minor: row.amount_minor,
            currency: currency_from_str(&row.currency)?,
            occurred_at: row.occurred_at,
            note: row.note,
            created_at: row.created_at,
            import_batch_id: row.import_batch_id.map(ImportBatchId::from),
        })
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    wallet_id: uuid::Uuid,
    file_name: String,
    imported_at: DateTime<Utc>,
    total_rows: i32,
    valid_rows: i32,
    skipped_rows: i32,
    duplicates_merged: i32,
    duplicates_skipped: i32,
    total_income_minor: i64,
    total_expenses_minor: i64,
    net_change_minor: i64,
    date_range_start: Option<DateTime<Utc>>,
    date_range_end: Option<DateTime<Utc>>,
    can_undo: bool,
    undo_expires_at: DateTime<Utc>,
    undone_at: Option<DateTime<Utc>>,
}

impl From<BatchRow> for ImportBatch {
    fn from(row: BatchRow) -> Self {
        ImportBatch {
            id: row.id.into(),
            user_id: row.user_id.into(),
            wallet_id: row.wallet_id.into(),
            file_name: row.file_name,
            imported_at: row.imported_at,
            total_rows: row.total_rows,
            valid_rows: row.valid_rows,
            skipped_rows: row.skipped_rows,
            duplicates_merged: row.duplicates_merged,
            duplicates_skipped: row.duplicates_skipped,
            total_income_minor: row.total_income_minor,
            total_expenses_minor: row.total_expenses_minor,
            net_change_minor: row.net_change_minor,
            date_range_start: row.date_range_start,
            date_range_end: row.date_range_end,
            can_undo: row.can_undo,
            undo_expires_at: row.undo_expires_at,
            undone_at: row.undone_at,
        }
    }
}

const BATCH_COLUMNS: &str = "id, user_id, wallet_id, file_name, imported_at, total_rows, valid_rows, \
     skipped_rows, duplicates_merged, duplicates_skipped, total_income_minor, \
     total_expenses_minor, net_change_minor, date_range_start, date_range_end, \
     can_undo, undo_expires_at, undone_at";

const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, category_id, amount_minor, currency, occurred_at, note, created_at, import_batch_id";

/// Postgres connection pool wrapped behind the repository traits. One
/// instance is shared across the process; cloning is cheap (it clones
/// the underlying `sqlx::PgPool`, itself an `Arc`).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| Error::internal(format!("failed to connect to postgres: {e}")))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, picture_url, preferred_currency, created_at \
             FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("find_by_id(user): {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, picture_url, preferred_currency, created_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("find_by_email: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn create(
        &self,
        email: &str,
        display_name: &str,
        picture_url: Option<&str>,
        preferred_currency: Currency,
    ) -> Result<User, Error> {
        let id = UserId::new();
        let created_at: (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO users (id, email, display_name, picture_url, preferred_currency, created_at) \
             VALUES ($1, $2, $3, $4, $5, now()) RETURNING created_at",
        )
        .bind(id.as_uuid())
        .bind(email)
        .bind(display_name)
        .bind(picture_url)
        .bind(preferred_currency.code())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("create(user): {e}")))?;

        Ok(User {
            id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            picture_url: picture_url.map(str::to_string),
            preferred_currency,
            created_at: created_at.0,
        })
    }
}

#[async_trait]
impl WalletRepository for PgStore {
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, Error> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT id, user_id, name, wallet_type, currency, balance_minor FROM wallets WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("find_by_id(wallet): {e}")))?;

        row.map(Wallet::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Wallet>, Error> {
        let rows = sqlx::query_as::<_, WalletRow>(
            "SELECT id, user_id, name, wallet_type, currency, balance_minor FROM wallets \
             WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("list_for_user(wallet): {e}")))?;

        rows.into_iter().map(Wallet::try_from).collect()
    }

    async fn create(
        &self,
        user_id: UserId,
        name: &str,
        wallet_type: WalletType,
        currency: Currency,
    ) -> Result<Wallet, Error> {
        let id = WalletId::new();
        sqlx::query(
            "INSERT INTO wallets (id, user_id, name, wallet_type, currency, balance_minor) \
             VALUES ($1, $2, $3, $4, $5, 0)",
        )
        .bind(id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(name)
        .bind(wallet_type_to_str(wallet_type))
        .bind(currency.code())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("create(wallet): {e}")))?;

        Ok(Wallet {
            id,
            user_id,
            name: name.to_string(),
            wallet_type,
            currency,
            balance_minor: 0,
        })
    }

    async fn apply_balance_delta(&self, id: WalletId, delta_minor: i64) -> Result<i64, Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE wallets SET balance_minor = balance_minor + $1 WHERE id = $2 RETURNING balance_minor",
        )
        .bind(delta_minor)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("apply_balance_delta: {e}")))?;

        row.map(|r| r.0).ok_or_else(|| Error::not_found("wallet not found"))
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Category>, Error> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, user_id, name, icon FROM categories WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::internal(format!("list_for_user(category): {e}")))?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn create(&self, user_id: UserId, name: &str, icon: Option<&str>) -> Result<Category, Error> {
        let id = CategoryId::new();
        sqlx::query("INSERT INTO categories (id, user_id, name, icon) VALUES ($1, $2, $3, $4)")
            .bind(id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(name)
            .bind(icon)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("create(category): {e}")))?;

        Ok(Category {
            id,
            user_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
        })
    }

    async fn seed_defaults(&self, user_id: UserId) -> Result<(), Error> {
        for (name, icon) in DEFAULT_CATEGORIES {
            self.create(user_id, name, Some(icon)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for PgStore {
    async fn bulk_create(&self, transactions: Vec<NewTransaction>) -> Result<Vec<TransactionId>, Error> {
        let mut ids = Vec::with_capacity(transactions.len());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::internal(format!("bulk_create begin: {e}")))?;

        for new_tx in &transactions {
            let id = TransactionId::new();
            sqlx::query(
                "INSERT INTO transactions \
                 (id, wallet_id, category_id, amount_minor, currency, occurred_at, note, created_at, import_batch_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, now(), $8)",
            )
            .bind(id.as_uuid())
            .bind(new_tx.wallet_id.as_uuid())
            .bind(new_tx.category_id.map(|c| c.as_uuid()))
            .bind(new_tx.amount_minor)
            .bind(new_tx.currency.code())
            .bind(new_tx.occurred_at)
            .bind(&new_tx.note)
            .bind(new_tx.import_batch_id.map(|b| b.as_uuid()))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::internal(format!("bulk_create insert: {e}")))?;
            ids.push(id);
        }

        tx.commit()
            .await
            .map_err(|e| Error::internal(format!("bulk_create commit: {e}")))?;
        Ok(ids)
    }

    async fn find_by_import_batch(&self, batch_id: ImportBatchId) -> Result<Vec<Transaction>, Error> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE import_batch_id = $1 ORDER BY occurred_at"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(batch_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("find_by_import_batch: {e}")))?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn find_candidates(
        &self,
        wallet_id: WalletId,
        amount_minor: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, Error> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE wallet_id = $1 AND amount_minor = $2 AND occurred_at BETWEEN $3 AND $4"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(wallet_id.as_uuid())
            .bind(amount_minor)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("find_candidates: {e}")))?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn delete_by_import_batch(&self, batch_id: ImportBatchId) -> Result<(), Error> {
        sqlx::query("DELETE FROM transactions WHERE import_batch_id = $1")
            .bind(batch_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("delete_by_import_batch: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ImportBatchRepository for PgStore {
    async fn find_by_id(&self, id: ImportBatchId) -> Result<Option<ImportBatch>, Error> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM import_batches WHERE id = $1");
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("find_by_id(batch): {e}")))?;
        Ok(row.map(ImportBatch::from))
    }

    async fn mark_undone(&self, id: ImportBatchId, undone_at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE import_batches SET undone_at = $1, can_undo = false WHERE id = $2")
            .bind(undone_at)
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::internal(format!("mark_undone: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn commit_import(
        &self,
        batch: NewImportBatch,
        transactions: Vec<NewTransaction>,
        merge_annotations: Vec<(TransactionId, String)>,
    ) -> Result<(ImportBatch, Vec<TransactionId>, i64), Error> {
        let id = ImportBatchId::new();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::internal(format!("commit_import begin: {e}")))?;

        sqlx::query(
            "INSERT INTO import_batches \
             (id, user_id, wallet_id, file_name, imported_at, total_rows, valid_rows, skipped_rows, \
              duplicates_merged, duplicates_skipped, total_income_minor, total_expenses_minor, \
              net_change_minor, date_range_start, date_range_end, can_undo, undo_expires_at, undone_at) \
             VALUES ($1,$2,$3,$4,now(),$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,true,$15,NULL)",
        )
        .bind(id.as_uuid())
        .bind(batch.user_id.as_uuid())
        .bind(batch.wallet_id.as_uuid())
        .bind(&batch.file_name)
        .bind(batch.total_rows)
        .bind(batch.valid_rows)
        .bind(batch.skipped_rows)
        .bind(batch.duplicates_merged)
        .bind(batch.duplicates_skipped)
        .bind(batch.total_income_minor)
        .bind(batch.total_expenses_minor)
        .bind(batch.net_change_minor)
        .bind(batch.date_range_start)
        .bind(batch.date_range_end)
        .bind(batch.undo_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::internal(format!("commit_import insert batch: {e}")))?;

        let mut transaction_ids = Vec::with_capacity(transactions.len());
        for new_tx in &transactions {
            let tx_id = TransactionId::new();
            sqlx::query(
                "INSERT INTO transactions \
                 (id, wallet_id, category_id, amount_minor, currency, occurred_at, note, created_at, import_batch_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, now(), $8)",
            )
            .bind(tx_id.as_uuid())
            .bind(new_tx.wallet_id.as_uuid())
            .bind(new_tx.category_id.map(|c| c.as_uuid()))
            .bind(new_tx.amount_minor)
            .bind(new_tx.currency.code())
            .bind(new_tx.occurred_at)
            .bind(&new_tx.note)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::internal(format!("commit_import insert transaction: {e}")))?;
            transaction_ids.push(tx_id);
        }

        for (existing_id, note_suffix) in &merge_annotations {
            sqlx::query("UPDATE transactions SET note = note || $1 WHERE id = $2")
                .bind(note_suffix)
                .bind(existing_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::internal(format!("commit_import annotate merge: {e}")))?;
        }

        let new_balance: (i64,) = sqlx::query_as(
            "UPDATE wallets SET balance_minor = balance_minor + $1 WHERE id = $2 RETURNING balance_minor",
        )
        .bind(batch.net_change_minor)
        .bind(batch.wallet_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::internal(format!("commit_import balance update: {e}")))?
        .ok_or_else(|| Error::not_found("wallet not found"))?;

        tx.commit()
            .await
            .map_err(|e| Error::internal(format!("commit_import commit: {e}")))?;

        Ok((
            ImportBatch {
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
            },
            transaction_ids,
            new_balance.0,
        ))
    }

    async fn undo_import(
        &self,
        batch_id: ImportBatchId,
        reversals: Vec<(WalletId, i64)>,
        undone_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::internal(format!("undo_import begin: {e}")))?;

        sqlx::query("DELETE FROM transactions WHERE import_batch_id = $1")
            .bind(batch_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::internal(format!("undo_import delete transactions: {e}")))?;

        for (wallet_id, delta_minor) in reversals {
            sqlx::query("UPDATE wallets SET balance_minor = balance_minor + $1 WHERE id = $2")
                .bind(delta_minor)
                .bind(wallet_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::internal(format!("undo_import apply reversal: {e}")))?;
        }

        sqlx::query("UPDATE import_batches SET undone_at = $1, can_undo = false WHERE id = $2")
            .bind(undone_at)
            .bind(batch_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::internal(format!("undo_import mark batch: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| Error::internal(format!("undo_import commit: {e}")))?;
        Ok(())
    }
}
