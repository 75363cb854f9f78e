//! Ledger/wallet store (C12): entities, repository traits, and the
//! Postgres-backed and in-memory implementations of them.

pub mod inmemory;
pub mod model;
pub mod postgres;
pub mod repo;

pub use inmemory::InMemoryStore;
pub use model::{
    Category, ImportBatch, NewImportBatch, NewTransaction, Transaction, User, Wallet, WalletType,
};
pub use postgres::PgStore;
pub use repo::{
    CategoryRepository, ImportBatchRepository, LedgerStore, TransactionRepository,
    UserRepository, WalletRepository,
};
