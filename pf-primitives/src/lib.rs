//! Money, currency, identifier, and gold-unit primitives shared across
//! the personal-finance backend (C1).

pub mod currency;
pub mod gold_unit;
pub mod ids;
pub mod money;

pub use currency::Currency;
pub use gold_unit::{GoldType, GoldUnit};
pub use ids::{
    CategoryId, GoldHoldingId, ImportBatchId, ImportJobId, SessionId, TransactionId, UserId, WalletId,
};
pub use money::Money;
