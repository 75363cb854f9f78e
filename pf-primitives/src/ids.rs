//! Newtype identifiers for the entities in the data model.
//!
//! Each id wraps a [`uuid::Uuid`] so the compiler stops a `WalletId` from
//! being handed where a `UserId` is expected, the way the codebase keeps
//! `RegistryId`/`TokenId` distinct rather than passing raw integers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(UserId);
id_type!(WalletId);
id_type!(TransactionId);
id_type!(CategoryId);
id_type!(SessionId);
id_type!(ImportBatchId);
id_type!(ImportJobId);
id_type!(GoldHoldingId);
