//! Strongly-typed identifiers, so e.g. an `AccountId` can never be passed
//! where a `TransactionId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
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

uuid_id!(AccountId);
uuid_id!(TransactionId);
uuid_id!(ApiKeyId);

/// Catalog product identifier; stable across price changes (spec §3 Product).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account can be referenced either by its internal id or, before it's
/// been resolved, by one of its external handles (spec §3 Account).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AccountRef {
    Id(AccountId),
    ExternalChatId(i64),
    Email(String),
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "{id}"),
            AccountRef::ExternalChatId(chat_id) => write!(f, "chat:{chat_id}"),
            AccountRef::Email(email) => write!(f, "email:{email}"),
        }
    }
}
