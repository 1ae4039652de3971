//! Supported inbound payload schemas and the metadata keyed off them.
//!
//! Every routing decision hangs off [`SchemaKind`]: which payload field carries
//! the external identifier, which registry column owns the mapping, how the
//! cache key is prefixed, and which [`ClassificationCode`] is persisted with
//! the row. All of these are fixed tables here so that no value read from a
//! payload ever selects a column or a code.

use serde::{Deserialize, Serialize};

/// Which messaging-platform payload shape an event matches.
///
/// Variants are declared in priority order: when a payload satisfies more
/// than one shape, the earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaKind {
    /// Meta `WhatsApp` Business webhook (`entry[0].id`).
    MetaBusiness,
    /// Whapi channel webhook (`channel_id`).
    WhapiChannel,
}

impl SchemaKind {
    /// All kinds in extraction priority order.
    pub const PRIORITY: [SchemaKind; 2] = [SchemaKind::MetaBusiness, SchemaKind::WhapiChannel];

    /// Registry column that maps this kind's identifier to a store name.
    #[must_use]
    pub const fn registry_column(self) -> &'static str {
        match self {
            Self::MetaBusiness => "MetaIdWppBusiness",
            Self::WhapiChannel => "WhapiChannelID",
        }
    }

    /// Prefix that namespaces this kind's identifiers inside the tenant cache.
    #[must_use]
    pub const fn cache_prefix(self) -> &'static str {
        match self {
            Self::MetaBusiness => "META_",
            Self::WhapiChannel => "WHAPI_",
        }
    }

    /// Classification code persisted alongside payloads of this kind.
    #[must_use]
    pub const fn classification(self) -> ClassificationCode {
        match self {
            Self::MetaBusiness => ClassificationCode::Meta,
            Self::WhapiChannel => ClassificationCode::Whapi,
        }
    }

    /// Short lowercase label used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetaBusiness => "meta",
            Self::WhapiChannel => "whapi",
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source classification recorded with every persisted payload.
///
/// Downstream consumers key off the numeric value, so the discriminants are
/// part of the storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ClassificationCode {
    Whapi = 2,
    Meta = 3,
}

impl ClassificationCode {
    /// Integer value as written to the tenant store.
    #[must_use]
    pub const fn value(self) -> i32 {
        self as i32
    }

    /// Decimal string form (`"2"`, `"3"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Whapi => "2",
            Self::Meta => "3",
        }
    }
}

impl std::fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
