use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::SchemaKind;

/// An inbound event as received from the queue.
///
/// Holds the raw body verbatim (that is what gets persisted) next to the
/// parsed document used for identifier extraction. A blank or unparsable body
/// parses to `Value::Null`, which matches no schema.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    raw: Arc<str>,
    document: serde_json::Value,
}

impl InboundEvent {
    /// Wraps a raw queue body. Never fails.
    #[must_use]
    pub fn parse(raw: impl Into<Arc<str>>) -> Self {
        let raw = raw.into();
        let document = if raw.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null)
        };
        Self { raw, document }
    }

    /// The body exactly as delivered.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed JSON document.
    #[must_use]
    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }

    /// Whether the body is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

/// An external identifier pulled out of a payload, tagged with its schema.
///
/// `external_id` is never empty: an absent or empty field produces no
/// candidate at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierCandidate {
    pub kind: SchemaKind,
    pub external_id: String,
}

impl IdentifierCandidate {
    /// Returns `None` for an empty identifier.
    #[must_use]
    pub fn new(kind: SchemaKind, external_id: impl Into<String>) -> Option<Self> {
        let external_id = external_id.into();
        if external_id.is_empty() {
            None
        } else {
            Some(Self { kind, external_id })
        }
    }

    /// Cache key for this candidate.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            kind: self.kind,
            external_id: self.external_id.clone(),
        }
    }
}

/// Tenant cache key: the schema kind plus the raw identifier.
///
/// Equality and hashing include the kind, so identical id strings under
/// different schemas never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub kind: SchemaKind,
    pub external_id: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.cache_prefix(), self.external_id)
    }
}

/// Unquoted SQL identifier of at most 63 bytes (the Postgres limit).
static SQL_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

/// Whether `name` is a plain SQL identifier: ASCII letter or underscore,
/// then letters, digits or underscores, 63 bytes at most.
#[must_use]
pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENT_RE.is_match(name)
}

/// Errors from validating a store name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreNameError {
    #[error("store name is empty")]
    Empty,
    #[error("store name {name:?} is not an allowed identifier")]
    NotAllowed { name: String },
}

/// Name of the tenant store that owns an external identifier.
///
/// Only constructible through [`ResolvedStore::new`], which enforces the
/// identifier allow-list, so a value of this type is always safe to hand to a
/// connection builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedStore(Arc<str>);

impl ResolvedStore {
    /// Validates a store name returned by the registry.
    ///
    /// Surrounding whitespace is trimmed first; registry columns are often
    /// fixed-width.
    ///
    /// # Errors
    ///
    /// Returns [`StoreNameError`] if the trimmed name is empty or contains
    /// anything other than ASCII letters, digits and underscores.
    pub fn new(name: &str) -> Result<Self, StoreNameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreNameError::Empty);
        }
        if !is_sql_identifier(name) {
            return Err(StoreNameError::NotAllowed {
                name: name.to_string(),
            });
        }
        Ok(Self(Arc::from(name)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolvedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
