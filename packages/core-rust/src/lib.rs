//! Inbound Core — payload schemas, identifier extraction, and routing types.

pub mod extract;
pub mod schema;
pub mod types;

pub use extract::{extract, extract_document};
pub use schema::{ClassificationCode, SchemaKind};
pub use types::{
    is_sql_identifier, CacheKey, IdentifierCandidate, InboundEvent, ResolvedStore, StoreNameError,
};
