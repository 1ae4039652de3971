//! Identifier extraction from inbound payloads.
//!
//! Each [`SchemaKind`] knows where its external identifier lives in the JSON
//! document. Extraction walks the kinds in priority order and stops at the
//! first one that yields a non-empty identifier, so a payload that happens to
//! satisfy several shapes is routed by the highest-priority one only.

use serde_json::Value;

use crate::schema::SchemaKind;
use crate::types::{IdentifierCandidate, InboundEvent};

/// Returns the routing candidates for an event, highest priority first.
///
/// Never fails: malformed or unrecognized payloads yield an empty vector.
/// Because extraction short-circuits on the first match, the result holds at
/// most one candidate per call; callers should still treat it as an ordered
/// sequence.
#[must_use]
pub fn extract(event: &InboundEvent) -> Vec<IdentifierCandidate> {
    extract_document(event.document())
}

/// [`extract`] over an already-parsed document.
#[must_use]
pub fn extract_document(document: &Value) -> Vec<IdentifierCandidate> {
    SchemaKind::PRIORITY
        .iter()
        .find_map(|&kind| extract_kind(document, kind))
        .into_iter()
        .collect()
}

/// Reads the identifier for a single schema kind, if present and non-empty.
#[must_use]
pub fn extract_kind(document: &Value, kind: SchemaKind) -> Option<IdentifierCandidate> {
    let field = match kind {
        SchemaKind::MetaBusiness => document.get("entry")?.get(0)?.get("id")?,
        SchemaKind::WhapiChannel => document.get("channel_id")?,
    };
    IdentifierCandidate::new(kind, scalar_text(field)?)
}

/// Strings verbatim, numbers as their literal JSON text; nothing else.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
