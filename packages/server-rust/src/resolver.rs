//! Tenant resolution: payload identifier -> owning store.
//!
//! Orchestrates extraction, the shared [`TenantCache`], and the
//! [`RegistryClient`]. Every call makes at most one registry query and at most
//! one cache write.
//!
//! Only the highest-priority identifier present in a payload is ever looked
//! up. If the registry has no row for it, the event is unresolved even when a
//! lower-priority identifier is also present: the schema kind that matched
//! first also decides the classification code, so falling back would persist
//! the row under the wrong source.

use std::sync::Arc;

use inbound_core::{extract, InboundEvent, ResolvedStore, SchemaKind};
use metrics::counter;
use tracing::debug;

use crate::traits::{RegistryClient, TenantCache};

/// Where a resolved store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Registry,
}

/// Why an event could not be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The body was empty or whitespace only.
    EmptyBody,
    /// No supported schema produced a non-empty identifier.
    NoIdentifier,
    /// The registry holds no mapping for the winning identifier.
    NoMapping {
        kind: SchemaKind,
        external_id: String,
    },
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBody => f.write_str("empty body"),
            Self::NoIdentifier => f.write_str("no recognizable identifier"),
            Self::NoMapping { kind, external_id } => {
                write!(f, "no registry mapping for {kind} id {external_id:?}")
            }
        }
    }
}

/// Outcome of resolving one event. `Unresolved` is terminal but not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        store: ResolvedStore,
        kind: SchemaKind,
        source: LookupSource,
    },
    Unresolved(UnresolvedReason),
}

/// Errors that abort resolution of a single event.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("registry lookup failed for {kind} id {external_id:?}")]
    Registry {
        kind: SchemaKind,
        external_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Resolves inbound events to their owning tenant store.
///
/// Cheap to share: holds only `Arc`s to the cache and registry.
#[derive(Clone)]
pub struct Resolver {
    cache: Arc<dyn TenantCache>,
    registry: Arc<dyn RegistryClient>,
}

impl Resolver {
    #[must_use]
    pub fn new(cache: Arc<dyn TenantCache>, registry: Arc<dyn RegistryClient>) -> Self {
        Self { cache, registry }
    }

    /// The cache this resolver reads and populates.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn TenantCache> {
        &self.cache
    }

    /// Resolves `event` to its tenant store.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Registry`] when the registry query itself
    /// fails. A missing mapping is reported as [`Resolution::Unresolved`].
    pub async fn resolve(&self, event: &InboundEvent) -> Result<Resolution, ResolveError> {
        if event.is_blank() {
            return Ok(Resolution::Unresolved(UnresolvedReason::EmptyBody));
        }

        let Some(candidate) = extract(event).into_iter().next() else {
            return Ok(Resolution::Unresolved(UnresolvedReason::NoIdentifier));
        };
        let kind = candidate.kind;
        let key = candidate.cache_key();

        if let Some(store) = self.cache.get(&key) {
            counter!("tenant_cache_lookups_total", "result" => "hit").increment(1);
            debug!(%key, %store, "tenant cache hit");
            return Ok(Resolution::Resolved {
                store,
                kind,
                source: LookupSource::Cache,
            });
        }
        counter!("tenant_cache_lookups_total", "result" => "miss").increment(1);

        let found = self
            .registry
            .lookup(kind, &candidate.external_id)
            .await
            .map_err(|source| ResolveError::Registry {
                kind,
                external_id: candidate.external_id.clone(),
                source,
            })?;

        match found {
            Some(store) => {
                // A concurrent resolver may have inserted first; route by
                // whatever the cache holds so all callers agree.
                let store = self.cache.put(key, store);
                debug!(%store, %kind, "tenant resolved from registry");
                Ok(Resolution::Resolved {
                    store,
                    kind,
                    source: LookupSource::Registry,
                })
            }
            None => Ok(Resolution::Unresolved(UnresolvedReason::NoMapping {
                kind,
                external_id: candidate.external_id,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::DashMapTenantCache;
    use crate::storage::MemoryRegistry;

    fn resolver(registry: &Arc<MemoryRegistry>) -> Resolver {
        Resolver::new(
            Arc::new(DashMapTenantCache::new()),
            Arc::clone(registry) as Arc<dyn RegistryClient>,
        )
    }

    fn store(name: &str) -> ResolvedStore {
        ResolvedStore::new(name).unwrap()
    }

    #[tokio::test]
    async fn resolves_meta_from_registry_then_cache() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(SchemaKind::MetaBusiness, "BIZ123", "store_A");
        let resolver = resolver(&registry);
        let event = InboundEvent::parse(r#"{"entry":[{"id":"BIZ123"}]}"#);

        let first = resolver.resolve(&event).await.unwrap();
        assert_eq!(
            first,
            Resolution::Resolved {
                store: store("store_A"),
                kind: SchemaKind::MetaBusiness,
                source: LookupSource::Registry,
            }
        );
        assert_eq!(registry.lookup_count(), 1);

        let second = resolver.resolve(&event).await.unwrap();
        assert_eq!(
            second,
            Resolution::Resolved {
                store: store("store_A"),
                kind: SchemaKind::MetaBusiness,
                source: LookupSource::Cache,
            }
        );
        assert_eq!(registry.lookup_count(), 1, "cache hit must not query registry");
    }

    #[tokio::test]
    async fn no_identifier_skips_registry() {
        let registry = Arc::new(MemoryRegistry::new());
        let resolver = resolver(&registry);

        for body in [r#"{"foo":"bar"}"#, "not json", r#"{"channel_id":""}"#] {
            let res = resolver.resolve(&InboundEvent::parse(body)).await.unwrap();
            assert_eq!(res, Resolution::Unresolved(UnresolvedReason::NoIdentifier));
        }
        let res = resolver.resolve(&InboundEvent::parse("  ")).await.unwrap();
        assert_eq!(res, Resolution::Unresolved(UnresolvedReason::EmptyBody));
        assert_eq!(registry.lookup_count(), 0);
    }

    #[tokio::test]
    async fn missing_mapping_is_unresolved_and_not_cached() {
        let registry = Arc::new(MemoryRegistry::new());
        let resolver = resolver(&registry);
        let event = InboundEvent::parse(r#"{"channel_id":"CHX"}"#);

        let res = resolver.resolve(&event).await.unwrap();
        assert_eq!(
            res,
            Resolution::Unresolved(UnresolvedReason::NoMapping {
                kind: SchemaKind::WhapiChannel,
                external_id: "CHX".to_string(),
            })
        );
        assert!(resolver.cache().is_empty());

        // No negative caching: a later registration becomes visible.
        registry.insert(SchemaKind::WhapiChannel, "CHX", "late_store");
        let res = resolver.resolve(&event).await.unwrap();
        assert!(matches!(res, Resolution::Resolved { ref store, .. } if store.as_str() == "late_store"));
        assert_eq!(registry.lookup_count(), 2);
    }

    #[tokio::test]
    async fn does_not_fall_back_to_lower_priority() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(SchemaKind::WhapiChannel, "CH1", "whapi_store");
        let resolver = resolver(&registry);
        let event = InboundEvent::parse(r#"{"entry":[{"id":"UNKNOWN"}],"channel_id":"CH1"}"#);

        let res = resolver.resolve(&event).await.unwrap();
        assert!(matches!(
            res,
            Resolution::Unresolved(UnresolvedReason::NoMapping {
                kind: SchemaKind::MetaBusiness,
                ..
            })
        ));
        assert_eq!(registry.lookup_count(), 1);
    }

    #[tokio::test]
    async fn registry_failure_propagates_and_caches_nothing() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(SchemaKind::WhapiChannel, "CH77", "store_B");
        registry.fail_next("connection reset");
        let resolver = resolver(&registry);
        let event = InboundEvent::parse(r#"{"channel_id":"CH77"}"#);

        let err = resolver.resolve(&event).await.unwrap_err();
        let ResolveError::Registry {
            kind, external_id, ..
        } = &err;
        assert_eq!(*kind, SchemaKind::WhapiChannel);
        assert_eq!(external_id, "CH77");
        assert!(resolver.cache().is_empty());

        // The failure was one-shot; redelivery succeeds.
        let res = resolver.resolve(&event).await.unwrap();
        assert!(matches!(res, Resolution::Resolved { .. }));
    }

    #[tokio::test]
    async fn invalid_store_name_from_registry_is_an_error() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(SchemaKind::WhapiChannel, "CH9", "bad;name");
        let resolver = resolver(&registry);

        let res = resolver
            .resolve(&InboundEvent::parse(r#"{"channel_id":"CH9"}"#))
            .await;
        assert!(res.is_err());
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolution_converges() {
        let registry = Arc::new(MemoryRegistry::new().with_latency(Duration::from_millis(20)));
        registry.insert(SchemaKind::WhapiChannel, "CH77", "store_B");
        let resolver = resolver(&registry);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve(&InboundEvent::parse(r#"{"channel_id":"CH77"}"#))
                    .await
            }));
        }

        for handle in handles {
            let res = handle.await.unwrap().unwrap();
            assert!(matches!(res, Resolution::Resolved { ref store, .. } if store.as_str() == "store_B"));
        }
        assert_eq!(resolver.cache().len(), 1);
        let lookups = registry.lookup_count();
        assert!((1..=32).contains(&lookups));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_writers_all_route_to_the_cached_value() {
        // A registry that answers differently per call: the cache must still
        // hand every caller the single value that won the insert.
        let registry = Arc::new(
            MemoryRegistry::new()
                .with_latency(Duration::from_millis(10))
                .with_rotating_answers(vec!["store_1", "store_2", "store_3"]),
        );
        let resolver = resolver(&registry);

        let mut handles = Vec::new();
        for _ in 0..24 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve(&InboundEvent::parse(r#"{"channel_id":"CH1"}"#))
                    .await
            }));
        }

        let mut stores = Vec::new();
        for handle in handles {
            if let Resolution::Resolved { store, .. } = handle.await.unwrap().unwrap() {
                stores.push(store);
            }
        }
        assert_eq!(stores.len(), 24);
        let winner = resolver
            .cache()
            .get(&inbound_core::CacheKey {
                kind: SchemaKind::WhapiChannel,
                external_id: "CH1".to_string(),
            })
            .unwrap();
        assert!(stores.iter().all(|s| *s == winner));
    }
}
