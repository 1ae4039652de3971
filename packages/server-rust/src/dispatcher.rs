//! Per-message pipeline: resolve the owning tenant, then persist.
//!
//! ```text
//! Received -> Extracted -> Resolved -> Persisted
//!                       |           \-> Failed (DispatchError, propagated)
//!                       \-> Unresolved (dropped, logged)
//! ```
//!
//! There is no retry in here. Errors propagate so the queue transport can
//! redeliver; a redelivered message that already reached the tenant store
//! is written again, since the insert carries no idempotency key.

use std::sync::Arc;

use inbound_core::{ClassificationCode, InboundEvent, ResolvedStore, SchemaKind};
use metrics::counter;
use tracing::{info, warn};

use crate::resolver::{Resolution, ResolveError, Resolver, UnresolvedReason};
use crate::traits::TenantStore;

/// Errors from the persistence step.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("write to tenant store {store} failed")]
    Write {
        store: ResolvedStore,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors that fail a message and request redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("message task aborted: {0}")]
    Aborted(String),
}

/// Terminal, non-error result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Persisted {
        store: ResolvedStore,
        code: ClassificationCode,
    },
    Dropped(UnresolvedReason),
}

impl MessageOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Persisted { .. } => "persisted",
            Self::Dropped(_) => "dropped",
        }
    }
}

/// Resolves and persists inbound events.
pub struct Dispatcher {
    resolver: Resolver,
    store: Arc<dyn TenantStore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(resolver: Resolver, store: Arc<dyn TenantStore>) -> Self {
        Self { resolver, store }
    }

    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Writes `event` into `store`, tagged with the code for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Write`] if the tenant store rejects the
    /// write or cannot be reached.
    pub async fn dispatch(
        &self,
        event: &InboundEvent,
        store: &ResolvedStore,
        kind: SchemaKind,
    ) -> Result<ClassificationCode, DispatchError> {
        let code = kind.classification();
        self.store
            .append(store, event.raw(), code)
            .await
            .map_err(|source| DispatchError::Write {
                store: store.clone(),
                source,
            })?;
        info!(store = %store, code = %code, "payload persisted");
        Ok(code)
    }

    /// Runs the full pipeline for one event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the registry lookup or the write fails.
    /// Unroutable events are not errors: they come back as
    /// [`MessageOutcome::Dropped`].
    pub async fn handle(&self, event: &InboundEvent) -> Result<MessageOutcome, ProcessError> {
        let result = self.route(event).await;
        counter!("inbound_messages_total", "outcome" => outcome_label(&result)).increment(1);
        result
    }

    async fn route(&self, event: &InboundEvent) -> Result<MessageOutcome, ProcessError> {
        match self.resolver.resolve(event).await? {
            Resolution::Resolved { store, kind, .. } => {
                let code = self.dispatch(event, &store, kind).await?;
                Ok(MessageOutcome::Persisted { store, code })
            }
            Resolution::Unresolved(reason) => {
                warn!(%reason, "dropping message without tenant mapping");
                Ok(MessageOutcome::Dropped(reason))
            }
        }
    }
}

/// Metric label for a handled message: persisted, dropped or failed.
fn outcome_label(result: &Result<MessageOutcome, ProcessError>) -> &'static str {
    match result {
        Ok(outcome) => outcome.as_str(),
        Err(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DashMapTenantCache;
    use crate::storage::{MemoryRegistry, MemoryTenantStore};
    use crate::traits::RegistryClient;

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        store: Arc<MemoryTenantStore>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert(SchemaKind::MetaBusiness, "BIZ123", "store_A");
        registry.insert(SchemaKind::WhapiChannel, "CH77", "store_B");
        let store = Arc::new(MemoryTenantStore::new());
        let resolver = Resolver::new(
            Arc::new(DashMapTenantCache::new()),
            Arc::clone(&registry) as Arc<dyn RegistryClient>,
        );
        let dispatcher = Dispatcher::new(resolver, Arc::clone(&store) as Arc<dyn TenantStore>);
        Fixture {
            registry,
            store,
            dispatcher,
        }
    }

    fn target(name: &str) -> ResolvedStore {
        ResolvedStore::new(name).unwrap()
    }

    #[tokio::test]
    async fn meta_payload_is_written_with_code_3() {
        let f = fixture();
        let body = r#"{"entry":[{"id":"BIZ123"}]}"#;

        let outcome = f.dispatcher.handle(&InboundEvent::parse(body)).await.unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Persisted {
                store: target("store_A"),
                code: ClassificationCode::Meta,
            }
        );

        let rows = f.store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].store, target("store_A"));
        assert_eq!(rows[0].payload, body);
        assert_eq!(rows[0].code.as_str(), "3");
    }

    #[tokio::test]
    async fn whapi_payload_is_written_with_code_2() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"channel_id":"CH77"}"#))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MessageOutcome::Persisted {
                store: target("store_B"),
                code: ClassificationCode::Whapi,
            }
        );
        assert_eq!(f.store.rows()[0].code.as_str(), "2");
    }

    #[tokio::test]
    async fn unknown_channel_is_dropped_without_write() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"channel_id":"CHX"}"#))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Dropped(UnresolvedReason::NoMapping { .. })
        ));
        assert!(f.store.rows().is_empty());
    }

    #[tokio::test]
    async fn repeat_message_is_served_from_cache() {
        let f = fixture();
        let event = InboundEvent::parse(r#"{"channel_id":"CH77"}"#);

        let first = f.dispatcher.handle(&event).await.unwrap();
        assert_eq!(f.registry.lookup_count(), 1);
        let second = f.dispatcher.handle(&event).await.unwrap();
        assert_eq!(f.registry.lookup_count(), 1);

        assert_eq!(first, second);
        let rows = f.store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rows[1]);
    }

    #[tokio::test]
    async fn write_failure_propagates() {
        let f = fixture();
        f.store.fail_next("connection refused");

        let err = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"channel_id":"CH77"}"#))
            .await
            .unwrap_err();
        match err {
            ProcessError::Dispatch(DispatchError::Write { store, source }) => {
                assert_eq!(store, target("store_B"));
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Resolution succeeded before the write failed, so the mapping stays cached.
        assert_eq!(f.dispatcher.resolver().cache().len(), 1);
    }

    #[tokio::test]
    async fn registry_failure_is_not_a_drop() {
        let f = fixture();
        f.registry.fail_next("timeout");

        let err = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"entry":[{"id":"BIZ123"}]}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Resolve(_)));
        assert!(f.store.rows().is_empty());
    }

    #[tokio::test]
    async fn dispatch_uses_code_of_given_kind() {
        let f = fixture();
        let event = InboundEvent::parse(r#"{"anything":true}"#);
        let code = f
            .dispatcher
            .dispatch(&event, &target("store_C"), SchemaKind::MetaBusiness)
            .await
            .unwrap();
        assert_eq!(code, ClassificationCode::Meta);
        assert_eq!(f.store.rows()[0].store, target("store_C"));
    }

    #[tokio::test]
    async fn every_outcome_has_a_metric_label() {
        let f = fixture();
        let persisted = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"channel_id":"CH77"}"#))
            .await;
        assert_eq!(outcome_label(&persisted), "persisted");

        let dropped = f.dispatcher.handle(&InboundEvent::parse("")).await;
        assert_eq!(outcome_label(&dropped), "dropped");

        f.store.fail_next("disk full");
        let failed = f
            .dispatcher
            .handle(&InboundEvent::parse(r#"{"channel_id":"CH77"}"#))
            .await;
        assert_eq!(outcome_label(&failed), "failed");
    }
}
