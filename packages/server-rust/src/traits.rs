use async_trait::async_trait;
use inbound_core::{CacheKey, ClassificationCode, ResolvedStore, SchemaKind};

/// Read-only view of the shared master registry.
/// Implementations: `PostgreSQL`, memory (tests).
///
/// Performs exactly one query per call and never caches; caching belongs to
/// the [`Resolver`](crate::resolver::Resolver).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Look up the store owning `external_id` under the column for `kind`.
    ///
    /// Returns `Ok(None)` when no mapping row exists. Connectivity and query
    /// faults are returned as errors, never as `None`.
    async fn lookup(
        &self,
        kind: SchemaKind,
        external_id: &str,
    ) -> anyhow::Result<Option<ResolvedStore>>;
}

/// Append-only persistence into a tenant store.
/// Implementations: `PostgreSQL`, memory (tests).
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Insert one raw payload, tagged with its classification code, into
    /// `store`. Not idempotent: calling twice writes two rows.
    async fn append(
        &self,
        store: &ResolvedStore,
        payload: &str,
        code: ClassificationCode,
    ) -> anyhow::Result<()>;
}

/// Process-wide cache of resolved tenant stores.
///
/// Entries are never removed or replaced. Shared by every in-flight message,
/// so implementations must be safe for concurrent use without external
/// locking.
pub trait TenantCache: Send + Sync {
    /// Cached store for `key`, if any.
    fn get(&self, key: &CacheKey) -> Option<ResolvedStore>;

    /// Insert `store` unless `key` is already present (first writer wins).
    ///
    /// Returns the value held for `key` after the call, which is the
    /// earlier value when the key was already present.
    fn put(&self, key: CacheKey, store: ResolvedStore) -> ResolvedStore;

    /// Number of cached keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
