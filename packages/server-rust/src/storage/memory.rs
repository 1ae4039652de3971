//! In-memory [`RegistryClient`] and [`TenantStore`] implementations.
//!
//! Used by tests and local dry runs. Both record how often they were called
//! and can be told to fail, so callers can assert on registry traffic and on
//! error propagation without a database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use inbound_core::{ClassificationCode, ResolvedStore, SchemaKind};
use parking_lot::Mutex;

use crate::traits::{RegistryClient, TenantStore};

/// Registry held in a [`DashMap`], keyed by `(kind, external_id)`.
///
/// Store names are kept as raw strings and validated on lookup, exactly as a
/// database-backed registry would.
#[derive(Default)]
pub struct MemoryRegistry {
    rows: DashMap<(SchemaKind, String), String>,
    lookups: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    latency: Option<Duration>,
    rotating: Vec<String>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency` to widen race windows.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Ignore stored rows and answer with `answers` in turn, one per lookup.
    #[must_use]
    pub fn with_rotating_answers(mut self, answers: Vec<&str>) -> Self {
        self.rotating = answers.into_iter().map(str::to_string).collect();
        self
    }

    /// Add or replace a mapping row.
    pub fn insert(&self, kind: SchemaKind, external_id: &str, store: &str) {
        self.rows
            .insert((kind, external_id.to_string()), store.to_string());
    }

    /// Make the next lookup fail with `message`.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// Number of lookups performed so far, failed ones included.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn lookup(
        &self,
        kind: SchemaKind,
        external_id: &str,
    ) -> anyhow::Result<Option<ResolvedStore>> {
        let call = self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.fail_next.lock().take() {
            anyhow::bail!("{message}");
        }

        let name = if self.rotating.is_empty() {
            self.rows
                .get(&(kind, external_id.to_string()))
                .map(|r| r.value().clone())
        } else {
            Some(self.rotating[call % self.rotating.len()].clone())
        };

        name.map(|n| ResolvedStore::new(&n))
            .transpose()
            .map_err(anyhow::Error::from)
    }
}

/// One row written through [`MemoryTenantStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedRow {
    pub store: ResolvedStore,
    pub payload: String,
    pub code: ClassificationCode,
}

/// Tenant store that keeps appended rows in memory.
#[derive(Default)]
pub struct MemoryTenantStore {
    rows: Mutex<Vec<AppendedRow>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryTenantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next append fail with `message`.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    /// Snapshot of every row written so far, in write order.
    #[must_use]
    pub fn rows(&self) -> Vec<AppendedRow> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn append(
        &self,
        store: &ResolvedStore,
        payload: &str,
        code: ClassificationCode,
    ) -> anyhow::Result<()> {
        if let Some(message) = self.fail_next.lock().take() {
            anyhow::bail!("{message}");
        }
        self.rows.lock().push(AppendedRow {
            store: store.clone(),
            payload: payload.to_string(),
            code,
        });
        Ok(())
    }
}
