//! `PostgreSQL` implementations of [`RegistryClient`] and [`TenantStore`].
//!
//! SQL text is assembled once at construction from identifiers that have
//! already passed the allow-list (configuration) or come from a fixed table
//! (registry columns). Runtime values, the external id and the payload, are
//! always bound parameters. The tenant database is selected through
//! [`PgConnectOptions::database`], never by editing a connection URL.

use std::str::FromStr;

use async_trait::async_trait;
use inbound_core::{ClassificationCode, ResolvedStore, SchemaKind};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;

use crate::config::{RegistryConfig, TenantStoreConfig};
use crate::traits::{RegistryClient, TenantStore};

/// Registry lookups against the shared master database.
pub struct PgRegistry {
    pool: PgPool,
    meta_query: String,
    whapi_query: String,
}

impl PgRegistry {
    /// Builds a registry client over a lazily connected pool.
    ///
    /// No connection is opened until the first lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation or `url` is not a valid
    /// `PostgreSQL` connection string.
    pub fn connect_lazy(url: &str, config: &RegistryConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options);
        Ok(Self::with_pool(pool, config))
    }

    /// Builds a registry client over an existing pool. `config` must already
    /// be validated.
    #[must_use]
    pub fn with_pool(pool: PgPool, config: &RegistryConfig) -> Self {
        Self {
            pool,
            meta_query: lookup_sql(config, SchemaKind::MetaBusiness),
            whapi_query: lookup_sql(config, SchemaKind::WhapiChannel),
        }
    }

    fn query_for(&self, kind: SchemaKind) -> &str {
        match kind {
            SchemaKind::MetaBusiness => &self.meta_query,
            SchemaKind::WhapiChannel => &self.whapi_query,
        }
    }
}

fn lookup_sql(config: &RegistryConfig, kind: SchemaKind) -> String {
    format!(
        r#"SELECT "{store}" FROM "{table}" WHERE "{column}" = $1 ORDER BY "{store}" LIMIT 1"#,
        store = config.store_column,
        table = config.table,
        column = kind.registry_column(),
    )
}

#[async_trait]
impl RegistryClient for PgRegistry {
    async fn lookup(
        &self,
        kind: SchemaKind,
        external_id: &str,
    ) -> anyhow::Result<Option<ResolvedStore>> {
        let row: Option<Option<String>> = sqlx::query_scalar(self.query_for(kind))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        // A row whose store column is NULL counts as no mapping.
        match row.flatten() {
            Some(name) => Ok(Some(ResolvedStore::new(&name)?)),
            None => Ok(None),
        }
    }
}

/// Writes payloads into per-tenant databases on a shared server.
pub struct PgTenantStore {
    base: PgConnectOptions,
    insert_sql: String,
}

impl PgTenantStore {
    /// `url` names the tenant server and credentials; its database part, if
    /// any, is replaced by the resolved store name on every write.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation or `url` is not a valid
    /// `PostgreSQL` connection string.
    pub fn new(url: &str, config: &TenantStoreConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            base: PgConnectOptions::from_str(url)?,
            insert_sql: insert_sql(config),
        })
    }

    /// Connection options scoped to one tenant database.
    #[must_use]
    pub fn options_for(&self, store: &ResolvedStore) -> PgConnectOptions {
        self.base.clone().database(store.as_str())
    }
}

fn insert_sql(config: &TenantStoreConfig) -> String {
    format!(
        r#"INSERT INTO "{table}" ("{payload}", "{code}") VALUES ($1, $2)"#,
        table = config.table,
        payload = config.payload_column,
        code = config.code_column,
    )
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn append(
        &self,
        store: &ResolvedStore,
        payload: &str,
        code: ClassificationCode,
    ) -> anyhow::Result<()> {
        let mut conn = PgConnection::connect_with(&self.options_for(store)).await?;
        sqlx::query(&self.insert_sql)
            .bind(payload)
            .bind(code.value())
            .execute(&mut conn)
            .await?;

        // The row is committed at this point; a failed close must not turn
        // into a redelivery and a duplicate insert.
        if let Err(err) = conn.close().await {
            tracing::warn!(store = %store, error = %err, "failed to close tenant connection");
        }
        Ok(())
    }
}
