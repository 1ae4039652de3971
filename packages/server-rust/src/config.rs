//! Configuration types for the inbound writer.
//!
//! Table and column names end up inside SQL text, so every one of them is
//! checked against the identifier allow-list before a backend is built.
//! Connection endpoints and credentials are owned by the deployment and are
//! passed to the backends separately.

use inbound_core::is_sql_identifier;

/// Errors raised while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a plain SQL identifier, got {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Top-level configuration for the writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Upper bound on messages processed concurrently within one batch.
    pub max_concurrent_messages: usize,
    /// Master registry lookup settings.
    pub registry: RegistryConfig,
    /// Tenant store insert settings.
    pub tenant_store: TenantStoreConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 16,
            registry: RegistryConfig::default(),
            tenant_store: TenantStoreConfig::default(),
        }
    }
}

impl WriterConfig {
    /// Validates every nested section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_messages == 0 {
            return Err(ConfigError::Zero {
                field: "max_concurrent_messages",
            });
        }
        self.registry.validate()?;
        self.tenant_store.validate()
    }
}

/// Where the master registry keeps its identifier-to-store mapping.
///
/// The per-schema identifier columns are fixed by
/// [`SchemaKind::registry_column`](inbound_core::SchemaKind::registry_column)
/// and are not configurable.
///
/// An identifier is expected to map to at most one row. If duplicates exist,
/// the lookup picks the lowest store name so the answer stays stable.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry table holding one row per tenant.
    pub table: String,
    /// Column holding the tenant store name.
    pub store_column: String,
    /// Maximum pooled connections to the registry.
    pub max_connections: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table: "tenant_registry".to_string(),
            store_column: "DatabaseName".to_string(),
            max_connections: 4,
        }
    }
}

impl RegistryConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a name is not a plain identifier or the
    /// pool size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("registry.table", &self.table)?;
        check_identifier("registry.store_column", &self.store_column)?;
        if self.max_connections == 0 {
            return Err(ConfigError::Zero {
                field: "registry.max_connections",
            });
        }
        Ok(())
    }
}

/// Target table inside every tenant store.
#[derive(Debug, Clone)]
pub struct TenantStoreConfig {
    /// Table receiving inbound payloads.
    pub table: String,
    /// Column receiving the raw payload text.
    pub payload_column: String,
    /// Column receiving the classification code.
    pub code_column: String,
}

impl Default for TenantStoreConfig {
    fn default() -> Self {
        Self {
            table: "BotJsonComandos".to_string(),
            payload_column: "Json".to_string(),
            code_column: "CodsysBotJsonComandos".to_string(),
        }
    }
}

impl TenantStoreConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any name is not a plain identifier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("tenant_store.table", &self.table)?;
        check_identifier("tenant_store.payload_column", &self.payload_column)?;
        check_identifier("tenant_store.code_column", &self.code_column)
    }
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_sql_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}
