//! Host for the inbound writer.
//!
//! Reads one batch of queue messages from stdin, one JSON object per line
//! (`{"message_id": "...", "body": "..."}`), processes it against the
//! configured `PostgreSQL` registry and tenant server, and prints the partial
//! batch response (`{"batchItemFailures":[{"itemIdentifier":"..."}]}`) to
//! stdout so the transport can redeliver exactly the failed messages.

use std::sync::Arc;

use clap::Parser;
use inbound_writer::logging::{init_tracing, LogFormat};
use inbound_writer::storage::{PgRegistry, PgTenantStore};
use inbound_writer::{
    failure_response, parse_batch, BatchProcessor, DashMapTenantCache, Dispatcher, RegistryClient,
    RegistryConfig, Resolver, TenantStore, TenantStoreConfig, WriterConfig,
};
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "inbound-writer", about = "Persist queued inbound events into tenant stores")]
struct Args {
    /// Connection URL of the master registry database.
    #[arg(long, env = "REGISTRY_DATABASE_URL")]
    registry_url: String,

    /// Connection URL of the tenant server; the database is chosen per message.
    #[arg(long, env = "TENANT_DATABASE_URL")]
    tenant_url: String,

    #[arg(long, env = "REGISTRY_TABLE", default_value = "tenant_registry")]
    registry_table: String,

    #[arg(long, env = "REGISTRY_STORE_COLUMN", default_value = "DatabaseName")]
    registry_store_column: String,

    #[arg(long, env = "REGISTRY_MAX_CONNECTIONS", default_value_t = 4)]
    registry_max_connections: u32,

    #[arg(long, env = "TENANT_TABLE", default_value = "BotJsonComandos")]
    tenant_table: String,

    #[arg(long, env = "TENANT_PAYLOAD_COLUMN", default_value = "Json")]
    tenant_payload_column: String,

    #[arg(long, env = "TENANT_CODE_COLUMN", default_value = "CodsysBotJsonComandos")]
    tenant_code_column: String,

    #[arg(long, env = "MAX_CONCURRENT_MESSAGES", default_value_t = 16)]
    max_concurrent_messages: usize,

    /// `pretty` or `json`.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

impl Args {
    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_concurrent_messages: self.max_concurrent_messages,
            registry: RegistryConfig {
                table: self.registry_table.clone(),
                store_column: self.registry_store_column.clone(),
                max_connections: self.registry_max_connections,
            },
            tenant_store: TenantStoreConfig {
                table: self.tenant_table.clone(),
                payload_column: self.tenant_payload_column.clone(),
                code_column: self.tenant_code_column.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = args.writer_config();
    config.validate()?;

    let registry: Arc<dyn RegistryClient> =
        Arc::new(PgRegistry::connect_lazy(&args.registry_url, &config.registry)?);
    let store: Arc<dyn TenantStore> =
        Arc::new(PgTenantStore::new(&args.tenant_url, &config.tenant_store)?);
    let resolver = Resolver::new(Arc::new(DashMapTenantCache::new()), registry);
    let processor = BatchProcessor::new(
        Arc::new(Dispatcher::new(resolver, store)),
        config.max_concurrent_messages,
    );

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let batch = parse_batch(&input);
    let total = batch.len();
    let report = processor.process_batch(batch).await;

    info!(
        total,
        persisted = report.persisted_count(),
        dropped = report.dropped_count(),
        failed = report.failed_message_ids().len(),
        "batch complete"
    );
    println!("{}", failure_response(&report));
    Ok(())
}
