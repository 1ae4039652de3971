//! Inbound Writer — routes queued messaging events to their tenant store.
//!
//! Pipeline per message:
//!
//! 1. **Extraction** (`inbound_core::extract`): payload -> identifier candidate
//! 2. **Resolution** (`resolver`): cache, then registry, -> tenant store
//! 3. **Dispatch** (`dispatcher`): single append into the tenant store
//! 4. **Batching** (`processor`): bounded fan-out and per-message outcomes

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod processor;
pub mod resolver;
pub mod storage;
pub mod traits;

pub use cache::DashMapTenantCache;
pub use config::{ConfigError, RegistryConfig, TenantStoreConfig, WriterConfig};
pub use dispatcher::{DispatchError, Dispatcher, MessageOutcome, ProcessError};
pub use processor::{failure_response, parse_batch, BatchProcessor, BatchReport, QueueMessage};
pub use resolver::{LookupSource, Resolution, ResolveError, Resolver, UnresolvedReason};
pub use traits::{RegistryClient, TenantCache, TenantStore};
