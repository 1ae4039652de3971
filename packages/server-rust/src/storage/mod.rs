//! Backends for the registry and tenant store traits.
//!
//! - [`memory`]: in-process fakes with call counting and failure injection
//! - [`postgres`]: `sqlx`-based implementations (feature `postgres`)

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{AppendedRow, MemoryRegistry, MemoryTenantStore};
#[cfg(feature = "postgres")]
pub use postgres::{PgRegistry, PgTenantStore};
