//! Storage boundary and its backends.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

use std::sync::Arc;

use tracing::info;

pub use in_memory::InMemoryClinicStore;
pub use postgres::PostgresClinicStore;
pub use r#trait::{ChangeSet, ClinicStore, StoreError, StoreResult, VersionedWrite};

use crate::config::{LedgerConfig, StoreBackend};

/// Build the store `config.backend` selects.
///
/// Postgres connects and creates the schema up front, so a bad
/// `DATABASE_URL` fails here rather than on the first operation.
pub async fn open_store(config: &LedgerConfig) -> StoreResult<Arc<dyn ClinicStore>> {
    match &config.backend {
        StoreBackend::InMemory => {
            info!(backend = "in-memory", "clinic store ready");
            Ok(Arc::new(InMemoryClinicStore::new()))
        }
        StoreBackend::Postgres { database_url } => {
            let store = PostgresClinicStore::connect(database_url).await?;
            info!(backend = "postgres", "clinic store ready");
            Ok(Arc::new(store))
        }
    }
}
