//! Event store construction from configuration.

use crate::config::{StorageBackendType, StorageConfig};
use crate::storage::{EventStore, SqliteEventStore};
use crate::Result;
use std::sync::Arc;

/// Opens the configured event store.
///
/// PostgreSQL stores must be opened either outside any tokio runtime or on a
/// blocking worker of one.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, or PostgreSQL is selected
/// in a build without the `postgres` feature.
pub fn create_event_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    match config.backend {
        StorageBackendType::Sqlite => {
            tracing::info!(path = %config.sqlite_path.display(), "Opening SQLite event store");
            Ok(Arc::new(SqliteEventStore::new(&config.sqlite_path)?))
        },
        StorageBackendType::Postgres => create_postgres_store(config),
    }
}

#[cfg(feature = "postgres")]
fn create_postgres_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    tracing::info!(
        url = %config.redacted_postgres_url(),
        pool_max_size = ?config.pool_max_size,
        "Opening PostgreSQL event store"
    );
    let store = crate::storage::PostgresEventStore::with_pool_size(
        &config.postgres_url,
        config.pool_max_size,
    )?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
fn create_postgres_store(_config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    Err(crate::Error::operation(
        "create_event_store",
        "PostgreSQL backend requested but medtrack was built without the 'postgres' feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::sqlite(dir.path().join("medtrack.db"));
        let store = create_event_store(&config).unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(dir.path().join("medtrack.db").exists());
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_requires_feature() {
        let config = StorageConfig {
            backend: StorageBackendType::Postgres,
            ..StorageConfig::sqlite("unused.db")
        };
        let Err(err) = create_event_store(&config) else {
            panic!("expected an error without the postgres feature");
        };
        assert!(err.to_string().contains("postgres"));
    }
}
