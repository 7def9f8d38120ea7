//! Event store implementations.

mod sqlite;

pub use sqlite::SqliteEventStore;

// PostgreSQL backend available with feature flag
#[cfg(feature = "postgres")]
mod postgresql;
#[cfg(feature = "postgres")]
pub use postgresql::PostgresEventStore;
