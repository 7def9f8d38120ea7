//! Storage layer.
//!
//! Every backend implements [`EventStore`], which owns the whole ingest
//! transaction (user lookup, medication get-or-create, event insert) and the
//! read-back queries:
//! - **`SQLite`**: default, file-backed or in-memory
//! - **PostgreSQL**: pooled, behind the `postgres` feature

// Allow significant_drop_tightening - the connection guard must outlive the
// transaction borrowed from it.
#![allow(clippy::significant_drop_tightening)]

#[cfg(feature = "postgres")]
pub mod migrations;
pub mod persistence;
pub mod sqlite;
pub mod traits;

#[cfg(feature = "postgres")]
pub use persistence::PostgresEventStore;
pub use persistence::SqliteEventStore;
pub use traits::EventStore;
