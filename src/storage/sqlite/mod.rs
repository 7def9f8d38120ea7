//! Shared `SQLite` infrastructure for the event store.
//!
//! - [`connection`]: lock acquisition and connection pragmas
//! - [`sql`]: schema and statement text
//! - [`event_row`]: row conversion into model types
//! - [`metrics`]: operation metrics shared with the PostgreSQL backend

mod connection;
mod event_row;
mod metrics;
pub mod sql;

pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection};
pub use event_row::{EventRow, build_listing_from_row, medication_from_row};
pub use metrics::{record_operation_metrics, timed};
