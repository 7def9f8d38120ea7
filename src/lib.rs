//! # Medtrack
//!
//! Records medication-intake events for a tracked user and serves the user's
//! event history back, most recent first.
//!
//! ## Features
//!
//! - Validation of raw event submissions (`medication`, `timestamp`, `source`/`event_source`, `notes`)
//! - Race-safe get-or-create of medication records keyed by `(user_id, name)`
//! - Atomic ingestion: medication creation and event insert commit together
//! - Pluggable storage (`SQLite` by default, PostgreSQL behind the `postgres` feature)
//! - HTTP transport (`POST /log`, `GET /medications`) built on axum
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medtrack::{LogEventRequest, MedicationLogService};
//! use medtrack::storage::SqliteEventStore;
//!
//! let store = SqliteEventStore::in_memory()?;
//! store.create_user("kermit")?;
//! let service = MedicationLogService::new(Arc::new(store));
//! let logged = service.log_event("kermit", &LogEventRequest {
//!     medication: Some("Aspirin".to_string()),
//!     timestamp: Some("2024-01-01T08:00:00".to_string()),
//!     ..Default::default()
//! })?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod http;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{MedtrackConfig, StorageBackendType, StorageConfig};
pub use models::{
    EventId, EventListing, EventSource, LogEventCommand, LogEventRequest, Medication,
    MedicationId, RecordedEvent, UserId,
};
pub use services::MedicationLogService;
pub use storage::EventStore;

/// Error type for medtrack operations.
///
/// | Variant | Raised When | HTTP |
/// |---------|-------------|------|
/// | `MissingField` | `medication` or `timestamp` absent or empty | 400 |
/// | `InvalidTimestamp` | `timestamp` is not an ISO-8601 date-time | 400 |
/// | `InvalidSource` | effective source outside the allowed set | 400 |
/// | `InvalidInput` | request body is not a JSON object of strings | 400 |
/// | `UserNotFound` | configured identity missing from `users` | 500 |
/// | `OperationFailed` | storage, runtime, or I/O failure | 500 |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A required field was absent or empty.
    ///
    /// The message is shared by both required fields so clients see a single,
    /// stable text; `field` names the first one found missing.
    #[error("Medication and timestamp are required!")]
    MissingField {
        /// The field that was missing.
        field: &'static str,
    },

    /// The timestamp could not be parsed as ISO-8601.
    #[error("Invalid timestamp format; use ISO 8601.")]
    InvalidTimestamp(String),

    /// The effective event source is not recognised.
    #[error("Invalid source '{0}'")]
    InvalidSource(String),

    /// The request body was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The configured identity has no row in the `users` table.
    ///
    /// This is a deployment misconfiguration rather than bad client input.
    #[error("user '{0}' not found in users table")]
    UserNotFound(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` or PostgreSQL statements fail
    /// - A transaction cannot begin or commit
    /// - The connection pool or async runtime cannot be created
    /// - Configuration files cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true if the error was caused by the client's input.
    ///
    /// Client errors are detected before any storage access and map to 400.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. }
                | Self::InvalidTimestamp(_)
                | Self::InvalidSource(_)
                | Self::InvalidInput(_)
        )
    }

    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    pub fn operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for medtrack operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingField {
            field: "medication",
        };
        assert_eq!(err.to_string(), "Medication and timestamp are required!");

        let err = Error::InvalidSource("bluetooth".to_string());
        assert_eq!(err.to_string(), "Invalid source 'bluetooth'");

        let err = Error::OperationFailed {
            operation: "insert_event".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'insert_event' failed: disk full");

        let err = Error::UserNotFound("kermit".to_string());
        assert_eq!(err.to_string(), "user 'kermit' not found in users table");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::MissingField { field: "timestamp" }.is_client_error());
        assert!(Error::InvalidTimestamp("x".to_string()).is_client_error());
        assert!(Error::InvalidSource("x".to_string()).is_client_error());
        assert!(Error::InvalidInput("x".to_string()).is_client_error());
        assert!(!Error::UserNotFound("kermit".to_string()).is_client_error());
        assert!(!Error::operation("list_events", "boom").is_client_error());
    }
}
