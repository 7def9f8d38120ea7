//! Medication logging service.
//!
//! Validates submissions and hands them to an [`EventStore`]. The service is
//! synchronous; async callers run it on a blocking worker.

use crate::models::{EventListing, LogEventRequest, Medication, RecordedEvent, UserId};
use crate::observability::current_request_id;
use crate::services::validation::validate_log_request;
use crate::storage::EventStore;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// Service for logging medication-intake events.
#[derive(Clone)]
pub struct MedicationLogService {
    /// Backing store.
    store: Arc<dyn EventStore>,
}

impl MedicationLogService {
    /// Creates a new service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Validates and records one event for `user_name`.
    ///
    /// Validation runs first; a rejected submission performs no storage
    /// access at all.
    ///
    /// # Errors
    ///
    /// Returns a client error ([`Error::is_client_error`]) for invalid input,
    /// [`Error::UserNotFound`] when `user_name` is not provisioned, or
    /// [`Error::OperationFailed`] when storage fails.
    #[instrument(skip(self, request), fields(request_id = ?current_request_id()))]
    pub fn log_event(&self, user_name: &str, request: &LogEventRequest) -> Result<RecordedEvent> {
        let command = validate_log_request(request).inspect_err(|e| {
            tracing::info!(error = %e, "Rejected event submission");
        })?;

        let recorded = self
            .store
            .record_event(user_name, &command)
            .inspect_err(|e| log_storage_failure("record_event", e))?;

        metrics::counter!(
            "medication_events_logged_total",
            "source" => command.source.as_str()
        )
        .increment(1);
        if recorded.medication_created {
            metrics::counter!("medications_created_total").increment(1);
        }

        tracing::info!(
            event_id = %recorded.event_id,
            medication_id = %recorded.medication_id,
            medication_created = recorded.medication_created,
            source = %command.source,
            "Logged medication event"
        );

        Ok(recorded)
    }

    /// Returns `user_name`'s events, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] or [`Error::OperationFailed`].
    #[instrument(skip(self), fields(request_id = ?current_request_id()))]
    pub fn list_events(&self, user_name: &str) -> Result<Vec<EventListing>> {
        self.store
            .list_events(user_name)
            .inspect_err(|e| log_storage_failure("list_events", e))
    }

    /// Returns `user_name`'s medications ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] or [`Error::OperationFailed`].
    pub fn list_medications(&self, user_name: &str) -> Result<Vec<Medication>> {
        self.store
            .list_medications(user_name)
            .inspect_err(|e| log_storage_failure("list_medications", e))
    }

    /// Counts `user_name`'s medications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserNotFound`] or [`Error::OperationFailed`].
    pub fn count_medications(&self, user_name: &str) -> Result<usize> {
        self.store.count_medications(user_name)
    }

    /// Provisions `user_name`, returning the existing id if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name, or
    /// [`Error::OperationFailed`] when storage fails.
    pub fn create_user(&self, user_name: &str) -> Result<UserId> {
        if user_name.trim().is_empty() {
            return Err(Error::InvalidInput("user name must not be empty".to_string()));
        }
        let user_id = self.store.create_user(user_name)?;
        tracing::info!(user_id = %user_id, user = user_name, "User provisioned");
        Ok(user_id)
    }
}

fn log_storage_failure(operation: &str, error: &Error) {
    match error {
        Error::UserNotFound(user) => {
            tracing::error!(operation, user = %user, "Configured user is not provisioned");
        },
        _ => tracing::error!(operation, error = %error, "Storage operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSource;
    use crate::storage::SqliteEventStore;

    fn service() -> MedicationLogService {
        let store = SqliteEventStore::in_memory().unwrap();
        store.create_user("kermit").unwrap();
        MedicationLogService::new(Arc::new(store))
    }

    #[test]
    fn test_log_event_then_list() {
        let service = service();
        let recorded = service
            .log_event(
                "kermit",
                &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00").with_notes("with food"),
            )
            .unwrap();

        let events = service.list_events("kermit").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, recorded.event_id);
        assert_eq!(events[0].medication, "Aspirin");
        assert_eq!(events[0].event_source, EventSource::Manual);
        assert_eq!(events[0].notes, "with food");
        assert_eq!(
            events[0].event_time_iso().as_deref(),
            Some("2024-01-01T08:00:00")
        );
    }

    #[test]
    fn test_rejected_submission_touches_no_storage() {
        let service = service();
        let result = service.log_event(
            "nobody",
            &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00").with_source("bluetooth"),
        );
        // Validation fails before the unknown user could be looked up.
        assert!(matches!(result, Err(Error::InvalidSource(ref s)) if s == "bluetooth"));
        assert_eq!(service.count_medications("kermit").unwrap(), 0);
    }

    #[test]
    fn test_unknown_user_is_not_a_client_error() {
        let service = service();
        let err = service
            .log_event("gonzo", &LogEventRequest::new("Aspirin", "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, Error::UserNotFound(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_create_user_rejects_blank_name() {
        let service = service();
        assert!(matches!(
            service.create_user("  "),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(service.create_user("kermit").unwrap(), UserId::new(1));
    }
}
