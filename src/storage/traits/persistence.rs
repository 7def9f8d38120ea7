//! Event store trait.

use crate::Result;
use crate::models::{EventListing, LogEventCommand, Medication, RecordedEvent, UserId};

/// Trait for relational event stores.
///
/// Every operation takes the identity it acts for explicitly; the store holds
/// no notion of a current user.
///
/// Implementations must uphold:
/// - at most one medication per `(user_id, name)`, even under concurrent
///   ingestion of the same new name;
/// - [`record_event`](Self::record_event) commits the medication it may create
///   and the event together, or neither;
/// - read operations take no write locks.
pub trait EventStore: Send + Sync {
    /// Short backend name used in logs and metrics labels.
    fn backend_name(&self) -> &'static str;

    /// Provisions a user, returning the existing id if the name is taken.
    fn create_user(&self, user_name: &str) -> Result<UserId>;

    /// Looks up a user by name.
    ///
    /// Returns [`crate::Error::UserNotFound`] when no row matches.
    fn resolve_user(&self, user_name: &str) -> Result<UserId>;

    /// Resolves the user and medication and writes the event in one transaction.
    fn record_event(&self, user_name: &str, command: &LogEventCommand) -> Result<RecordedEvent>;

    /// Returns the user's events joined with medication names, most recent
    /// effective time first.
    fn list_events(&self, user_name: &str) -> Result<Vec<EventListing>>;

    /// Returns the user's medications ordered by name.
    fn list_medications(&self, user_name: &str) -> Result<Vec<Medication>>;

    /// Returns the number of medications the user has.
    fn count_medications(&self, user_name: &str) -> Result<usize> {
        Ok(self.list_medications(user_name)?.len())
    }
}
