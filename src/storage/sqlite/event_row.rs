//! Row conversion for the `SQLite` event store.

use crate::models::{EventId, EventListing, EventSource, Medication, MedicationId, UserId};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use rusqlite::Row;

/// Raw columns of one event-history row.
#[derive(Debug)]
pub struct EventRow {
    /// Event id.
    pub id: i64,
    /// Joined medication name.
    pub medication: String,
    /// `COALESCE(actual_time, scheduled_time)`.
    pub event_time: Option<NaiveDateTime>,
    /// Stored source text.
    pub event_source: String,
    /// Notes.
    pub notes: String,
}

impl EventRow {
    /// Reads the columns selected by [`super::sql::SELECT_EVENTS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            medication: row.get(1)?,
            event_time: row.get(2)?,
            event_source: row.get(3)?,
            notes: row.get(4)?,
        })
    }
}

/// Converts a raw row into an [`EventListing`].
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the stored source is not a known
/// [`EventSource`], which means the table was written by something else.
pub fn build_listing_from_row(row: EventRow) -> Result<EventListing> {
    let event_source = EventSource::parse(&row.event_source).ok_or_else(|| {
        Error::operation(
            "decode_event_row",
            format!("event {} has unknown source '{}'", row.id, row.event_source),
        )
    })?;

    Ok(EventListing {
        event_id: EventId::new(row.id),
        medication: row.medication,
        event_time: row.event_time,
        event_source,
        notes: row.notes,
    })
}

/// Reads the columns selected by [`super::sql::SELECT_MEDICATIONS`].
pub fn medication_from_row(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: MedicationId::new(row.get(0)?),
        user_id: UserId::new(row.get(1)?),
        name: row.get(2)?,
        dosage_amount: row.get(3)?,
        dosage_unit: row.get(4)?,
        route: row.get(5)?,
        notes: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source: &str) -> EventRow {
        EventRow {
            id: 3,
            medication: "Aspirin".to_string(),
            event_time: None,
            event_source: source.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_build_listing_known_source() {
        let listing = build_listing_from_row(row("nfc")).unwrap();
        assert_eq!(listing.event_id, EventId::new(3));
        assert_eq!(listing.event_source, EventSource::Nfc);
    }

    #[test]
    fn test_build_listing_unknown_source_fails() {
        let err = build_listing_from_row(row("telepathy")).unwrap_err();
        assert!(err.to_string().contains("telepathy"));
    }
}
