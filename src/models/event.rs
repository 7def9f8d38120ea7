//! Medication event types.

use super::{EventId, MedicationId, timestamp::format_iso_timestamp};
use chrono::NaiveDateTime;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// `event_type` written for every event this service records.
pub const EVENT_TYPE_TAKEN: &str = "taken";

/// `exception_code` written for every event this service records.
pub const EXCEPTION_CODE_NONE: &str = "none";

/// Channel through which a dose-taking event was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Entered by hand.
    #[default]
    Manual,
    /// NFC tag scan.
    Nfc,
    /// Smart pill bottle.
    SmartBottle,
    /// Barcode scanner.
    Scanner,
}

impl EventSource {
    /// Returns all event source variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Manual, Self::Nfc, Self::SmartBottle, Self::Scanner]
    }

    /// Returns the source as stored and serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Nfc => "nfc",
            Self::SmartBottle => "smart_bottle",
            Self::Scanner => "scanner",
        }
    }

    /// Parses a source name. Matching is exact and case-sensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "nfc" => Some(Self::Nfc),
            "smart_bottle" => Some(Self::SmartBottle),
            "scanner" => Some(Self::Scanner),
            _ => None,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::InvalidSource(s.to_string()))
    }
}

/// Raw event submission as received from a client.
///
/// Every field is optional here; [`crate::services::validate_log_request`]
/// decides what is required. `event_source` is a legacy alias for `source`
/// and takes precedence when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEventRequest {
    /// Medication name.
    pub medication: Option<String>,
    /// ISO-8601 time the dose was taken.
    pub timestamp: Option<String>,
    /// Event source.
    pub source: Option<String>,
    /// Legacy alias for `source`.
    pub event_source: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

impl LogEventRequest {
    /// Creates a request with the two required fields set.
    #[must_use]
    pub fn new(medication: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            medication: Some(medication.into()),
            timestamp: Some(timestamp.into()),
            ..Default::default()
        }
    }

    /// Sets the `source` field.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the legacy `event_source` field.
    #[must_use]
    pub fn with_event_source(mut self, source: impl Into<String>) -> Self {
        self.event_source = Some(source.into());
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A validated, normalized event ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEventCommand {
    /// Medication name, non-empty.
    pub medication_name: String,
    /// Time the dose was taken.
    pub taken_at: NaiveDateTime,
    /// Effective event source.
    pub source: EventSource,
    /// Notes, empty when none were given.
    pub notes: String,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedEvent {
    /// The new event's identifier.
    pub event_id: EventId,
    /// The medication the event references.
    pub medication_id: MedicationId,
    /// Whether the medication row was created by this ingestion.
    pub medication_created: bool,
}

/// One row of a user's event history.
///
/// Serializes as the positional array
/// `[event_id, medication, event_time, event_source, notes]`, with the event
/// time as ISO-8601 or `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventListing {
    /// Event identifier.
    pub event_id: EventId,
    /// Name of the referenced medication.
    pub medication: String,
    /// Effective time: `actual_time`, else `scheduled_time`.
    pub event_time: Option<NaiveDateTime>,
    /// Event source.
    pub event_source: EventSource,
    /// Notes.
    pub notes: String,
}

impl EventListing {
    /// Returns the effective time formatted as ISO-8601.
    #[must_use]
    pub fn event_time_iso(&self) -> Option<String> {
        self.event_time.as_ref().map(format_iso_timestamp)
    }
}

impl Serialize for EventListing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(5)?;
        tuple.serialize_element(&self.event_id)?;
        tuple.serialize_element(&self.medication)?;
        tuple.serialize_element(&self.event_time_iso())?;
        tuple.serialize_element(self.event_source.as_str())?;
        tuple.serialize_element(&self.notes)?;
        tuple.end()
    }
}
