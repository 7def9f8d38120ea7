//! Data models for medtrack.
//!
//! Users own medications; medications own events. Rows are created by the
//! service but never updated or deleted by it.

mod event;
mod ids;
mod medication;
mod timestamp;

pub use event::{
    EVENT_TYPE_TAKEN, EXCEPTION_CODE_NONE, EventListing, EventSource, LogEventCommand,
    LogEventRequest, RecordedEvent,
};
pub use ids::{EventId, MedicationId, UserId};
pub use medication::{
    DEFAULT_DOSAGE_AMOUNT, DEFAULT_DOSAGE_UNIT, DEFAULT_MEDICATION_NOTES, DEFAULT_ROUTE,
    Medication, NewMedication,
};
pub use timestamp::{format_iso_timestamp, parse_iso_timestamp};
