//! Validation of raw event submissions.
//!
//! Runs before any storage access: a rejected submission never touches the
//! database.

use crate::models::{EventSource, LogEventCommand, LogEventRequest, parse_iso_timestamp};
use crate::{Error, Result};

/// Validates a raw submission and normalizes it into a [`LogEventCommand`].
///
/// Rules, in order:
/// 1. `medication` and `timestamp` must be present and non-empty.
/// 2. `timestamp` must parse as ISO-8601.
/// 3. The effective source is `event_source` if present, else `source` if
///    present, else `manual`; it must name a known [`EventSource`].
/// 4. Absent `notes` become the empty string.
///
/// # Errors
///
/// Returns [`Error::MissingField`], [`Error::InvalidTimestamp`] or
/// [`Error::InvalidSource`].
pub fn validate_log_request(request: &LogEventRequest) -> Result<LogEventCommand> {
    let medication = required(request.medication.as_deref(), "medication")?;
    let timestamp = required(request.timestamp.as_deref(), "timestamp")?;

    let taken_at = parse_iso_timestamp(timestamp)
        .ok_or_else(|| Error::InvalidTimestamp(timestamp.to_string()))?;

    let source = effective_source(request).parse::<EventSource>()?;

    Ok(LogEventCommand {
        medication_name: medication.to_string(),
        taken_at,
        source,
        notes: request.notes.clone().unwrap_or_default(),
    })
}

/// Resolves which source string applies to a submission.
///
/// The legacy `event_source` key wins over `source`. A present-but-empty value
/// still counts as present and is rejected later.
#[must_use]
pub fn effective_source(request: &LogEventRequest) -> &str {
    request
        .event_source
        .as_deref()
        .or(request.source.as_deref())
        .unwrap_or_else(|| EventSource::default().as_str())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::MissingField { field }),
    }
}
