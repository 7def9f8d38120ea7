//! Service-level ingestion and retrieval tests.
//!
//! Exercises `MedicationLogService` over a file-backed `SQLite` store:
//! - the three reference scenarios (first event, repeat medication, bad source)
//! - alias precedence between `source` and `event_source`
//! - ordering of the history by effective time
//! - nothing persisted for rejected submissions

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use medtrack::storage::SqliteEventStore;
use medtrack::{Error, EventId, EventSource, LogEventRequest, MedicationLogService};
use std::sync::Arc;
use tempfile::TempDir;
use test_case::test_case;

const USER: &str = "kermit";

// ============================================================================
// Test Helpers
// ============================================================================

/// Creates a service over a fresh database with `kermit` provisioned.
fn create_service(temp_dir: &TempDir) -> MedicationLogService {
    let store = SqliteEventStore::new(temp_dir.path().join("medtrack.db"))
        .expect("Failed to open SQLite store");
    let service = MedicationLogService::new(Arc::new(store));
    service.create_user(USER).expect("Failed to provision user");
    service
}

/// Serializes the user's history the way `GET /medications` does.
fn history_json(service: &MedicationLogService) -> serde_json::Value {
    serde_json::to_value(service.list_events(USER).unwrap()).unwrap()
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_scenario_first_event_creates_medication() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let recorded = service
        .log_event(USER, &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00"))
        .unwrap();

    assert_eq!(recorded.event_id, EventId::new(1));
    assert!(recorded.medication_created);
    assert_eq!(
        history_json(&service),
        serde_json::json!([[1, "Aspirin", "2024-01-01T08:00:00", "manual", ""]])
    );
}

#[test]
fn test_scenario_repeat_medication_reuses_row() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let first = service
        .log_event(USER, &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00"))
        .unwrap();
    let second = service
        .log_event(
            USER,
            &LogEventRequest::new("Aspirin", "2024-01-01T20:00:00").with_source("nfc"),
        )
        .unwrap();

    assert_ne!(first.event_id, second.event_id);
    assert_eq!(first.medication_id, second.medication_id);
    assert!(!second.medication_created);
    assert_eq!(service.count_medications(USER).unwrap(), 1);
    assert_eq!(
        history_json(&service),
        serde_json::json!([
            [2, "Aspirin", "2024-01-01T20:00:00", "nfc", ""],
            [1, "Aspirin", "2024-01-01T08:00:00", "manual", ""]
        ])
    );
}

#[test]
fn test_scenario_invalid_source_persists_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    service
        .log_event(USER, &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00"))
        .unwrap();
    let before = history_json(&service);

    let result = service.log_event(
        USER,
        &LogEventRequest::new("Ibuprofen", "2024-01-02T08:00:00").with_source("bluetooth"),
    );

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Invalid source 'bluetooth'");
    assert!(err.is_client_error());
    assert_eq!(history_json(&service), before);
    assert_eq!(service.count_medications(USER).unwrap(), 1);
}

// ============================================================================
// Validation Without Side Effects
// ============================================================================

#[test_case(LogEventRequest::default(); "empty body")]
#[test_case(LogEventRequest { medication: Some("Aspirin".to_string()), ..Default::default() }; "no timestamp")]
#[test_case(LogEventRequest { timestamp: Some("2024-01-01".to_string()), ..Default::default() }; "no medication")]
#[test_case(LogEventRequest::new("", "2024-01-01"); "empty medication")]
#[test_case(LogEventRequest::new("Aspirin", ""); "empty timestamp")]
fn test_missing_fields_persist_nothing(request: LogEventRequest) {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let err = service.log_event(USER, &request).unwrap_err();

    assert!(matches!(err, Error::MissingField { .. }));
    assert_eq!(err.to_string(), "Medication and timestamp are required!");
    assert!(service.list_events(USER).unwrap().is_empty());
    assert_eq!(service.count_medications(USER).unwrap(), 0);
}

#[test_case("yesterday"; "word")]
#[test_case("2024-13-01T08:00:00"; "bad month")]
#[test_case("2024-01-01T25:00:00"; "bad hour")]
#[test_case("01/02/2024"; "slash date")]
#[test_case("-0001-01-01T08:00:00"; "negative year")]
#[test_case("+12345-01-01T08:00:00"; "extended year")]
#[test_case("0000-01-01T08:00:00"; "year zero")]
#[test_case(" 2024-01-01T08:00:00 "; "surrounding whitespace")]
fn test_invalid_timestamp_persists_nothing(timestamp: &str) {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let err = service
        .log_event(USER, &LogEventRequest::new("Aspirin", timestamp))
        .unwrap_err();

    assert!(matches!(err, Error::InvalidTimestamp(_)));
    assert_eq!(err.to_string(), "Invalid timestamp format; use ISO 8601.");
    assert_eq!(service.count_medications(USER).unwrap(), 0);
}

// ============================================================================
// Source Resolution
// ============================================================================

#[test_case(None, None, EventSource::Manual; "defaults to manual")]
#[test_case(Some("scanner"), None, EventSource::Scanner; "source only")]
#[test_case(None, Some("smart_bottle"), EventSource::SmartBottle; "alias only")]
#[test_case(Some("manual"), Some("nfc"), EventSource::Nfc; "alias wins")]
#[test_case(Some("bluetooth"), Some("nfc"), EventSource::Nfc; "alias wins over invalid source")]
fn test_effective_source_is_persisted(
    source: Option<&str>,
    event_source: Option<&str>,
    expected: EventSource,
) {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let request = LogEventRequest {
        source: source.map(String::from),
        event_source: event_source.map(String::from),
        ..LogEventRequest::new("Aspirin", "2024-01-01T08:00:00")
    };
    service.log_event(USER, &request).unwrap();

    let events = service.list_events(USER).unwrap();
    assert_eq!(events[0].event_source, expected);
}

#[test]
fn test_invalid_alias_rejected_even_with_valid_source() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let err = service
        .log_event(
            USER,
            &LogEventRequest::new("Aspirin", "2024-01-01T08:00:00")
                .with_source("nfc")
                .with_event_source("NFC"),
        )
        .unwrap_err();

    assert!(matches!(err, Error::InvalidSource(ref s) if s == "NFC"));
}

// ============================================================================
// Ordering and Timestamps
// ============================================================================

#[test]
fn test_history_is_newest_first_regardless_of_insert_order() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    for (name, ts) in [
        ("Aspirin", "2024-03-01T08:00:00"),
        ("Ibuprofen", "2024-01-01T08:00:00"),
        ("Metformin", "2024-02-01T08:00:00"),
    ] {
        service
            .log_event(USER, &LogEventRequest::new(name, ts))
            .unwrap();
    }

    let names: Vec<_> = service
        .list_events(USER)
        .unwrap()
        .into_iter()
        .map(|e| e.medication)
        .collect();
    assert_eq!(names, ["Aspirin", "Metformin", "Ibuprofen"]);
}

#[test]
fn test_equal_times_ordered_by_newest_event() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    for name in ["Aspirin", "Ibuprofen"] {
        service
            .log_event(USER, &LogEventRequest::new(name, "2024-01-01T08:00:00"))
            .unwrap();
    }

    let events = service.list_events(USER).unwrap();
    assert_eq!(events[0].medication, "Ibuprofen");
    assert_eq!(events[1].medication, "Aspirin");
}

#[test_case("2024-01-01", "2024-01-01T00:00:00"; "date only")]
#[test_case("2024-01-01 08:30", "2024-01-01T08:30:00"; "space and minutes")]
#[test_case("2024-01-01T08:00:00Z", "2024-01-01T08:00:00"; "utc suffix")]
#[test_case("2024-01-01T08:00:00+02:00", "2024-01-01T08:00:00"; "offset keeps wall clock")]
#[test_case("2024-01-01T08:00:00.250000", "2024-01-01T08:00:00.250000"; "fractional seconds")]
#[test_case("2024-01-01T08", "2024-01-01T08:00:00"; "hour only")]
#[test_case("2024-01-01T08:00:00+02", "2024-01-01T08:00:00"; "hour only offset")]
#[test_case("0001-01-01T00:00:00", "0001-01-01T00:00:00"; "earliest year")]
fn test_timestamp_round_trips_through_storage(input: &str, expected: &str) {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    service
        .log_event(USER, &LogEventRequest::new("Aspirin", input))
        .unwrap();

    let events = service.list_events(USER).unwrap();
    assert_eq!(events[0].event_time_iso().as_deref(), Some(expected));
}

#[test]
fn test_history_order_holds_across_year_range() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    for (name, ts) in [
        ("Aspirin", "0999-06-01T08:00:00"),
        ("Ibuprofen", "9999-12-31T23:59:59"),
        ("Metformin", "0001-01-01T00:00:00"),
        ("Lisinopril", "2024-01-01T08:00:00"),
    ] {
        service
            .log_event(USER, &LogEventRequest::new(name, ts))
            .unwrap();
    }
    let rejected = service.log_event(USER, &LogEventRequest::new("Warfarin", "-0002-01-01T00:00:00"));
    assert!(matches!(rejected, Err(Error::InvalidTimestamp(_))));

    let names: Vec<_> = service
        .list_events(USER)
        .unwrap()
        .into_iter()
        .map(|e| e.medication)
        .collect();
    assert_eq!(names, ["Ibuprofen", "Lisinopril", "Aspirin", "Metformin"]);
}

#[test]
fn test_null_event_source_falls_back_to_source() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    // A JSON null is deserialized as an absent key.
    let request: LogEventRequest = serde_json::from_value(serde_json::json!({
        "medication": "Aspirin",
        "timestamp": "2024-01-01T08:00:00",
        "source": "nfc",
        "event_source": null
    }))
    .unwrap();
    service.log_event(USER, &request).unwrap();

    assert_eq!(
        service.list_events(USER).unwrap()[0].event_source,
        EventSource::Nfc
    );
}

// ============================================================================
// Users
// ============================================================================

#[test]
fn test_histories_are_per_user() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);
    service.create_user("piggy").unwrap();

    service
        .log_event(USER, &LogEventRequest::new("Aspirin", "2024-01-01"))
        .unwrap();
    service
        .log_event("piggy", &LogEventRequest::new("Aspirin", "2024-01-02"))
        .unwrap();

    assert_eq!(service.list_events(USER).unwrap().len(), 1);
    assert_eq!(service.list_events("piggy").unwrap().len(), 1);
    assert_eq!(service.count_medications("piggy").unwrap(), 1);
}

#[test]
fn test_unprovisioned_user_is_a_server_error() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    let err = service.list_events("gonzo").unwrap_err();
    assert!(matches!(err, Error::UserNotFound(ref u) if u == "gonzo"));
    assert!(!err.is_client_error());
}

#[test]
fn test_notes_and_medication_names_are_kept_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    let service = create_service(&temp_dir);

    service
        .log_event(
            USER,
            &LogEventRequest::new("  Vitamin D3 ", "2024-01-01").with_notes("with breakfast; 2 caps"),
        )
        .unwrap();
    service
        .log_event(USER, &LogEventRequest::new("Vitamin D3", "2024-01-02"))
        .unwrap();

    // Names are not trimmed, so these are two distinct medications.
    assert_eq!(service.count_medications(USER).unwrap(), 2);
    let events = service.list_events(USER).unwrap();
    assert_eq!(events[1].medication, "  Vitamin D3 ");
    assert_eq!(events[1].notes, "with breakfast; 2 caps");
}
