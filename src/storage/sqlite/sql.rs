//! SQL text for the `SQLite` event store.
//!
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS[.ffffff]` text, which sorts
//! chronologically.

/// Schema, applied idempotently on open.
///
/// `medications(id, user_id)` is declared unique so that events can reference
/// the pair, which makes the database itself reject an event whose medication
/// belongs to a different user.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS medications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    dosage_amount REAL NOT NULL,
    dosage_unit TEXT NOT NULL,
    route TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    UNIQUE (user_id, name),
    UNIQUE (id, user_id)
);

CREATE TABLE IF NOT EXISTS medication_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    medication_id INTEGER NOT NULL,
    scheduled_time TEXT,
    actual_time TEXT,
    event_type TEXT NOT NULL,
    event_source TEXT NOT NULL
        CHECK (event_source IN ('manual', 'nfc', 'smart_bottle', 'scanner')),
    exception_code TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (medication_id, user_id) REFERENCES medications(id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_medication_events_user_time
    ON medication_events(user_id, actual_time, scheduled_time);
";

/// Inserts a user unless the name is taken.
pub const INSERT_USER: &str =
    "INSERT INTO users (user_name) VALUES (?1) ON CONFLICT (user_name) DO NOTHING";

/// Looks up a user id by name.
pub const SELECT_USER_ID: &str = "SELECT id FROM users WHERE user_name = ?1";

/// Looks up a medication id by its natural key.
pub const SELECT_MEDICATION_ID: &str =
    "SELECT id FROM medications WHERE user_id = ?1 AND name = ?2";

/// Inserts a medication unless `(user_id, name)` exists, returning the new id.
///
/// Returns no row on conflict; the caller re-reads with
/// [`SELECT_MEDICATION_ID`].
pub const INSERT_MEDICATION: &str = "
    INSERT INTO medications (user_id, name, dosage_amount, dosage_unit, route, notes)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT (user_id, name) DO NOTHING
    RETURNING id";

/// Inserts an event, returning its id.
pub const INSERT_EVENT: &str = "
    INSERT INTO medication_events (
        user_id,
        medication_id,
        scheduled_time,
        actual_time,
        event_type,
        event_source,
        exception_code,
        notes
    )
    VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7)
    RETURNING id";

/// A user's events joined with medication names, most recent first.
pub const SELECT_EVENTS: &str = "
    SELECT
        e.id,
        m.name AS medication,
        COALESCE(e.actual_time, e.scheduled_time) AS event_time,
        e.event_source,
        e.notes
    FROM medication_events e
    JOIN medications m ON m.id = e.medication_id
    WHERE e.user_id = ?1
    ORDER BY event_time DESC NULLS LAST, e.id DESC";

/// A user's medications ordered by name.
pub const SELECT_MEDICATIONS: &str = "
    SELECT id, user_id, name, dosage_amount, dosage_unit, route, notes
    FROM medications
    WHERE user_id = ?1
    ORDER BY name, id";

/// Counts a user's medications.
pub const COUNT_MEDICATIONS: &str = "SELECT COUNT(*) FROM medications WHERE user_id = ?1";
