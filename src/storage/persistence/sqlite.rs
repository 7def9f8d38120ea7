//! `SQLite`-based event store.
//!
//! The default backend. Users, medications and events live in one database
//! file (or in memory for tests). Each ingestion runs in a `BEGIN IMMEDIATE`
//! transaction, so concurrent writers queue on the database lock instead of
//! interleaving their get-or-create steps.

use crate::models::{
    EVENT_TYPE_TAKEN, EXCEPTION_CODE_NONE, EventId, EventListing, LogEventCommand, Medication,
    MedicationId, NewMedication, RecordedEvent, UserId,
};
use crate::storage::sqlite::{
    EventRow, acquire_lock, build_listing_from_row, configure_connection, medication_from_row,
    sql, timed,
};
use crate::storage::traits::EventStore;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// `SQLite`-based event store.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access within one store.
/// Separate stores (or processes) opened on the same file coordinate through
/// `SQLite` itself:
///
/// - **WAL mode**: readers proceed while one writer holds the lock
/// - **`busy_timeout`**: a blocked writer waits up to five seconds
/// - **`UNIQUE (user_id, name)`**: the final guard against duplicate medications
pub struct SqliteEventStore {
    /// Connection to the `SQLite` database.
    ///
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteEventStore {
    /// Opens (creating if needed) a file-backed store.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_db_dir", e))?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::operation("open_sqlite", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::operation("open_sqlite_in_memory", e))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        conn.execute_batch(sql::SCHEMA)
            .map_err(|e| Error::operation("create_schema", e))?;
        Ok(())
    }
}

/// Looks up a user id by name.
fn resolve_user_id(conn: &Connection, user_name: &str) -> Result<UserId> {
    conn.query_row(sql::SELECT_USER_ID, params![user_name], |row| row.get(0))
        .optional()
        .map_err(|e| Error::operation("resolve_user", e))?
        .map(UserId::new)
        .ok_or_else(|| Error::UserNotFound(user_name.to_string()))
}

fn find_medication_id(conn: &Connection, user_id: UserId, name: &str) -> Result<Option<MedicationId>> {
    conn.query_row(
        sql::SELECT_MEDICATION_ID,
        params![user_id.get(), name],
        |row| row.get(0),
    )
    .optional()
    .map(|id| id.map(MedicationId::new))
    .map_err(|e| Error::operation("select_medication", e))
}

/// Returns the medication id for `(user_id, name)`, inserting it with defaults
/// when absent. The flag is true when this call created the row.
///
/// The insert is conditional on the natural key, so a writer that lost a race
/// gets no row back and re-reads the winner's id.
fn get_or_create_medication(
    conn: &Connection,
    user_id: UserId,
    name: &str,
) -> Result<(MedicationId, bool)> {
    if let Some(id) = find_medication_id(conn, user_id, name)? {
        return Ok((id, false));
    }

    let new = NewMedication::with_defaults(user_id, name);
    let inserted: Option<i64> = conn
        .query_row(
            sql::INSERT_MEDICATION,
            params![
                new.user_id.get(),
                new.name,
                new.dosage_amount,
                new.dosage_unit,
                new.route,
                new.notes
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("insert_medication", e))?;

    if let Some(id) = inserted {
        return Ok((MedicationId::new(id), true));
    }

    tracing::debug!(user_id = %user_id, medication = name, "Medication created concurrently, re-reading");
    find_medication_id(conn, user_id, name)?
        .map(|id| (id, false))
        .ok_or_else(|| {
            Error::operation(
                "insert_medication",
                format!("medication '{name}' conflicted but could not be re-read"),
            )
        })
}

fn insert_event(
    conn: &Connection,
    user_id: UserId,
    medication_id: MedicationId,
    command: &LogEventCommand,
) -> Result<EventId> {
    conn.query_row(
        sql::INSERT_EVENT,
        params![
            user_id.get(),
            medication_id.get(),
            command.taken_at,
            EVENT_TYPE_TAKEN,
            command.source.as_str(),
            EXCEPTION_CODE_NONE,
            command.notes
        ],
        |row| row.get(0),
    )
    .map(EventId::new)
    .map_err(|e| Error::operation("insert_event", e))
}

fn select_events(conn: &Connection, user_id: UserId) -> Result<Vec<EventListing>> {
    let mut stmt = conn
        .prepare(sql::SELECT_EVENTS)
        .map_err(|e| Error::operation("prepare_list_events", e))?;

    let rows = stmt
        .query_map(params![user_id.get()], EventRow::from_row)
        .map_err(|e| Error::operation("list_events", e))?;

    rows.map(|row| {
        row.map_err(|e| Error::operation("list_events_row", e))
            .and_then(build_listing_from_row)
    })
    .collect()
}

fn select_medications(conn: &Connection, user_id: UserId) -> Result<Vec<Medication>> {
    let mut stmt = conn
        .prepare(sql::SELECT_MEDICATIONS)
        .map_err(|e| Error::operation("prepare_list_medications", e))?;

    let rows = stmt
        .query_map(params![user_id.get()], medication_from_row)
        .map_err(|e| Error::operation("list_medications", e))?;

    rows.map(|row| row.map_err(|e| Error::operation("list_medications_row", e)))
        .collect()
}

impl SqliteEventStore {
    /// Runs `op` inside a read transaction.
    ///
    /// Deferred transactions take only a shared lock, so readers never block
    /// behind each other.
    fn read<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|e| Error::operation("begin_read_transaction", e))?;
        let value = op(&tx)?;
        tx.commit()
            .map_err(|e| Error::operation("end_read_transaction", e))?;
        Ok(value)
    }
}

impl EventStore for SqliteEventStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(operation = "create_user", backend = BACKEND))]
    fn create_user(&self, user_name: &str) -> Result<UserId> {
        timed(BACKEND, "create_user", || {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::operation("begin_transaction", e))?;
            tx.execute(sql::INSERT_USER, params![user_name])
                .map_err(|e| Error::operation("insert_user", e))?;
            let user_id = resolve_user_id(&tx, user_name)?;
            tx.commit()
                .map_err(|e| Error::operation("commit_transaction", e))?;
            Ok(user_id)
        })
    }

    #[instrument(skip(self), fields(operation = "resolve_user", backend = BACKEND))]
    fn resolve_user(&self, user_name: &str) -> Result<UserId> {
        timed(BACKEND, "resolve_user", || {
            self.read(|conn| resolve_user_id(conn, user_name))
        })
    }

    #[instrument(
        skip(self, command),
        fields(
            operation = "record_event",
            backend = BACKEND,
            medication = %command.medication_name,
            source = %command.source
        )
    )]
    fn record_event(&self, user_name: &str, command: &LogEventCommand) -> Result<RecordedEvent> {
        timed(BACKEND, "record_event", || {
            let mut conn = acquire_lock(&self.conn);

            // Dropping `tx` on any early return rolls back, so a medication
            // created here never outlives a failed event insert.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::operation("begin_transaction", e))?;

            let user_id = resolve_user_id(&tx, user_name)?;
            let (medication_id, medication_created) =
                get_or_create_medication(&tx, user_id, &command.medication_name)?;
            let event_id = insert_event(&tx, user_id, medication_id, command)?;

            tx.commit()
                .map_err(|e| Error::operation("commit_transaction", e))?;

            Ok(RecordedEvent {
                event_id,
                medication_id,
                medication_created,
            })
        })
    }

    #[instrument(skip(self), fields(operation = "list_events", backend = BACKEND))]
    fn list_events(&self, user_name: &str) -> Result<Vec<EventListing>> {
        timed(BACKEND, "list_events", || {
            self.read(|conn| {
                let user_id = resolve_user_id(conn, user_name)?;
                select_events(conn, user_id)
            })
        })
    }

    #[instrument(skip(self), fields(operation = "list_medications", backend = BACKEND))]
    fn list_medications(&self, user_name: &str) -> Result<Vec<Medication>> {
        timed(BACKEND, "list_medications", || {
            self.read(|conn| {
                let user_id = resolve_user_id(conn, user_name)?;
                select_medications(conn, user_id)
            })
        })
    }

    #[instrument(skip(self), fields(operation = "count_medications", backend = BACKEND))]
    fn count_medications(&self, user_name: &str) -> Result<usize> {
        timed(BACKEND, "count_medications", || {
            self.read(|conn| {
                let user_id = resolve_user_id(conn, user_name)?;
                let count: i64 = conn
                    .query_row(sql::COUNT_MEDICATIONS, params![user_id.get()], |row| row.get(0))
                    .map_err(|e| Error::operation("count_medications", e))?;
                usize::try_from(count).map_err(|e| Error::operation("count_medications", e))
            })
        })
    }
}
