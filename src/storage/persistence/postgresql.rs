//! PostgreSQL-based event store.
//!
//! Available with the `postgres` feature. Connections come from a
//! `deadpool-postgres` pool; the schema is managed by embedded
//! [migrations](crate::storage::migrations).
//!
//! The [`EventStore`] trait is synchronous, so every operation is driven to
//! completion with [`PostgresEventStore::block_on`]. Inside a tokio runtime
//! the caller must be on a blocking thread (`spawn_blocking`); outside one the
//! store owns a private current-thread runtime for its whole lifetime, so
//! pooled connections always stay attached to the runtime that opened them.

use crate::models::{
    EVENT_TYPE_TAKEN, EXCEPTION_CODE_NONE, EventId, EventListing, LogEventCommand, Medication,
    MedicationId, NewMedication, RecordedEvent, UserId,
};
use crate::storage::migrations::{Migration, MigrationRunner};
use crate::storage::sqlite::{EventRow, build_listing_from_row, timed};
use crate::storage::traits::EventStore;
use crate::{Error, Result};
use deadpool_postgres::{Client, Config, Pool, Runtime as PoolRuntime};
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_postgres::{NoTls, Row, Transaction};
use tracing::instrument;

const BACKEND: &str = "postgres";

/// Table recording applied schema versions.
const MIGRATIONS_TABLE: &str = "medtrack_schema_migrations";

/// Embedded migrations compiled into the binary.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Users, medications and medication events",
        sql: r"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                user_name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS medications (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                dosage_amount NUMERIC(10, 2) NOT NULL,
                dosage_unit TEXT NOT NULL,
                route TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                UNIQUE (user_id, name),
                UNIQUE (id, user_id)
            );
            CREATE TABLE IF NOT EXISTS medication_events (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                medication_id BIGINT NOT NULL,
                scheduled_time TIMESTAMP,
                actual_time TIMESTAMP,
                event_type TEXT NOT NULL,
                event_source TEXT NOT NULL
                    CHECK (event_source IN ('manual', 'nfc', 'smart_bottle', 'scanner')),
                exception_code TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (medication_id, user_id) REFERENCES medications (id, user_id)
            )
        ",
    },
    Migration {
        version: 2,
        description: "Index events by user and effective time",
        sql: r"
            CREATE INDEX IF NOT EXISTS idx_medication_events_user_time
                ON medication_events (user_id, (COALESCE(actual_time, scheduled_time)) DESC)
        ",
    },
];

const INSERT_USER: &str =
    "INSERT INTO users (user_name) VALUES ($1) ON CONFLICT (user_name) DO NOTHING";

const SELECT_USER_ID: &str = "SELECT id FROM users WHERE user_name = $1";

const SELECT_MEDICATION_ID: &str = "SELECT id FROM medications WHERE user_id = $1 AND name = $2";

const INSERT_MEDICATION: &str = "
    INSERT INTO medications (user_id, name, dosage_amount, dosage_unit, route, notes)
    VALUES ($1, $2, $3::float8, $4, $5, $6)
    ON CONFLICT (user_id, name) DO NOTHING
    RETURNING id";

const INSERT_EVENT: &str = "
    INSERT INTO medication_events (
        user_id, medication_id, scheduled_time, actual_time,
        event_type, event_source, exception_code, notes
    )
    VALUES ($1, $2, $3, $3, $4, $5, $6, $7)
    RETURNING id";

const SELECT_EVENTS: &str = "
    SELECT
        e.id,
        m.name AS medication,
        COALESCE(e.actual_time, e.scheduled_time) AS event_time,
        e.event_source,
        e.notes
    FROM medication_events e
    JOIN medications m ON m.id = e.medication_id
    WHERE e.user_id = $1
    ORDER BY event_time DESC NULLS LAST, e.id DESC";

const SELECT_MEDICATIONS: &str = "
    SELECT id, user_id, name, dosage_amount::float8, dosage_unit, route, notes
    FROM medications
    WHERE user_id = $1
    ORDER BY name, id";

const COUNT_MEDICATIONS: &str = "SELECT COUNT(*) FROM medications WHERE user_id = $1";

/// Helper to map pool errors.
fn pool_error(e: impl std::fmt::Display) -> Error {
    Error::operation("postgres_get_client", e)
}

/// PostgreSQL-based event store.
pub struct PostgresEventStore {
    /// Connection pool.
    pool: Pool,
    /// Runtime used when the store was opened outside of tokio.
    runtime: Option<Runtime>,
}

impl PostgresEventStore {
    /// Default maximum connections in pool.
    const DEFAULT_POOL_MAX_SIZE: usize = 20;

    /// Connects and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the pool cannot be created, or
    /// a migration fails.
    pub fn new(connection_url: &str) -> Result<Self> {
        Self::with_pool_size(connection_url, None)
    }

    /// Connects with a bounded pool and applies pending migrations.
    ///
    /// # Arguments
    ///
    /// * `connection_url` - PostgreSQL URL or `key=value` connection string
    /// * `pool_max_size` - Maximum connections in pool (defaults to 20)
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the pool cannot be created, or
    /// a migration fails.
    pub fn with_pool_size(connection_url: &str, pool_max_size: Option<usize>) -> Result<Self> {
        let config = Self::parse_connection_url(connection_url)?;
        let cfg = Self::build_pool_config(&config, pool_max_size);

        let runtime = if Handle::try_current().is_ok() {
            None
        } else {
            Some(
                Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| Error::operation("postgres_create_runtime", e))?,
            )
        };

        let pool = cfg
            .create_pool(Some(PoolRuntime::Tokio1), NoTls)
            .map_err(|e| Error::operation("postgres_create_pool", e))?;

        let store = Self { pool, runtime };
        store.run_migrations()?;
        Ok(store)
    }

    /// Parses the connection URL into a tokio-postgres config.
    fn parse_connection_url(url: &str) -> Result<tokio_postgres::Config> {
        url.parse::<tokio_postgres::Config>()
            .map_err(|e| Error::operation("postgres_parse_url", e))
    }

    /// Extracts host string from tokio-postgres Host.
    #[cfg(unix)]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        }
    }

    /// Extracts host string from tokio-postgres Host (Windows: Tcp only).
    #[cfg(not(unix))]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        let tokio_postgres::config::Host::Tcp(s) = h;
        s.clone()
    }

    /// Builds a deadpool config from tokio-postgres config.
    ///
    /// Waits for, creates and recycles connections with a five second timeout
    /// each, so an exhausted pool surfaces as an error instead of a hang.
    fn build_pool_config(config: &tokio_postgres::Config, pool_max_size: Option<usize>) -> Config {
        let mut cfg = Config::new();
        cfg.host = config.get_hosts().first().map(Self::host_to_string);
        cfg.port = config.get_ports().first().copied();
        cfg.user = config.get_user().map(String::from);
        cfg.password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = config.get_dbname().map(String::from);

        let max_size = pool_max_size.unwrap_or(Self::DEFAULT_POOL_MAX_SIZE);
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(std::time::Duration::from_secs(5)),
                create: Some(std::time::Duration::from_secs(5)),
                recycle: Some(std::time::Duration::from_secs(5)),
            },
            ..Default::default()
        });

        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        cfg
    }

    /// Drives a future to completion from synchronous code.
    fn block_on<F, T>(&self, f: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(runtime) = &self.runtime {
            return runtime.block_on(f);
        }
        Handle::try_current()
            .map_err(|e| Error::operation("postgres_runtime_handle", e))?
            .block_on(f)
    }

    fn run_migrations(&self) -> Result<()> {
        self.block_on(async {
            MigrationRunner::new(self.pool.clone(), MIGRATIONS_TABLE)
                .run(MIGRATIONS)
                .await
        })
    }

    async fn create_user_async(&self, user_name: &str) -> Result<UserId> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::operation("begin_transaction", e))?;
        tx.execute(INSERT_USER, &[&user_name])
            .await
            .map_err(|e| Error::operation("insert_user", e))?;
        let user_id = resolve_user_id(&tx, user_name).await?;
        tx.commit()
            .await
            .map_err(|e| Error::operation("commit_transaction", e))?;
        Ok(user_id)
    }

    async fn record_event_async(
        &self,
        user_name: &str,
        command: &LogEventCommand,
    ) -> Result<RecordedEvent> {
        let mut client = self.pool.get().await.map_err(pool_error)?;

        // Dropping an uncommitted transaction rolls it back.
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::operation("begin_transaction", e))?;

        let user_id = resolve_user_id(&tx, user_name).await?;
        let (medication_id, medication_created) =
            get_or_create_medication(&tx, user_id, &command.medication_name).await?;
        let event_id = insert_event(&tx, user_id, medication_id, command).await?;

        tx.commit()
            .await
            .map_err(|e| Error::operation("commit_transaction", e))?;

        Ok(RecordedEvent {
            event_id,
            medication_id,
            medication_created,
        })
    }

    async fn list_events_async(&self, user_name: &str) -> Result<Vec<EventListing>> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = begin_read_only(&mut client).await?;
        let user_id = resolve_user_id(&tx, user_name).await?;
        let events = select_events(&tx, user_id).await?;
        end_read_only(tx).await?;
        Ok(events)
    }

    async fn list_medications_async(&self, user_name: &str) -> Result<Vec<Medication>> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = begin_read_only(&mut client).await?;
        let user_id = resolve_user_id(&tx, user_name).await?;
        let medications = select_medications(&tx, user_id).await?;
        end_read_only(tx).await?;
        Ok(medications)
    }

    async fn count_medications_async(&self, user_name: &str) -> Result<usize> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = begin_read_only(&mut client).await?;
        let user_id = resolve_user_id(&tx, user_name).await?;
        let count = count_medications(&tx, user_id).await?;
        end_read_only(tx).await?;
        Ok(count)
    }

    async fn resolve_user_async(&self, user_name: &str) -> Result<UserId> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = begin_read_only(&mut client).await?;
        let user_id = resolve_user_id(&tx, user_name).await?;
        end_read_only(tx).await?;
        Ok(user_id)
    }
}

async fn begin_read_only(client: &mut Client) -> Result<deadpool_postgres::Transaction<'_>> {
    client
        .build_transaction()
        .read_only(true)
        .start()
        .await
        .map_err(|e| Error::operation("begin_read_transaction", e))
}

async fn end_read_only(tx: deadpool_postgres::Transaction<'_>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| Error::operation("end_read_transaction", e))
}

async fn resolve_user_id(tx: &Transaction<'_>, user_name: &str) -> Result<UserId> {
    tx.query_opt(SELECT_USER_ID, &[&user_name])
        .await
        .map_err(|e| Error::operation("resolve_user", e))?
        .map(|row| row.try_get::<_, i64>(0))
        .transpose()
        .map_err(|e| Error::operation("resolve_user", e))?
        .map(UserId::new)
        .ok_or_else(|| Error::UserNotFound(user_name.to_string()))
}

async fn find_medication_id(
    tx: &Transaction<'_>,
    user_id: UserId,
    name: &str,
) -> Result<Option<MedicationId>> {
    tx.query_opt(SELECT_MEDICATION_ID, &[&user_id.get(), &name])
        .await
        .and_then(|row| row.map(|r| r.try_get::<_, i64>(0)).transpose())
        .map(|id| id.map(MedicationId::new))
        .map_err(|e| Error::operation("select_medication", e))
}

async fn get_or_create_medication(
    tx: &Transaction<'_>,
    user_id: UserId,
    name: &str,
) -> Result<(MedicationId, bool)> {
    if let Some(id) = find_medication_id(tx, user_id, name).await? {
        return Ok((id, false));
    }

    let new = NewMedication::with_defaults(user_id, name);
    let inserted = tx
        .query_opt(
            INSERT_MEDICATION,
            &[
                &new.user_id.get(),
                &new.name,
                &new.dosage_amount,
                &new.dosage_unit,
                &new.route,
                &new.notes,
            ],
        )
        .await
        .and_then(|row| row.map(|r| r.try_get::<_, i64>(0)).transpose())
        .map_err(|e| Error::operation("insert_medication", e))?;

    if let Some(id) = inserted {
        return Ok((MedicationId::new(id), true));
    }

    tracing::debug!(user_id = %user_id, medication = name, "Medication created concurrently, re-reading");
    find_medication_id(tx, user_id, name)
        .await?
        .map(|id| (id, false))
        .ok_or_else(|| {
            Error::operation(
                "insert_medication",
                format!("medication '{name}' conflicted but could not be re-read"),
            )
        })
}

async fn insert_event(
    tx: &Transaction<'_>,
    user_id: UserId,
    medication_id: MedicationId,
    command: &LogEventCommand,
) -> Result<EventId> {
    tx.query_one(
        INSERT_EVENT,
        &[
            &user_id.get(),
            &medication_id.get(),
            &command.taken_at,
            &EVENT_TYPE_TAKEN,
            &command.source.as_str(),
            &EXCEPTION_CODE_NONE,
            &command.notes,
        ],
    )
    .await
    .and_then(|row| row.try_get::<_, i64>(0))
    .map(EventId::new)
    .map_err(|e| Error::operation("insert_event", e))
}

fn event_row(row: &Row) -> std::result::Result<EventRow, tokio_postgres::Error> {
    Ok(EventRow {
        id: row.try_get(0)?,
        medication: row.try_get(1)?,
        event_time: row.try_get(2)?,
        event_source: row.try_get(3)?,
        notes: row.try_get(4)?,
    })
}

fn medication_row(row: &Row) -> std::result::Result<Medication, tokio_postgres::Error> {
    Ok(Medication {
        id: MedicationId::new(row.try_get(0)?),
        user_id: UserId::new(row.try_get(1)?),
        name: row.try_get(2)?,
        dosage_amount: row.try_get(3)?,
        dosage_unit: row.try_get(4)?,
        route: row.try_get(5)?,
        notes: row.try_get(6)?,
    })
}

async fn select_events(tx: &Transaction<'_>, user_id: UserId) -> Result<Vec<EventListing>> {
    let rows = tx
        .query(SELECT_EVENTS, &[&user_id.get()])
        .await
        .map_err(|e| Error::operation("list_events", e))?;

    rows.iter()
        .map(|row| {
            event_row(row)
                .map_err(|e| Error::operation("list_events_row", e))
                .and_then(build_listing_from_row)
        })
        .collect()
}

async fn select_medications(tx: &Transaction<'_>, user_id: UserId) -> Result<Vec<Medication>> {
    let rows = tx
        .query(SELECT_MEDICATIONS, &[&user_id.get()])
        .await
        .map_err(|e| Error::operation("list_medications", e))?;

    rows.iter()
        .map(|row| medication_row(row).map_err(|e| Error::operation("list_medications_row", e)))
        .collect()
}

async fn count_medications(tx: &Transaction<'_>, user_id: UserId) -> Result<usize> {
    let count: i64 = tx
        .query_one(COUNT_MEDICATIONS, &[&user_id.get()])
        .await
        .and_then(|row| row.try_get(0))
        .map_err(|e| Error::operation("count_medications", e))?;
    usize::try_from(count).map_err(|e| Error::operation("count_medications", e))
}

impl EventStore for PostgresEventStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self), fields(operation = "create_user", backend = BACKEND))]
    fn create_user(&self, user_name: &str) -> Result<UserId> {
        timed(BACKEND, "create_user", || {
            self.block_on(self.create_user_async(user_name))
        })
    }

    #[instrument(skip(self), fields(operation = "resolve_user", backend = BACKEND))]
    fn resolve_user(&self, user_name: &str) -> Result<UserId> {
        timed(BACKEND, "resolve_user", || {
            self.block_on(self.resolve_user_async(user_name))
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
            self.block_on(self.record_event_async(user_name, command))
        })
    }

    #[instrument(skip(self), fields(operation = "list_events", backend = BACKEND))]
    fn list_events(&self, user_name: &str) -> Result<Vec<EventListing>> {
        timed(BACKEND, "list_events", || {
            self.block_on(self.list_events_async(user_name))
        })
    }

    #[instrument(skip(self), fields(operation = "list_medications", backend = BACKEND))]
    fn list_medications(&self, user_name: &str) -> Result<Vec<Medication>> {
        timed(BACKEND, "list_medications", || {
            self.block_on(self.list_medications_async(user_name))
        })
    }

    #[instrument(skip(self), fields(operation = "count_medications", backend = BACKEND))]
    fn count_medications(&self, user_name: &str) -> Result<usize> {
        timed(BACKEND, "count_medications", || {
            self.block_on(self.count_medications_async(user_name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSource;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::env;

    /// Gets test database URL from environment or skips test.
    fn get_test_db_url() -> Option<String> {
        env::var("MEDTRACK_TEST_POSTGRES_URL").ok()
    }

    /// Creates a unique user name for test isolation.
    fn unique_user() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!("test_user_{ts}")
    }

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    fn command(name: &str, hour: u32, source: EventSource) -> LogEventCommand {
        LogEventCommand {
            medication_name: name.to_string(),
            taken_at: at(hour),
            source,
            notes: String::new(),
        }
    }

    #[test]
    fn test_record_and_list_events() {
        let Some(url) = get_test_db_url() else {
            eprintln!("Skipping: MEDTRACK_TEST_POSTGRES_URL not set");
            return;
        };

        let store = PostgresEventStore::new(&url).expect("Failed to create store");
        let user = unique_user();
        store.create_user(&user).expect("Failed to create user");

        let first = store
            .record_event(&user, &command("Aspirin", 8, EventSource::Manual))
            .expect("Failed to record event");
        let second = store
            .record_event(&user, &command("Aspirin", 9, EventSource::Nfc))
            .expect("Failed to record event");

        assert!(first.medication_created);
        assert!(!second.medication_created);
        assert_eq!(first.medication_id, second.medication_id);

        let events = store.list_events(&user).expect("Failed to list events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, second.event_id);
        assert_eq!(events[0].event_time, Some(at(9)));
        assert_eq!(events[0].event_source, EventSource::Nfc);
        assert_eq!(store.count_medications(&user).unwrap(), 1);
    }

    #[test]
    fn test_medication_defaults_round_trip_numeric() {
        let Some(url) = get_test_db_url() else {
            eprintln!("Skipping: MEDTRACK_TEST_POSTGRES_URL not set");
            return;
        };

        let store = PostgresEventStore::new(&url).expect("Failed to create store");
        let user = unique_user();
        store.create_user(&user).unwrap();
        store
            .record_event(&user, &command("Ibuprofen", 8, EventSource::Scanner))
            .unwrap();

        let meds = store.list_medications(&user).unwrap();
        assert_eq!(meds.len(), 1);
        assert!((meds[0].dosage_amount - 1.0).abs() < f64::EPSILON);
        assert_eq!(meds[0].route, "oral");
    }

    #[test]
    fn test_unknown_user() {
        let Some(url) = get_test_db_url() else {
            eprintln!("Skipping: MEDTRACK_TEST_POSTGRES_URL not set");
            return;
        };

        let store = PostgresEventStore::new(&url).expect("Failed to create store");
        let result = store.record_event(&unique_user(), &command("Aspirin", 8, EventSource::Manual));
        assert!(matches!(result, Err(Error::UserNotFound(_))));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let Some(url) = get_test_db_url() else {
            eprintln!("Skipping: MEDTRACK_TEST_POSTGRES_URL not set");
            return;
        };

        let store = PostgresEventStore::new(&url).expect("Failed to create store");
        PostgresEventStore::new(&url).expect("Second connect should skip applied migrations");

        let version = store
            .block_on(async {
                MigrationRunner::new(store.pool.clone(), MIGRATIONS_TABLE)
                    .current_version()
                    .await
            })
            .unwrap();
        assert_eq!(version, crate::storage::migrations::max_version(MIGRATIONS));
    }

    #[test]
    fn test_invalid_url() {
        assert!(PostgresEventStore::new("not a url ===").is_err());
    }
}
