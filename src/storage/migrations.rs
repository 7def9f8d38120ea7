//! PostgreSQL schema migrations.
//!
//! Migrations are embedded at compile time and applied in version order when
//! a [`PostgresEventStore`](super::PostgresEventStore) connects. Each one runs
//! in its own transaction together with the row that records it, so a failed
//! migration leaves no partial schema behind.
//!
//! # Usage
//!
//! ```rust,ignore
//! use medtrack::storage::migrations::{Migration, MigrationRunner};
//!
//! const MIGRATIONS: &[Migration] = &[Migration {
//!     version: 1,
//!     description: "Users table",
//!     sql: "CREATE TABLE IF NOT EXISTS users (id BIGSERIAL PRIMARY KEY)",
//! }];
//!
//! MigrationRunner::new(pool, "medtrack_schema_migrations")
//!     .run(MIGRATIONS)
//!     .await?;
//! ```

use crate::{Error, Result};
use deadpool_postgres::{Object, Pool};

/// A single migration with version and SQL.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Migration version (sequential, starting at 1).
    pub version: i32,
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to apply (statements separated by semicolons).
    pub sql: &'static str,
}

/// Applies pending migrations and records them in a tracking table.
pub struct MigrationRunner {
    pool: Pool,
    tracking_table: String,
}

impl MigrationRunner {
    /// Creates a runner that records applied versions in `tracking_table`.
    #[must_use]
    pub fn new(pool: Pool, tracking_table: impl Into<String>) -> Self {
        Self {
            pool,
            tracking_table: tracking_table.into(),
        }
    }

    /// Returns the tracking table name.
    #[must_use]
    pub fn tracking_table(&self) -> &str {
        &self.tracking_table
    }

    /// Runs all pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be acquired or a migration fails.
    pub async fn run(&self, migrations: &[Migration]) -> Result<()> {
        let mut client = self.client().await?;

        self.ensure_tracking_table(&client).await?;
        let current_version = self.read_version(&client).await?;

        for migration in migrations.iter().filter(|m| m.version > current_version) {
            self.apply(&mut client, migration).await?;
        }

        Ok(())
    }

    /// Returns the highest applied version, or 0 when nothing was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    pub async fn current_version(&self) -> Result<i32> {
        let client = self.client().await?;
        self.ensure_tracking_table(&client).await?;
        self.read_version(&client).await
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::operation("migration_get_connection", e))
    }

    async fn ensure_tracking_table(&self, client: &Object) -> Result<()> {
        let sql = format!(
            r"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
            self.tracking_table
        );

        client
            .execute(&sql, &[])
            .await
            .map_err(|e| Error::operation("create_migrations_table", e))?;
        Ok(())
    }

    async fn read_version(&self, client: &Object) -> Result<i32> {
        let sql = format!("SELECT COALESCE(MAX(version), 0) FROM {}", self.tracking_table);
        client
            .query_one(&sql, &[])
            .await
            .map(|row| row.get(0))
            .map_err(|e| Error::operation("read_schema_version", e))
    }

    async fn apply(&self, client: &mut Object, migration: &Migration) -> Result<()> {
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::operation(format!("migration_v{}_begin_tx", migration.version), e))?;

        for statement in migration.sql.split(';').map(str::trim) {
            if statement.is_empty() {
                continue;
            }
            tx.execute(statement, &[]).await.map_err(|e| {
                Error::operation(
                    format!("migration_v{}: {}", migration.version, migration.description),
                    e,
                )
            })?;
        }

        let record = format!(
            "INSERT INTO {} (version, description) VALUES ($1, $2)",
            self.tracking_table
        );
        tx.execute(&record, &[&migration.version, &migration.description])
            .await
            .map_err(|e| Error::operation("record_migration", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::operation(format!("migration_v{}_commit", migration.version), e))?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            tracking_table = %self.tracking_table,
            "Applied migration"
        );

        Ok(())
    }
}

/// Maximum version across a set of migrations.
#[must_use]
pub fn max_version(migrations: &[Migration]) -> i32 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}
