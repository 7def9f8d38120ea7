//! Storage backend selection and PostgreSQL connection settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which [`EventStore`](crate::EventStore) implementation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// Embedded `SQLite` file.
    #[default]
    Sqlite,
    /// PostgreSQL server (requires the `postgres` feature).
    Postgres,
}

impl StorageBackendType {
    /// Parses a backend name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackendType,
    /// `SQLite` database file.
    pub sqlite_path: PathBuf,
    /// PostgreSQL URL or `key=value` connection string.
    pub postgres_url: String,
    /// Maximum pooled PostgreSQL connections (backend default when unset).
    pub pool_max_size: Option<usize>,
}

impl StorageConfig {
    /// Configuration for a `SQLite` file at `path`.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendType::Sqlite,
            sqlite_path: path.into(),
            postgres_url: PostgresParts::default().connection_string(),
            pool_max_size: None,
        }
    }

    /// The PostgreSQL connection string with any password masked.
    #[must_use]
    pub fn redacted_postgres_url(&self) -> String {
        redact_password(&self.postgres_url)
    }
}

/// Individual PostgreSQL connection settings, as given by `DB_NAME`,
/// `DB_USER`, `DB_PASSWORD`, `DB_HOST` and `DB_PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresParts {
    /// Database name.
    pub dbname: String,
    /// Role name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Host name or socket directory.
    pub host: String,
    /// Port.
    pub port: String,
}

impl Default for PostgresParts {
    fn default() -> Self {
        Self {
            dbname: "medtracker".to_string(),
            user: "meduser".to_string(),
            password: "medpass".to_string(),
            host: "localhost".to_string(),
            port: "5432".to_string(),
        }
    }
}

impl PostgresParts {
    /// Builds a libpq-style `key='value'` connection string.
    ///
    /// Values are quoted, with `\` and `'` escaped, so passwords containing
    /// spaces or quotes survive.
    #[must_use]
    pub fn connection_string(&self) -> String {
        [
            ("host", &self.host),
            ("port", &self.port),
            ("user", &self.user),
            ("password", &self.password),
            ("dbname", &self.dbname),
        ]
        .iter()
        .map(|(key, value)| format!("{key}='{}'", quote_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

fn quote_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Masks the password in a `postgres://` URL or a `key=value` string.
#[must_use]
pub fn redact_password(conn: &str) -> String {
    if let Some(scheme_end) = conn.find("://") {
        let rest = &conn[scheme_end + 3..];
        let Some(at) = rest.rfind('@') else {
            return conn.to_string();
        };
        let userinfo = &rest[..at];
        return userinfo.find(':').map_or_else(
            || conn.to_string(),
            |colon| {
                format!(
                    "{}{}:***{}",
                    &conn[..scheme_end + 3],
                    &userinfo[..colon],
                    &rest[at..]
                )
            },
        );
    }

    let Some(start) = conn.find("password=") else {
        return conn.to_string();
    };
    let value_start = start + "password=".len();
    let tail = &conn[value_start..];
    let value_len = if tail.starts_with('\'') {
        quoted_len(tail)
    } else {
        tail.find(char::is_whitespace).unwrap_or(tail.len())
    };
    format!("{}***{}", &conn[..value_start], &tail[value_len..])
}

/// Length of a leading single-quoted value, including both quotes.
fn quoted_len(s: &str) -> usize {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '\'' => return i + 1,
            _ => {},
        }
    }
    s.len()
}
