//! Configuration management.
//!
//! Precedence, lowest first: built-in defaults, the TOML config file,
//! environment variables, then CLI flags (applied by the binary).

mod storage;

pub use storage::{PostgresParts, StorageBackendType, StorageConfig, redact_password};

use crate::observability::{LogFormat, LoggingConfig, MetricsConfig, ObservabilityConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Identity used when none is configured.
pub const DEFAULT_USER_NAME: &str = "kermit";

/// Default HTTP listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 5000;

/// Main configuration for medtrack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedtrackConfig {
    /// Identity every operation acts for.
    pub user_name: String,
    /// Storage backend settings.
    pub storage: StorageConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Resolves the listen address.
    ///
    /// `host` may be an IP literal or a hostname; a hostname binds to the
    /// first address it resolves to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` cannot be resolved.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let target = format!("{}:{}", self.host, self.port);
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::operation("resolve_listen_addr", format!("{target}: {e}")))?
            .next()
            .ok_or_else(|| {
                Error::operation("resolve_listen_addr", format!("{target}: no addresses"))
            })
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Identity name.
    pub user: Option<String>,
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Server section.
    pub server: Option<ConfigFileServer>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics section.
    pub metrics: Option<ConfigFileMetrics>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileStorage {
    /// Backend name.
    pub backend: Option<String>,
    /// `SQLite` file.
    pub path: Option<String>,
    /// PostgreSQL connection string.
    pub url: Option<String>,
    /// Pool size.
    pub pool_max_size: Option<usize>,
}

/// Server section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileServer {
    /// Host.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `json` or `pretty`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileMetrics {
    /// Whether to install the exporter.
    pub enabled: Option<bool>,
    /// Scrape port.
    pub port: Option<u16>,
}

impl Default for MedtrackConfig {
    fn default() -> Self {
        Self {
            user_name: DEFAULT_USER_NAME.to_string(),
            storage: StorageConfig::sqlite(default_data_dir().join("medtrack.db")),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Platform data directory for medtrack (`.medtrack` when none is known).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".medtrack"),
        |dirs| dirs.data_dir().join("medtrack"),
    )
}

/// Platform config file location, if a home directory is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("medtrack").join("config.toml"))
}

impl MedtrackConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the effective configuration.
    ///
    /// Reads `path` when given (failing if it cannot be read), otherwise the
    /// platform config file when present, then applies process environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is unreadable or invalid, or an
    /// environment variable holds an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Self::from_config_file(file)
    }

    /// Loads the platform config file, or defaults when absent or invalid.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(path) = default_config_path().filter(|p| p.exists()) else {
            return Self::default();
        };

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Converts a `ConfigFile` to `MedtrackConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user) = file.user {
            config.user_name = user;
        }
        if let Some(storage) = file.storage {
            if let Some(backend) = storage.backend {
                config.storage.backend = parse_backend(&backend)?;
            }
            if let Some(path) = storage.path {
                config.storage.sqlite_path = PathBuf::from(path);
            }
            if let Some(url) = storage.url {
                config.storage.postgres_url = url;
            }
            if storage.pool_max_size.is_some() {
                config.storage.pool_max_size = storage.pool_max_size;
            }
        }
        if let Some(server) = file.server {
            if let Some(host) = server.host {
                config.server.host = host;
            }
            if let Some(port) = server.port {
                config.server.port = port;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = parse_log_format(&format)?;
            }
            if let Some(filter) = logging.filter {
                config.logging.filter = filter;
            }
        }
        if let Some(metrics) = file.metrics {
            if let Some(enabled) = metrics.enabled {
                config.metrics.enabled = enabled;
            }
            if let Some(port) = metrics.port {
                config.metrics.port = port;
            }
        }

        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn apply_env_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(user) = var("MEDTRACK_USER").or_else(|| var("DEMO_USERNAME")) {
            self.user_name = user;
        }

        if let Some(backend) = var("MEDTRACK_BACKEND") {
            self.storage.backend = parse_backend(&backend)?;
        }
        if let Some(path) = var("MEDTRACK_DB_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(url) = var("DATABASE_URL") {
            self.storage.postgres_url = url;
        } else if let Some(parts) = legacy_postgres_parts(&var) {
            self.storage.postgres_url = parts.connection_string();
        }
        if let Some(size) = var("MEDTRACK_POOL_MAX_SIZE") {
            self.storage.pool_max_size = Some(parse_number("MEDTRACK_POOL_MAX_SIZE", &size)?);
        }

        if let Some(host) = var("MEDTRACK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("MEDTRACK_PORT") {
            self.server.port = parse_number("MEDTRACK_PORT", &port)?;
        }

        if let Some(format) = var("MEDTRACK_LOG_FORMAT") {
            self.logging.format = parse_log_format(&format)?;
        }
        if let Some(filter) = var("MEDTRACK_LOG").or_else(|| var("RUST_LOG")) {
            self.logging.filter = filter;
        }

        if let Some(enabled) = var("MEDTRACK_METRICS_ENABLED") {
            self.metrics.enabled = parse_bool(&enabled);
        }
        if let Some(port) = var("MEDTRACK_METRICS_PORT") {
            self.metrics.port = parse_number("MEDTRACK_METRICS_PORT", &port)?;
        }

        Ok(())
    }

    /// Sets the identity.
    #[must_use]
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    /// Sets the `SQLite` database path and selects the `SQLite` backend.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.backend = StorageBackendType::Sqlite;
        self.storage.sqlite_path = path.into();
        self
    }

    /// Observability settings derived from this configuration.
    #[must_use]
    pub fn observability(&self, verbose: bool, metrics_expose: bool) -> ObservabilityConfig {
        ObservabilityConfig {
            logging: self.logging.clone().with_verbose(verbose),
            metrics: self.metrics.clone(),
            metrics_expose,
        }
    }
}

/// Collects `DB_*` variables, filling unset ones with defaults. Returns
/// `None` when none of them is set.
fn legacy_postgres_parts(var: &impl Fn(&str) -> Option<String>) -> Option<PostgresParts> {
    let dbname = var("DB_NAME");
    let user = var("DB_USER");
    let password = var("DB_PASSWORD");
    let host = var("DB_HOST");
    let port = var("DB_PORT");

    if dbname.is_none() && user.is_none() && password.is_none() && host.is_none() && port.is_none() {
        return None;
    }

    let defaults = PostgresParts::default();
    Some(PostgresParts {
        dbname: dbname.unwrap_or(defaults.dbname),
        user: user.unwrap_or(defaults.user),
        password: password.unwrap_or(defaults.password),
        host: host.unwrap_or(defaults.host),
        port: port.unwrap_or(defaults.port),
    })
}

fn parse_backend(value: &str) -> Result<StorageBackendType> {
    StorageBackendType::parse(value)
        .ok_or_else(|| Error::operation("parse_config", format!("unknown storage backend '{value}'")))
}

fn parse_log_format(value: &str) -> Result<LogFormat> {
    LogFormat::parse(value)
        .ok_or_else(|| Error::operation("parse_config", format!("unknown log format '{value}'")))
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::operation("parse_config", format!("{key}='{value}': {e}")))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
