//! Connection settings.
//!
//! [`ConnectSettings`] carries everything `ConnectionRegistry::connect` needs
//! to open one native connection: credentials, driver type, host, database
//! name, the registry name to file the handle under, and typed driver options
//! (no stringly-typed option array).

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry name used when the caller does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl DriverType {
    /// The DSN prefix for this driver.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Get the default port for this driver.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }
}

impl FromStr for DriverType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(DbError::UnsupportedDriver {
                driver: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed driver options.
///
/// The recognized knobs of the underlying drivers; everything defaults to the
/// driver's own behavior when left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Abort the initial connect after this many seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Connection character set (MySQL only, e.g. "utf8mb4").
    #[serde(default)]
    pub charset: Option<String>,
    /// Create the database file when absent (SQLite only).
    #[serde(default)]
    pub create_if_missing: bool,
    /// Size of the driver-side prepared statement cache.
    #[serde(default)]
    pub statement_cache_capacity: Option<usize>,
}

/// Settings for opening one named connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectSettings {
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    #[serde(default)]
    pub password: String,
    pub driver: DriverType,
    /// Server hostname, optionally `host:port`. Ignored for SQLite.
    pub host: String,
    /// Database name; the file path for SQLite.
    pub database: String,
    /// Registry name the handle is filed under.
    #[serde(default = "default_connection_name")]
    pub connection: String,
    #[serde(default)]
    pub options: DriverOptions,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION.to_string()
}

impl ConnectSettings {
    /// Create settings for the `"default"` connection name.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        driver: DriverType,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            driver,
            host: host.into(),
            database: database.into(),
            connection: default_connection_name(),
            options: DriverOptions::default(),
        }
    }

    /// File the handle under a different registry name.
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    /// Set the driver options.
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// The credential-free DSN, `"<type>:host=<host>;dbname=<name>"`.
    ///
    /// Display and logging only; the actual connect goes through the driver's
    /// typed options.
    pub fn dsn(&self) -> String {
        format!(
            "{}:host={};dbname={}",
            self.driver.as_str(),
            self.host,
            self.database
        )
    }

    /// Split `host` into hostname and explicit port, when one is given.
    pub(crate) fn host_and_port(&self) -> (&str, Option<u16>) {
        match self.host.split_once(':') {
            Some((host, port)) => (host, port.parse().ok()),
            None => (&self.host, None),
        }
    }
}

impl fmt::Debug for ConnectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("connection", &self.connection)
            .field("options", &self.options)
            .finish()
    }
}
