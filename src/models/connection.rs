//! Connection-related data models.
//!
//! This module defines the parsed connection descriptor, the password prompt used
//! to complete descriptors that carry no secret, and the manager lifecycle states.

use crate::config::EngineOptions;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Message shown when a password has to be read from the terminal.
pub const PASSWORD_PROMPT: &str = "Enter database password: ";

/// Where an embedded SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Parsed connection target.
///
/// Grammar: `scheme[+driver]://[user[:password]@]host[:port]/database[?query]`.
/// Engine option keys are pulled out of the query string; the remaining
/// parameters are handed to the driver untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    dialect: Dialect,
    driver: Option<String>,
    /// Contains sensitive data - never log
    url: Url,
    sqlite_target: Option<SqliteTarget>,
    engine_options: EngineOptions,
}

impl ConnectionDescriptor {
    /// Parse a connection URL.
    pub fn parse(connection_url: &str) -> DbResult<Self> {
        let connection_url = connection_url.trim();
        let mut url = Url::parse(connection_url).map_err(|e| {
            DbError::invalid_configuration(format!("Failed to parse connection URL: {}", e))
        })?;

        let (backend, driver) = match url.scheme().split_once('+') {
            Some((backend, driver)) => (backend.to_string(), Some(driver.to_string())),
            None => (url.scheme().to_string(), None),
        };
        let dialect = Dialect::from_name(&backend).map_err(|_| {
            DbError::invalid_configuration(format!("Unknown database backend: {}", backend))
        })?;

        let engine_options = EngineOptions::extract_from_url(&mut url)?;

        let sqlite_target = if dialect == Dialect::Sqlite {
            Some(sqlite_target(&url)?)
        } else {
            if url.cannot_be_a_base() {
                return Err(DbError::invalid_configuration(format!(
                    "Connection URL for {} must have the form {}://host/database",
                    dialect, backend
                )));
            }
            if url.set_scheme(dialect.url_scheme()).is_err() {
                return Err(DbError::invalid_configuration(format!(
                    "Cannot normalize scheme {}",
                    url.scheme()
                )));
            }
            None
        };

        Ok(Self {
            dialect,
            driver,
            url,
            sqlite_target,
            engine_options,
        })
    }

    /// Read a descriptor from a file whose whole content is one connection URL.
    ///
    /// A descriptor without a password is completed through `prompt` unless the
    /// backend is SQLite.
    pub async fn from_file(
        path: impl AsRef<Path>,
        prompt: &dyn PasswordPrompt,
    ) -> DbResult<Self> {
        let path = path.as_ref();
        if !tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(DbError::config_file(
                path.display().to_string(),
                "not an existing file",
            ));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DbError::config_file(path.display().to_string(), e.to_string()))?;

        let mut descriptor = Self::parse(&content)?;
        if descriptor.needs_password() {
            let password = prompt.prompt(PASSWORD_PROMPT)?;
            descriptor.fill_password(&password)?;
        }
        Ok(descriptor)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Driver suffix of the scheme (`postgresql+psycopg` gives `psycopg`).
    pub fn driver(&self) -> Option<&str> {
        self.driver.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        match self.sqlite_target {
            Some(_) => None,
            None => self.url.host_str().filter(|h| !h.is_empty()),
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    pub fn username(&self) -> Option<&str> {
        Some(self.url.username()).filter(|u| !u.is_empty())
    }

    /// Percent-decoded password.
    pub fn password(&self) -> Option<String> {
        self.url
            .password()
            .map(|p| percent_decode_str(p).decode_utf8_lossy().into_owned())
    }

    /// Database name for server backends, file path for SQLite files.
    pub fn database(&self) -> Option<String> {
        match &self.sqlite_target {
            Some(SqliteTarget::Memory) => None,
            Some(SqliteTarget::File(path)) => Some(path.display().to_string()),
            None => {
                let name = self.url.path().trim_start_matches('/');
                (!name.is_empty())
                    .then(|| percent_decode_str(name).decode_utf8_lossy().into_owned())
            }
        }
    }

    pub fn sqlite_target(&self) -> Option<&SqliteTarget> {
        self.sqlite_target.as_ref()
    }

    pub fn engine_options(&self) -> &EngineOptions {
        &self.engine_options
    }

    /// True when no password is present and the backend is not an embedded file.
    pub fn needs_password(&self) -> bool {
        self.dialect != Dialect::Sqlite && self.url.password().is_none()
    }

    /// Fill in the missing password.
    ///
    /// Only allowed while [`needs_password`](Self::needs_password) holds, which
    /// makes the descriptor immutable once a secret has been set.
    pub(crate) fn fill_password(&mut self, password: &str) -> DbResult<()> {
        if !self.needs_password() {
            return Err(DbError::invalid_configuration(
                "Password can only be supplied once for a server backend",
            ));
        }
        self.url
            .set_password(Some(password))
            .map_err(|_| DbError::invalid_configuration("Connection URL cannot carry a password"))
    }

    /// URL handed to the driver. Includes the secret.
    pub(crate) fn driver_url(&self) -> &str {
        self.url.as_str()
    }

    /// Display-safe version of the URL (password masked).
    pub fn masked(&self) -> String {
        let mut masked = self.url.clone();
        if masked.password().is_some() {
            let _ = masked.set_password(Some("****"));
        }
        masked.to_string()
    }
}

/// Resolve the SQLite target from the host and path parts of a URL.
///
/// `sqlite://` and `sqlite::memory:` are in-memory, `sqlite:///rel.db` is
/// relative and `sqlite:////abs.db` is absolute.
fn sqlite_target(url: &Url) -> DbResult<SqliteTarget> {
    let raw = match url.cannot_be_a_base() {
        true => url.path().to_string(),
        false => format!("{}{}", url.host_str().unwrap_or(""), url.path()),
    };
    let raw = raw.strip_prefix('/').unwrap_or(&raw);
    let path = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| DbError::invalid_configuration(format!("Invalid SQLite path: {}", e)))?;
    match path.as_ref() {
        "" | ":memory:" => Ok(SqliteTarget::Memory),
        p => Ok(SqliteTarget::File(PathBuf::from(p))),
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("dialect", &self.dialect)
            .field("driver", &self.driver)
            .field("url", &self.masked())
            .field("engine_options", &self.engine_options)
            .finish()
    }
}

impl std::str::FromStr for ConnectionDescriptor {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Source of a password for descriptors that carry none.
pub trait PasswordPrompt: Send + Sync {
    fn prompt(&self, message: &str) -> DbResult<String>;
}

/// Reads the password from the controlling terminal without echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn prompt(&self, message: &str) -> DbResult<String> {
        rpassword::prompt_password(message)
            .map_err(|e| DbError::internal(format!("Failed to read password: {}", e)))
    }
}

/// Engine/session-factory state of a connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NoEngine,
    EngineOnly,
    /// Engine and session factory exist
    Connected,
}

impl LifecycleState {
    pub fn has_engine(&self) -> bool {
        !matches!(self, Self::NoEngine)
    }
}

/// Information about a live connection, returned by the `check` command.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub dialect: Dialect,
    pub url: String,
    pub server_version: Option<String>,
    pub database: Option<String>,
    pub tables: Vec<String>,
}
