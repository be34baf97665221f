//! Configuration handling for dbutils.
//!
//! This module provides engine and session options plus the CLI configuration
//! (arguments and environment variables) used by the `dbutils` binary.

use crate::error::{DbError, DbResult};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Engine option keys extracted from the connection URL query string.
const ENGINE_OPTION_KEYS: &[&str] = &[
    "max_connections",
    "min_connections",
    "idle_timeout",
    "acquire_timeout",
    "test_before_acquire",
];

/// Connection pool options passed through to engine creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineOptions {
    /// Maximum connections in pool (default: 10 for MySQL/PostgreSQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600, never for in-memory SQLite)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl EngineOptions {
    /// Get max_connections with default value based on backend.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Fill unset fields from `fallback`.
    pub fn merged_with(&self, fallback: &EngineOptions) -> EngineOptions {
        EngineOptions {
            max_connections: self.max_connections.or(fallback.max_connections),
            min_connections: self.min_connections.or(fallback.min_connections),
            idle_timeout_secs: self.idle_timeout_secs.or(fallback.idle_timeout_secs),
            acquire_timeout_secs: self.acquire_timeout_secs.or(fallback.acquire_timeout_secs),
            test_before_acquire: self.test_before_acquire.or(fallback.test_before_acquire),
        }
    }

    /// Validate pool options.
    pub fn validate(&self) -> DbResult<()> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err(DbError::invalid_configuration(
                    "max_connections must be greater than 0",
                ));
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err(DbError::invalid_configuration(
                    "min_connections must be greater than 0",
                ));
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(DbError::invalid_configuration(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    )));
                }
            }
        }
        Ok(())
    }

    /// Extract engine options from URL query params, keeping others for the driver.
    ///
    /// Invalid numeric or boolean values are ignored; the resulting options are
    /// validated before being returned.
    pub fn extract_from_url(url: &mut Url) -> DbResult<Self> {
        let mut opts = extract_options(url, ENGINE_OPTION_KEYS);
        let options = Self {
            max_connections: opts.remove("max_connections").and_then(|v| v.parse().ok()),
            min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
            idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
            acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
            test_before_acquire: opts.remove("test_before_acquire").and_then(|v| {
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }),
        };
        options.validate()?;
        Ok(options)
    }
}

/// Remove the given keys from the URL query string and return them.
/// Remaining parameters are re-encoded and left on the URL for the driver.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// Options applied to every session minted by a session factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionOptions {
    /// Per-statement timeout in seconds (default: 30)
    pub statement_timeout_secs: Option<u64>,
}

impl SessionOptions {
    /// Set the per-statement timeout.
    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = Some(secs);
        self
    }

    /// Get the statement timeout as a Duration.
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(
            self.statement_timeout_secs
                .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_SECS),
        )
    }
}

/// Subcommands of the `dbutils` binary.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Connect, then print the backend, server version and tables
    Check,
    /// Print the dialect-specific SQL fragments for a dialect
    Render {
        /// Dialect name (mssql, mysql, oracle, postgresql, sqlite)
        #[arg(long)]
        dialect: String,
        /// Length used for the unicode text type
        #[arg(long)]
        length: Option<i64>,
    },
}

/// Configuration for the `dbutils` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbutils",
    about = "Database engine/session lifecycle manager and dialect SQL fragments",
    version,
    author
)]
pub struct Config {
    /// Connection URL: scheme://[user[:password]@]host/database
    #[arg(short = 'u', long = "url", value_name = "URL", env = "DBUTILS_URL")]
    pub url: Option<String>,

    /// File whose entire content is a connection URL
    #[arg(
        short = 'c',
        long = "config-file",
        value_name = "PATH",
        env = "DBUTILS_CONFIG_FILE",
        conflicts_with = "url"
    )]
    pub config_file: Option<PathBuf>,

    /// Key sessions by calling context instead of holding a single session
    #[arg(long, env = "DBUTILS_SCOPED")]
    pub scoped: bool,

    /// Statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_STATEMENT_TIMEOUT_SECS,
        env = "DBUTILS_STATEMENT_TIMEOUT"
    )]
    pub statement_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "DBUTILS_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBUTILS_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            url: None,
            config_file: None,
            scoped: false,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
            command: Command::Check,
        }
    }

    /// Session options derived from the CLI arguments.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default().with_statement_timeout(self.statement_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
