//! SQL dialects and dialect-specific rendering.
//!
//! A [`Dialect`] names the SQL flavor of a backend. The [`registry`] maps
//! logical expressions to the SQL text each dialect expects, and [`view`]
//! builds view DDL on top of it.

pub mod registry;
pub mod view;

pub use registry::{
    DialectExpression, DialectExpressionRegistry, DialectKey, ExpressionKind, Renderer, render,
};
pub use view::create_view;

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a SQL backend flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MsSql,
    /// Includes MariaDB
    MySql,
    Oracle,
    PostgreSql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::MsSql,
        Dialect::MySql,
        Dialect::Oracle,
        Dialect::PostgreSql,
        Dialect::Sqlite,
    ];

    /// Parse a dialect name. Case-insensitive; `postgres` and `mariadb` are aliases.
    pub fn from_name(name: &str) -> DbResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mssql" => Ok(Self::MsSql),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "oracle" => Ok(Self::Oracle),
            "postgresql" | "postgres" => Ok(Self::PostgreSql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(DbError::invalid_configuration(format!(
                "Unknown dialect: {}",
                other
            ))),
        }
    }

    /// Canonical dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MsSql => "mssql",
            Self::MySql => "mysql",
            Self::Oracle => "oracle",
            Self::PostgreSql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Get the display name for this dialect.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MsSql => "SQL Server",
            Self::MySql => "MySQL",
            Self::Oracle => "Oracle",
            Self::PostgreSql => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// URL scheme understood by the driver.
    pub(crate) fn url_scheme(&self) -> &'static str {
        match self {
            Self::PostgreSql => "postgres",
            other => other.name(),
        }
    }

    /// Get the default port for this dialect.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MsSql => Some(1433),
            Self::MySql => Some(3306),
            Self::Oracle => Some(1521),
            Self::PostgreSql => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// Whether an engine can be opened for this dialect.
    pub fn has_driver(&self) -> bool {
        matches!(self, Self::MySql | Self::PostgreSql | Self::Sqlite)
    }

    /// Quote an identifier when it is not a plain lowercase name or is reserved.
    pub fn quote_identifier(&self, ident: &str) -> String {
        if is_plain_identifier(ident) && !is_reserved(ident) {
            return ident.to_string();
        }
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::MsSql => format!("[{}]", ident.replace(']', "]]")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSql => format!("${}", index),
            Self::Oracle => format!(":{}", index),
            Self::MsSql => format!("@p{}", index),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Render a parameter as an inline SQL literal.
    pub fn literal(&self, param: &QueryParam) -> DbResult<String> {
        match (self, param) {
            (Self::PostgreSql, QueryParam::Bool(b)) => {
                Ok(if *b { "TRUE" } else { "FALSE" }.to_string())
            }
            (Self::PostgreSql, QueryParam::Bytes(bytes)) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                Ok(format!("'\\x{}'::bytea", hex))
            }
            (Self::MySql, QueryParam::String(s)) => Ok(format!(
                "'{}'",
                s.replace('\\', "\\\\").replace('\'', "''")
            )),
            _ => param.to_sql_literal(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

fn is_plain_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Words reserved in at least one supported dialect.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "check", "column", "create", "default",
    "delete", "desc", "distinct", "drop", "else", "end", "exists", "from", "grant", "group",
    "having", "in", "index", "insert", "into", "is", "join", "key", "like", "limit", "not",
    "null", "offset", "on", "or", "order", "primary", "references", "select", "session", "set",
    "table", "then", "to", "union", "unique", "update", "user", "values", "view", "when",
    "where", "with",
];

fn is_reserved(ident: &str) -> bool {
    RESERVED_WORDS.contains(&ident)
}
