//! Dispatch table from logical expressions to dialect-specific SQL text.
//!
//! Each entry maps an [`ExpressionKind`] and a [`DialectKey`] to a pure
//! [`Renderer`]. Lookup tries the exact dialect first, then the [`DialectKey::Any`]
//! wildcard. A kind with neither entry for a dialect is a configuration error.

use super::Dialect;
use crate::db::query::{BindStyle, Select};
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Largest NVARCHAR2 length accepted by older Oracle releases.
pub const ORACLE_NVARCHAR2_MAX: i64 = 4000;

/// A logical SQL fragment whose text depends on the dialect.
#[derive(Debug, Clone)]
pub enum DialectExpression {
    /// Current UTC time, used as a server-side column default
    TimestampDefault,
    /// Portable unicode text column type
    UnicodeText { length: Option<i64> },
    CreateView {
        name: String,
        query: Box<Select>,
        materialized: bool,
    },
    DropView { name: String, materialized: bool },
}

impl DialectExpression {
    pub fn unicode_text(length: Option<i64>) -> Self {
        Self::UnicodeText { length }
    }

    pub fn create_view(name: impl Into<String>, query: Select, materialized: bool) -> Self {
        Self::CreateView {
            name: name.into(),
            query: Box::new(query),
            materialized,
        }
    }

    pub fn drop_view(name: impl Into<String>, materialized: bool) -> Self {
        Self::DropView {
            name: name.into(),
            materialized,
        }
    }

    pub fn kind(&self) -> ExpressionKind {
        match self {
            Self::TimestampDefault => ExpressionKind::TimestampDefault,
            Self::UnicodeText { .. } => ExpressionKind::UnicodeText,
            Self::CreateView { .. } => ExpressionKind::CreateView,
            Self::DropView { .. } => ExpressionKind::DropView,
        }
    }
}

/// Tag of a [`DialectExpression`], used as half of the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    TimestampDefault,
    UnicodeText,
    CreateView,
    DropView,
}

/// Dialect half of the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKey {
    Named(Dialect),
    /// Fallback consulted after an exact-match lookup fails
    Any,
}

impl From<Dialect> for DialectKey {
    fn from(dialect: Dialect) -> Self {
        Self::Named(dialect)
    }
}

pub type Renderer = fn(&DialectExpression, Dialect) -> DbResult<String>;

#[derive(Debug, Clone)]
pub struct DialectExpressionRegistry {
    renderers: HashMap<(ExpressionKind, DialectKey), Renderer>,
}

impl DialectExpressionRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Register a renderer, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: ExpressionKind,
        key: impl Into<DialectKey>,
        renderer: Renderer,
    ) -> Option<Renderer> {
        self.renderers.insert((kind, key.into()), renderer)
    }

    /// Find the renderer for `kind` on `dialect`, falling back to the wildcard.
    pub fn lookup(&self, kind: ExpressionKind, dialect: Dialect) -> Option<Renderer> {
        self.renderers
            .get(&(kind, DialectKey::Named(dialect)))
            .or_else(|| self.renderers.get(&(kind, DialectKey::Any)))
            .copied()
    }

    /// Render `expr` for the dialect called `dialect_name`.
    pub fn render(&self, expr: &DialectExpression, dialect_name: &str) -> DbResult<String> {
        self.render_for(expr, Dialect::from_name(dialect_name)?)
    }

    /// Render `expr` for an already parsed dialect.
    pub fn render_for(&self, expr: &DialectExpression, dialect: Dialect) -> DbResult<String> {
        let kind = expr.kind();
        let renderer = self.lookup(kind, dialect).ok_or_else(|| {
            DbError::invalid_configuration(format!(
                "No renderer for {:?} on dialect {}",
                kind, dialect
            ))
        })?;
        let sql = renderer(expr, dialect)?;
        debug!(kind = ?kind, dialect = %dialect, sql = %sql, "Rendered dialect expression");
        Ok(sql)
    }
}

impl Default for DialectExpressionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register(ExpressionKind::TimestampDefault, Dialect::MsSql, |_, _| {
            Ok("GETUTCDATE()".to_string())
        });
        registry.register(ExpressionKind::TimestampDefault, Dialect::MySql, |_, _| {
            Ok("UTC_TIMESTAMP()".to_string())
        });
        registry.register(ExpressionKind::TimestampDefault, Dialect::Oracle, |_, _| {
            Ok("SYS_EXTRACT_UTC(SYSTIMESTAMP)".to_string())
        });
        registry.register(
            ExpressionKind::TimestampDefault,
            Dialect::PostgreSql,
            |_, _| Ok("(NOW() AT TIME ZONE 'UTC')".to_string()),
        );
        registry.register(ExpressionKind::TimestampDefault, Dialect::Sqlite, |_, _| {
            Ok("CURRENT_TIMESTAMP".to_string())
        });

        registry.register(ExpressionKind::UnicodeText, Dialect::MsSql, render_mssql_unicode);
        registry.register(ExpressionKind::UnicodeText, Dialect::Oracle, render_oracle_unicode);
        for dialect in [Dialect::MySql, Dialect::PostgreSql, Dialect::Sqlite] {
            registry.register(ExpressionKind::UnicodeText, dialect, |_, _| {
                Ok("TEXT".to_string())
            });
        }

        registry.register(ExpressionKind::CreateView, DialectKey::Any, render_create_view);
        registry.register(ExpressionKind::DropView, DialectKey::Any, render_drop_view);
        registry.register(
            ExpressionKind::CreateView,
            Dialect::PostgreSql,
            render_postgres_create_view,
        );
        registry.register(
            ExpressionKind::DropView,
            Dialect::PostgreSql,
            render_postgres_drop_view,
        );

        registry
    }
}

static DEFAULT_REGISTRY: LazyLock<DialectExpressionRegistry> =
    LazyLock::new(DialectExpressionRegistry::default);

/// Render `expr` with the built-in renderers.
pub fn render(expr: &DialectExpression, dialect_name: &str) -> DbResult<String> {
    DEFAULT_REGISTRY.render(expr, dialect_name)
}

/// Positive length, or `None` for the unbounded marker.
fn bounded_length(expr: &DialectExpression) -> DbResult<Option<i64>> {
    match expr {
        DialectExpression::UnicodeText { length } => Ok(length.filter(|len| *len > 0)),
        other => Err(mismatched(other, ExpressionKind::UnicodeText)),
    }
}

fn render_mssql_unicode(expr: &DialectExpression, _: Dialect) -> DbResult<String> {
    Ok(match bounded_length(expr)? {
        Some(len) => format!("NVARCHAR({})", len),
        None => "NVARCHAR(MAX)".to_string(),
    })
}

fn render_oracle_unicode(expr: &DialectExpression, _: Dialect) -> DbResult<String> {
    Ok(format!(
        "NVARCHAR2({})",
        bounded_length(expr)?.unwrap_or(ORACLE_NVARCHAR2_MAX)
    ))
}

fn render_create_view(expr: &DialectExpression, dialect: Dialect) -> DbResult<String> {
    match expr {
        DialectExpression::CreateView { name, query, .. } => Ok(format!(
            "CREATE VIEW {} AS {}",
            dialect.quote_identifier(name),
            query.compile(dialect, BindStyle::Literal)?.sql
        )),
        other => Err(mismatched(other, ExpressionKind::CreateView)),
    }
}

fn render_drop_view(expr: &DialectExpression, dialect: Dialect) -> DbResult<String> {
    match expr {
        DialectExpression::DropView { name, .. } => Ok(format!(
            "DROP VIEW IF EXISTS {}",
            dialect.quote_identifier(name)
        )),
        other => Err(mismatched(other, ExpressionKind::DropView)),
    }
}

fn render_postgres_create_view(expr: &DialectExpression, dialect: Dialect) -> DbResult<String> {
    match expr {
        DialectExpression::CreateView {
            name,
            query,
            materialized: true,
        } => Ok(format!(
            "CREATE MATERIALIZED VIEW {} AS {}",
            dialect.quote_identifier(name),
            query.compile(dialect, BindStyle::Literal)?.sql
        )),
        _ => render_create_view(expr, dialect),
    }
}

fn render_postgres_drop_view(expr: &DialectExpression, dialect: Dialect) -> DbResult<String> {
    match expr {
        DialectExpression::DropView {
            name,
            materialized: true,
        } => Ok(format!(
            "DROP MATERIALIZED VIEW IF EXISTS {}",
            dialect.quote_identifier(name)
        )),
        _ => render_drop_view(expr, dialect),
    }
}

fn mismatched(expr: &DialectExpression, expected: ExpressionKind) -> DbError {
    DbError::internal(format!(
        "Renderer for {:?} received {:?}",
        expected,
        expr.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnType, Table};

    fn user_table() -> Table {
        Table::new("user")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("first_name", ColumnType::String(Some(64))))
    }

    #[test]
    fn test_timestamp_default_table() {
        let expected = [
            ("mssql", "GETUTCDATE()"),
            ("mysql", "UTC_TIMESTAMP()"),
            ("oracle", "SYS_EXTRACT_UTC(SYSTIMESTAMP)"),
            ("postgresql", "(NOW() AT TIME ZONE 'UTC')"),
            ("sqlite", "CURRENT_TIMESTAMP"),
        ];
        for (dialect, sql) in expected {
            assert_eq!(
                render(&DialectExpression::TimestampDefault, dialect).unwrap(),
                sql
            );
        }
    }

    #[test]
    fn test_unicode_text_table() {
        let text = |len| DialectExpression::unicode_text(len);
        assert_eq!(render(&text(Some(0)), "mssql").unwrap(), "NVARCHAR(MAX)");
        assert_eq!(render(&text(None), "mssql").unwrap(), "NVARCHAR(MAX)");
        assert_eq!(render(&text(Some(25)), "mssql").unwrap(), "NVARCHAR(25)");
        assert_eq!(render(&text(Some(10)), "oracle").unwrap(), "NVARCHAR2(10)");
        assert_eq!(render(&text(Some(-5)), "oracle").unwrap(), "NVARCHAR2(4000)");
        for dialect in ["mysql", "postgresql", "sqlite"] {
            assert_eq!(render(&text(Some(10)), dialect).unwrap(), "TEXT");
        }
    }

    #[test]
    fn test_unknown_dialect_name() {
        let err = render(&DialectExpression::TimestampDefault, "informix").unwrap_err();
        assert!(matches!(err, DbError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_missing_entry_is_configuration_error() {
        let registry = DialectExpressionRegistry::empty();
        let err = registry
            .render(&DialectExpression::TimestampDefault, "sqlite")
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_exact_entry_wins_over_wildcard() {
        let mut registry = DialectExpressionRegistry::empty();
        registry.register(ExpressionKind::DropView, DialectKey::Any, |_, _| {
            Ok("any".to_string())
        });
        registry.register(ExpressionKind::DropView, Dialect::MySql, |_, _| {
            Ok("mysql".to_string())
        });
        let expr = DialectExpression::drop_view("v", false);
        assert_eq!(registry.render(&expr, "mysql").unwrap(), "mysql");
        assert_eq!(registry.render(&expr, "sqlite").unwrap(), "any");
    }

    #[test]
    fn test_create_view_default_and_materialized() {
        let select = Select::from_table(&user_table())
            .columns(["id", "first_name"])
            .filter_eq("first_name", "Ann");

        let plain = DialectExpression::create_view("name_view", select.clone(), true);
        assert_eq!(
            render(&plain, "sqlite").unwrap(),
            "CREATE VIEW name_view AS SELECT id, first_name FROM \"user\" WHERE first_name = 'Ann'"
        );
        assert_eq!(
            render(&plain, "postgresql").unwrap(),
            "CREATE MATERIALIZED VIEW name_view AS SELECT id, first_name FROM \"user\" WHERE first_name = 'Ann'"
        );

        let not_materialized = DialectExpression::create_view("name_view", select, false);
        assert!(
            render(&not_materialized, "postgresql")
                .unwrap()
                .starts_with("CREATE VIEW name_view AS")
        );
    }

    #[test]
    fn test_drop_view_forms() {
        let materialized = DialectExpression::drop_view("name_view", true);
        assert_eq!(
            render(&materialized, "postgresql").unwrap(),
            "DROP MATERIALIZED VIEW IF EXISTS name_view"
        );
        assert_eq!(
            render(&materialized, "mysql").unwrap(),
            "DROP VIEW IF EXISTS name_view"
        );
        assert_eq!(
            render(&DialectExpression::drop_view("name_view", false), "postgresql").unwrap(),
            "DROP VIEW IF EXISTS name_view"
        );
    }
}
