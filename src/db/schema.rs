//! Schema introspection module.
//!
//! Lists the relations that exist in the connected database, for the
//! bootstrap round-trip check and the `check` command.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface.

use crate::db::engine::{DbPool, Engine};
use crate::error::DbResult;
use crate::models::{TableInfo, TableType};
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List tables and views of the current database/schema, sorted by name.
    pub async fn list_tables(engine: &Engine) -> DbResult<Vec<TableInfo>> {
        match engine.pool() {
            DbPool::Postgres(p) => postgres::list_tables(p).await,
            DbPool::MySql(p) => mysql::list_tables(p).await,
            DbPool::SQLite(p) => sqlite::list_tables(p).await,
        }
    }

    /// Names of the base tables only.
    pub async fn table_names(engine: &Engine) -> DbResult<Vec<String>> {
        Ok(Self::list_tables(engine)
            .await?
            .into_iter()
            .filter(|t| t.table_type == TableType::Table)
            .map(|t| t.name)
            .collect())
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name, table_type::text AS table_type
            FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type IN ('BASE TABLE', 'VIEW')
            UNION ALL
            SELECT matviewname::text AS table_name, 'MATERIALIZED VIEW' AS table_type
            FROM pg_matviews
            WHERE schemaname = current_schema()
            ORDER BY table_name
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn list_tables(pool: &PgPool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.get("table_name");
                let type_str: String = row.get("table_type");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed PostgreSQL tables");
        Ok(tables)
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>(column)
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .unwrap_or_default()
    }

    pub async fn list_tables(pool: &MySqlPool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }
                let type_str = get_string(row, "TABLE_TYPE");
                Some(TableInfo::new(name, TableType::parse(&type_str)))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn list_tables(pool: &SqlitePool) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::models::ConnectionDescriptor;

    #[test]
    fn test_table_type_parsing() {
        assert_eq!(TableType::parse("BASE TABLE"), TableType::Table);
        assert_eq!(TableType::parse("VIEW"), TableType::View);
        assert_eq!(TableType::parse("table"), TableType::Table);
        assert_eq!(
            TableType::parse("MATERIALIZED VIEW"),
            TableType::MaterializedView
        );
    }

    #[tokio::test]
    async fn test_list_sqlite_tables_and_views() {
        let descriptor = ConnectionDescriptor::parse("sqlite://").unwrap();
        let engine = Engine::open(&descriptor, &EngineOptions::default())
            .await
            .unwrap();
        engine.execute("CREATE TABLE b (x INTEGER)").await.unwrap();
        engine.execute("CREATE TABLE a (x INTEGER)").await.unwrap();
        engine.execute("CREATE VIEW v AS SELECT x FROM a").await.unwrap();

        let tables = SchemaInspector::list_tables(&engine).await.unwrap();
        assert_eq!(
            tables,
            vec![
                TableInfo::new("a", TableType::Table),
                TableInfo::new("b", TableType::Table),
                TableInfo::new("v", TableType::View),
            ]
        );
        assert_eq!(
            SchemaInspector::table_names(&engine).await.unwrap(),
            vec!["a", "b"]
        );
    }
}
