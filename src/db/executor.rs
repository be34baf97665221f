//! Statement execution.
//!
//! This module runs compiled statements with a per-statement timeout, either
//! directly on a pool or inside an open transaction.
//!
//! # Architecture
//!
//! The executor uses backend-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and execute
//! - `postgres`: PostgreSQL-specific fetch and execute
//! - `sqlite`: SQLite-specific fetch and execute
//!
//! Each submodule is generic over the sqlx executor, so the same code serves a
//! pool and a transaction's connection.

use crate::config::DEFAULT_STATEMENT_TIMEOUT_SECS;
use crate::db::engine::DbPool;
use crate::db::transaction::DbTransaction;
use crate::db::types::RowToRecord;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Record};
use futures_util::TryStreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Runs statements with a fixed timeout.
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor {
    statement_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Fetch all rows on a pooled connection.
    pub async fn fetch(
        &self,
        pool: &DbPool,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Record>> {
        let start = Instant::now();
        let t = self.statement_timeout;
        let rows = match pool {
            DbPool::MySql(p) => mysql::fetch_rows(p, sql, params, t).await?,
            DbPool::Postgres(p) => postgres::fetch_rows(p, sql, params, t).await?,
            DbPool::SQLite(p) => sqlite::fetch_rows(p, sql, params, t).await?,
        };
        debug!(
            sql = %sql,
            params = params.len(),
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched rows"
        );
        Ok(rows)
    }

    /// Execute a statement on a pooled connection and return affected rows.
    pub async fn execute(&self, pool: &DbPool, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let start = Instant::now();
        let t = self.statement_timeout;
        let rows_affected = match pool {
            DbPool::MySql(p) => mysql::execute(p, sql, params, t).await?,
            DbPool::Postgres(p) => postgres::execute(p, sql, params, t).await?,
            DbPool::SQLite(p) => sqlite::execute(p, sql, params, t).await?,
        };
        debug!(
            sql = %sql,
            params = params.len(),
            rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Executed statement"
        );
        Ok(rows_affected)
    }

    /// Fetch all rows inside a transaction.
    pub async fn fetch_in(
        &self,
        tx: &mut DbTransaction,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<Record>> {
        let t = self.statement_timeout;
        let rows = match tx {
            DbTransaction::MySql(tx) => mysql::fetch_rows(&mut **tx, sql, params, t).await?,
            DbTransaction::Postgres(tx) => postgres::fetch_rows(&mut **tx, sql, params, t).await?,
            DbTransaction::SQLite(tx) => sqlite::fetch_rows(&mut **tx, sql, params, t).await?,
        };
        debug!(sql = %sql, params = params.len(), rows = rows.len(), "Fetched rows in transaction");
        Ok(rows)
    }

    /// Execute a statement inside a transaction.
    pub async fn execute_in(
        &self,
        tx: &mut DbTransaction,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let t = self.statement_timeout;
        let rows_affected = match tx {
            DbTransaction::MySql(tx) => mysql::execute(&mut **tx, sql, params, t).await?,
            DbTransaction::Postgres(tx) => postgres::execute(&mut **tx, sql, params, t).await?,
            DbTransaction::SQLite(tx) => sqlite::execute(&mut **tx, sql, params, t).await?,
        };
        debug!(sql = %sql, params = params.len(), rows_affected, "Executed in transaction");
        Ok(rows_affected)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS))
    }
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs() as u32)
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its backend.
// Statements without parameters go through the executor directly so DDL
// that cannot be prepared still runs.

mod mysql {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::MySql;

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Record>>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).try_collect::<Vec<_>>()
        } else {
            sqlx::query::<MySql>(sql)
                .bind_all(params)
                .fetch(executor)
                .try_collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(Ok(rows)) => Ok(rows.iter().map(RowToRecord::to_record).collect()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = sqlx::query::<MySql>(sql).bind_all(params);
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::Postgres;

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Record>>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).try_collect::<Vec<_>>()
        } else {
            sqlx::query::<Postgres>(sql)
                .bind_all(params)
                .fetch(executor)
                .try_collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(Ok(rows)) => Ok(rows.iter().map(RowToRecord::to_record).collect()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = sqlx::query::<Postgres>(sql).bind_all(params);
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::BindParams;
    use sqlx::Sqlite;

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<Vec<Record>>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let rows_future = if params.is_empty() {
            executor.fetch(sql).try_collect::<Vec<_>>()
        } else {
            sqlx::query::<Sqlite>(sql)
                .bind_all(params)
                .fetch(executor)
                .try_collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(Ok(rows)) => Ok(rows.iter().map(RowToRecord::to_record).collect()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
        query_timeout: Duration,
    ) -> DbResult<u64>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let result = if params.is_empty() {
            timeout(query_timeout, executor.execute(sql)).await
        } else {
            let query = sqlx::query::<Sqlite>(sql).bind_all(params);
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_default_timeout() {
        let executor = QueryExecutor::default();
        assert_eq!(
            executor.statement_timeout(),
            Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_executor_custom_timeout() {
        let executor = QueryExecutor::new(Duration::from_secs(5));
        assert_eq!(executor.statement_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fetch_and_execute_on_sqlite_pool() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let pool = DbPool::SQLite(pool);
        let executor = QueryExecutor::default();

        executor
            .execute(&pool, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let affected = executor
            .execute(
                &pool,
                "INSERT INTO t (name) VALUES (?)",
                &[QueryParam::from("a")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = executor
            .fetch(&pool, "SELECT id, name FROM t WHERE name = ?", &[QueryParam::from("a")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&serde_json::json!("a")));
        assert_eq!(rows[0].get("id"), Some(&serde_json::json!(1)));
    }
}
