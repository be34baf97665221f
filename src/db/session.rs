//! Unit-of-work session bound to one engine.
//!
//! A session opens its transaction on the first write and keeps it until
//! `commit` or `rollback`. Reads before that go straight to the pool; reads
//! after it see the session's own uncommitted writes.

use crate::config::SessionOptions;
use crate::db::engine::Engine;
use crate::db::executor::QueryExecutor;
use crate::db::query::{BindStyle, CompiledStatement, Delete, Insert, Select};
use crate::db::transaction::DbTransaction;
use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::models::{Entity, QueryParam, Record, Table};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct Session {
    id: String,
    engine: Engine,
    executor: QueryExecutor,
    transaction: Mutex<Option<DbTransaction>>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(engine: Engine, options: &SessionOptions) -> Self {
        let id = format!("ses_{}", uuid::Uuid::new_v4().simple());
        debug!(session_id = %id, dialect = %engine.dialect(), "Session opened");
        Self {
            id,
            engine,
            executor: QueryExecutor::new(options.statement_timeout()),
            transaction: Mutex::new(None),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True while writes are waiting for `commit` or `rollback`.
    pub async fn has_pending(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    /// Run a read statement.
    pub async fn fetch(&self, statement: &CompiledStatement) -> DbResult<Vec<Record>> {
        let mut guard = self.transaction.lock().await;
        match guard.as_mut() {
            Some(tx) => {
                self.executor
                    .fetch_in(tx, &statement.sql, &statement.params)
                    .await
            }
            None => {
                self.engine.check_connection(&self.id)?;
                self.executor
                    .fetch(self.engine.pool(), &statement.sql, &statement.params)
                    .await
            }
        }
    }

    /// Run a write statement inside the session transaction, opening it if needed.
    pub async fn execute(&self, statement: &CompiledStatement) -> DbResult<u64> {
        let mut guard = self.transaction.lock().await;
        let tx = match guard.take() {
            Some(tx) => tx,
            None => {
                self.engine.claim_connection(&self.id)?;
                let tx = match self.engine.pool().begin().await {
                    Ok(tx) => tx,
                    Err(e) => {
                        self.engine.release_connection(&self.id);
                        return Err(e);
                    }
                };
                debug!(session_id = %self.id, "Transaction started");
                tx
            }
        };
        let tx = guard.insert(tx);
        self.executor
            .execute_in(tx, &statement.sql, &statement.params)
            .await
    }

    pub async fn select(&self, select: &Select) -> DbResult<Vec<Record>> {
        let statement = select.compile(self.dialect(), BindStyle::Placeholder)?;
        self.fetch(&statement).await
    }

    /// Rows of `table` whose columns equal the given values.
    pub async fn query_table<I, K, V>(&self, table: &Table, filters: I) -> DbResult<Vec<Record>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.select(&Select::from_table(table).filter_by(filters))
            .await
    }

    /// Entities whose fields equal the given values.
    pub async fn query<E, I, K, V>(&self, filters: I) -> DbResult<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.query_table(&E::table(), filters)
            .await?
            .into_iter()
            .map(E::from_record)
            .collect()
    }

    pub async fn add_record(&self, table: &Table, record: &Record) -> DbResult<u64> {
        let statement = Insert::from_record(table, record)?.compile(self.dialect())?;
        self.execute(&statement).await
    }

    pub async fn add<E: Entity>(&self, entity: &E) -> DbResult<u64> {
        self.add_record(&E::table(), &entity.to_record()?).await
    }

    pub async fn delete_record(&self, table: &Table, record: &Record) -> DbResult<u64> {
        let statement = Delete::by_primary_key(table, record)?.compile(self.dialect())?;
        self.execute(&statement).await
    }

    pub async fn delete<E: Entity>(&self, entity: &E) -> DbResult<u64> {
        self.delete_record(&E::table(), &entity.to_record()?).await
    }

    /// Commit pending writes. Nothing to do when there are none.
    pub async fn commit(&self) -> DbResult<()> {
        let tx = self.transaction.lock().await.take();
        if let Some(tx) = tx {
            let result = tx.commit().await;
            self.engine.release_connection(&self.id);
            result?;
            info!(session_id = %self.id, "Session committed");
        }
        Ok(())
    }

    /// Discard pending writes. Nothing to do when there are none.
    pub async fn rollback(&self) -> DbResult<()> {
        let tx = self.transaction.lock().await.take();
        if let Some(tx) = tx {
            let result = tx.rollback().await;
            self.engine.release_connection(&self.id);
            result?;
            info!(session_id = %self.id, "Session rolled back");
        }
        Ok(())
    }

    /// End the session, discarding anything uncommitted.
    pub async fn close(&self) {
        if let Err(e) = self.rollback().await {
            warn!(session_id = %self.id, error = %e, "Rollback on close failed");
        }
        debug!(session_id = %self.id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // a dropped transaction rolls back and returns its connection
        self.engine.release_connection(&self.id);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("dialect", &self.dialect())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
