//! Connection lifecycle management.
//!
//! A [`ConnectionManager`] walks one connection target through
//! engine → session factory → session:
//!
//! ```text
//! NoEngine --create_engine--> EngineOnly --create_session_factory--> Connected
//!    ^                                                                   |
//!    +----------------------------- close_engine ------------------------+
//! ```
//!
//! In unscoped mode the manager additionally holds at most one active session.
//! In scoped mode sessions live in a [`ScopedSessions`] registry keyed by the
//! calling context and the manager hands out the registry itself.
//!
//! Every precondition failure leaves the manager state untouched.

use crate::config::{EngineOptions, SessionOptions};
use crate::db::ddl;
use crate::db::engine::Engine;
use crate::db::schema::SchemaInspector;
use crate::db::session::Session;
use crate::db::session_factory::{ContextId, ScopedSessions, SessionFactory};
use crate::dialect::DialectExpressionRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionDescriptor, ConnectionInfo, Entity, LifecycleState, PasswordPrompt, QueryParam,
    Record, SchemaDescriptor, Table, TableInfo, TerminalPrompt,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum FactoryState {
    Plain(SessionFactory),
    Scoped(ScopedSessions),
}

/// What [`ConnectionManager::acquire_session`] and
/// [`ConnectionManager::current_session`] hand out.
#[derive(Debug, Clone)]
pub enum SessionHandle {
    /// A session minted for the caller (unscoped mode)
    Single(Arc<Session>),
    /// The context-keyed registry (scoped mode)
    Scoped(ScopedSessions),
}

impl SessionHandle {
    /// The session to use from the calling context.
    pub async fn session(&self) -> Arc<Session> {
        match self {
            Self::Single(session) => Arc::clone(session),
            Self::Scoped(scoped) => scoped.current().await,
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, Self::Scoped(_))
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    engine: Option<Engine>,
    factory: Option<FactoryState>,
    /// Unscoped mode only
    session: Option<Arc<Session>>,
}

/// Owns one engine, one session factory and, unscoped, one active session.
#[derive(Debug)]
pub struct ConnectionManager {
    descriptor: ConnectionDescriptor,
    schema: Option<Arc<SchemaDescriptor>>,
    registry: Arc<DialectExpressionRegistry>,
    scoped: bool,
    session_options: SessionOptions,
    state: RwLock<ManagerState>,
}

impl ConnectionManager {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            schema: None,
            registry: Arc::new(DialectExpressionRegistry::default()),
            scoped: false,
            session_options: SessionOptions::default(),
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Manager for a connection URL.
    pub fn parse(connection_url: &str) -> DbResult<Self> {
        Ok(Self::new(ConnectionDescriptor::parse(connection_url)?))
    }

    /// Manager for the URL stored in `path`, prompting on the terminal for a
    /// missing password.
    pub async fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::from_file_with_prompt(path, &TerminalPrompt).await
    }

    pub async fn from_file_with_prompt(
        path: impl AsRef<Path>,
        prompt: &dyn PasswordPrompt,
    ) -> DbResult<Self> {
        Ok(Self::new(
            ConnectionDescriptor::from_file(path, prompt).await?,
        ))
    }

    /// Schema used by [`bootstrap_schema`](Self::bootstrap_schema).
    pub fn with_schema(mut self, schema: Arc<SchemaDescriptor>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Registry used to render DDL.
    pub fn with_registry(mut self, registry: Arc<DialectExpressionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Key sessions by calling context.
    ///
    /// An in-memory SQLite engine has a single connection, so at most one
    /// context can hold pending writes at a time. Others get
    /// [`DbError::ConnectionBusy`] until that context commits or rolls back.
    pub fn scoped(mut self, scoped: bool) -> Self {
        self.scoped = scoped;
        self
    }

    /// Options applied by [`connect`](Self::connect) when it creates the factory.
    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.session_options = options;
        self
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> Option<&Arc<SchemaDescriptor>> {
        self.schema.as_ref()
    }

    pub fn is_scoped(&self) -> bool {
        self.scoped
    }

    pub async fn state(&self) -> LifecycleState {
        let state = self.state.read().await;
        match (&state.engine, &state.factory) {
            (None, _) => LifecycleState::NoEngine,
            (Some(_), None) => LifecycleState::EngineOnly,
            (Some(_), Some(_)) => LifecycleState::Connected,
        }
    }

    /// The current engine, if any.
    pub async fn engine(&self) -> Option<Engine> {
        self.state.read().await.engine.clone()
    }

    async fn require_engine(&self) -> DbResult<Engine> {
        self.engine().await.ok_or(DbError::NoEngine)
    }

    /// Open the engine. Options not given fall back to those in the URL.
    pub async fn create_engine(&self, options: &EngineOptions) -> DbResult<()> {
        if self.state.read().await.engine.is_some() {
            return Err(DbError::AlreadyConnected);
        }

        let options = options.merged_with(self.descriptor.engine_options());
        let engine = Engine::open(&self.descriptor, &options).await?;

        // Re-check after the connect to close the race with a concurrent call.
        let mut state = self.state.write().await;
        if state.engine.is_some() {
            drop(state);
            engine.dispose().await;
            return Err(DbError::AlreadyConnected);
        }
        info!(
            dialect = %engine.dialect(),
            url = %engine.url(),
            server_version = ?engine.server_version(),
            "Engine created"
        );
        state.engine = Some(engine);
        Ok(())
    }

    /// Dispose the engine. Sessions and the factory go with it. Safe to call
    /// repeatedly.
    ///
    /// Every session the factory minted, persisted or not, is closed first so
    /// open transactions hand their connections back before the pool shuts.
    pub async fn close_engine(&self) {
        let (engine, factory, session) = {
            let mut state = self.state.write().await;
            (
                state.engine.take(),
                state.factory.take(),
                state.session.take(),
            )
        };

        if let Some(session) = session {
            session.close().await;
        }
        match factory {
            Some(FactoryState::Scoped(scoped)) => {
                scoped.clear().await;
                scoped.factory().close_all().await;
            }
            Some(FactoryState::Plain(factory)) => {
                factory.close_all().await;
            }
            None => {}
        }
        match engine {
            Some(engine) => {
                engine.dispose().await;
                info!(url = %engine.url(), "Engine closed");
            }
            None => debug!("close_engine called without an engine"),
        }
    }

    /// Create every table of the schema, then run its after-create hooks.
    pub async fn bootstrap_schema(&self) -> DbResult<()> {
        let engine = self.require_engine().await?;
        let schema = self.schema.as_ref().ok_or(DbError::NoSchema)?;
        ddl::create_all(&engine, schema, &self.registry).await
    }

    /// Drop every table of the schema, running its drop hooks around it.
    pub async fn drop_schema(&self) -> DbResult<()> {
        let engine = self.require_engine().await?;
        let schema = self.schema.as_ref().ok_or(DbError::NoSchema)?;
        ddl::drop_all(&engine, schema, &self.registry).await
    }

    pub async fn create_session_factory(&self, options: SessionOptions) -> DbResult<()> {
        let mut state = self.state.write().await;
        let engine = state.engine.clone().ok_or(DbError::NoEngine)?;
        if state.factory.is_some() {
            return Err(DbError::AlreadyFactory);
        }

        if self.scoped && engine.is_single_connection() {
            warn!(
                url = %engine.url(),
                "Scoped sessions share one connection; one context at a time can hold pending writes"
            );
        }
        let factory = SessionFactory::new(engine, options);
        state.factory = Some(if self.scoped {
            FactoryState::Scoped(ScopedSessions::new(factory))
        } else {
            FactoryState::Plain(factory)
        });
        info!(scoped = self.scoped, "Session factory created");
        Ok(())
    }

    /// Create whatever is missing of engine and factory, bootstrapping the
    /// schema in between when asked.
    pub async fn connect(&self, bootstrap: bool) -> DbResult<()> {
        if bootstrap && self.schema.is_none() {
            return Err(DbError::NoSchema);
        }

        if self.state.read().await.engine.is_none() {
            match self.create_engine(&EngineOptions::default()).await {
                Ok(()) | Err(DbError::AlreadyConnected) => {}
                Err(e) => return Err(e),
            }
        }
        if bootstrap {
            self.bootstrap_schema().await?;
        }
        if self.state.read().await.factory.is_none() {
            match self
                .create_session_factory(self.session_options.clone())
                .await
            {
                Ok(()) | Err(DbError::AlreadyFactory) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Hand out a session.
    ///
    /// Scoped managers return the registry. Unscoped managers mint a new
    /// session and, when `persist` is set, keep it as the active session.
    pub async fn acquire_session(&self, persist: bool) -> DbResult<SessionHandle> {
        let mut state = self.state.write().await;
        let factory = match &state.factory {
            Some(FactoryState::Scoped(scoped)) => {
                return Ok(SessionHandle::Scoped(scoped.clone()));
            }
            Some(FactoryState::Plain(factory)) => factory,
            None => return Err(DbError::NoFactory),
        };

        if persist && state.session.is_some() {
            return Err(DbError::SessionAlreadyActive);
        }
        let session = factory.create_session();
        if persist {
            state.session = Some(Arc::clone(&session));
            info!(session_id = %session.id(), "Session acquired");
        }
        Ok(SessionHandle::Single(session))
    }

    /// Run `work` as one unit of work.
    ///
    /// Scoped managers give `work` its own registry entry and close it when
    /// `work` finishes, so spawned tasks do not leave sessions behind.
    /// Unscoped managers just run `work`.
    pub async fn session_scope<F: Future>(&self, work: F) -> F::Output {
        let scoped = match &self.state.read().await.factory {
            Some(FactoryState::Scoped(scoped)) => Some(scoped.clone()),
            _ => None,
        };
        match scoped {
            Some(scoped) => scoped.scope(work).await,
            None => work.await,
        }
    }

    /// The active session, the scoped registry, or `None`.
    pub async fn current_session(&self) -> Option<SessionHandle> {
        let state = self.state.read().await;
        match (&state.factory, &state.session) {
            (Some(FactoryState::Scoped(scoped)), _) => Some(SessionHandle::Scoped(scoped.clone())),
            (_, Some(session)) => Some(SessionHandle::Single(Arc::clone(session))),
            _ => None,
        }
    }

    /// Drop the session of the calling context (scoped) or the active session
    /// (unscoped). Uncommitted writes are rolled back.
    pub async fn release_session(&self) {
        let (scoped, session) = {
            let mut state = self.state.write().await;
            match &state.factory {
                Some(FactoryState::Scoped(scoped)) => (Some(scoped.clone()), None),
                _ => (None, state.session.take()),
            }
        };

        if let Some(scoped) = scoped {
            scoped.remove(&ContextId::current()).await;
        } else if let Some(session) = session {
            session.close().await;
            info!(session_id = %session.id(), "Session released");
        }
    }

    async fn active_session(&self) -> DbResult<Arc<Session>> {
        let handle = {
            let state = self.state.read().await;
            match (&state.factory, &state.session) {
                (Some(FactoryState::Scoped(scoped)), _) => SessionHandle::Scoped(scoped.clone()),
                (_, Some(session)) => SessionHandle::Single(Arc::clone(session)),
                _ => return Err(DbError::NoActiveSession),
            }
        };
        Ok(handle.session().await)
    }

    /// Entities of type `E` whose fields equal the given values.
    pub async fn query<E, I, K, V>(&self, filters: I) -> DbResult<Vec<E>>
    where
        E: Entity,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.active_session().await?.query::<E, _, _, _>(filters).await
    }

    /// Rows of `table` (or a view projection) whose columns equal the given values.
    pub async fn query_table<I, K, V>(&self, table: &Table, filters: I) -> DbResult<Vec<Record>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.active_session().await?.query_table(table, filters).await
    }

    /// Insert `entity`, committing right away when `commit` is set.
    pub async fn add<E: Entity>(&self, entity: &E, commit: bool) -> DbResult<()> {
        let session = self.active_session().await?;
        session.add(entity).await?;
        if commit {
            session.commit().await?;
        }
        Ok(())
    }

    /// Delete `entity` by primary key, committing right away when `commit` is set.
    pub async fn delete<E: Entity>(&self, entity: &E, commit: bool) -> DbResult<()> {
        let session = self.active_session().await?;
        session.delete(entity).await?;
        if commit {
            session.commit().await?;
        }
        Ok(())
    }

    pub async fn commit(&self) -> DbResult<()> {
        self.active_session().await?.commit().await
    }

    pub async fn rollback(&self) -> DbResult<()> {
        self.active_session().await?.rollback().await
    }

    /// Relations present in the connected database.
    pub async fn list_tables(&self) -> DbResult<Vec<TableInfo>> {
        SchemaInspector::list_tables(&self.require_engine().await?).await
    }

    /// Summary of the live connection.
    pub async fn connection_info(&self) -> DbResult<ConnectionInfo> {
        let engine = self.require_engine().await?;
        let tables = SchemaInspector::list_tables(&engine)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        Ok(ConnectionInfo {
            dialect: engine.dialect(),
            url: engine.url().to_string(),
            server_version: engine.server_version().map(str::to_string),
            database: self.descriptor.database(),
            tables,
        })
    }
}
