//! Session factory and the context-keyed session registry.

use crate::config::SessionOptions;
use crate::db::engine::Engine;
use crate::db::session::Session;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info};

tokio::task_local! {
    static SCOPE: ContextId;
}

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Mints sessions bound to one engine.
///
/// The factory keeps a weak reference to every session it hands out so
/// [`close_all`](Self::close_all) can roll back whatever is still open before
/// the engine goes away. Clones share that list.
#[derive(Clone)]
pub struct SessionFactory {
    engine: Engine,
    options: SessionOptions,
    live: Arc<Mutex<Vec<Weak<Session>>>>,
}

impl SessionFactory {
    pub fn new(engine: Engine, options: SessionOptions) -> Self {
        Self {
            engine,
            options,
            live: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.engine.clone(), &self.options));
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Arc::downgrade(&session));
        session
    }

    /// Sessions from this factory that have not been dropped yet.
    pub fn live_sessions(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Close every session still alive, releasing the connections their open
    /// transactions hold. Returns how many were closed.
    ///
    /// Sessions stay usable afterwards; their next write opens a new
    /// transaction.
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.retain(|weak| weak.strong_count() > 0);
            live.iter().filter_map(Weak::upgrade).collect()
        };
        for session in &sessions {
            session.close().await;
        }
        if !sessions.is_empty() {
            debug!(count = sessions.len(), "Factory sessions closed");
        }
        sessions.len()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Identity of a calling context.
///
/// [`ContextId::current`] is the innermost [`ScopedSessions::scope`] when
/// called inside one, else the tokio task, else the OS thread. Callers with
/// their own notion of a unit of work can pass an explicit token instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextId {
    Scope(u64),
    Task(tokio::task::Id),
    Thread(std::thread::ThreadId),
    Token(String),
}

impl ContextId {
    pub fn current() -> Self {
        if let Ok(scope) = SCOPE.try_with(Clone::clone) {
            return scope;
        }
        match tokio::task::try_id() {
            Some(id) => Self::Task(id),
            None => Self::Thread(std::thread::current().id()),
        }
    }

    fn next_scope() -> Self {
        Self::Scope(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope(id) => write!(f, "scope:{}", id),
            Self::Task(id) => write!(f, "task:{}", id),
            Self::Thread(id) => write!(f, "thread:{:?}", id),
            Self::Token(token) => write!(f, "token:{}", token),
        }
    }
}

/// Sessions keyed by calling context.
///
/// Repeated lookups from the same context return the same session until it is
/// removed. Cloning shares the registry.
///
/// Task and thread keys are never reclaimed on their own: a task that calls
/// [`current`](Self::current) keeps its entry until [`remove`](Self::remove)
/// or [`clear`](Self::clear). Wrap per-task work in [`scope`](Self::scope) to
/// have the entry dropped when the work ends.
#[derive(Clone)]
pub struct ScopedSessions {
    factory: SessionFactory,
    sessions: Arc<RwLock<HashMap<ContextId, Arc<Session>>>>,
}

impl ScopedSessions {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Session of `context`, created on first use.
    pub async fn get_or_create(&self, context: &ContextId) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(context) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(context.clone()).or_insert_with(|| {
            let session = self.factory.create_session();
            debug!(context = %context, session_id = %session.id(), "Scoped session created");
            session
        });
        Arc::clone(session)
    }

    /// Session of the calling context, created on first use.
    pub async fn current(&self) -> Arc<Session> {
        self.get_or_create(&ContextId::current()).await
    }

    /// Run `work` in a fresh context and remove that context's session when it
    /// finishes.
    ///
    /// Inside `work`, [`current`](Self::current) resolves to the scope rather
    /// than the task. Uncommitted writes are rolled back on exit. If `work` is
    /// dropped before it completes, the removal is spawned onto the runtime.
    pub async fn scope<F: Future>(&self, work: F) -> F::Output {
        let context = ContextId::next_scope();
        let guard = ScopeGuard {
            sessions: self.clone(),
            context: Some(context.clone()),
        };
        let output = SCOPE.scope(context, work).await;
        guard.finish().await;
        output
    }

    pub async fn get(&self, context: &ContextId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(context).cloned()
    }

    /// Close and forget the session of `context`. Returns whether one existed.
    pub async fn remove(&self, context: &ContextId) -> bool {
        let removed = self.sessions.write().await.remove(context);
        match removed {
            Some(session) => {
                session.close().await;
                debug!(context = %context, session_id = %session.id(), "Scoped session removed");
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session in the registry.
    pub async fn clear(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        let count = sessions.len();
        for (_, session) in sessions {
            session.close().await;
        }
        if count > 0 {
            info!(count, "Scoped sessions closed");
        }
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }
}

/// Removes a scope's session once the scope is over.
struct ScopeGuard {
    sessions: ScopedSessions,
    context: Option<ContextId>,
}

impl ScopeGuard {
    async fn finish(mut self) {
        if let Some(context) = self.context.take() {
            self.sessions.remove(&context).await;
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let sessions = self.sessions.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    sessions.remove(&context).await;
                });
            }
            Err(_) => debug!(context = %context, "No runtime to remove abandoned scope session"),
        }
    }
}

impl fmt::Debug for ScopedSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedSessions")
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}
