//! Database layer.
//!
//! This module provides:
//! - The connection manager and its engine/factory/session lifecycle
//! - Engine handles over backend-specific pools
//! - Sessions and the context-keyed session registry
//! - Statement building and execution
//! - Schema DDL and introspection
//! - Type mappings for row decoding

#[macro_use]
pub mod macros;
pub mod ddl;
pub mod engine;
pub mod executor;
pub mod manager;
pub mod params;
pub mod query;
pub mod schema;
pub mod session;
pub mod session_factory;
pub mod transaction;
pub mod types;

pub use engine::{DbPool, Engine};
pub use executor::QueryExecutor;
pub use manager::{ConnectionManager, SessionHandle};
pub use query::{
    BindStyle, CompiledStatement, Delete, FilterOp, Insert, Order, OutputColumn, Select,
};
pub use schema::SchemaInspector;
pub use session::Session;
pub use session_factory::{ContextId, ScopedSessions, SessionFactory};
pub use transaction::DbTransaction;
