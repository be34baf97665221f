//! Data models for dbutils.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::{
    ConnectionDescriptor, ConnectionInfo, LifecycleState, PASSWORD_PROMPT, PasswordPrompt,
    SqliteTarget, TerminalPrompt,
};
pub use schema::{
    Column, ColumnType, DdlHook, Entity, ForeignKeyAction, ForeignKeyRef, Index,
    SchemaDescriptor, SchemaEvent, ServerDefault, Table, TableInfo, TableType,
};
pub use value::{QueryParam, Record};
