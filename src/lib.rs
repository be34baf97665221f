//! dbutils library
//!
//! A database engine/session lifecycle manager over sqlx pools (SQLite,
//! PostgreSQL, MySQL), plus dialect-aware SQL fragments: UTC timestamp
//! defaults, unicode text types and (materialized) view DDL.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{ConnectionManager, SessionHandle};
pub use dialect::{Dialect, DialectExpression, create_view, render};
pub use error::{DbError, DbResult};
