//! Shared fixtures for integration tests.

#![allow(dead_code)]

use dbutils::db::ConnectionManager;
use dbutils::dialect::DialectExpression;
use dbutils::models::{Column, ColumnType, Entity, SchemaDescriptor, ServerDefault, Table};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            id: None,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        }
    }
}

impl Entity for User {
    fn table() -> Table {
        Table::new("user")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("first_name", ColumnType::String(Some(64))).not_null())
            .column(Column::new("last_name", ColumnType::String(Some(64))).not_null())
            .column(Column::new("email", ColumnType::String(Some(128))).not_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    pub created_at: Option<String>,
}

impl Post {
    pub fn new(user_id: i64, content: &str) -> Self {
        Self {
            id: None,
            user_id,
            content: content.to_string(),
            created_at: None,
        }
    }
}

impl Entity for Post {
    fn table() -> Table {
        Table::new("post")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(
                Column::new("user_id", ColumnType::Integer)
                    .not_null()
                    .references("user", "id"),
            )
            .column(Column::new("content", ColumnType::Text).not_null())
            .column(
                Column::new("created_at", ColumnType::Timestamp)
                    .server_default(ServerDefault::Expression(DialectExpression::TimestampDefault)),
            )
    }
}

pub fn user_schema() -> SchemaDescriptor {
    SchemaDescriptor::new().with_table(User::table())
}

pub fn user_post_schema() -> SchemaDescriptor {
    user_schema().with_table(Post::table())
}

/// Unscoped manager on an in-memory database, connected and bootstrapped.
pub async fn connected_manager(schema: SchemaDescriptor) -> ConnectionManager {
    let manager = ConnectionManager::parse("sqlite://")
        .unwrap()
        .with_schema(Arc::new(schema));
    manager.connect(true).await.unwrap();
    manager
}
