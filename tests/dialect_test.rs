//! Integration tests for dialect rendering as used by schema bootstrap.

use dbutils::db::ConnectionManager;
use dbutils::db::ddl::create_table_sql;
use dbutils::dialect::{Dialect, DialectExpressionRegistry, ExpressionKind};
use dbutils::models::{Column, ColumnType, Record, SchemaDescriptor, ServerDefault, Table};
use dbutils::{DbError, DialectExpression, render};
use serde_json::json;
use std::sync::Arc;

fn event_table() -> Table {
    Table::new("event")
        .column(Column::new("id", ColumnType::Integer).primary_key())
        .column(Column::new("note", ColumnType::UnicodeText(None)))
        .column(
            Column::new("created_at", ColumnType::Timestamp)
                .server_default(ServerDefault::Expression(DialectExpression::TimestampDefault)),
        )
}

fn note(text: &str) -> Record {
    let mut record = Record::new();
    record.insert("note".to_string(), json!(text));
    record
}

#[test]
fn test_every_dialect_renders_both_fragments() {
    for dialect in Dialect::ALL {
        assert!(render(&DialectExpression::TimestampDefault, dialect.name()).is_ok());
        assert!(render(&DialectExpression::unicode_text(None), dialect.name()).is_ok());
    }
}

#[test]
fn test_dialect_aliases_render_like_canonical_names() {
    let ts = DialectExpression::TimestampDefault;
    assert_eq!(
        render(&ts, "postgres").unwrap(),
        render(&ts, "postgresql").unwrap()
    );
    assert_eq!(render(&ts, "MariaDB").unwrap(), "UTC_TIMESTAMP()");
}

#[test]
fn test_unknown_dialect_is_rejected() {
    let err = render(&DialectExpression::unicode_text(Some(10)), "db2").unwrap_err();
    assert!(matches!(err, DbError::InvalidConfiguration { .. }));
}

#[test]
fn test_ddl_per_dialect() {
    let registry = DialectExpressionRegistry::default();
    let table = event_table();

    let mssql = create_table_sql(&table, Dialect::MsSql, &registry).unwrap();
    assert!(mssql.contains("note NVARCHAR(MAX)"));
    assert!(mssql.contains("DEFAULT GETUTCDATE()"));

    let oracle = create_table_sql(&table, Dialect::Oracle, &registry).unwrap();
    assert!(oracle.contains("note NVARCHAR2(4000)"));
    assert!(oracle.contains("DEFAULT SYS_EXTRACT_UTC(SYSTIMESTAMP)"));

    let mysql = create_table_sql(&table, Dialect::MySql, &registry).unwrap();
    assert!(mysql.contains("note TEXT"));
    assert!(mysql.contains("DEFAULT (UTC_TIMESTAMP())"));

    let postgres = create_table_sql(&table, Dialect::PostgreSql, &registry).unwrap();
    assert!(postgres.contains("DEFAULT (NOW() AT TIME ZONE 'UTC')"));
}

#[tokio::test]
async fn test_bootstrap_fills_timestamp_default() {
    let table = event_table();
    let manager = ConnectionManager::parse("sqlite://")
        .unwrap()
        .with_schema(Arc::new(SchemaDescriptor::new().with_table(table.clone())));
    manager.connect(true).await.unwrap();

    let session = manager.acquire_session(true).await.unwrap().session().await;
    session.add_record(&table, &note("héllo wörld")).await.unwrap();
    session.commit().await.unwrap();

    let rows = session
        .query_table(&table, [("note", "héllo wörld")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["created_at"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_custom_registry_overrides_builtin() {
    let mut registry = DialectExpressionRegistry::default();
    registry.register(ExpressionKind::TimestampDefault, Dialect::Sqlite, |_, _| {
        Ok("'2000-01-01 00:00:00'".to_string())
    });

    let table = event_table();
    let manager = ConnectionManager::parse("sqlite://")
        .unwrap()
        .with_schema(Arc::new(SchemaDescriptor::new().with_table(table.clone())))
        .with_registry(Arc::new(registry));
    manager.connect(true).await.unwrap();

    let session = manager.acquire_session(true).await.unwrap().session().await;
    session.add_record(&table, &note("fixed")).await.unwrap();
    session.commit().await.unwrap();

    let rows = session.query_table(&table, [("note", "fixed")]).await.unwrap();
    assert_eq!(rows[0]["created_at"], json!("2000-01-01 00:00:00"));
}

#[tokio::test]
async fn test_missing_renderer_fails_bootstrap() {
    let manager = ConnectionManager::parse("sqlite://")
        .unwrap()
        .with_schema(Arc::new(SchemaDescriptor::new().with_table(event_table())))
        .with_registry(Arc::new(DialectExpressionRegistry::empty()));

    let err = manager.connect(true).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidConfiguration { .. }));
}
