//! Integration tests against a live PostgreSQL server.

mod common;

use common::{User, user_schema};
use dbutils::db::{ConnectionManager, Order, Select};
use dbutils::dialect::create_view;
use dbutils::models::{Entity, TableType};
use std::sync::Arc;

/// Test that requires a running PostgreSQL database.
/// Set TEST_POSTGRES_URL environment variable to run this test.
#[tokio::test]
async fn test_postgres_materialized_view() {
    let postgres_url = match std::env::var("TEST_POSTGRES_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_POSTGRES_URL not set");
            return;
        }
    };

    let mut schema = user_schema();
    let select = Select::from_table(&User::table())
        .columns(["id", "first_name", "email"])
        .filter_eq("last_name", "Lee")
        .order_by("id", Order::Asc);
    let view = create_view("name_view", &select, &mut schema, true).unwrap();

    let manager = ConnectionManager::parse(&postgres_url)
        .unwrap()
        .with_schema(Arc::new(schema));

    // Start from a clean slate
    manager.create_engine(&Default::default()).await.unwrap();
    manager.drop_schema().await.unwrap();
    manager.connect(true).await.unwrap();

    let engine = manager.engine().await.unwrap();
    assert!(engine.server_version().is_some());

    manager.acquire_session(true).await.unwrap();
    manager
        .add(&User::new("Ann", "Lee", "ann@example.com"), false)
        .await
        .unwrap();
    manager
        .add(&User::new("Bob", "Stone", "bob@example.com"), false)
        .await
        .unwrap();
    manager.commit().await.unwrap();

    // Materialized views hold the snapshot taken at creation
    let rows = manager
        .query_table(&view, Vec::<(String, String)>::new())
        .await
        .unwrap();
    assert!(rows.is_empty());

    engine
        .execute("REFRESH MATERIALIZED VIEW name_view")
        .await
        .unwrap();
    let rows = manager
        .query_table(&view, Vec::<(String, String)>::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["first_name"], serde_json::json!("Ann"));

    let tables = manager.list_tables().await.unwrap();
    assert!(
        tables
            .iter()
            .any(|t| t.name == "name_view" && t.table_type == TableType::MaterializedView)
    );

    manager.drop_schema().await.unwrap();
    let tables = manager.list_tables().await.unwrap();
    assert!(!tables.iter().any(|t| t.name == "name_view" || t.name == "user"));

    manager.close_engine().await;
}

#[tokio::test]
async fn test_postgres_connection_info() {
    let postgres_url = match std::env::var("TEST_POSTGRES_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_POSTGRES_URL not set");
            return;
        }
    };

    let manager = ConnectionManager::parse(&postgres_url).unwrap();
    manager.connect(false).await.unwrap();
    let info = manager.connection_info().await.unwrap();
    assert_eq!(info.dialect.name(), "postgresql");
    if let Some(password) = manager.descriptor().password() {
        assert!(!info.url.contains(&format!(":{}@", password)));
    }
    manager.close_engine().await;
}
