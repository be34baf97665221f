//! End-to-end tests for session data operations through the manager.

mod common;

use common::{User, connected_manager, user_schema};
use dbutils::models::QueryParam;
use std::collections::{BTreeMap, HashMap};

#[tokio::test]
async fn test_add_commit_and_query() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();

    manager
        .add(&User::new("Ann", "Lee", "ann@example.com"), true)
        .await
        .unwrap();

    let users: Vec<User> = manager
        .query([("first_name", "Ann"), ("last_name", "Lee")])
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].email, "ann@example.com");
    assert!(users[0].id.is_some());
}

#[tokio::test]
async fn test_query_filters_are_conjunctive() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();

    for (first, last, email) in [
        ("Ann", "Lee", "ann.lee@example.com"),
        ("Ann", "Kim", "ann.kim@example.com"),
        ("Bob", "Lee", "bob.lee@example.com"),
    ] {
        manager
            .add(&User::new(first, last, email), false)
            .await
            .unwrap();
    }
    manager.commit().await.unwrap();

    let hashed: HashMap<&str, &str> = HashMap::from([("last_name", "Lee"), ("first_name", "Ann")]);
    let ordered: BTreeMap<&str, &str> = BTreeMap::from([("first_name", "Ann"), ("last_name", "Lee")]);

    let a: Vec<User> = manager.query(hashed).await.unwrap();
    let b: Vec<User> = manager.query(ordered).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a, b);
    assert_eq!(a[0].email, "ann.lee@example.com");
}

#[tokio::test]
async fn test_rollback_discards_uncommitted_add() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();

    manager
        .add(&User::new("Cy", "Doe", "cy@example.com"), false)
        .await
        .unwrap();
    let pending: Vec<User> = manager.query([("first_name", "Cy")]).await.unwrap();
    assert_eq!(pending.len(), 1);

    manager.rollback().await.unwrap();
    let after: Vec<User> = manager.query([("first_name", "Cy")]).await.unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_delete_with_commit() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();

    manager
        .add(&User::new("Dee", "Fox", "dee@example.com"), true)
        .await
        .unwrap();
    let stored: Vec<User> = manager.query([("email", "dee@example.com")]).await.unwrap();
    assert_eq!(stored.len(), 1);

    manager.delete(&stored[0], true).await.unwrap();
    let remaining: Vec<User> = manager.query([("email", "dee@example.com")]).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_unknown_filter_field() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();

    let err = manager
        .query::<User, _, _, _>([("nickname", QueryParam::from("x"))])
        .await
        .unwrap_err();
    assert!(matches!(err, dbutils::DbError::Schema { .. }));
}

#[tokio::test]
async fn test_release_session_rolls_back() {
    let manager = connected_manager(user_schema()).await;
    manager.acquire_session(true).await.unwrap();
    manager
        .add(&User::new("Eve", "Ray", "eve@example.com"), false)
        .await
        .unwrap();
    manager.release_session().await;

    manager.acquire_session(true).await.unwrap();
    let users: Vec<User> = manager.query([("first_name", "Eve")]).await.unwrap();
    assert!(users.is_empty());
}
