//! Integration tests for the connection registry.

use paneldb::{
    ConnectSettings, ConnectionRegistry, DEFAULT_CONNECTION, DbError, DriverOptions, DriverType,
    FetchMode,
};
use tempfile::NamedTempFile;

fn sqlite_settings(temp: &NamedTempFile) -> ConnectSettings {
    ConnectSettings::new(
        "",
        "",
        DriverType::Sqlite,
        "",
        temp.path().to_str().unwrap(),
    )
    .with_options(DriverOptions {
        create_if_missing: true,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_connect_registers_under_default_name() {
    let temp = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();

    let handle = registry.connect(sqlite_settings(&temp)).await.unwrap();
    assert_eq!(handle.name(), DEFAULT_CONNECTION);
    assert_eq!(registry.len().await, 1);
    assert_eq!(registry.names().await, vec![DEFAULT_CONNECTION.to_string()]);
}

#[tokio::test]
async fn test_get_connection_returns_same_handle() {
    let temp = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();

    let connected = registry.connect(sqlite_settings(&temp)).await.unwrap();
    let looked_up = registry.get_connection(DEFAULT_CONNECTION).await.unwrap();
    assert!(connected.ptr_eq(&looked_up));

    // Lookups never open anything new.
    let again = registry.get_connection(DEFAULT_CONNECTION).await.unwrap();
    assert!(looked_up.ptr_eq(&again));
}

#[tokio::test]
async fn test_get_connection_unknown_name() {
    let registry = ConnectionRegistry::new();
    let err = registry.get_connection("reporting").await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn test_reconnect_replaces_and_closes_previous() {
    let temp = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();

    let first = registry.connect(sqlite_settings(&temp)).await.unwrap();
    let second = registry.connect(sqlite_settings(&temp)).await.unwrap();

    assert!(!first.ptr_eq(&second));
    assert_eq!(registry.len().await, 1);

    // The replaced handle was closed; clones of it fail from now on.
    assert!(!first.is_open().await);
    assert!(first.query("SELECT 1", FetchMode::Rows).await.is_err());
    assert!(second.is_open().await);
    assert!(second.query("SELECT 1", FetchMode::Rows).await.is_ok());
}

#[tokio::test]
async fn test_multiple_named_connections() {
    let temp_a = NamedTempFile::new().unwrap();
    let temp_b = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();

    registry
        .connect(sqlite_settings(&temp_a))
        .await
        .unwrap();
    registry
        .connect(sqlite_settings(&temp_b).with_connection("stats"))
        .await
        .unwrap();

    assert_eq!(registry.len().await, 2);
    let mut names = registry.names().await;
    names.sort();
    assert_eq!(names, vec!["default".to_string(), "stats".to_string()]);

    let stats = registry.get_connection("stats").await.unwrap();
    assert_eq!(stats.name(), "stats");
}

#[tokio::test]
async fn test_raw_connection_escape_hatch() {
    let temp = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();
    registry.connect(sqlite_settings(&temp)).await.unwrap();

    let mut raw = registry.raw_connection(DEFAULT_CONNECTION).await.unwrap();
    assert!(raw.is_open());
    assert!(raw.as_mysql().is_none());

    let conn = raw.as_sqlite().unwrap();
    let value: i64 = sqlx::query_scalar("SELECT 41 + 1")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_raw_connection_after_close() {
    let temp = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();
    let handle = registry.connect(sqlite_settings(&temp)).await.unwrap();

    handle.close().await.unwrap();
    let err = registry
        .raw_connection(DEFAULT_CONNECTION)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Closed { .. }));
}

#[tokio::test]
async fn test_close_all() {
    let temp_a = NamedTempFile::new().unwrap();
    let temp_b = NamedTempFile::new().unwrap();
    let registry = ConnectionRegistry::new();

    let a = registry.connect(sqlite_settings(&temp_a)).await.unwrap();
    let b = registry
        .connect(sqlite_settings(&temp_b).with_connection("stats"))
        .await
        .unwrap();

    registry.close_all().await;
    assert!(registry.is_empty().await);
    assert!(!a.is_open().await);
    assert!(!b.is_open().await);
}
