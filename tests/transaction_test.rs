//! Integration tests for transaction pass-through.

use paneldb::{
    ConnectSettings, ConnectionRegistry, DriverOptions, DriverType, FetchMode, Handle, SqlValue,
};
use tempfile::NamedTempFile;

async fn sqlite_handle(temp: &NamedTempFile) -> Handle {
    let registry = ConnectionRegistry::new();
    let settings = ConnectSettings::new(
        "",
        "",
        DriverType::Sqlite,
        "",
        temp.path().to_str().unwrap(),
    )
    .with_options(DriverOptions {
        create_if_missing: true,
        ..Default::default()
    });
    registry.connect(settings).await.unwrap()
}

async fn count_rows(db: &Handle) -> i64 {
    let result = db
        .query("SELECT COUNT(*) AS n FROM tx_test", FetchMode::Rows)
        .await
        .unwrap();
    result.rows[0]["n"].as_i64().unwrap()
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let temp = NamedTempFile::new().unwrap();
    let db = sqlite_handle(&temp).await;
    db.query(
        "CREATE TABLE tx_test (id INTEGER PRIMARY KEY, name TEXT)",
        FetchMode::Rows,
    )
    .await
    .unwrap();

    db.begin_transaction().await.unwrap();
    let insert = db
        .prepare("INSERT INTO tx_test (name) VALUES (?)", None)
        .await
        .unwrap();
    db.execute(&insert, "doomed").await.unwrap();
    assert_eq!(count_rows(&db).await, 1);

    db.rollback().await.unwrap();
    assert_eq!(count_rows(&db).await, 0);
}

#[tokio::test]
async fn test_commit_persists_writes() {
    let temp = NamedTempFile::new().unwrap();
    let db = sqlite_handle(&temp).await;
    db.query(
        "CREATE TABLE tx_test (id INTEGER PRIMARY KEY, name TEXT)",
        FetchMode::Rows,
    )
    .await
    .unwrap();

    db.begin_transaction().await.unwrap();
    let insert = db
        .prepare("INSERT INTO tx_test (name) VALUES (?)", None)
        .await
        .unwrap();
    db.execute(&insert, "kept").await.unwrap();
    db.commit().await.unwrap();

    assert_eq!(count_rows(&db).await, 1);

    // Writes after commit autocommit again.
    db.execute(&insert, "autocommitted").await.unwrap();
    assert_eq!(count_rows(&db).await, 2);
}

#[tokio::test]
async fn test_transaction_on_closed_handle_fails_hard() {
    let temp = NamedTempFile::new().unwrap();
    let db = sqlite_handle(&temp).await;
    db.close().await.unwrap();
    assert!(db.begin_transaction().await.is_err());
    assert!(db.commit().await.is_err());
}

/// Test that requires a running MySQL database.
/// Set the TEST_MYSQL_HOST, TEST_MYSQL_USER, TEST_MYSQL_PASSWORD and
/// TEST_MYSQL_DATABASE environment variables to run this test.
#[tokio::test]
async fn test_mysql_transaction_rollback() {
    let host = match std::env::var("TEST_MYSQL_HOST") {
        Ok(host) => host,
        Err(_) => {
            eprintln!("Skipping test: TEST_MYSQL_HOST not set");
            return;
        }
    };
    let user = std::env::var("TEST_MYSQL_USER").unwrap_or_else(|_| "root".to_string());
    let password = std::env::var("TEST_MYSQL_PASSWORD").unwrap_or_default();
    let database = std::env::var("TEST_MYSQL_DATABASE").unwrap_or_else(|_| "test".to_string());

    let registry = ConnectionRegistry::new();
    let db = registry
        .connect(ConnectSettings::new(
            user,
            password,
            DriverType::MySql,
            host,
            database,
        ))
        .await
        .unwrap();

    db.query(
        "CREATE TABLE IF NOT EXISTS tx_test (id INT PRIMARY KEY, name VARCHAR(100))",
        FetchMode::Rows,
    )
    .await
    .unwrap();
    db.query("DELETE FROM tx_test", FetchMode::Rows).await.unwrap();

    db.begin_transaction().await.unwrap();
    let insert = db
        .prepare("INSERT INTO tx_test (id, name) VALUES (?, ?)", None)
        .await
        .unwrap();
    db.execute(&insert, vec![SqlValue::Int(1), SqlValue::Text("doomed".into())])
        .await
        .unwrap();
    db.rollback().await.unwrap();

    let result = db
        .query("SELECT COUNT(*) AS n FROM tx_test", FetchMode::Rows)
        .await
        .unwrap();
    assert_eq!(result.rows[0]["n"].as_i64(), Some(0));

    db.query("DROP TABLE tx_test", FetchMode::Rows).await.unwrap();
    registry.close_all().await;
}
