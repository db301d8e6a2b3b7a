use super::*;

#[tokio::test]
async fn empty_store_has_no_identity() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.load_identity().await.expect("load"), None);
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn saved_identity_overwrites_previous_value() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.save_identity(UserId(7)).await.expect("save");
    storage.save_identity(UserId(42)).await.expect("overwrite");

    assert_eq!(storage.load_identity().await.expect("load"), Some(UserId(42)));
}

#[tokio::test]
async fn clear_identity_reports_whether_anything_was_removed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(!storage.clear_identity().await.expect("clear empty"));

    storage.save_identity(UserId(5)).await.expect("save");
    assert!(storage.clear_identity().await.expect("clear"));
    assert_eq!(storage.load_identity().await.expect("load"), None);
}

#[tokio::test]
async fn unparseable_identity_is_ignored() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query("INSERT INTO client_session (key, value, updated_at) VALUES (?, ?, ?)")
        .bind(IDENTITY_KEY)
        .bind("not-a-number")
        .bind(Utc::now().to_rfc3339())
        .execute(storage.pool())
        .await
        .expect("seed");

    assert_eq!(storage.load_identity().await.expect("load"), None);
}

#[tokio::test]
async fn identity_survives_reopening_file_database() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("pulse_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("session.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.save_identity(UserId(42)).await.expect("save");
        storage.pool().close().await;
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(reopened.load_identity().await.expect("load"), Some(UserId(42)));
    reopened.pool().close().await;

    assert!(db_path.exists(), "database file should exist: {}", db_path.display());
    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn memory_urls_have_no_filesystem_path() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(sqlite_path("postgres://localhost/db"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/session.db?mode=rwc"),
        Some(PathBuf::from("./data/session.db"))
    );
}
