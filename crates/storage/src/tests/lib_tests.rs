use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn save_overwrites_previous_snapshot() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot(EndpointId::Display, r#"{"v":1}"#)
        .await
        .expect("save");
    storage
        .save_snapshot(EndpointId::Display, r#"{"v":2}"#)
        .await
        .expect("save");

    let snapshot = storage
        .load_snapshot(EndpointId::Display)
        .await
        .expect("load")
        .expect("snapshot exists");
    assert_eq!(snapshot.endpoint, "display");
    assert_eq!(snapshot.snapshot_json, r#"{"v":2}"#);
    assert_eq!(storage.list_snapshots().await.expect("list").len(), 1);
}

#[tokio::test]
async fn snapshots_are_scoped_per_endpoint() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot(EndpointId::Controller, "{}")
        .await
        .expect("save");

    assert!(storage
        .load_snapshot(EndpointId::Display)
        .await
        .expect("load")
        .is_none());
    assert!(!storage
        .clear_snapshot(EndpointId::Display)
        .await
        .expect("clear"));
    assert!(storage
        .clear_snapshot(EndpointId::Controller)
        .await
        .expect("clear"));
    assert!(storage.list_snapshots().await.expect("list").is_empty());
}

#[test]
fn memory_urls_have_no_file_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/display.db?mode=rwc"),
        Some(PathBuf::from("./data/display.db"))
    );
}
