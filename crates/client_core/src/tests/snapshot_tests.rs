use super::*;
use shared::protocol::{Message, Question, QuestionIndex, SessionData, TranscriptionResult};

fn cache_with_progress() -> SessionCache {
    let mut cache = SessionCache::new();
    cache.record(&Message::SessionStart(SessionData {
        topic: "Networking".into(),
        difficulty: "Easy".into(),
        questions: vec![Question {
            question: "What is TCP?".into(),
            answer: String::new(),
        }],
    }));
    cache.record(&Message::QuestionIndex(QuestionIndex { index: 0 }));
    cache.record(&Message::TranscriptionResult(TranscriptionResult::text(
        0,
        "A reliable stream protocol.",
    )));
    cache
}

#[tokio::test]
async fn sqlite_store_round_trips_and_clears() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let store = SqliteSnapshotStore::with_storage(storage, EndpointId::Display);

    assert!(store.load().await.expect("load").is_none());

    let cache = cache_with_progress();
    store.save(&cache).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(cache));

    store.clear().await.expect("clear");
    assert!(store.load().await.expect("load").is_none());
}

#[tokio::test]
async fn sqlite_store_keeps_endpoints_apart() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let display = SqliteSnapshotStore::with_storage(storage.clone(), EndpointId::Display);
    let controller = SqliteSnapshotStore::with_storage(storage, EndpointId::Controller);

    display.save(&cache_with_progress()).await.expect("save");
    assert!(controller.load().await.expect("load").is_none());
}

#[tokio::test]
async fn corrupt_snapshot_is_an_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot(EndpointId::Display, "{not json")
        .await
        .expect("raw save");
    let store = SqliteSnapshotStore::with_storage(storage, EndpointId::Display);

    let error = store.load().await.expect_err("corrupt");
    assert!(error.to_string().contains("corrupt snapshot"));
}

#[tokio::test]
async fn memory_store_overwrites_previous_snapshot() {
    let store = MemorySnapshotStore::new();
    store.save(&SessionCache::new()).await.expect("save");
    let cache = cache_with_progress();
    store.save(&cache).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(cache));
}
