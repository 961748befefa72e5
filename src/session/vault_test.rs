use super::*;
use crate::session::{Emotion, NewSession, SessionStore, SessionSummary, SummarySegment, TrackPoint};
use std::sync::Arc;
use parking_lot::Mutex as SyncMutex;
use tempfile::TempDir;

fn draft(reference: &str) -> NewSession {
    NewSession {
        title: format!("Emergency ({reference})"),
        audio_file_reference: reference.to_string(),
        track_points: vec![TrackPoint {
            latitude: 37.42,
            longitude: -122.08,
            altitude: 12.0,
            timestamp_ms: 1_700_000_000_000,
        }],
    }
}

fn sample_summary() -> SessionSummary {
    SessionSummary {
        overall_summary: "Short confrontation, caller asks for help".into(),
        segments: vec![SummarySegment {
            speaker: "Speaker 1".into(),
            timestamp_label: "00:04".into(),
            text: "I need help".into(),
            language: "English".into(),
            language_code: "en".into(),
            translation: None,
            emotion: Emotion::Sad,
        }],
    }
}

#[tokio::test]
async fn test_insert_assigns_monotonic_ids() {
    let dir = TempDir::new().unwrap();
    let vault = SessionVault::open(dir.path().join("sessions.json")).await;

    let a = vault.insert(draft("rec-a.m4a")).await.unwrap();
    let b = vault.insert(draft("rec-b.m4a")).await.unwrap();
    assert!(b.id > a.id);
    assert_eq!(vault.all().await.len(), 2);
}

/// Ids keep increasing after the vault is reopened from disk
#[tokio::test]
async fn test_ids_stay_monotonic_across_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");

    let last_id = {
        let vault = SessionVault::open(path.clone()).await;
        vault.insert(draft("rec-a.m4a")).await.unwrap();
        vault.insert(draft("rec-b.m4a")).await.unwrap().id
    };

    let reopened = SessionVault::open(path).await;
    assert_eq!(reopened.all().await.len(), 2);
    let c = reopened.insert(draft("rec-c.m4a")).await.unwrap();
    assert!(c.id > last_id);
}

#[tokio::test]
async fn test_get_and_delete() {
    let dir = TempDir::new().unwrap();
    let removed: Arc<SyncMutex<Vec<String>>> = Arc::new(SyncMutex::new(Vec::new()));
    let removed_log = removed.clone();

    let vault = SessionVault::with_blob_remover(
        dir.path().join("sessions.json"),
        Box::new(move |reference| {
            removed_log.lock().push(reference.to_string());
            Ok(())
        }),
    )
    .await;

    let saved = vault.insert(draft("rec-a.m4a")).await.unwrap();
    assert_eq!(vault.get(saved.id).await.unwrap().id, saved.id);

    vault.delete(saved.id).await.unwrap();
    assert!(vault.get(saved.id).await.is_none());
    // Deleting must release the referenced audio blob
    assert_eq!(removed.lock().as_slice(), ["rec-a.m4a"]);

    assert!(matches!(
        vault.delete(saved.id).await,
        Err(SessionStoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_attach_and_remove_summary() {
    let dir = TempDir::new().unwrap();
    let vault = SessionVault::open(dir.path().join("sessions.json")).await;
    let saved = vault.insert(draft("rec-a.m4a")).await.unwrap();
    assert!(saved.summary.is_none());

    vault.attach_summary(saved.id, sample_summary()).await.unwrap();
    let with_summary = vault.get(saved.id).await.unwrap();
    assert_eq!(
        with_summary.summary.unwrap().segments[0].emotion,
        Emotion::Sad
    );

    vault.remove_summary(saved.id).await.unwrap();
    assert!(vault.get(saved.id).await.unwrap().summary.is_none());

    assert!(matches!(
        vault.attach_summary(999, sample_summary()).await,
        Err(SessionStoreError::NotFound(999))
    ));
}

#[tokio::test]
async fn test_watch_all_sees_commits() {
    let dir = TempDir::new().unwrap();
    let vault = SessionVault::open(dir.path().join("sessions.json")).await;

    let mut list = vault.watch_all();
    assert!(list.borrow().is_empty());

    vault.insert(draft("rec-a.m4a")).await.unwrap();
    list.changed().await.unwrap();
    assert_eq!(list.borrow().len(), 1);
}

/// A corrupt index file starts the vault empty instead of failing
#[tokio::test]
async fn test_corrupt_index_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, b"[{broken").unwrap();

    let vault = SessionVault::open(path).await;
    assert!(vault.all().await.is_empty());
}
