use super::*;
use crate::crypto::FixedKey;
use serde::Deserialize;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    count: u32,
    label: String,
}

fn plain_cell(dir: &TempDir) -> DurableCell<Counter> {
    DurableCell::new(dir.path().join("counter.json"))
}

fn sealed_cell(dir: &TempDir, key_byte: u8) -> DurableCell<Counter> {
    DurableCell::encrypted(
        dir.path().join("counter.bin"),
        Arc::new(FixedKey::new([key_byte; 32])),
    )
}

/// Fresh cell with no file behind it reads the default value
#[tokio::test]
async fn test_read_without_prior_write_returns_default() {
    let dir = TempDir::new().unwrap();
    let cell = plain_cell(&dir);
    assert_eq!(cell.read().await, Counter::default());
}

/// A committed value survives a new cell instance over the same file
#[tokio::test]
async fn test_write_then_reopen_reads_committed_value() {
    let dir = TempDir::new().unwrap();
    let value = Counter {
        count: 3,
        label: "three".into(),
    };

    plain_cell(&dir).write(value.clone()).await.unwrap();

    let reopened = plain_cell(&dir);
    assert_eq!(reopened.read().await, value);
}

/// Subscribers see every commit, in commit order, starting from the
/// value current at subscription time
#[tokio::test]
async fn test_subscription_observes_writes_in_commit_order() {
    let dir = TempDir::new().unwrap();
    let cell = plain_cell(&dir);

    let mut sub = cell.subscribe().await;
    assert_eq!(sub.recv().await.unwrap(), Counter::default());

    for i in 1..=5u32 {
        cell.write(Counter {
            count: i,
            label: i.to_string(),
        })
        .await
        .unwrap();
    }

    for i in 1..=5u32 {
        let seen = sub.recv().await.unwrap();
        assert_eq!(seen.count, i, "commits must arrive in order, no drops");
    }
    assert_eq!(cell.read().await.count, 5);
}

/// Two subscribers observe the same sequence
#[tokio::test]
async fn test_two_subscribers_agree_on_order() {
    let dir = TempDir::new().unwrap();
    let cell = plain_cell(&dir);

    let mut a = cell.subscribe().await;
    let mut b = cell.subscribe().await;
    a.recv().await.unwrap();
    b.recv().await.unwrap();

    for i in 1..=3u32 {
        cell.write(Counter {
            count: i,
            label: String::new(),
        })
        .await
        .unwrap();
    }

    let seen_a: Vec<u32> = [a.recv().await, a.recv().await, a.recv().await]
        .into_iter()
        .map(|v| v.unwrap().count)
        .collect();
    let seen_b: Vec<u32> = [b.recv().await, b.recv().await, b.recv().await]
        .into_iter()
        .map(|v| v.unwrap().count)
        .collect();
    assert_eq!(seen_a, vec![1, 2, 3]);
    assert_eq!(seen_b, seen_a);
}

/// Concurrent read-modify-writes compose; no increment is lost
#[tokio::test]
async fn test_concurrent_updates_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let cell = plain_cell(&dir);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cell = cell.clone();
        tasks.push(tokio::spawn(async move {
            cell.update(|mut c| {
                c.count += 1;
                c
            })
            .await
            .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(cell.read().await.count, 8);
}

/// Undecodable bytes on disk fall back to the default instead of failing
#[tokio::test]
async fn test_corrupt_file_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("counter.json");
    std::fs::write(&path, b"{not json").unwrap();

    let cell: DurableCell<Counter> = DurableCell::new(path);
    assert_eq!(cell.read().await, Counter::default());
}

/// Encrypted cells never write the plaintext payload to disk
#[tokio::test]
async fn test_encrypted_cell_does_not_leak_plaintext() {
    let dir = TempDir::new().unwrap();
    let cell = sealed_cell(&dir, 7);
    cell.write(Counter {
        count: 1,
        label: "super-secret-label".into(),
    })
    .await
    .unwrap();

    let on_disk = std::fs::read(dir.path().join("counter.bin")).unwrap();
    let haystack = String::from_utf8_lossy(&on_disk);
    assert!(!haystack.contains("super-secret-label"));

    assert_eq!(cell.read().await.label, "super-secret-label");
}

/// Reopening an encrypted cell with the wrong key behaves like a corrupt
/// file: default value, no error
#[tokio::test]
async fn test_encrypted_cell_wrong_key_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    sealed_cell(&dir, 7)
        .write(Counter {
            count: 9,
            label: "sealed".into(),
        })
        .await
        .unwrap();

    let wrong_key = sealed_cell(&dir, 8);
    assert_eq!(wrong_key.read().await, Counter::default());
}

/// Write failures surface as errors instead of being dropped
#[tokio::test]
async fn test_write_failure_is_surfaced() {
    let dir = TempDir::new().unwrap();
    // The cell path is an existing directory, so the rename cannot land
    let path = dir.path().join("cell-as-dir");
    std::fs::create_dir(&path).unwrap();

    let cell: DurableCell<Counter> = DurableCell::new(path);
    let result = cell.write(Counter::default()).await;
    assert!(matches!(result, Err(StoreError::Io(_))));
}

/// The stream adapter yields the same sequence as the subscription
#[tokio::test]
async fn test_observe_stream_yields_commits() {
    use futures_util::StreamExt;

    let dir = TempDir::new().unwrap();
    let cell = plain_cell(&dir);
    let mut stream = Box::pin(cell.observe().await);
    assert_eq!(stream.next().await.unwrap(), Counter::default());

    cell.write(Counter {
        count: 42,
        label: String::new(),
    })
    .await
    .unwrap();
    assert_eq!(stream.next().await.unwrap().count, 42);
}
