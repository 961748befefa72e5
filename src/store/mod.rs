//! Durable, observable single-value cells.
//!
//! One `DurableCell` per logical value (settings, contacts, OAuth
//! credential, ...), each backed by its own file. Writes are atomic
//! (temp file + `sync_all` + rename), so a crash mid-write never corrupts
//! the previously committed value. Sensitive cells seal the payload in the
//! crypto envelope before it reaches the file layer.
//!
//! Reads fall back to `T::default()` when no prior write exists or when
//! the on-disk bytes fail to decode/unseal - a corrupted file must never
//! lock the app out of its own settings. Write failures are surfaced to
//! the caller.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

use crate::crypto::{Envelope, EnvelopeError, KeyProvider};

/// Commits a subscriber may lag behind before the channel drops values.
/// Sized well past anything the app produces between polls.
const COMMIT_BUFFER: usize = 256;

/// Errors surfaced by cell writes. Read-side decode failures are logged
/// and absorbed, never raised.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to seal value: {0}")]
    Seal(#[from] EnvelopeError),
    #[error("failed to persist cell: {0}")]
    Io(#[from] std::io::Error),
}

struct CellInner<T> {
    /// Cached committed value; `None` until the first disk load.
    value: Option<T>,
}

/// A single-writer, observable, persistent cell holding one value.
pub struct DurableCell<T> {
    path: PathBuf,
    envelope: Option<Envelope>,
    inner: Arc<Mutex<CellInner<T>>>,
    commits: broadcast::Sender<T>,
}

impl<T> Clone for DurableCell<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            envelope: self.envelope.clone(),
            inner: self.inner.clone(),
            commits: self.commits.clone(),
        }
    }
}

impl<T> DurableCell<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + 'static,
{
    /// Cell persisting plain serialized JSON.
    pub fn new(path: PathBuf) -> Self {
        Self::build(path, None)
    }

    /// Cell whose file payload is sealed in the crypto envelope.
    pub fn encrypted(path: PathBuf, keys: Arc<dyn KeyProvider>) -> Self {
        Self::build(path, Some(Envelope::new(keys)))
    }

    fn build(path: PathBuf, envelope: Option<Envelope>) -> Self {
        let (commits, _) = broadcast::channel(COMMIT_BUFFER);
        Self {
            path,
            envelope,
            inner: Arc::new(Mutex::new(CellInner { value: None })),
            commits,
        }
    }

    /// Current committed value, or `T::default()` when none decodes.
    pub async fn read(&self) -> T {
        let mut inner = self.inner.lock().await;
        self.loaded(&mut inner).await
    }

    /// Replace the committed value.
    pub async fn write(&self, value: T) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        self.commit(&mut inner, value).await
    }

    /// Atomic read-modify-write. Concurrent `update` calls are serialized
    /// on the cell lock, so no application of `f` is ever lost.
    pub async fn update<F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(T) -> T,
    {
        let mut inner = self.inner.lock().await;
        let next = f(self.loaded(&mut inner).await);
        self.commit(&mut inner, next.clone()).await?;
        Ok(next)
    }

    /// Subscribe to the cell: yields the current committed value
    /// immediately, then every subsequent commit in commit order.
    pub async fn subscribe(&self) -> Subscription<T> {
        let mut inner = self.inner.lock().await;
        let current = self.loaded(&mut inner).await;
        // The receiver is created while holding the commit lock, so no
        // commit can slip between the snapshot and the subscription.
        Subscription {
            first: Some(current),
            commits: self.commits.subscribe(),
        }
    }

    /// `subscribe()` adapted to a `Stream`.
    pub async fn observe(&self) -> impl Stream<Item = T> {
        let subscription = self.subscribe().await;
        futures_util::stream::unfold(subscription, |mut sub| async move {
            sub.recv().await.map(|value| (value, sub))
        })
    }

    async fn loaded(&self, inner: &mut CellInner<T>) -> T {
        if let Some(value) = &inner.value {
            return value.clone();
        }
        let value = self.load_from_disk().await;
        inner.value = Some(value.clone());
        value
    }

    async fn load_from_disk(&self) -> T {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                crate::error!("failed to read cell {:?}: {}", self.path, e);
                return T::default();
            }
        };

        let plain = match &self.envelope {
            Some(envelope) => match envelope.decrypt(&bytes) {
                Ok(plain) => plain,
                Err(e) => {
                    crate::error!("failed to unseal cell {:?}: {}", self.path, e);
                    return T::default();
                }
            },
            None => bytes,
        };

        match serde_json::from_slice(&plain) {
            Ok(value) => value,
            Err(e) => {
                crate::error!("failed to decode cell {:?}: {}", self.path, e);
                T::default()
            }
        }
    }

    async fn commit(&self, inner: &mut CellInner<T>, value: T) -> Result<(), StoreError> {
        let mut payload = serde_json::to_vec(&value)?;
        if let Some(envelope) = &self.envelope {
            payload = envelope.encrypt(&payload)?;
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic temp file + rename, with explicit sync before the rename
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&payload).await?;
            file.sync_all().await?;
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        inner.value = Some(value.clone());
        // No receivers is fine; the send only fans out to live subscribers
        let _ = self.commits.send(value);
        Ok(())
    }
}

/// Live view of a cell: the committed value at subscription time, then
/// every later commit in order.
pub struct Subscription<T> {
    first: Option<T>,
    commits: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Next value, or `None` once the cell has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        loop {
            match self.commits.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    crate::warn!("cell subscriber lagged by {n} commits");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cell_test.rs"]
mod tests;
