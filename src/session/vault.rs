// File-backed session store - persists the session index as one JSON file
// with the same atomic-write discipline as the durable cells.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};

use super::{NewSession, RecordingSession, SessionStore, SessionStoreError, SessionSummary};

type BlobRemover = Box<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

struct VaultState {
    sessions: Vec<RecordingSession>,
    next_id: i64,
}

/// Production session store over a single JSON index file.
pub struct SessionVault {
    path: PathBuf,
    state: Mutex<VaultState>,
    list: watch::Sender<Vec<RecordingSession>>,
    remove_blob: BlobRemover,
}

impl SessionVault {
    /// Open (or start) the vault at `path`. Deleted sessions release their
    /// audio blob by removing the referenced file.
    pub async fn open(path: PathBuf) -> Self {
        Self::with_blob_remover(path, Box::new(|reference| std::fs::remove_file(reference))).await
    }

    /// Open with a custom audio-blob release hook.
    pub async fn with_blob_remover(path: PathBuf, remove_blob: BlobRemover) -> Self {
        let sessions = Self::load(&path).await;
        let next_id = sessions.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let (list, _) = watch::channel(sessions.clone());
        Self {
            path,
            state: Mutex::new(VaultState { sessions, next_id }),
            list,
            remove_blob,
        }
    }

    async fn load(path: &PathBuf) -> Vec<RecordingSession> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                crate::error!("failed to read session index {:?}: {}", path, e);
                return Vec::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(sessions) => sessions,
            Err(e) => {
                crate::error!("failed to decode session index {:?}: {}", path, e);
                Vec::new()
            }
        }
    }

    async fn persist(&self, sessions: &[RecordingSession]) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_vec_pretty(sessions)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

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
        Ok(())
    }

    /// Persist a candidate list, then make it the committed state.
    async fn commit(
        &self,
        state: &mut VaultState,
        sessions: Vec<RecordingSession>,
    ) -> Result<(), SessionStoreError> {
        self.persist(&sessions).await?;
        state.sessions = sessions.clone();
        self.list.send_replace(sessions);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SessionVault {
    async fn insert(&self, draft: NewSession) -> Result<RecordingSession, SessionStoreError> {
        let mut state = self.state.lock().await;

        let session = RecordingSession {
            id: state.next_id,
            title: draft.title,
            audio_file_reference: draft.audio_file_reference,
            track_points: draft.track_points,
            summary: None,
        };

        let mut sessions = state.sessions.clone();
        sessions.push(session.clone());
        self.commit(&mut state, sessions).await?;
        state.next_id += 1;

        crate::info!("recording session {} saved", session.id);
        Ok(session)
    }

    async fn all(&self) -> Vec<RecordingSession> {
        self.state.lock().await.sessions.clone()
    }

    async fn get(&self, id: i64) -> Option<RecordingSession> {
        self.state
            .lock()
            .await
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    async fn delete(&self, id: i64) -> Result<(), SessionStoreError> {
        let mut state = self.state.lock().await;

        let at = state
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or(SessionStoreError::NotFound(id))?;

        let mut sessions = state.sessions.clone();
        let removed = sessions.remove(at);
        self.commit(&mut state, sessions).await?;

        if let Err(e) = (self.remove_blob)(&removed.audio_file_reference) {
            crate::warn!(
                "failed to release audio blob {}: {}",
                removed.audio_file_reference,
                e
            );
        }
        Ok(())
    }

    async fn attach_summary(
        &self,
        id: i64,
        summary: SessionSummary,
    ) -> Result<(), SessionStoreError> {
        let mut state = self.state.lock().await;

        let mut sessions = state.sessions.clone();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SessionStoreError::NotFound(id))?;
        session.summary = Some(summary);

        self.commit(&mut state, sessions).await
    }

    async fn remove_summary(&self, id: i64) -> Result<(), SessionStoreError> {
        let mut state = self.state.lock().await;

        let mut sessions = state.sessions.clone();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SessionStoreError::NotFound(id))?;
        session.summary = None;

        self.commit(&mut state, sessions).await
    }

    fn watch_all(&self) -> watch::Receiver<Vec<RecordingSession>> {
        self.list.subscribe()
    }
}

#[cfg(test)]
#[path = "vault_test.rs"]
mod tests;
