//! Recording session records and the session store contract.
//!
//! One `RecordingSession` per emergency capture episode: the audio blob
//! reference, the GPS track collected while it ran, and (attached later,
//! on request) a structured transcript summary. Sessions become immutable
//! once committed, except for summary attach/remove and deletion.

mod vault;

pub use vault::SessionVault;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Timestamp layout embedded in recording file names (`rec-<stamp>.m4a`)
const REFERENCE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// One GPS fix on a session's track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp_ms: i64,
}

/// Speaker emotion as classified by the transcript service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySegment {
    pub speaker: String,
    pub timestamp_label: String,
    pub text: String,
    pub language: String,
    pub language_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    pub emotion: Emotion,
}

/// Structured transcript attached to a session after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub overall_summary: String,
    pub segments: Vec<SummarySegment>,
}

/// A committed emergency capture episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Assigned at persistence time; monotonic within the store
    pub id: i64,
    pub title: String,
    /// Path/identifier of the audio blob, owned by the filesystem collaborator
    pub audio_file_reference: String,
    pub track_points: Vec<TrackPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

/// Session contents before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub title: String,
    pub audio_file_reference: String,
    pub track_points: Vec<TrackPoint>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("recording session {0} not found")]
    NotFound(i64),
    #[error("failed to encode session index: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist session index: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed record store for recording sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Commit a new session, assigning its id.
    async fn insert(&self, draft: NewSession) -> Result<RecordingSession, SessionStoreError>;

    async fn all(&self) -> Vec<RecordingSession>;

    async fn get(&self, id: i64) -> Option<RecordingSession>;

    /// Delete a session and release its referenced audio blob.
    async fn delete(&self, id: i64) -> Result<(), SessionStoreError>;

    async fn attach_summary(
        &self,
        id: i64,
        summary: SessionSummary,
    ) -> Result<(), SessionStoreError>;

    async fn remove_summary(&self, id: i64) -> Result<(), SessionStoreError>;

    /// Live view of the full session list; updates on every commit.
    fn watch_all(&self) -> watch::Receiver<Vec<RecordingSession>>;
}

/// File name for a recording started at `at`. Shell recorder
/// implementations use this so references stay parseable.
pub fn recording_file_name(at: DateTime<Utc>) -> String {
    format!("rec-{}.m4a", at.format(REFERENCE_STAMP_FORMAT))
}

/// Session title derived from the start timestamp embedded in the audio
/// file reference; falls back to `fallback` when the stem does not parse.
pub fn title_for_reference(reference: &str, fallback: DateTime<Utc>) -> String {
    let started = parse_reference_stamp(reference)
        .unwrap_or_else(|| fallback.naive_utc());
    format!("Emergency {}", started.format("%Y-%m-%d %H:%M"))
}

fn parse_reference_stamp(reference: &str) -> Option<NaiveDateTime> {
    let stem = std::path::Path::new(reference).file_stem()?.to_str()?;
    let stamp = stem.strip_prefix("rec-")?;
    NaiveDateTime::parse_from_str(stamp, REFERENCE_STAMP_FORMAT).ok()
}
