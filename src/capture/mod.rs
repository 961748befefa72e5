//! Platform capture and alert contracts.
//!
//! The shells implement these against the device SDKs (media recorder,
//! fused location provider, ringtone player, vibrator). The orchestrator
//! owns at most one active recorder and one active location subscription
//! at a time; implementations may assume starts and stops alternate.

use async_trait::async_trait;

use crate::session::TrackPoint;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Runtime permission missing or revoked
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("audio capture failed: {0}")]
    Audio(String),
    #[error("location capture failed: {0}")]
    Location(String),
    #[error("alert sound failed: {0}")]
    Sound(String),
}

/// Microphone capture. `start_recording` returns a reference to the audio
/// blob being written (see `session::recording_file_name` for the layout).
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn start_recording(&self) -> Result<String, CaptureError>;
    async fn stop_recording(&self);
}

/// Continuous GPS tracking plus a single-shot fix.
#[async_trait]
pub trait GeoRecorder: Send + Sync {
    async fn start_geo_recording(&self) -> Result<(), CaptureError>;
    async fn stop_geo_recording(&self);

    /// Best-effort single-shot fix, independent of continuous tracking.
    async fn current_location(&self) -> Result<TrackPoint, CaptureError>;

    /// Stops continuous tracking and drains the accumulated points.
    async fn take_track_points(&self) -> Vec<TrackPoint>;
}

/// Loud alert sound playback.
#[async_trait]
pub trait SoundAlert: Send + Sync {
    async fn play_alert(&self) -> Result<(), CaptureError>;
    async fn stop_alert(&self) -> Result<(), CaptureError>;
}

/// Haptic feedback.
pub trait Haptics: Send + Sync {
    fn vibrate(&self, duration_ms: u64);
    fn vibrate_pattern(&self, pattern: &[u64]);
}
