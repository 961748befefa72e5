// Emergency recording orchestration.
//
// Drives one capture episode end to end: claim the active flag, start
// audio then location capture, publish Running, and hand teardown to a
// long-lived watcher on the flag. Stopping - from the UI, an auto
// timeout, or an external signal - only flips the flag; a single code
// path performs teardown regardless of who asked.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::capture::{AudioRecorder, CaptureError, GeoRecorder, Haptics, SoundAlert};
use crate::notify::{ContactNotifier, NotifyError, NotifyOutcome, SessionUploader};
use crate::session::{self, NewSession, SessionStore, SessionStoreError};
use crate::settings::SettingsRepository;

use super::state::{EmergencyState, EmergencyStateHandle};

/// Invoked exactly once per capture attempt when the episode is over
/// (saved, failed, or aborted); releases the foreground service.
pub type StopCallback = Arc<dyn Fn() + Send + Sync>;

/// Haptic confirmation length when a silent capture starts
const START_VIBRATION_MS: u64 = 400;

#[derive(Debug, thiserror::Error)]
pub enum EmergencyError {
    /// Duplicate trigger while a capture is active; nothing was started
    #[error("an emergency capture is already active")]
    AlreadyActive,
    #[error(transparent)]
    CaptureStart(#[from] CaptureError),
    #[error("failed to save recording session: {0}")]
    Persistence(#[from] SessionStoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// A started capture episode.
pub struct EmergencyRun {
    pub audio_file_reference: String,
    /// The teardown watcher. It follows the active flag, not the service
    /// lifecycle; the hosting service aborts it on process teardown and
    /// the capture guard still stops the recorders in that case.
    pub watcher: JoinHandle<()>,
}

/// Coordinates capture modules, shared state, persistence, and fan-out
/// for emergency episodes. Owns the only writer of the active flag's
/// start transition and the only code path that tears a capture down.
pub struct EmergencyOrchestrator {
    state: EmergencyStateHandle,
    settings: SettingsRepository,
    audio: Arc<dyn AudioRecorder>,
    geo: Arc<dyn GeoRecorder>,
    sound: Arc<dyn SoundAlert>,
    haptics: Arc<dyn Haptics>,
    sessions: Arc<dyn SessionStore>,
    uploader: Arc<dyn SessionUploader>,
    notifier: Arc<dyn ContactNotifier>,
}

impl EmergencyOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: EmergencyStateHandle,
        settings: SettingsRepository,
        audio: Arc<dyn AudioRecorder>,
        geo: Arc<dyn GeoRecorder>,
        sound: Arc<dyn SoundAlert>,
        haptics: Arc<dyn Haptics>,
        sessions: Arc<dyn SessionStore>,
        uploader: Arc<dyn SessionUploader>,
        notifier: Arc<dyn ContactNotifier>,
    ) -> Self {
        Self {
            state,
            settings,
            audio,
            geo,
            sound,
            haptics,
            sessions,
            uploader,
            notifier,
        }
    }

    pub fn state(&self) -> &EmergencyStateHandle {
        &self.state
    }

    /// Start a capture episode. Idempotent against duplicate triggers:
    /// while a capture is active this returns `AlreadyActive` without
    /// touching the capture modules.
    pub async fn start_emergency(
        &self,
        on_stopped: StopCallback,
    ) -> Result<EmergencyRun, EmergencyError> {
        if !self.state.try_activate() {
            crate::debug!("emergency trigger ignored: capture already active");
            return Err(EmergencyError::AlreadyActive);
        }

        // A leftover Error from a previous episode clears automatically;
        // the user just asked for a new capture.
        if matches!(self.state.state(), EmergencyState::Error(_)) {
            if let Err(e) = self.state.reset() {
                crate::warn!("could not reset previous error state: {e}");
            }
        }

        // Audio first. No audio means no session - a GPS-only capture is
        // not a valid emergency recording, so location is never started.
        let audio_file_reference = match self.audio.start_recording().await {
            Ok(reference) => reference,
            Err(e) => {
                self.abort_start(format!("audio capture failed to start: {e}"), &on_stopped);
                return Err(e.into());
            }
        };

        if let Err(e) = self.geo.start_geo_recording().await {
            self.audio.stop_recording().await;
            self.abort_start(
                format!("location capture failed to start: {e}"),
                &on_stopped,
            );
            return Err(e.into());
        }

        if self.settings.read().await.enable_vibration_on_start {
            self.haptics.vibrate(START_VIBRATION_MS);
        }

        if let Err(e) = self.state.begin_running() {
            crate::warn!("state machine rejected Running: {e}");
        }
        crate::info!("emergency capture running: {audio_file_reference}");

        let watcher = self.spawn_watcher(audio_file_reference.clone(), on_stopped);
        Ok(EmergencyRun {
            audio_file_reference,
            watcher,
        })
    }

    /// Request a stop. Only flips the authoritative flag; teardown is the
    /// watcher's, so explicit stops, auto timeouts, and external signals
    /// all take the same path.
    pub fn stop_emergency(&self) {
        self.stop_requested();
    }

    fn stop_requested(&self) {
        crate::info!("emergency stop requested");
        self.state.deactivate();
    }

    fn abort_start(&self, reason: String, on_stopped: &StopCallback) {
        crate::error!("{reason}");
        self.state.deactivate();
        self.state.fail(reason);
        on_stopped();
    }

    fn spawn_watcher(
        &self,
        audio_file_reference: String,
        on_stopped: StopCallback,
    ) -> JoinHandle<()> {
        let state = self.state.clone();
        let settings = self.settings.clone();
        let audio = self.audio.clone();
        let geo = self.geo.clone();
        let sessions = self.sessions.clone();
        let uploader = self.uploader.clone();
        let notifier = self.notifier.clone();

        // The guard travels inside the task's future: dropping the watcher
        // at any point before normal teardown, even before its first poll,
        // still stops the capture modules.
        let guard = CaptureGuard::new(audio.clone(), geo.clone());

        tokio::spawn(async move {
            let mut active = state.watch_active();

            if active.wait_for(|is_active| !*is_active).await.is_err() {
                // State handle dropped out from under us; treat as a stop
                crate::warn!("active flag closed; stopping capture");
            }

            audio.stop_recording().await;
            let track_points = geo.take_track_points().await;
            guard.disarm();

            let title = session::title_for_reference(&audio_file_reference, Utc::now());
            let point_count = track_points.len();
            let draft = NewSession {
                title,
                audio_file_reference,
                track_points,
            };

            match sessions.insert(draft).await {
                Ok(saved) => {
                    crate::info!(
                        "session {} committed with {} track points",
                        saved.id,
                        point_count
                    );
                    let current = settings.read().await;

                    // Fan-out tasks are independent of the committed save
                    // and of each other; their failures are logged, never
                    // propagated back.
                    if current.upload_recording_to_drive_on_end {
                        let uploader = uploader.clone();
                        let upload_session = saved.clone();
                        tokio::spawn(async move {
                            if let Err(e) = uploader.upload(&upload_session).await {
                                crate::error!(
                                    "session {} upload failed: {}",
                                    upload_session.id,
                                    e
                                );
                            }
                        });
                    }

                    if current.enable_sms_on_emergency || current.enable_email_on_emergency {
                        let notifier = notifier.clone();
                        let last_point = saved.track_points.last().copied();
                        tokio::spawn(async move {
                            match notifier.notify_contacts(last_point.as_ref()).await {
                                Ok(outcome) => crate::info!(
                                    "contacts notified: {} sent, {} failed",
                                    outcome.sent,
                                    outcome.failed
                                ),
                                Err(e) => crate::error!("contact notification failed: {e}"),
                            }
                        });
                    }

                    on_stopped();
                    if let Err(e) = state.finish() {
                        crate::warn!("state machine rejected Idle after save: {e}");
                    }
                }
                Err(e) => {
                    let reason = format!("failed to save recording session: {e}");
                    crate::error!("{reason}");
                    on_stopped();
                    state.fail(reason);
                }
            }
        })
    }

    /// Message the registered contacts, with the current position when one
    /// can be had. Runs with or without an active recording; a missing fix
    /// downgrades to a location-less message instead of failing.
    pub async fn contact_emergency_contacts(&self) -> Result<NotifyOutcome, EmergencyError> {
        let location = match self.geo.current_location().await {
            Ok(point) => Some(point),
            Err(e) => {
                crate::warn!("no location for contact message: {e}");
                None
            }
        };
        Ok(self.notifier.notify_contacts(location.as_ref()).await?)
    }

    /// Start the loud alert. Duplicate play intents while already playing
    /// are no-ops, mirroring the recording trigger guard.
    pub async fn play_alert_sound(&self) -> Result<(), EmergencyError> {
        if !self.state.begin_alert() {
            crate::debug!("alert sound already playing");
            return Ok(());
        }
        if let Err(e) = self.sound.play_alert().await {
            self.state.fail_alert(format!("alert sound failed: {e}"));
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn stop_alert_sound(&self) -> Result<(), EmergencyError> {
        let result = self.sound.stop_alert().await;
        self.state.end_alert();
        result.map_err(Into::into)
    }
}

/// Stops the capture modules if the watcher dies before normal teardown
/// (service torn down mid-session). An open microphone or GPS handle must
/// not outlive its watcher.
struct CaptureGuard {
    audio: Arc<dyn AudioRecorder>,
    geo: Arc<dyn GeoRecorder>,
    armed: bool,
}

impl CaptureGuard {
    fn new(audio: Arc<dyn AudioRecorder>, geo: Arc<dyn GeoRecorder>) -> Self {
        Self {
            audio,
            geo,
            armed: true,
        }
    }

    /// Normal teardown has stopped both modules; stand down.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        crate::warn!("emergency watcher cancelled mid-session; stopping capture");
        let audio = self.audio.clone();
        let geo = self.geo.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                audio.stop_recording().await;
                geo.stop_geo_recording().await;
            });
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
