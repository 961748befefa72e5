// Process-wide emergency state.
//
// One handle instance per process, constructed by the app container and
// injected everywhere that needs it: the foreground service, the UI layer,
// and every broadcast/intent entry point that might re-trigger while a
// capture is already running. The handle is the single source of truth;
// no component keeps its own copy of "is an emergency active".

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// State of the emergency recording machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum EmergencyState {
    #[default]
    Idle,
    Running,
    Error(String),
}

/// State of the loud-alert sub-machine, independent of recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum AlertSoundState {
    #[default]
    Idle,
    Playing,
    Error(String),
}

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: EmergencyState,
        to: EmergencyState,
    },
}

struct HandleInner {
    machine: watch::Sender<EmergencyState>,
    sound: watch::Sender<AlertSoundState>,
    /// The authoritative recording-active flag. Distinct from the machine
    /// state: the flag is what start/stop flip and what the orchestrator's
    /// watcher follows; the machine is what screens render.
    active: watch::Sender<bool>,
}

/// Shared, observable emergency state. Cheap to clone; all clones view
/// the same cells.
#[derive(Clone)]
pub struct EmergencyStateHandle {
    inner: Arc<HandleInner>,
}

impl EmergencyStateHandle {
    pub fn new() -> Self {
        let (machine, _) = watch::channel(EmergencyState::Idle);
        let (sound, _) = watch::channel(AlertSoundState::Idle);
        let (active, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                machine,
                sound,
                active,
            }),
        }
    }

    // ----- authoritative recording-active flag -----

    /// Claim the flag: `false -> true`. Returns `false` without effect
    /// when a capture is already active, which is what makes duplicate
    /// triggers (repeated button presses, re-delivered intents) no-ops.
    pub fn try_activate(&self) -> bool {
        self.inner.active.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    /// Release the flag. Stopping is just this; teardown belongs to the
    /// watcher following the flag.
    pub fn deactivate(&self) {
        self.inner.active.send_if_modified(|active| {
            let was_active = *active;
            *active = false;
            was_active
        });
    }

    pub fn is_active(&self) -> bool {
        *self.inner.active.borrow()
    }

    pub fn watch_active(&self) -> watch::Receiver<bool> {
        self.inner.active.subscribe()
    }

    // ----- recording machine -----

    pub fn state(&self) -> EmergencyState {
        self.inner.machine.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<EmergencyState> {
        self.inner.machine.subscribe()
    }

    /// `Idle -> Running`
    #[must_use = "this returns a Result that should be handled"]
    pub fn begin_running(&self) -> Result<(), StateError> {
        self.transition(EmergencyState::Running)
    }

    /// `Running -> Idle`
    #[must_use = "this returns a Result that should be handled"]
    pub fn finish(&self) -> Result<(), StateError> {
        self.transition(EmergencyState::Idle)
    }

    /// Report a failure. Always lands in `Error`, whatever the current
    /// state - failure reporting must not itself be able to fail.
    pub fn fail(&self, reason: impl Into<String>) {
        self.inner
            .machine
            .send_replace(EmergencyState::Error(reason.into()));
    }

    /// `Error -> Idle` (operator or automatic reset). Resetting an
    /// already-idle machine is a no-op.
    #[must_use = "this returns a Result that should be handled"]
    pub fn reset(&self) -> Result<(), StateError> {
        if self.state() == EmergencyState::Idle {
            return Ok(());
        }
        self.transition(EmergencyState::Idle)
    }

    fn transition(&self, to: EmergencyState) -> Result<(), StateError> {
        let mut outcome = Ok(());
        self.inner.machine.send_if_modified(|state| {
            let valid = matches!(
                (&*state, &to),
                (EmergencyState::Idle, EmergencyState::Running)
                    | (EmergencyState::Running, EmergencyState::Idle)
                    | (EmergencyState::Error(_), EmergencyState::Idle)
            );
            if valid {
                *state = to.clone();
                true
            } else {
                outcome = Err(StateError::InvalidTransition {
                    from: state.clone(),
                    to: to.clone(),
                });
                false
            }
        });
        outcome
    }

    // ----- alert sound machine -----

    pub fn sound_state(&self) -> AlertSoundState {
        self.inner.sound.borrow().clone()
    }

    pub fn watch_sound_state(&self) -> watch::Receiver<AlertSoundState> {
        self.inner.sound.subscribe()
    }

    /// Claim the sound machine: `Idle -> Playing`. Returns `false` when
    /// already playing (duplicate play intents are no-ops).
    pub fn begin_alert(&self) -> bool {
        self.inner.sound.send_if_modified(|state| {
            if *state == AlertSoundState::Playing {
                false
            } else {
                *state = AlertSoundState::Playing;
                true
            }
        })
    }

    pub fn end_alert(&self) {
        self.inner.sound.send_replace(AlertSoundState::Idle);
    }

    pub fn fail_alert(&self, reason: impl Into<String>) {
        self.inner
            .sound
            .send_replace(AlertSoundState::Error(reason.into()));
    }
}

impl Default for EmergencyStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
