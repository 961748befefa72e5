// Emergency capture: process-wide state, trigger debouncing, and the
// orchestrator that drives one capture episode end to end.

mod orchestrator;
mod state;
mod trigger;

pub use orchestrator::{EmergencyError, EmergencyOrchestrator, EmergencyRun, StopCallback};
pub use state::{AlertSoundState, EmergencyState, EmergencyStateHandle, StateError};
pub use trigger::{PressSequenceDetector, DEFAULT_PRESS_COUNT, DEFAULT_PRESS_WINDOW_MS};
