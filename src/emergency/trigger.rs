// Hardware-trigger debouncing.
//
// The emergency gesture is a burst of volume-key presses inside a short
// window. Single or slow presses are ignored; a completed sequence fires
// once and the detector resets so held-down key repeats cannot re-fire.

use std::time::{Duration, Instant};

/// Presses required to complete the gesture
pub const DEFAULT_PRESS_COUNT: u32 = 3;
/// Window for the whole sequence, measured from its first press (1.5s)
pub const DEFAULT_PRESS_WINDOW_MS: u64 = 1500;

/// Detects an N-press sequence within a configurable time window.
///
/// Usage:
/// ```ignore
/// let mut detector = PressSequenceDetector::new();
/// detector.on_press(); // 1st - nothing
/// detector.on_press(); // 2nd - nothing
/// detector.on_press(); // 3rd within the window - returns true
/// ```
pub struct PressSequenceDetector {
    required: u32,
    window: Duration,
    /// Start of the current sequence (None when no sequence is open)
    first_press: Option<Instant>,
    count: u32,
}

impl PressSequenceDetector {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_PRESS_COUNT, DEFAULT_PRESS_WINDOW_MS)
    }

    pub fn with_config(required: u32, window_ms: u64) -> Self {
        Self {
            required: required.max(1),
            window: Duration::from_millis(window_ms),
            first_press: None,
            count: 0,
        }
    }

    /// Handle one press. Returns true when this press completes the
    /// sequence; the detector resets itself at that point.
    pub fn on_press(&mut self) -> bool {
        let now = Instant::now();

        match self.first_press {
            Some(first) if now.duration_since(first) <= self.window => {
                self.count += 1;
            }
            _ => {
                // Window expired or no sequence open - this press starts one
                self.first_press = Some(now);
                self.count = 1;
            }
        }

        if self.count >= self.required {
            self.reset();
            return true;
        }
        false
    }

    /// Clear any open sequence.
    pub fn reset(&mut self) {
        self.first_press = None;
        self.count = 0;
    }
}

impl Default for PressSequenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sequence_within_window_fires_once() {
        let mut detector = PressSequenceDetector::new();
        assert!(!detector.on_press());
        assert!(!detector.on_press());
        assert!(detector.on_press());
    }

    #[test]
    fn test_too_few_presses_never_fire() {
        let mut detector = PressSequenceDetector::new();
        assert!(!detector.on_press());
        assert!(!detector.on_press());
    }

    #[test]
    fn test_firing_resets_the_sequence() {
        let mut detector = PressSequenceDetector::with_config(2, DEFAULT_PRESS_WINDOW_MS);
        assert!(!detector.on_press());
        assert!(detector.on_press());
        // The next press starts a fresh sequence instead of re-firing
        assert!(!detector.on_press());
        assert!(detector.on_press());
    }

    #[test]
    fn test_press_after_window_starts_new_sequence() {
        let mut detector = PressSequenceDetector::with_config(3, 50);
        assert!(!detector.on_press());
        assert!(!detector.on_press());

        thread::sleep(Duration::from_millis(60));

        // Window expired: this is press 1 of a new sequence, not press 3
        assert!(!detector.on_press());
        assert!(!detector.on_press());
        assert!(detector.on_press());
    }

    #[test]
    fn test_reset_clears_open_sequence() {
        let mut detector = PressSequenceDetector::with_config(2, DEFAULT_PRESS_WINDOW_MS);
        assert!(!detector.on_press());
        detector.reset();
        assert!(!detector.on_press());
        assert!(detector.on_press());
    }
}
