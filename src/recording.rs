//! Shared log of the user's recording toggles.
//!
//! Events are parsed some time after they occur, while the user toggles
//! recording based on realtime cues. The toggle log keeps the counter values
//! at which the state changed so that the merger can classify each event by
//! where its own timestamp falls, not by when it arrived.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::timestamp::Qpc;

#[derive(Debug, Default)]
struct ToggleState {
    history: Vec<Qpc>,
    is_recording: bool,
}

/// Writers are the UI/control thread; the reader is the merger. Everything
/// goes through one mutex — contention is minimal, and zero when reading from
/// a trace file. The extra atomic mirrors `is_recording` for the lock-free
/// console heartbeat.
#[derive(Debug)]
pub struct RecordingToggle {
    state: Mutex<ToggleState>,
    live: AtomicBool,
    /// When reading from a trace file there are no realtime cues to map onto
    /// the trace's counter values, so toggles only flip the flag.
    keep_history: bool,
}

impl RecordingToggle {
    pub fn new(keep_history: bool) -> Self {
        Self {
            state: Mutex::new(ToggleState::default()),
            live: AtomicBool::new(false),
            keep_history,
        }
    }

    /// Flip the recording state at counter value `now`. A no-change call
    /// appends nothing.
    pub fn set_recording(&self, record: bool, now: Qpc) {
        let mut state = self.state.lock().unwrap();
        if state.is_recording == record {
            return;
        }
        if self.keep_history {
            state.history.push(now);
        }
        state.is_recording = record;
        self.live.store(record, Ordering::Relaxed);
    }

    /// Best-effort read of the live state, for UI heartbeats only. Event
    /// classification must go through `snapshot` instead.
    pub fn is_recording(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Clone the toggle history into `history` and return the recording
    /// state in effect before the first of those toggles: the live state
    /// XOR'ed with the parity of the history length.
    pub fn snapshot(&self, history: &mut Vec<Qpc>) -> bool {
        let state = self.state.lock().unwrap();
        history.clear();
        history.extend_from_slice(&state.history);
        (state.history.len() + usize::from(state.is_recording)) % 2 == 1
    }

    /// Forget the first `count` toggles once the merger has consumed them.
    pub fn discard_prefix(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.history.drain(..count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_recording_is_idempotent() {
        let toggle = RecordingToggle::new(true);
        toggle.set_recording(true, 100);
        toggle.set_recording(true, 200);
        toggle.set_recording(false, 300);
        toggle.set_recording(false, 400);

        let mut history = Vec::new();
        toggle.snapshot(&mut history);
        assert_eq!(history, vec![100, 300]);
    }

    #[test]
    fn snapshot_returns_starting_state() {
        let toggle = RecordingToggle::new(true);
        let mut history = Vec::new();

        // No toggles yet, not recording.
        assert!(!toggle.snapshot(&mut history));

        // One toggle to on: the state before it was off.
        toggle.set_recording(true, 100);
        assert!(!toggle.snapshot(&mut history));
        assert_eq!(history, vec![100]);

        // Back to off: still started off.
        toggle.set_recording(false, 200);
        assert!(!toggle.snapshot(&mut history));
        assert_eq!(history, vec![100, 200]);

        // Consume the first toggle; the starting state for the remaining
        // history is on.
        toggle.discard_prefix(1);
        assert!(toggle.snapshot(&mut history));
        assert_eq!(history, vec![200]);
    }

    #[test]
    fn trace_file_mode_keeps_no_history() {
        let toggle = RecordingToggle::new(false);
        toggle.set_recording(true, 100);
        toggle.set_recording(false, 200);
        toggle.set_recording(true, 300);

        let mut history = Vec::new();
        assert!(toggle.snapshot(&mut history));
        assert!(history.is_empty());
        assert!(toggle.is_recording());
    }
}
