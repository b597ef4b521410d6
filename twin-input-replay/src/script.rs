//! Recorded input scripts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use twin_input_core::{PointerEvent, VoiceEvent};

use crate::error::{read_json, ReplayResult};

/// One step of a replay script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// A pointer event. The replay clock moves up to its timestamp.
    Pointer(PointerEvent),
    /// A speech recognition result. The replay clock moves up to its
    /// timestamp.
    Voice(VoiceEvent),
    /// A bare transcript, bypassing confidence gating.
    Transcript {
        /// Recognised text.
        text: String,
    },
    /// Set an application flag read by gates.
    SetFlag {
        /// Flag name.
        flag: String,
        /// New value.
        value: bool,
    },
    /// Move the replay clock forward.
    Advance {
        /// Milliseconds to advance.
        ms: u64,
    },
    /// Enable or disable a voice command.
    SetEnabled {
        /// Voice command id.
        id: String,
        /// New state.
        enabled: bool,
    },
    /// Cancel a stale capture.
    PollTimeout,
    /// Drive queued asynchronous handlers.
    RunPending,
}

/// A replay script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Clock start time.
    #[serde(default)]
    pub start_ms: u64,
    /// Steps in order.
    pub steps: Vec<Step>,
}

impl Script {
    /// Load a script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> ReplayResult<Self> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_input_core::PointerPhase;

    #[test]
    fn parses_mixed_steps() {
        let json = r#"{
            "start_ms": 1000,
            "steps": [
                { "step": "set_flag", "flag": "has_selection", "value": true },
                { "step": "pointer", "phase": "down", "x": 10.0, "y": 20.0, "timestamp_ms": 1000 },
                { "step": "pointer", "pointer_id": 2, "phase": "up", "x": 10.0, "y": 20.0, "timestamp_ms": 1040 },
                { "step": "voice", "transcript": "save", "confidence": 0.9, "is_final": true, "timestamp_ms": 1100 },
                { "step": "advance", "ms": 600 },
                { "step": "poll_timeout" }
            ]
        }"#;
        let script: Script = serde_json::from_str(json).unwrap();
        assert_eq!(script.start_ms, 1000);
        assert_eq!(script.steps.len(), 6);
        match &script.steps[2] {
            Step::Pointer(event) => {
                assert_eq!(event.phase, PointerPhase::Up);
                assert_eq!(event.pointer_id, 2);
            }
            other => panic!("Expected pointer step, got {other:?}"),
        }
        assert_eq!(script.steps[4], Step::Advance { ms: 600 });
        assert_eq!(script.steps[5], Step::PollTimeout);
    }
}
