//! Input events consumed by the recognition engine.

use serde::{Deserialize, Serialize};

/// A single recorded pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    /// X position in editor coordinates.
    pub x: f32,
    /// Y position in editor coordinates.
    pub y: f32,
    /// Timestamp in milliseconds.
    pub t: u64,
}

impl PointSample {
    /// Create a new sample.
    #[must_use]
    pub const fn new(x: f32, y: f32, t: u64) -> Self {
        Self { x, y, t }
    }

    /// Euclidean distance to another sample.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerPhase {
    /// Pointer pressed (capture start).
    Down,
    /// Pointer moved (sample).
    Move,
    /// Pointer released (capture end).
    Up,
    /// Pointer cancelled by the input device (e.g., palm rejection).
    Cancel,
}

/// A pointer event from the host's input layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Pointer identifier (for multi-touch).
    #[serde(default)]
    pub pointer_id: u32,
    /// Phase of this event.
    pub phase: PointerPhase,
    /// X position in editor coordinates.
    pub x: f32,
    /// Y position in editor coordinates.
    pub y: f32,
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl PointerEvent {
    /// Create a new pointer event for the primary pointer.
    #[must_use]
    pub const fn new(phase: PointerPhase, x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            pointer_id: 0,
            phase,
            x,
            y,
            timestamp_ms,
        }
    }

    /// Set the pointer id.
    #[must_use]
    pub const fn with_pointer_id(mut self, pointer_id: u32) -> Self {
        self.pointer_id = pointer_id;
        self
    }

    /// The sample this event contributes to a capture.
    #[must_use]
    pub const fn sample(&self) -> PointSample {
        PointSample::new(self.x, self.y, self.timestamp_ms)
    }
}

/// A voice input event from speech recognition.
///
/// Represents transcribed speech from the Web Speech API or a similar
/// producer. The engine works without any producer attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEvent {
    /// The recognized speech transcript.
    pub transcript: String,
    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,
    /// Whether this is a final (committed) result.
    ///
    /// Interim results may change as speech recognition continues.
    pub is_final: bool,
    /// Timestamp when the speech was recognized (ms).
    pub timestamp_ms: u64,
}

impl VoiceEvent {
    /// Create a new voice event.
    #[must_use]
    pub fn new(transcript: String, confidence: f32, is_final: bool, timestamp_ms: u64) -> Self {
        Self {
            transcript,
            confidence,
            is_final,
            timestamp_ms,
        }
    }

    /// Create an interim (non-final) voice event.
    #[must_use]
    pub fn interim(transcript: String, confidence: f32, timestamp_ms: u64) -> Self {
        Self::new(transcript, confidence, false, timestamp_ms)
    }

    /// Create a final voice event.
    #[must_use]
    pub fn final_result(transcript: String, confidence: f32, timestamp_ms: u64) -> Self {
        Self::new(transcript, confidence, true, timestamp_ms)
    }
}

/// All input events the engine can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InputEvent {
    /// Pointer down/move/up/cancel.
    Pointer(PointerEvent),
    /// Transcript from speech recognition.
    Voice(VoiceEvent),
}

/// Collapse runs of whitespace and trim the ends.
#[must_use]
pub fn normalize_transcript(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
