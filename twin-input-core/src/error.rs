//! Error types for input recognition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations.
pub type InputResult<T> = Result<T, InputError>;

/// Boxed error returned by gesture and voice command handlers.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors surfaced synchronously by the recognition engine.
///
/// Handler failures are not part of this enum; they are reported through
/// [`HandlerError`] on the notification side channel.
#[derive(Debug, Error)]
pub enum InputError {
    /// A capture was started while another one is still active.
    #[error("A capture session is already active")]
    AlreadyCapturing,

    /// A capture operation was called while no capture is active.
    #[error("No capture session is active")]
    NotCapturing,

    /// A gesture or voice definition was rejected at registration time.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// No definition with the given id is registered.
    #[error("Unknown definition: {0}")]
    UnknownDefinition(String),

    /// Engine configuration is out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Config or definition JSON could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InputError {
    /// Shorthand for an [`InputError::InvalidDefinition`].
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDefinition(message.into())
    }
}

/// A failure raised by a dispatched handler.
///
/// Never returned to the caller of `end_capture` or `receive_transcript`;
/// logged and forwarded to listeners as a notification instead.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Handler for '{definition_id}' failed: {message}")]
pub struct HandlerError {
    /// Id of the definition whose handler failed.
    pub definition_id: String,
    /// Rendered error message.
    pub message: String,
    /// Debug rendering of the input that triggered the handler.
    pub input: String,
}

impl HandlerError {
    /// Wrap a handler failure.
    #[must_use]
    pub fn new(definition_id: &str, error: &BoxError, input: String) -> Self {
        Self {
            definition_id: definition_id.to_string(),
            message: error.to_string(),
            input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_definition_message_includes_reason() {
        let err = InputError::invalid("missing handler");
        assert_eq!(err.to_string(), "Invalid definition: missing handler");
    }

    #[test]
    fn handler_error_keeps_definition_id() {
        let source: BoxError = "boom".into();
        let err = HandlerError::new("delete", &source, "Circle".to_string());
        assert_eq!(err.definition_id, "delete");
        assert!(err.to_string().contains("delete"));
        assert!(err.to_string().contains("boom"));
    }
}
