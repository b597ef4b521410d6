//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to name the
//! values it changes:
//!
//! ```
//! use twin_input_core::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{"double_tap": {"max_interval_ms": 300}}"#).unwrap();
//! assert_eq!(config.double_tap.max_interval_ms, 300);
//! assert_eq!(config.sample_capacity, 50);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InputError, InputResult};
use crate::sample::DEFAULT_SAMPLE_CAPACITY;

/// Circle classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    /// Fewest samples a circle can be classified from.
    pub min_samples: usize,
    /// Average radius must exceed this.
    pub min_radius: f32,
    /// Allowed radius deviation as a fraction of the average radius.
    pub tolerance_ratio: f32,
    /// Matches at or below this confidence are discarded.
    pub min_confidence: f32,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            min_radius: 20.0,
            tolerance_ratio: 0.3,
            min_confidence: 0.0,
        }
    }
}

/// Line (swipe) classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Fewest samples a line can be classified from.
    pub min_samples: usize,
    /// Shortest start-to-end distance accepted.
    pub min_distance: f32,
    /// Allowed perpendicular deviation as a fraction of the distance.
    pub deviation_ratio: f32,
    /// Matches at or below this confidence are discarded.
    pub min_confidence: f32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            min_distance: 30.0,
            deviation_ratio: 0.2,
            min_confidence: 0.0,
        }
    }
}

/// Double-tap detection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleTapConfig {
    /// Longest gap between the two taps.
    pub max_interval_ms: u64,
    /// Largest distance between the two tap points.
    pub max_distance: f32,
    /// A capture moving further than this from its first sample is not a tap.
    pub tap_max_movement: f32,
    /// A capture lasting longer than this is not a tap.
    pub tap_max_duration_ms: u64,
    /// Matches at or below this confidence are discarded.
    pub min_confidence: f32,
}

impl Default for DoubleTapConfig {
    fn default() -> Self {
        Self {
            max_interval_ms: 400,
            max_distance: 40.0,
            tap_max_movement: 10.0,
            tap_max_duration_ms: 300,
            min_confidence: 0.0,
        }
    }
}

/// Transcript acceptance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Transcripts below this recognition confidence are dropped.
    pub min_confidence: f32,
    /// Also resolve interim (non-final) results.
    pub accept_interim: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            accept_interim: false,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Samples kept per capture before the oldest are evicted.
    pub sample_capacity: usize,
    /// Inactivity window after which a capture is cancelled; 0 disables it.
    pub capture_timeout_ms: u64,
    /// Circle classifier.
    pub circle: CircleConfig,
    /// Line classifier.
    pub line: LineConfig,
    /// Double-tap detection.
    pub double_tap: DoubleTapConfig,
    /// Transcript acceptance.
    pub voice: VoiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            capture_timeout_ms: 5000,
            circle: CircleConfig::default(),
            line: LineConfig::default(),
            double_tap: DoubleTapConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json_str(json: &str) -> InputResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> InputResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] naming the first bad field.
    pub fn validate(&self) -> InputResult<()> {
        if self.sample_capacity == 0 {
            return Err(InputError::Config("sample_capacity must be at least 1".into()));
        }
        non_negative("circle.min_radius", self.circle.min_radius)?;
        ratio("circle.tolerance_ratio", self.circle.tolerance_ratio)?;
        confidence("circle.min_confidence", self.circle.min_confidence)?;
        non_negative("line.min_distance", self.line.min_distance)?;
        ratio("line.deviation_ratio", self.line.deviation_ratio)?;
        confidence("line.min_confidence", self.line.min_confidence)?;
        non_negative("double_tap.max_distance", self.double_tap.max_distance)?;
        non_negative("double_tap.tap_max_movement", self.double_tap.tap_max_movement)?;
        confidence("double_tap.min_confidence", self.double_tap.min_confidence)?;
        if self.double_tap.max_interval_ms == 0 {
            return Err(InputError::Config(
                "double_tap.max_interval_ms must be positive".into(),
            ));
        }
        confidence("voice.min_confidence", self.voice.min_confidence)?;
        Ok(())
    }
}

fn non_negative(field: &str, value: f32) -> InputResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(InputError::Config(format!(
            "{field} must be a finite non-negative number, got {value}"
        )))
    }
}

fn ratio(field: &str, value: f32) -> InputResult<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(InputError::Config(format!(
            "{field} must be in (0, 1], got {value}"
        )))
    }
}

fn confidence(field: &str, value: f32) -> InputResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InputError::Config(format!(
            "{field} must be in [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_capacity, 50);
        assert_eq!(config.capture_timeout_ms, 5000);
        assert_eq!(config.circle.min_samples, 10);
        assert!((config.circle.tolerance_ratio - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.line.min_samples, 5);
        assert!((config.line.min_distance - 30.0).abs() < f32::EPSILON);
        assert_eq!(config.double_tap.max_interval_ms, 400);
        assert!((config.double_tap.max_distance - 40.0).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"sample_capacity": 20, "voice": {"accept_interim": true}}"#)
                .unwrap();
        assert_eq!(config.sample_capacity, 20);
        assert!(config.voice.accept_interim);
        assert!((config.voice.min_confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.line, LineConfig::default());
    }

    #[test]
    fn rejects_zero_capacity() {
        let result = EngineConfig::from_json_str(r#"{"sample_capacity": 0}"#);
        assert!(matches!(result, Err(InputError::Config(_))));
    }

    #[test]
    fn rejects_ratio_out_of_range() {
        let result = EngineConfig::from_json_str(r#"{"circle": {"tolerance_ratio": 1.5}}"#);
        assert!(matches!(result, Err(InputError::Config(msg)) if msg.contains("tolerance_ratio")));
    }

    #[test]
    fn rejects_wrong_types() {
        let result = EngineConfig::from_json_str(r#"{"capture_timeout_ms": "soon"}"#);
        assert!(matches!(result, Err(InputError::Serialization(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"capture_timeout_ms": 0}}"#).unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.capture_timeout_ms, 0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = EngineConfig::from_path("/definitely/not/here.json");
        assert!(matches!(result, Err(InputError::Io(_))));
    }
}
