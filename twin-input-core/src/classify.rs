//! # Shape Classifiers
//!
//! Pure functions that turn a finished sample sequence into a shape match.
//!
//! ```text
//! samples ──► classify_circle ──┐
//!         ──► classify_line   ──┼──► best_match ──► Classification
//! taps    ──► classify_double_tap┘
//! ```
//!
//! Candidates are compared in the fixed order circle, line, double tap. The
//! highest confidence above its threshold wins; on equal confidence the
//! earlier candidate is kept.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{CircleConfig, DoubleTapConfig, LineConfig};
use crate::event::PointSample;

/// A position in editor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<PointSample> for Point {
    fn from(sample: PointSample) -> Self {
        Self::new(sample.x, sample.y)
    }
}

/// Category of geometric gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeFamily {
    /// Closed, roughly circular trace.
    Circle,
    /// Straight stroke (swipe).
    #[serde(alias = "swipe")]
    Line,
    /// Two short taps close together in time and space.
    DoubleTap,
}

impl ShapeFamily {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Circle => "circle",
            Self::Line => "line",
            Self::DoubleTap => "double_tap",
        }
    }
}

impl fmt::Display for ShapeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapeFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circle" => Ok(Self::Circle),
            "line" | "swipe" => Ok(Self::Line),
            "double_tap" | "double-tap" | "doubletap" => Ok(Self::DoubleTap),
            other => Err(format!("unknown shape family: {other}")),
        }
    }
}

/// Dominant direction of a line gesture.
///
/// Screen coordinates: y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    /// Towards smaller y.
    Up,
    /// Towards larger y.
    Down,
    /// Towards smaller x.
    Left,
    /// Towards larger x.
    Right,
}

impl SwipeDirection {
    /// Direction of the dominant axis of `end - start`; ties go horizontal.
    #[must_use]
    pub fn from_delta(dx: f32, dy: f32) -> Self {
        if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if dy > 0.0 {
            Self::Down
        } else {
            Self::Up
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for SwipeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown swipe direction: {other}")),
        }
    }
}

/// Outcome of classifying one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Classification {
    /// A circle around `center`.
    Circle {
        /// Centroid of the trace.
        center: Point,
        /// Mean distance of the samples to the centroid.
        radius: f32,
        /// Match confidence (0.0 to 1.0).
        confidence: f32,
    },
    /// A straight stroke.
    Line {
        /// First sample.
        start: Point,
        /// Last sample.
        end: Point,
        /// Start-to-end distance.
        distance: f32,
        /// Largest distance of any sample to the start-end segment.
        max_deviation: f32,
        /// Dominant direction.
        direction: SwipeDirection,
        /// Match confidence (0.0 to 1.0).
        confidence: f32,
    },
    /// Two taps.
    DoubleTap {
        /// Position of the second tap.
        point: Point,
        /// Time between the two taps.
        interval_ms: u64,
        /// Match confidence (0.0 to 1.0).
        confidence: f32,
    },
    /// Nothing recognised.
    None,
}

impl Classification {
    /// Shape family of this result, if any.
    #[must_use]
    pub const fn family(&self) -> Option<ShapeFamily> {
        match self {
            Self::Circle { .. } => Some(ShapeFamily::Circle),
            Self::Line { .. } => Some(ShapeFamily::Line),
            Self::DoubleTap { .. } => Some(ShapeFamily::DoubleTap),
            Self::None => None,
        }
    }

    /// Match confidence; 0 for [`Classification::None`].
    #[must_use]
    pub const fn confidence(&self) -> f32 {
        match self {
            Self::Circle { confidence, .. }
            | Self::Line { confidence, .. }
            | Self::DoubleTap { confidence, .. } => *confidence,
            Self::None => 0.0,
        }
    }

    /// Check if nothing was recognised.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Result of a single classifier.
///
/// `shape` carries the measured parameters even when `is_match` is false,
/// unless there were too few samples to measure anything.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMatch {
    /// Whether the samples satisfy the classifier.
    pub is_match: bool,
    /// Confidence (0.0 to 1.0).
    pub confidence: f32,
    /// Measured shape parameters.
    pub shape: Classification,
}

impl ShapeMatch {
    /// A non-match with no parameters.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
            shape: Classification::None,
        }
    }
}

/// Classify samples as a circle.
///
/// Matches when the variance of the sample distances to the centroid is
/// below `(avg_radius * tolerance_ratio)²` and the average radius exceeds
/// `min_radius`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify_circle(samples: &[PointSample], config: &CircleConfig) -> ShapeMatch {
    if samples.len() < config.min_samples.max(1) {
        return ShapeMatch::none();
    }

    let n = samples.len() as f32;
    let center = Point::new(
        samples.iter().map(|s| s.x).sum::<f32>() / n,
        samples.iter().map(|s| s.y).sum::<f32>() / n,
    );

    let distances: Vec<f32> = samples
        .iter()
        .map(|s| Point::from(*s).distance_to(center))
        .collect();
    let avg_radius = distances.iter().sum::<f32>() / n;
    let radius_variance = distances
        .iter()
        .map(|d| (d - avg_radius).powi(2))
        .sum::<f32>()
        / n;

    let tolerance = avg_radius * config.tolerance_ratio;
    let tolerance_sq = tolerance * tolerance;
    let (is_match, confidence) = if avg_radius > config.min_radius && tolerance_sq > 0.0 {
        (
            radius_variance < tolerance_sq,
            (1.0 - radius_variance / tolerance_sq).max(0.0),
        )
    } else {
        (false, 0.0)
    };

    ShapeMatch {
        is_match,
        confidence,
        shape: Classification::Circle {
            center,
            radius: avg_radius,
            confidence,
        },
    }
}

/// Distance from `p` to the segment `a`–`b`.
///
/// Projects `p` onto the segment's line and clamps the projection to the
/// segment ends.
#[must_use]
pub fn point_to_segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance_to(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Classify samples as a straight line (swipe).
///
/// Rejected outright when the start-to-end distance is below
/// `min_distance`; otherwise matches when every sample lies within
/// `distance * deviation_ratio` of the start-end segment.
#[must_use]
pub fn classify_line(samples: &[PointSample], config: &LineConfig) -> ShapeMatch {
    if samples.len() < config.min_samples.max(2) {
        return ShapeMatch::none();
    }
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return ShapeMatch::none();
    };
    let start = Point::from(*first);
    let end = Point::from(*last);
    let distance = start.distance_to(end);
    if distance < config.min_distance || distance == 0.0 {
        return ShapeMatch::none();
    }

    let max_deviation = samples
        .iter()
        .map(|s| point_to_segment_distance(Point::from(*s), start, end))
        .fold(0.0_f32, f32::max);
    let allowed = distance * config.deviation_ratio;
    let is_match = max_deviation < allowed;
    let confidence = (1.0 - max_deviation / allowed).max(0.0);

    ShapeMatch {
        is_match,
        confidence,
        shape: Classification::Line {
            start,
            end,
            distance,
            max_deviation,
            direction: SwipeDirection::from_delta(end.x - start.x, end.y - start.y),
            confidence,
        },
    }
}

/// A completed short capture that may form half of a double tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    /// Where the tap landed (first sample).
    pub point: Point,
    /// When the tap started.
    pub t: u64,
}

/// Detect whether a finished capture was a tap.
///
/// A tap stays within `tap_max_movement` of its first sample and lasts no
/// longer than `tap_max_duration_ms`.
#[must_use]
pub fn detect_tap(samples: &[PointSample], config: &DoubleTapConfig) -> Option<Tap> {
    let first = samples.first()?;
    let last = samples.last()?;
    if last.t.saturating_sub(first.t) > config.tap_max_duration_ms {
        return None;
    }
    let stayed = samples
        .iter()
        .all(|s| s.distance_to(first) <= config.tap_max_movement);
    stayed.then(|| Tap {
        point: Point::from(*first),
        t: first.t,
    })
}

/// Classify a pair of taps as a double tap.
///
/// The interval is measured between the two tap starts. Confidence falls
/// linearly from 1.0 for coincident, simultaneous taps to 0.5 at both
/// limits.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify_double_tap(first: &Tap, second: &Tap, config: &DoubleTapConfig) -> ShapeMatch {
    let Some(interval_ms) = second.t.checked_sub(first.t) else {
        return ShapeMatch::none();
    };
    let distance = first.point.distance_to(second.point);
    if interval_ms > config.max_interval_ms || distance > config.max_distance {
        return ShapeMatch::none();
    }

    let time_term = interval_ms as f32 / config.max_interval_ms.max(1) as f32;
    let space_term = if config.max_distance > 0.0 {
        distance / config.max_distance
    } else {
        0.0
    };
    let confidence = (1.0 - 0.25 * time_term - 0.25 * space_term).clamp(0.0, 1.0);

    ShapeMatch {
        is_match: true,
        confidence,
        shape: Classification::DoubleTap {
            point: second.point,
            interval_ms,
            confidence,
        },
    }
}

/// Pick the best candidate.
///
/// Each candidate is paired with its minimum confidence. A candidate must
/// match and score strictly above its threshold; the highest confidence
/// wins and equal confidences keep the earlier candidate.
#[must_use]
pub fn best_match(candidates: Vec<(ShapeMatch, f32)>) -> Classification {
    let mut best: Option<ShapeMatch> = None;
    for (candidate, threshold) in candidates {
        if !candidate.is_match || candidate.confidence <= threshold {
            continue;
        }
        let better = best
            .as_ref()
            .map_or(true, |b| candidate.confidence > b.confidence);
        if better {
            best = Some(candidate);
        }
    }
    best.map_or(Classification::None, |m| m.shape)
}
