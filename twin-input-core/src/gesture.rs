//! Gesture definitions and the gesture registry.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, ShapeFamily, SwipeDirection};
use crate::dispatch::{Handler, HandlerResult};
use crate::error::{InputError, InputResult};
use crate::registry::{Definition, Gate, Registry};

/// Payload handed to gesture handlers and carried by
/// [`Notification::GestureFired`](crate::Notification::GestureFired).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Id of the definition that fired.
    pub definition_id: String,
    /// Recognised shape family.
    pub shape_family: ShapeFamily,
    /// Measured shape parameters.
    pub params: Classification,
    /// Dispatch time in milliseconds.
    pub timestamp_ms: u64,
}

/// Parameter limits a classification must satisfy.
///
/// Only the fields relevant to the definition's shape family may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeConstraints {
    /// Smallest accepted circle radius.
    pub min_radius: Option<f32>,
    /// Largest accepted circle radius.
    pub max_radius: Option<f32>,
    /// Shortest accepted line length.
    pub min_distance: Option<f32>,
    /// Longest accepted line length.
    pub max_distance: Option<f32>,
    /// Required swipe direction.
    pub direction: Option<SwipeDirection>,
    /// Longest accepted interval between the taps of a double tap.
    pub max_interval_ms: Option<u64>,
    /// Classification confidence must reach this.
    pub min_confidence: Option<f32>,
}

impl ShapeConstraints {
    /// No constraints.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Check the constraints make sense for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] for a field that does not
    /// apply to the family, a negative or non-finite bound, or a minimum
    /// above its maximum.
    pub fn validate(&self, family: ShapeFamily) -> InputResult<()> {
        let circle_only = self.min_radius.is_some() || self.max_radius.is_some();
        let line_only =
            self.min_distance.is_some() || self.max_distance.is_some() || self.direction.is_some();
        let tap_only = self.max_interval_ms.is_some();

        match family {
            ShapeFamily::Circle if line_only || tap_only => Err(InputError::invalid(
                "circle gestures accept only radius and confidence constraints",
            )),
            ShapeFamily::Line if circle_only || tap_only => Err(InputError::invalid(
                "line gestures accept only distance, direction, and confidence constraints",
            )),
            ShapeFamily::DoubleTap if circle_only || line_only => Err(InputError::invalid(
                "double-tap gestures accept only interval and confidence constraints",
            )),
            _ => Ok(()),
        }?;

        bounds("radius", self.min_radius, self.max_radius)?;
        bounds("distance", self.min_distance, self.max_distance)?;
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(InputError::invalid(format!(
                    "min_confidence must be in [0, 1], got {min}"
                )));
            }
        }
        Ok(())
    }

    /// Check whether a classification satisfies these constraints.
    #[must_use]
    pub fn accepts(&self, classification: &Classification) -> bool {
        if self
            .min_confidence
            .is_some_and(|min| classification.confidence() < min)
        {
            return false;
        }
        match classification {
            Classification::Circle { radius, .. } => within(*radius, self.min_radius, self.max_radius),
            Classification::Line {
                distance,
                direction,
                ..
            } => {
                within(*distance, self.min_distance, self.max_distance)
                    && self.direction.map_or(true, |d| d == *direction)
            }
            Classification::DoubleTap { interval_ms, .. } => {
                self.max_interval_ms.map_or(true, |max| *interval_ms <= max)
            }
            Classification::None => false,
        }
    }
}

fn bounds(name: &str, min: Option<f32>, max: Option<f32>) -> InputResult<()> {
    for value in [min, max].into_iter().flatten() {
        if !value.is_finite() || value < 0.0 {
            return Err(InputError::invalid(format!(
                "{name} bounds must be finite and non-negative, got {value}"
            )));
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(InputError::invalid(format!(
                "min {name} {min} exceeds max {name} {max}"
            )));
        }
    }
    Ok(())
}

fn within(value: f32, min: Option<f32>, max: Option<f32>) -> bool {
    min.map_or(true, |m| value >= m) && max.map_or(true, |m| value <= m)
}

/// Arbitration settings and handler for a gesture registration.
#[derive(Default)]
pub struct GestureOptions {
    /// Higher wins; equal priorities go to the earlier registration.
    pub priority: i32,
    /// Minimum time between firings.
    pub cooldown_ms: u64,
    /// Evaluated at resolution time; `None` is always open.
    pub gate: Option<Gate>,
    /// Required.
    pub handler: Option<Handler<GestureEvent>>,
}

/// A registered gesture.
pub struct GestureDefinition {
    id: String,
    family: ShapeFamily,
    constraints: ShapeConstraints,
    priority: i32,
    cooldown_ms: u64,
    gate: Option<Gate>,
    handler: Handler<GestureEvent>,
    last_fired_at: Option<u64>,
}

impl GestureDefinition {
    /// Validate and assemble a definition.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] for an empty id, a missing
    /// handler, or constraints that do not fit the family.
    pub fn new(
        id: impl Into<String>,
        family: ShapeFamily,
        constraints: ShapeConstraints,
        options: GestureOptions,
    ) -> InputResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InputError::invalid("gesture id must not be empty"));
        }
        constraints.validate(family)?;
        let handler = options
            .handler
            .ok_or_else(|| InputError::invalid(format!("gesture '{id}' has no handler")))?;

        Ok(Self {
            id,
            family,
            constraints,
            priority: options.priority,
            cooldown_ms: options.cooldown_ms,
            gate: options.gate,
            handler,
            last_fired_at: None,
        })
    }

    /// Shape family this gesture responds to.
    #[must_use]
    pub const fn family(&self) -> ShapeFamily {
        self.family
    }

    /// Parameter constraints.
    #[must_use]
    pub const fn constraints(&self) -> &ShapeConstraints {
        &self.constraints
    }

    /// Whether this gesture accepts the classification, ignoring cooldown
    /// and gate.
    #[must_use]
    pub fn matches(&self, classification: &Classification) -> bool {
        classification.family() == Some(self.family) && self.constraints.accepts(classification)
    }
}

impl std::fmt::Debug for GestureDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureDefinition")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("constraints", &self.constraints)
            .field("priority", &self.priority)
            .field("cooldown_ms", &self.cooldown_ms)
            .field("gated", &self.gate.is_some())
            .field("handler", &self.handler)
            .field("last_fired_at", &self.last_fired_at)
            .finish()
    }
}

impl Definition for GestureDefinition {
    type Event = GestureEvent;

    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    fn last_fired_at(&self) -> Option<u64> {
        self.last_fired_at
    }

    fn mark_fired(&mut self, now_ms: u64) {
        self.last_fired_at = Some(now_ms);
    }

    fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    fn handler_mut(&mut self) -> &mut Handler<GestureEvent> {
        &mut self.handler
    }
}

/// Registered gestures in registration order.
pub type GestureRegistry = Registry<GestureDefinition>;

impl Registry<GestureDefinition> {
    /// Index of the gesture that wins `classification` at `now_ms`.
    #[must_use]
    pub fn resolve(&self, classification: &Classification, now_ms: u64) -> Option<usize> {
        if classification.is_none() {
            return None;
        }
        self.arbitrate(now_ms, |d| d.matches(classification))
    }
}

/// Chained construction of a [`GestureDefinition`].
///
/// ```
/// use twin_input_core::GestureBuilder;
///
/// let delete = GestureBuilder::new("delete")
///     .circle()
///     .radius(30.0, 80.0)
///     .priority(8)
///     .cooldown_ms(500)
///     .on(|_event| Ok(()))
///     .build()
///     .unwrap();
/// assert_eq!(delete.constraints().max_radius, Some(80.0));
/// ```
#[must_use]
pub struct GestureBuilder {
    id: String,
    family: Option<ShapeFamily>,
    constraints: ShapeConstraints,
    options: GestureOptions,
}

impl GestureBuilder {
    /// Start a gesture with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: None,
            constraints: ShapeConstraints::default(),
            options: GestureOptions::default(),
        }
    }

    /// Respond to circles.
    pub fn circle(mut self) -> Self {
        self.family = Some(ShapeFamily::Circle);
        self
    }

    /// Respond to swipes in any direction.
    pub fn swipe(mut self) -> Self {
        self.family = Some(ShapeFamily::Line);
        self
    }

    /// Respond to swipes in one direction.
    pub fn swipe_towards(mut self, direction: SwipeDirection) -> Self {
        self.family = Some(ShapeFamily::Line);
        self.constraints.direction = Some(direction);
        self
    }

    /// Respond to double taps.
    pub fn double_tap(mut self) -> Self {
        self.family = Some(ShapeFamily::DoubleTap);
        self
    }

    /// Limit the circle radius.
    pub fn radius(mut self, min: f32, max: f32) -> Self {
        self.constraints.min_radius = Some(min);
        self.constraints.max_radius = Some(max);
        self
    }

    /// Limit the swipe length.
    pub fn distance(mut self, min: f32, max: f32) -> Self {
        self.constraints.min_distance = Some(min);
        self.constraints.max_distance = Some(max);
        self
    }

    /// Require a minimum classification confidence.
    pub fn min_confidence(mut self, min: f32) -> Self {
        self.constraints.min_confidence = Some(min);
        self
    }

    /// Replace all constraints.
    pub fn constraints(mut self, constraints: ShapeConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Gate on live application state.
    pub fn when<F>(mut self, gate: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.options.gate = Some(Box::new(gate));
        self
    }

    /// Arbitration priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.options.priority = priority;
        self
    }

    /// Cooldown between firings.
    pub fn cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.options.cooldown_ms = cooldown_ms;
        self
    }

    /// Synchronous handler.
    pub fn on<F>(self, handler: F) -> Self
    where
        F: FnMut(&GestureEvent) -> HandlerResult + 'static,
    {
        self.handler(Handler::sync(handler))
    }

    /// Asynchronous handler.
    pub fn on_async<F, Fut>(self, handler: F) -> Self
    where
        F: FnMut(GestureEvent) -> Fut + 'static,
        Fut: Future<Output = HandlerResult> + 'static,
    {
        self.handler(Handler::from_async(handler))
    }

    /// Set a prepared handler.
    pub fn handler(mut self, handler: Handler<GestureEvent>) -> Self {
        self.options.handler = Some(handler);
        self
    }

    /// Validate and produce the definition.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] if no shape family was
    /// chosen or the definition is otherwise invalid.
    pub fn build(self) -> InputResult<GestureDefinition> {
        let family = self.family.ok_or_else(|| {
            InputError::invalid(format!("gesture '{}' has no shape family", self.id))
        })?;
        GestureDefinition::new(self.id, family, self.constraints, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Point;

    fn circle(radius: f32, confidence: f32) -> Classification {
        Classification::Circle {
            center: Point::new(0.0, 0.0),
            radius,
            confidence,
        }
    }

    fn swipe(direction: SwipeDirection, distance: f32) -> Classification {
        Classification::Line {
            start: Point::new(0.0, 0.0),
            end: Point::new(distance, 0.0),
            distance,
            max_deviation: 0.0,
            direction,
            confidence: 1.0,
        }
    }

    fn noop() -> Option<Handler<GestureEvent>> {
        Some(Handler::sync(|_| Ok(())))
    }

    #[test]
    fn missing_handler_is_rejected() {
        let result = GestureDefinition::new(
            "delete",
            ShapeFamily::Circle,
            ShapeConstraints::none(),
            GestureOptions::default(),
        );
        assert!(matches!(result, Err(InputError::InvalidDefinition(msg)) if msg.contains("handler")));
    }

    #[test]
    fn empty_id_is_rejected() {
        let result = GestureDefinition::new(
            "  ",
            ShapeFamily::Circle,
            ShapeConstraints::none(),
            GestureOptions {
                handler: noop(),
                ..GestureOptions::default()
            },
        );
        assert!(matches!(result, Err(InputError::InvalidDefinition(_))));
    }

    #[test]
    fn constraints_must_fit_family() {
        let constraints = ShapeConstraints {
            direction: Some(SwipeDirection::Up),
            ..ShapeConstraints::default()
        };
        assert!(constraints.validate(ShapeFamily::Circle).is_err());
        assert!(constraints.validate(ShapeFamily::Line).is_ok());
        assert!(constraints.validate(ShapeFamily::DoubleTap).is_err());
    }

    #[test]
    fn inverted_or_negative_bounds_are_rejected() {
        let inverted = ShapeConstraints {
            min_radius: Some(80.0),
            max_radius: Some(30.0),
            ..ShapeConstraints::default()
        };
        assert!(inverted.validate(ShapeFamily::Circle).is_err());

        let negative = ShapeConstraints {
            min_distance: Some(-1.0),
            ..ShapeConstraints::default()
        };
        assert!(negative.validate(ShapeFamily::Line).is_err());

        let nan = ShapeConstraints {
            max_radius: Some(f32::NAN),
            ..ShapeConstraints::default()
        };
        assert!(nan.validate(ShapeFamily::Circle).is_err());

        let confidence = ShapeConstraints {
            min_confidence: Some(1.5),
            ..ShapeConstraints::default()
        };
        assert!(confidence.validate(ShapeFamily::Circle).is_err());
    }

    #[test]
    fn radius_range_is_inclusive() {
        let constraints = ShapeConstraints {
            min_radius: Some(30.0),
            max_radius: Some(80.0),
            ..ShapeConstraints::default()
        };
        assert!(constraints.accepts(&circle(30.0, 1.0)));
        assert!(constraints.accepts(&circle(80.0, 1.0)));
        assert!(!constraints.accepts(&circle(29.9, 1.0)));
        assert!(!constraints.accepts(&circle(81.0, 1.0)));
    }

    #[test]
    fn direction_and_confidence_filters() {
        let constraints = ShapeConstraints {
            direction: Some(SwipeDirection::Left),
            min_confidence: Some(0.9),
            ..ShapeConstraints::default()
        };
        assert!(constraints.accepts(&swipe(SwipeDirection::Left, 100.0)));
        assert!(!constraints.accepts(&swipe(SwipeDirection::Right, 100.0)));
        assert!(!constraints.accepts(&circle(40.0, 0.5)));
        assert!(!ShapeConstraints::none().accepts(&Classification::None));
    }

    #[test]
    fn matches_checks_family() {
        let definition = GestureBuilder::new("ring").circle().on(|_| Ok(())).build().unwrap();
        assert!(definition.matches(&circle(40.0, 1.0)));
        assert!(!definition.matches(&swipe(SwipeDirection::Up, 100.0)));
    }

    #[test]
    fn builder_requires_family() {
        let result = GestureBuilder::new("nothing").on(|_| Ok(())).build();
        assert!(matches!(result, Err(InputError::InvalidDefinition(msg)) if msg.contains("shape family")));
    }

    #[test]
    fn builder_sets_arbitration_fields() {
        let definition = GestureBuilder::new("undo")
            .swipe_towards(SwipeDirection::Left)
            .distance(50.0, 400.0)
            .when(|| true)
            .priority(4)
            .cooldown_ms(250)
            .on_async(|_| async { Ok::<(), crate::BoxError>(()) })
            .build()
            .unwrap();
        assert_eq!(definition.family(), ShapeFamily::Line);
        assert_eq!(definition.priority(), 4);
        assert_eq!(definition.cooldown_ms(), 250);
        assert!(definition.gate().is_some());
        assert_eq!(definition.constraints().direction, Some(SwipeDirection::Left));
    }

    #[test]
    fn registry_resolve_prefers_priority_then_order() {
        let mut registry = GestureRegistry::new();
        let gestures = [
            GestureBuilder::new("quick-delete").radius(20.0, 40.0).priority(5),
            GestureBuilder::new("delete").radius(30.0, 80.0).priority(8),
            GestureBuilder::new("ring").priority(8),
        ];
        for builder in gestures {
            registry.insert(builder.circle().on(|_| Ok(())).build().unwrap());
        }

        assert_eq!(registry.resolve(&circle(35.0, 1.0), 0), Some(1));
        assert_eq!(registry.resolve(&circle(25.0, 1.0), 0), Some(2));
        assert_eq!(registry.resolve(&circle(90.0, 1.0), 0), Some(2));
        assert_eq!(registry.resolve(&Classification::None, 0), None);
    }

    #[test]
    fn constraints_deserialize_from_json() {
        let constraints: ShapeConstraints =
            serde_json::from_str(r#"{"direction": "up", "min_distance": 40}"#).unwrap();
        assert_eq!(constraints.direction, Some(SwipeDirection::Up));
        assert_eq!(constraints.min_distance, Some(40.0));
        assert!(serde_json::from_str::<ShapeConstraints>(r#"{"radius": 4}"#).is_err());
    }
}
