//! # Recognition engine
//!
//! The capture state machine. It owns the sample buffer, runs the
//! classifiers when a capture ends, and hands the result to the gesture
//! registry. Transcripts take a separate path through the voice registry
//! and are accepted in any capture state.
//!
//! ```text
//!          begin_capture          end_capture
//!   Idle ───────────────▶ Capturing ──────────▶ Classifying ──▶ Idle
//!    ▲                        │
//!    └────────────────────────┘
//!      cancel_capture / timeout
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::{
    best_match, classify_circle, classify_double_tap, classify_line, detect_tap, Classification,
    ShapeFamily, ShapeMatch, Tap,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dispatch::{DispatchStatus, Dispatcher, ListenerId, Notification};
use crate::error::{InputError, InputResult};
use crate::event::{normalize_transcript, InputEvent, PointSample, PointerEvent, PointerPhase, VoiceEvent};
use crate::gesture::{GestureDefinition, GestureEvent, GestureOptions, GestureRegistry, ShapeConstraints};
use crate::registry::Definition;
use crate::sample::SampleBuffer;
use crate::voice::{VoiceCommandDefinition, VoiceCommandEvent, VoiceMatch, VoiceOptions, VoiceRegistry};

/// Where the engine is in the capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No capture in progress.
    Idle,
    /// Samples are accumulating.
    Capturing,
    /// The finished capture is being classified and resolved.
    Classifying,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Classifying => "classifying",
        };
        f.write_str(name)
    }
}

/// Identifies one capture session in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureId(Uuid);

impl CaptureId {
    /// Create a new unique capture id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of [`RecognitionEngine::end_capture`].
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// A gesture won arbitration and its handler was invoked.
    Dispatched {
        /// Winning gesture.
        definition_id: String,
        /// What the capture was classified as.
        classification: Classification,
        /// How the handler went.
        status: DispatchStatus,
    },
    /// A shape was recognised but no gesture was eligible.
    Unclaimed(Classification),
    /// No classifier matched.
    NoMatch,
    /// The capture had gone stale and was cancelled instead.
    TimedOut,
}

/// Result of handing a transcript to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    /// A voice command won arbitration and its handler was invoked.
    Dispatched {
        /// Winning command.
        definition_id: String,
        /// Normalised transcript.
        transcript: String,
        /// How the handler went.
        status: DispatchStatus,
    },
    /// No voice command was eligible for the transcript.
    Unclaimed(String),
    /// The transcript was empty, interim, or below the confidence floor.
    Dropped,
}

/// What [`RecognitionEngine::handle_event`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResponse {
    /// The event did not concern the engine's current capture.
    Ignored,
    /// A capture started.
    CaptureStarted(CaptureId),
    /// A sample was added to the running capture.
    SampleAdded,
    /// The capture ended.
    CaptureEnded(CaptureOutcome),
    /// The capture was cancelled.
    CaptureCancelled,
    /// A transcript was processed.
    Voice(VoiceOutcome),
}

#[derive(Debug, Clone, Copy)]
struct ActiveCapture {
    id: CaptureId,
    /// `None` accepts samples from any pointer.
    pointer_id: Option<u32>,
    last_activity_ms: u64,
    last_sample_t: u64,
}

/// Gesture and voice recognition engine.
///
/// Constructed and owned by the host; registration and input calls go
/// through `&mut self`, so a resolution can never observe a registry that
/// is being modified.
pub struct RecognitionEngine {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    state: CaptureState,
    buffer: SampleBuffer,
    capture: Option<ActiveCapture>,
    pending_tap: Option<Tap>,
    gestures: GestureRegistry,
    voice: VoiceRegistry,
    dispatcher: Dispatcher,
}

impl RecognitionEngine {
    /// Create an engine on the wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] if the config does not validate.
    pub fn new(config: EngineConfig) -> InputResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create an engine on a custom clock.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Config`] if the config does not validate.
    pub fn with_clock(config: EngineConfig, clock: impl Clock + 'static) -> InputResult<Self> {
        config.validate()?;
        let buffer = SampleBuffer::with_capacity(config.sample_capacity);
        Ok(Self {
            config,
            clock: Box::new(clock),
            state: CaptureState::Idle,
            buffer,
            capture: None,
            pending_tap: None,
            gestures: GestureRegistry::new(),
            voice: VoiceRegistry::new(),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Current engine config.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current capture state.
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Id of the running capture.
    #[must_use]
    pub fn capture_id(&self) -> Option<CaptureId> {
        self.capture.map(|c| c.id)
    }

    /// Samples in the current capture.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    /// Current time on the engine clock.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ----- capture -----

    /// Start a capture seeded with `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AlreadyCapturing`] outside `Idle`; the running
    /// capture is left untouched.
    pub fn begin_capture(&mut self, initial: PointSample) -> InputResult<CaptureId> {
        self.start(initial, None)
    }

    fn start(&mut self, initial: PointSample, pointer_id: Option<u32>) -> InputResult<CaptureId> {
        if self.state != CaptureState::Idle {
            return Err(InputError::AlreadyCapturing);
        }
        let id = CaptureId::new();
        self.buffer.clear();
        self.buffer.push(initial);
        self.capture = Some(ActiveCapture {
            id,
            pointer_id,
            last_activity_ms: self.clock.now_ms(),
            last_sample_t: initial.t,
        });
        self.state = CaptureState::Capturing;
        debug!(capture_id = %id, x = initial.x, y = initial.y, "Capture started");
        Ok(id)
    }

    /// Append a sample to the running capture.
    ///
    /// Returns false if nothing is being captured, or if the gap since the
    /// previous sample exceeds the capture timeout, in which case the stale
    /// capture is cancelled.
    pub fn add_sample(&mut self, sample: PointSample) -> bool {
        let Some(capture) = self.capture.as_mut() else {
            return false;
        };
        if self.state != CaptureState::Capturing {
            return false;
        }
        let timeout = self.config.capture_timeout_ms;
        if timeout > 0 && sample.t.saturating_sub(capture.last_sample_t) > timeout {
            warn!(
                capture_id = %capture.id,
                gap_ms = sample.t.saturating_sub(capture.last_sample_t),
                "Sample gap exceeded capture timeout, cancelling"
            );
            self.pending_tap = None;
            self.reset();
            return false;
        }
        capture.last_sample_t = sample.t;
        capture.last_activity_ms = self.clock.now_ms();
        self.buffer.push(sample);
        true
    }

    /// Finish the capture: classify, arbitrate, and dispatch.
    ///
    /// The buffer is cleared and the engine returns to `Idle` whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::NotCapturing`] outside `Capturing`.
    pub fn end_capture(&mut self) -> InputResult<CaptureOutcome> {
        if self.state != CaptureState::Capturing {
            return Err(InputError::NotCapturing);
        }
        if self.poll_timeout() {
            return Ok(CaptureOutcome::TimedOut);
        }

        self.state = CaptureState::Classifying;
        let samples = self.buffer.to_vec();
        let classification = self.classify(&samples);
        debug!(
            samples = samples.len(),
            evicted = self.buffer.evicted(),
            capacity = self.buffer.capacity(),
            shape = ?classification.family(),
            confidence = classification.confidence(),
            "Capture classified"
        );
        self.reset();

        Ok(self.resolve_gesture(classification))
    }

    /// Abandon the capture without classifying. Safe in any state.
    pub fn cancel_capture(&mut self) {
        if let Some(capture) = self.capture {
            debug!(capture_id = %capture.id, "Capture cancelled");
        }
        self.pending_tap = None;
        self.reset();
    }

    /// Cancel the capture if it has been inactive longer than the timeout.
    ///
    /// Returns true if a capture was cancelled.
    pub fn poll_timeout(&mut self) -> bool {
        let timeout = self.config.capture_timeout_ms;
        let Some(capture) = self.capture else {
            return false;
        };
        if timeout == 0 || self.state != CaptureState::Capturing {
            return false;
        }
        let idle_ms = self.clock.now_ms().saturating_sub(capture.last_activity_ms);
        if idle_ms <= timeout {
            return false;
        }
        warn!(capture_id = %capture.id, idle_ms, "Capture timed out");
        self.pending_tap = None;
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.capture = None;
        self.state = CaptureState::Idle;
    }

    /// Run the classifiers in declaration order: circle, line, double tap.
    fn classify(&mut self, samples: &[PointSample]) -> Classification {
        let config = &self.config;
        let tap = detect_tap(samples, &config.double_tap);
        let double_tap = match (self.pending_tap.take(), tap) {
            (Some(first), Some(second)) => classify_double_tap(&first, &second, &config.double_tap),
            _ => ShapeMatch::none(),
        };

        let classification = best_match(vec![
            (classify_circle(samples, &config.circle), config.circle.min_confidence),
            (classify_line(samples, &config.line), config.line.min_confidence),
            (double_tap, config.double_tap.min_confidence),
        ]);

        // A lone tap waits for its partner; anything else consumes it.
        self.pending_tap = match (&classification, tap) {
            (Classification::None, Some(tap)) => Some(tap),
            _ => None,
        };
        classification
    }

    fn resolve_gesture(&mut self, classification: Classification) -> CaptureOutcome {
        if classification.is_none() {
            return CaptureOutcome::NoMatch;
        }
        let now = self.clock.now_ms();
        let Some(definition) = self
            .gestures
            .resolve(&classification, now)
            .and_then(|index| self.gestures.get_index_mut(index))
        else {
            debug!(shape = ?classification.family(), "No gesture claimed the capture");
            return CaptureOutcome::Unclaimed(classification);
        };

        let definition_id = definition.id().to_string();
        let event = GestureEvent {
            definition_id: definition_id.clone(),
            shape_family: definition.family(),
            params: classification.clone(),
            timestamp_ms: now,
        };
        let status = self.dispatcher.dispatch(definition, event, now);
        CaptureOutcome::Dispatched {
            definition_id,
            classification,
            status,
        }
    }

    // ----- voice -----

    /// Resolve a transcript against the voice commands.
    ///
    /// Independent of the capture state.
    pub fn receive_transcript(&mut self, text: &str) -> VoiceOutcome {
        self.resolve_voice(text, 1.0)
    }

    /// Resolve a speech recognition result, dropping interim results and
    /// results below the configured confidence.
    pub fn receive_voice(&mut self, event: &VoiceEvent) -> VoiceOutcome {
        if !event.is_final && !self.config.voice.accept_interim {
            debug!(transcript = %event.transcript, "Dropped interim transcript");
            return VoiceOutcome::Dropped;
        }
        if event.confidence < self.config.voice.min_confidence {
            warn!(
                transcript = %event.transcript,
                confidence = event.confidence,
                min_confidence = self.config.voice.min_confidence,
                "Dropped low-confidence transcript"
            );
            return VoiceOutcome::Dropped;
        }
        self.resolve_voice(&event.transcript, event.confidence)
    }

    fn resolve_voice(&mut self, text: &str, confidence: f32) -> VoiceOutcome {
        let transcript = normalize_transcript(text);
        if transcript.is_empty() {
            return VoiceOutcome::Dropped;
        }
        let now = self.clock.now_ms();
        let Some(definition) = self
            .voice
            .resolve(&transcript, now)
            .and_then(|index| self.voice.get_index_mut(index))
        else {
            debug!(transcript = %transcript, "No voice command claimed the transcript");
            return VoiceOutcome::Unclaimed(transcript);
        };

        let definition_id = definition.id().to_string();
        let event = VoiceCommandEvent {
            definition_id: definition_id.clone(),
            transcript: transcript.clone(),
            captures: definition.captures(&transcript),
            confidence,
            timestamp_ms: now,
        };
        let status = self.dispatcher.dispatch(definition, event, now);
        VoiceOutcome::Dispatched {
            definition_id,
            transcript,
            status,
        }
    }

    // ----- input events -----

    /// Route a host input event.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AlreadyCapturing`] for a pointer-down while a
    /// capture is running.
    pub fn handle_event(&mut self, event: &InputEvent) -> InputResult<EventResponse> {
        match event {
            InputEvent::Pointer(pointer) => self.handle_pointer(pointer),
            InputEvent::Voice(voice) => Ok(EventResponse::Voice(self.receive_voice(voice))),
        }
    }

    /// Route a pointer event. Events from pointers other than the one that
    /// started the capture are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::AlreadyCapturing`] for a pointer-down while a
    /// capture is running.
    pub fn handle_pointer(&mut self, event: &PointerEvent) -> InputResult<EventResponse> {
        if event.phase == PointerPhase::Down {
            return self
                .start(event.sample(), Some(event.pointer_id))
                .map(EventResponse::CaptureStarted);
        }
        if !self.owns_pointer(event.pointer_id) {
            return Ok(EventResponse::Ignored);
        }

        match event.phase {
            PointerPhase::Move => Ok(if self.add_sample(event.sample()) {
                EventResponse::SampleAdded
            } else {
                EventResponse::CaptureEnded(CaptureOutcome::TimedOut)
            }),
            PointerPhase::Up => {
                if !self.add_sample(event.sample()) {
                    return Ok(EventResponse::CaptureEnded(CaptureOutcome::TimedOut));
                }
                self.end_capture().map(EventResponse::CaptureEnded)
            }
            PointerPhase::Cancel => {
                self.cancel_capture();
                Ok(EventResponse::CaptureCancelled)
            }
            PointerPhase::Down => Ok(EventResponse::Ignored),
        }
    }

    fn owns_pointer(&self, pointer_id: u32) -> bool {
        self.state == CaptureState::Capturing
            && self
                .capture
                .is_some_and(|c| c.pointer_id.map_or(true, |owner| owner == pointer_id))
    }

    // ----- registration -----

    /// Register a gesture, replacing any gesture with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] if the definition is
    /// rejected; existing registrations are unaffected.
    pub fn register_gesture(
        &mut self,
        id: impl Into<String>,
        family: ShapeFamily,
        constraints: ShapeConstraints,
        options: GestureOptions,
    ) -> InputResult<()> {
        let definition = GestureDefinition::new(id, family, constraints, options)?;
        self.register_gesture_definition(definition);
        Ok(())
    }

    /// Register a prepared gesture, replacing any gesture with the same id.
    pub fn register_gesture_definition(&mut self, definition: GestureDefinition) {
        let id = definition.id().to_string();
        let family = definition.family();
        if self.gestures.insert(definition).is_some() {
            debug!(definition_id = %id, %family, "Gesture replaced");
        } else {
            debug!(definition_id = %id, %family, "Gesture registered");
        }
    }

    /// Remove a gesture. Returns false if it was not registered.
    pub fn unregister_gesture(&mut self, id: &str) -> bool {
        let removed = self.gestures.remove(id).is_some();
        if removed {
            debug!(definition_id = %id, "Gesture unregistered");
        }
        removed
    }

    /// Register a voice command, replacing any command with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] if the definition is
    /// rejected; existing registrations are unaffected.
    pub fn register_voice_command(
        &mut self,
        id: impl Into<String>,
        matcher: VoiceMatch,
        options: VoiceOptions,
    ) -> InputResult<()> {
        let definition = VoiceCommandDefinition::new(id, matcher, options)?;
        self.register_voice_definition(definition);
        Ok(())
    }

    /// Register a prepared voice command, replacing any with the same id.
    pub fn register_voice_definition(&mut self, definition: VoiceCommandDefinition) {
        let id = definition.id().to_string();
        if self.voice.insert(definition).is_some() {
            debug!(definition_id = %id, "Voice command replaced");
        } else {
            debug!(definition_id = %id, "Voice command registered");
        }
    }

    /// Remove a voice command. Returns false if it was not registered.
    pub fn unregister_voice_command(&mut self, id: &str) -> bool {
        let removed = self.voice.remove(id).is_some();
        if removed {
            debug!(definition_id = %id, "Voice command unregistered");
        }
        removed
    }

    /// Enable or disable a voice command.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::UnknownDefinition`] if no voice command has
    /// this id.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> InputResult<()> {
        let definition = self
            .voice
            .get_mut(id)
            .ok_or_else(|| InputError::UnknownDefinition(id.to_string()))?;
        definition.set_enabled(enabled);
        debug!(definition_id = %id, enabled, "Voice command toggled");
        Ok(())
    }

    /// Whether a voice command is enabled; `None` if it is not registered.
    #[must_use]
    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.voice.get(id).map(Definition::is_enabled)
    }

    /// When a definition last fired. Gestures are looked up before voice
    /// commands.
    #[must_use]
    pub fn last_fired_at(&self, id: &str) -> Option<u64> {
        self.gestures
            .get(id)
            .map(Definition::last_fired_at)
            .or_else(|| self.voice.get(id).map(Definition::last_fired_at))
            .flatten()
    }

    /// Registered gesture ids in registration order.
    #[must_use]
    pub fn gesture_ids(&self) -> Vec<String> {
        self.gestures.ids()
    }

    /// Registered voice command ids in registration order.
    #[must_use]
    pub fn voice_command_ids(&self) -> Vec<String> {
        self.voice.ids()
    }

    /// The gesture registry.
    #[must_use]
    pub const fn gestures(&self) -> &GestureRegistry {
        &self.gestures
    }

    /// The voice registry.
    #[must_use]
    pub const fn voice_commands(&self) -> &VoiceRegistry {
        &self.voice
    }

    // ----- notifications -----

    /// Register a notification listener.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Notification) + 'static,
    {
        self.dispatcher.subscribe(listener)
    }

    /// Remove a notification listener.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Drive queued asynchronous handlers.
    ///
    /// Returns the number of handler failures reported.
    pub fn run_pending_handlers(&mut self) -> usize {
        self.dispatcher.run_pending()
    }
}

impl Default for RecognitionEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            buffer: SampleBuffer::with_capacity(config.sample_capacity),
            config,
            clock: Box::new(SystemClock),
            state: CaptureState::Idle,
            capture: None,
            pending_tap: None,
            gestures: GestureRegistry::new(),
            voice: VoiceRegistry::new(),
            dispatcher: Dispatcher::new(),
        }
    }
}

impl fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("state", &self.state)
            .field("samples", &self.buffer.len())
            .field("gestures", &self.gestures)
            .field("voice", &self.voice)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gesture::GestureBuilder;
    use crate::voice::VoiceCommandBuilder;
    use std::cell::{Cell, RefCell};
    use std::f32::consts::TAU;
    use std::rc::Rc;

    fn engine() -> (RecognitionEngine, ManualClock) {
        let clock = ManualClock::new(1_000);
        let engine = RecognitionEngine::with_clock(EngineConfig::default(), clock.clone()).unwrap();
        (engine, clock)
    }

    #[allow(clippy::cast_precision_loss)]
    fn feed_circle(engine: &mut RecognitionEngine, radius: f32, t0: u64) -> CaptureOutcome {
        let n = 12;
        let point = |i: usize| {
            let angle = TAU * i as f32 / n as f32;
            PointSample::new(200.0 + radius * angle.cos(), 200.0 + radius * angle.sin(), t0 + i as u64 * 16)
        };
        engine.begin_capture(point(0)).unwrap();
        for i in 1..n {
            assert!(engine.add_sample(point(i)));
        }
        engine.end_capture().unwrap()
    }

    fn tap(engine: &mut RecognitionEngine, x: f32, y: f32, t: u64) -> CaptureOutcome {
        engine.begin_capture(PointSample::new(x, y, t)).unwrap();
        engine.add_sample(PointSample::new(x + 1.0, y, t + 40));
        engine.end_capture().unwrap()
    }

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(&GestureEvent) -> crate::HandlerResult) {
        let calls = Rc::new(Cell::new(0));
        let inner = Rc::clone(&calls);
        (calls, move |_: &GestureEvent| {
            inner.set(inner.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn begin_while_capturing_is_rejected() {
        let (mut engine, _) = engine();
        let first = engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        let err = engine.begin_capture(PointSample::new(5.0, 5.0, 5)).unwrap_err();
        assert!(matches!(err, InputError::AlreadyCapturing));
        assert_eq!(engine.capture_id(), Some(first));
        assert_eq!(engine.sample_count(), 1);
    }

    #[test]
    fn add_sample_outside_capture_is_noop() {
        let (mut engine, _) = engine();
        assert!(!engine.add_sample(PointSample::new(1.0, 1.0, 1)));
        assert_eq!(engine.sample_count(), 0);
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[test]
    fn end_capture_requires_capturing() {
        let (mut engine, _) = engine();
        assert!(matches!(engine.end_capture(), Err(InputError::NotCapturing)));
    }

    #[test]
    fn end_capture_always_returns_to_idle() {
        let (mut engine, _) = engine();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        engine.add_sample(PointSample::new(3.0, 90.0, 500));
        let outcome = engine.end_capture().unwrap();
        assert_eq!(outcome, CaptureOutcome::NoMatch);
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.sample_count(), 0);
        assert!(engine.capture_id().is_none());
    }

    #[test]
    fn buffer_is_bounded() {
        let config = EngineConfig {
            sample_capacity: 4,
            ..EngineConfig::default()
        };
        let mut engine = RecognitionEngine::with_clock(config, ManualClock::new(0)).unwrap();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        for i in 1..10u16 {
            engine.add_sample(PointSample::new(f32::from(i), 0.0, u64::from(i)));
        }
        assert_eq!(engine.sample_count(), 4);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut engine, _) = engine();
        engine.cancel_capture();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        engine.add_sample(PointSample::new(1.0, 0.0, 1));
        engine.cancel_capture();
        engine.cancel_capture();
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(engine.sample_count(), 0);
    }

    #[test]
    fn circle_dispatches_unclaimed_without_definitions() {
        let (mut engine, _) = engine();
        match feed_circle(&mut engine, 50.0, 0) {
            CaptureOutcome::Unclaimed(Classification::Circle { radius, .. }) => {
                assert!((radius - 50.0).abs() < 0.5);
            }
            other => panic!("Expected unclaimed circle, got {other:?}"),
        }
    }

    #[test]
    fn panicking_async_handler_does_not_wedge_engine() {
        let (mut engine, _) = engine();
        engine.register_gesture_definition(
            GestureBuilder::new("ring")
                .circle()
                .on_async(|_: GestureEvent| -> futures::future::Ready<crate::HandlerResult> {
                    panic!("no executor")
                })
                .build()
                .unwrap(),
        );
        let failures = Rc::new(Cell::new(0));
        let counter = Rc::clone(&failures);
        engine.subscribe(move |n| {
            if matches!(n, Notification::HandlerFailed(_)) {
                counter.set(counter.get() + 1);
            }
        });

        match feed_circle(&mut engine, 50.0, 0) {
            CaptureOutcome::Dispatched {
                status: DispatchStatus::Failed(err),
                ..
            } => assert!(err.message.contains("no executor")),
            other => panic!("Expected failed dispatch, got {other:?}"),
        }
        assert_eq!(engine.state(), CaptureState::Idle);
        assert_eq!(failures.get(), 1);
        assert!(engine.begin_capture(PointSample::new(0.0, 0.0, 1_000)).is_ok());
    }

    #[test]
    fn circle_fires_registered_gesture() {
        let (mut engine, clock) = engine();
        let (calls, handler) = counter();
        engine.register_gesture_definition(GestureBuilder::new("ring").circle().on(handler).build().unwrap());

        let outcome = feed_circle(&mut engine, 50.0, 0);

        assert!(matches!(
            outcome,
            CaptureOutcome::Dispatched { ref definition_id, status: DispatchStatus::Completed, .. } if definition_id == "ring"
        ));
        assert_eq!(calls.get(), 1);
        assert_eq!(engine.last_fired_at("ring"), Some(clock.now_ms()));
    }

    #[test]
    fn failing_handler_does_not_break_next_capture() {
        let (mut engine, _) = engine();
        engine.register_gesture_definition(
            GestureBuilder::new("broken")
                .circle()
                .on(|_| Err("no selection".into()))
                .build()
                .unwrap(),
        );
        let (calls, handler) = counter();
        engine.register_gesture_definition(GestureBuilder::new("swipe").swipe().on(handler).build().unwrap());

        let outcome = feed_circle(&mut engine, 50.0, 0);
        assert!(matches!(
            outcome,
            CaptureOutcome::Dispatched { status: DispatchStatus::Failed(_), .. }
        ));
        assert_eq!(engine.state(), CaptureState::Idle);

        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        for i in 1..6u16 {
            engine.add_sample(PointSample::new(f32::from(i) * 20.0, 0.0, u64::from(i) * 16));
        }
        let outcome = engine.end_capture().unwrap();
        assert!(matches!(outcome, CaptureOutcome::Dispatched { ref definition_id, .. } if definition_id == "swipe"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn two_taps_make_a_double_tap() {
        let (mut engine, _) = engine();
        let (calls, handler) = counter();
        engine.register_gesture_definition(GestureBuilder::new("open").double_tap().on(handler).build().unwrap());

        assert_eq!(tap(&mut engine, 100.0, 100.0, 0), CaptureOutcome::NoMatch);
        match tap(&mut engine, 105.0, 100.0, 200) {
            CaptureOutcome::Dispatched {
                classification: Classification::DoubleTap { interval_ms, .. },
                ..
            } => assert_eq!(interval_ms, 200),
            other => panic!("Expected double tap, got {other:?}"),
        }
        assert_eq!(calls.get(), 1);

        // The pair is consumed; a third tap starts a new pair.
        assert_eq!(tap(&mut engine, 105.0, 100.0, 300), CaptureOutcome::NoMatch);
    }

    #[test]
    fn slow_second_tap_becomes_new_first_tap() {
        let (mut engine, _) = engine();
        assert_eq!(tap(&mut engine, 100.0, 100.0, 0), CaptureOutcome::NoMatch);
        assert_eq!(tap(&mut engine, 100.0, 100.0, 1_000), CaptureOutcome::NoMatch);
        assert!(matches!(
            tap(&mut engine, 100.0, 100.0, 1_150),
            CaptureOutcome::Unclaimed(Classification::DoubleTap { .. })
        ));
    }

    #[test]
    fn cancel_forgets_pending_tap() {
        let (mut engine, _) = engine();
        tap(&mut engine, 100.0, 100.0, 0);
        engine.cancel_capture();
        assert_eq!(tap(&mut engine, 100.0, 100.0, 100), CaptureOutcome::NoMatch);
    }

    #[test]
    fn inactivity_timeout_forgets_pending_tap() {
        let (mut engine, clock) = engine();
        tap(&mut engine, 100.0, 100.0, 0);
        engine.begin_capture(PointSample::new(100.0, 100.0, 50)).unwrap();
        clock.advance(5_001);
        assert!(engine.poll_timeout());
        assert_eq!(tap(&mut engine, 100.0, 100.0, 100), CaptureOutcome::NoMatch);
    }

    #[test]
    fn sample_gap_forgets_pending_tap() {
        let (mut engine, _) = engine();
        tap(&mut engine, 100.0, 100.0, 0);
        engine.begin_capture(PointSample::new(100.0, 100.0, 50)).unwrap();
        assert!(!engine.add_sample(PointSample::new(100.0, 100.0, 5_100)));
        assert_eq!(tap(&mut engine, 100.0, 100.0, 100), CaptureOutcome::NoMatch);
    }

    #[test]
    fn inactivity_timeout_cancels_capture() {
        let (mut engine, clock) = engine();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        clock.advance(4_000);
        assert!(!engine.poll_timeout());
        clock.advance(2_000);
        assert!(engine.poll_timeout());
        assert_eq!(engine.state(), CaptureState::Idle);
        assert!(!engine.poll_timeout());
    }

    #[test]
    fn end_capture_after_timeout_reports_it() {
        let (mut engine, clock) = engine();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        clock.advance(5_001);
        assert_eq!(engine.end_capture().unwrap(), CaptureOutcome::TimedOut);
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[test]
    fn sample_gap_cancels_stale_capture() {
        let (mut engine, _) = engine();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        assert!(engine.add_sample(PointSample::new(1.0, 0.0, 100)));
        assert!(!engine.add_sample(PointSample::new(2.0, 0.0, 6_000)));
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = EngineConfig {
            capture_timeout_ms: 0,
            ..EngineConfig::default()
        };
        let clock = ManualClock::new(0);
        let mut engine = RecognitionEngine::with_clock(config, clock.clone()).unwrap();
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
        clock.advance(60_000);
        assert!(!engine.poll_timeout());
        assert!(engine.add_sample(PointSample::new(1.0, 0.0, 60_000)));
    }

    #[test]
    fn other_pointers_are_ignored() {
        let (mut engine, _) = engine();
        let down = PointerEvent::new(PointerPhase::Down, 0.0, 0.0, 0).with_pointer_id(1);
        assert!(matches!(engine.handle_pointer(&down), Ok(EventResponse::CaptureStarted(_))));

        let stray = PointerEvent::new(PointerPhase::Move, 50.0, 50.0, 10).with_pointer_id(2);
        assert_eq!(engine.handle_pointer(&stray).unwrap(), EventResponse::Ignored);
        let stray_up = PointerEvent::new(PointerPhase::Up, 50.0, 50.0, 20).with_pointer_id(2);
        assert_eq!(engine.handle_pointer(&stray_up).unwrap(), EventResponse::Ignored);
        assert_eq!(engine.state(), CaptureState::Capturing);
        assert_eq!(engine.sample_count(), 1);

        let second_down = PointerEvent::new(PointerPhase::Down, 9.0, 9.0, 30).with_pointer_id(2);
        assert!(matches!(engine.handle_pointer(&second_down), Err(InputError::AlreadyCapturing)));

        let cancel = PointerEvent::new(PointerPhase::Cancel, 0.0, 0.0, 40).with_pointer_id(1);
        assert_eq!(engine.handle_pointer(&cancel).unwrap(), EventResponse::CaptureCancelled);
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[test]
    fn pointer_up_ends_capture() {
        let (mut engine, _) = engine();
        let events = [
            PointerEvent::new(PointerPhase::Down, 0.0, 0.0, 0),
            PointerEvent::new(PointerPhase::Move, 20.0, 0.0, 16),
            PointerEvent::new(PointerPhase::Move, 40.0, 0.0, 32),
            PointerEvent::new(PointerPhase::Move, 60.0, 0.0, 48),
            PointerEvent::new(PointerPhase::Up, 80.0, 0.0, 64),
        ];
        let mut last = EventResponse::Ignored;
        for event in &events {
            last = engine.handle_event(&InputEvent::Pointer(*event)).unwrap();
        }
        assert!(matches!(
            last,
            EventResponse::CaptureEnded(CaptureOutcome::Unclaimed(Classification::Line { .. }))
        ));
    }

    #[test]
    fn transcripts_work_while_capturing() {
        let (mut engine, _) = engine();
        let heard = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&heard);
        engine.register_voice_definition(
            VoiceCommandBuilder::new("undo")
                .literal("undo")
                .on(move |e| {
                    sink.borrow_mut().push(e.transcript.clone());
                    Ok(())
                })
                .build()
                .unwrap(),
        );
        engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();

        let outcome = engine.receive_transcript("  Undo ");

        assert!(matches!(outcome, VoiceOutcome::Dispatched { ref transcript, .. } if transcript == "Undo"));
        assert_eq!(*heard.borrow(), vec!["Undo".to_string()]);
        assert_eq!(engine.state(), CaptureState::Capturing);
    }

    #[test]
    fn interim_and_low_confidence_results_are_dropped() {
        let (mut engine, _) = engine();
        engine.register_voice_definition(VoiceCommandBuilder::new("save").literal("save").on(|_| Ok(())).build().unwrap());

        let interim = VoiceEvent::interim("save".into(), 0.9, 0);
        assert_eq!(engine.receive_voice(&interim), VoiceOutcome::Dropped);
        let quiet = VoiceEvent::final_result("save".into(), 0.2, 0);
        assert_eq!(engine.receive_voice(&quiet), VoiceOutcome::Dropped);
        assert_eq!(engine.receive_transcript("   "), VoiceOutcome::Dropped);

        let clear = VoiceEvent::final_result("save".into(), 0.9, 0);
        assert!(matches!(engine.receive_voice(&clear), VoiceOutcome::Dispatched { .. }));
    }

    #[test]
    fn accept_interim_lets_interim_through() {
        let mut config = EngineConfig::default();
        config.voice.accept_interim = true;
        let mut engine = RecognitionEngine::with_clock(config, ManualClock::new(0)).unwrap();
        let interim = VoiceEvent::interim("hello".into(), 0.9, 0);
        assert_eq!(engine.receive_voice(&interim), VoiceOutcome::Unclaimed("hello".into()));
    }

    #[test]
    fn set_enabled_toggles_voice_commands() {
        let (mut engine, _) = engine();
        engine
            .register_voice_command(
                "save",
                VoiceMatch::literal("save"),
                VoiceOptions {
                    handler: Some(crate::Handler::sync(|_| Ok(()))),
                    ..VoiceOptions::default()
                },
            )
            .unwrap();

        engine.set_enabled("save", false).unwrap();
        assert_eq!(engine.is_enabled("save"), Some(false));
        assert_eq!(engine.receive_transcript("save"), VoiceOutcome::Unclaimed("save".into()));

        engine.set_enabled("save", true).unwrap();
        assert!(matches!(engine.receive_transcript("save"), VoiceOutcome::Dispatched { .. }));

        assert!(matches!(
            engine.set_enabled("missing", true),
            Err(InputError::UnknownDefinition(id)) if id == "missing"
        ));
        assert_eq!(engine.is_enabled("missing"), None);
    }

    #[test]
    fn invalid_registration_keeps_existing() {
        let (mut engine, _) = engine();
        let (_, handler) = counter();
        engine.register_gesture_definition(GestureBuilder::new("ring").circle().on(handler).build().unwrap());

        let err = engine
            .register_gesture("ring", ShapeFamily::Circle, ShapeConstraints::none(), GestureOptions::default())
            .unwrap_err();
        assert!(matches!(err, InputError::InvalidDefinition(_)));
        assert_eq!(engine.gesture_ids(), vec!["ring".to_string()]);
        assert!(engine.gestures().get("ring").is_some());
    }

    #[test]
    fn unregister_reports_presence() {
        let (mut engine, _) = engine();
        let (_, handler) = counter();
        engine.register_gesture_definition(GestureBuilder::new("ring").circle().on(handler).build().unwrap());
        assert!(engine.unregister_gesture("ring"));
        assert!(!engine.unregister_gesture("ring"));
        assert!(!engine.unregister_voice_command("ring"));
        assert!(engine.gesture_ids().is_empty());
        assert!(engine.voice_command_ids().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            sample_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(RecognitionEngine::new(config), Err(InputError::Config(_))));
    }
}
