//! WebAssembly bindings for the browser editor.
//!
//! Handlers and gates are plain JS functions. A handler receives the fired
//! event as a JSON string and may return a `Promise`. Handlers are queued
//! like native asynchronous handlers: a throw or a rejection is delivered
//! to subscribers as a `handler_failed` notification on the next
//! `runPendingHandlers` call.

use std::collections::HashMap;

use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::{
    BoxError, CaptureOutcome, DispatchStatus, EngineConfig, Gate, Handler, ListenerId,
    PointSample, RecognitionEngine, ShapeConstraints, ShapeFamily, VoiceEvent, VoiceMatch,
    VoiceOptions, VoiceOutcome,
};
use crate::gesture::GestureOptions;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Recognition engine handle for JavaScript.
#[wasm_bindgen]
pub struct WasmRecognizer {
    engine: RecognitionEngine,
    listeners: HashMap<u32, ListenerId>,
    next_listener: u32,
}

#[wasm_bindgen]
impl WasmRecognizer {
    /// Create a recognizer, optionally from a JSON engine config.
    ///
    /// # Errors
    ///
    /// Returns an error string if the config does not parse or validate.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmRecognizer, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => EngineConfig::from_json_str(json).map_err(to_js)?,
            _ => EngineConfig::default(),
        };
        Ok(Self {
            engine: RecognitionEngine::new(config).map_err(to_js)?,
            listeners: HashMap::new(),
            next_listener: 0,
        })
    }

    /// Current capture state.
    #[wasm_bindgen(getter)]
    #[must_use]
    pub fn state(&self) -> String {
        self.engine.state().to_string()
    }

    /// Start a capture. Returns the capture id.
    ///
    /// # Errors
    ///
    /// Returns an error string if a capture is already running.
    #[wasm_bindgen(js_name = beginCapture)]
    pub fn begin_capture(&mut self, x: f32, y: f32, t: f64) -> Result<String, JsValue> {
        self.engine
            .begin_capture(PointSample::new(x, y, millis(t)))
            .map(|id| id.to_string())
            .map_err(to_js)
    }

    /// Add a sample to the running capture.
    #[wasm_bindgen(js_name = addSample)]
    pub fn add_sample(&mut self, x: f32, y: f32, t: f64) -> bool {
        self.engine.add_sample(PointSample::new(x, y, millis(t)))
    }

    /// Finish the capture. Returns the outcome as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if no capture is running.
    #[wasm_bindgen(js_name = endCapture)]
    pub fn end_capture(&mut self) -> Result<String, JsValue> {
        self.engine
            .end_capture()
            .map(|outcome| capture_outcome_json(&outcome))
            .map_err(to_js)
    }

    /// Abandon the running capture, if any.
    #[wasm_bindgen(js_name = cancelCapture)]
    pub fn cancel_capture(&mut self) {
        self.engine.cancel_capture();
    }

    /// Cancel a stale capture. Returns true if one was cancelled.
    #[wasm_bindgen(js_name = pollTimeout)]
    pub fn poll_timeout(&mut self) -> bool {
        self.engine.poll_timeout()
    }

    /// Resolve a transcript. Returns the outcome as JSON.
    #[wasm_bindgen(js_name = receiveTranscript)]
    pub fn receive_transcript(&mut self, text: &str) -> String {
        voice_outcome_json(&self.engine.receive_transcript(text))
    }

    /// Resolve a speech recognition result. Returns the outcome as JSON.
    #[wasm_bindgen(js_name = receiveVoice)]
    pub fn receive_voice(&mut self, transcript: String, confidence: f32, is_final: bool, t: f64) -> String {
        let event = VoiceEvent::new(transcript, confidence, is_final, millis(t));
        voice_outcome_json(&self.engine.receive_voice(&event))
    }

    /// Register a gesture.
    ///
    /// `family` is `circle`, `line` (or `swipe`), or `double_tap`;
    /// `constraints_json` may be empty.
    ///
    /// # Errors
    ///
    /// Returns an error string if the definition is rejected.
    #[wasm_bindgen(js_name = registerGesture)]
    #[allow(clippy::too_many_arguments)]
    pub fn register_gesture(
        &mut self,
        id: String,
        family: &str,
        constraints_json: &str,
        priority: i32,
        cooldown_ms: u32,
        handler: js_sys::Function,
        gate: Option<js_sys::Function>,
    ) -> Result<(), JsValue> {
        let family: ShapeFamily = family.parse().map_err(|e: String| JsValue::from_str(&e))?;
        let constraints = if constraints_json.trim().is_empty() {
            ShapeConstraints::none()
        } else {
            serde_json::from_str(constraints_json).map_err(|e| JsValue::from_str(&e.to_string()))?
        };
        let options = GestureOptions {
            priority,
            cooldown_ms: u64::from(cooldown_ms),
            gate: gate.map(js_gate),
            handler: Some(js_handler(&id, handler)),
        };
        self.engine
            .register_gesture(id, family, constraints, options)
            .map_err(to_js)
    }

    /// Register a voice command matching a literal phrase or, with
    /// `is_pattern`, a regular expression.
    ///
    /// # Errors
    ///
    /// Returns an error string if the definition is rejected.
    #[wasm_bindgen(js_name = registerVoiceCommand)]
    #[allow(clippy::too_many_arguments)]
    pub fn register_voice_command(
        &mut self,
        id: String,
        matcher: String,
        is_pattern: bool,
        case_sensitive: bool,
        priority: i32,
        cooldown_ms: u32,
        handler: js_sys::Function,
        gate: Option<js_sys::Function>,
    ) -> Result<(), JsValue> {
        let matcher = if is_pattern {
            VoiceMatch::Pattern(matcher)
        } else {
            VoiceMatch::Literal(matcher)
        };
        let options = VoiceOptions {
            case_sensitive,
            priority,
            cooldown_ms: u64::from(cooldown_ms),
            gate: gate.map(js_gate),
            handler: Some(js_handler(&id, handler)),
            ..VoiceOptions::default()
        };
        self.engine
            .register_voice_command(id, matcher, options)
            .map_err(to_js)
    }

    /// Remove a gesture.
    #[wasm_bindgen(js_name = unregisterGesture)]
    pub fn unregister_gesture(&mut self, id: &str) -> bool {
        self.engine.unregister_gesture(id)
    }

    /// Remove a voice command.
    #[wasm_bindgen(js_name = unregisterVoiceCommand)]
    pub fn unregister_voice_command(&mut self, id: &str) -> bool {
        self.engine.unregister_voice_command(id)
    }

    /// Enable or disable a voice command.
    ///
    /// # Errors
    ///
    /// Returns an error string if the id is unknown.
    #[wasm_bindgen(js_name = setEnabled)]
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), JsValue> {
        self.engine.set_enabled(id, enabled).map_err(to_js)
    }

    /// Listen for notifications, delivered as JSON strings.
    ///
    /// Returns a handle for [`WasmRecognizer::unsubscribe`].
    pub fn subscribe(&mut self, listener: js_sys::Function) -> u32 {
        let id = self.engine.subscribe(move |notification| {
            let json = serde_json::to_string(notification).unwrap_or_default();
            if let Err(err) = listener.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                web_sys::console::error_2(&"Notification listener failed:".into(), &err);
            }
        });
        let handle = self.next_listener;
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.insert(handle, id);
        handle
    }

    /// Remove a listener.
    pub fn unsubscribe(&mut self, handle: u32) -> bool {
        self.listeners
            .remove(&handle)
            .is_some_and(|id| self.engine.unsubscribe(id))
    }

    /// Drive queued asynchronous handlers.
    #[wasm_bindgen(js_name = runPendingHandlers)]
    pub fn run_pending_handlers(&mut self) -> usize {
        self.engine.run_pending_handlers()
    }

    /// Registered gesture ids as JSON.
    #[wasm_bindgen(js_name = gestureIds)]
    #[must_use]
    pub fn gesture_ids(&self) -> String {
        serde_json::to_string(&self.engine.gesture_ids()).unwrap_or_default()
    }

    /// Registered voice command ids as JSON.
    #[wasm_bindgen(js_name = voiceCommandIds)]
    #[must_use]
    pub fn voice_command_ids(&self) -> String {
        serde_json::to_string(&self.engine.voice_command_ids()).unwrap_or_default()
    }
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn millis(t: f64) -> u64 {
    t.max(0.0) as u64
}

fn js_gate(gate: js_sys::Function) -> Gate {
    Box::new(move || {
        gate.call0(&JsValue::NULL)
            .map(|value| value.is_truthy())
            .unwrap_or(false)
    })
}

fn js_handler<E: serde::Serialize + 'static>(definition_id: &str, handler: js_sys::Function) -> Handler<E> {
    let definition_id = definition_id.to_string();
    Handler::from_async(move |event: E| {
        let called = call_handler(&handler, &event);
        let definition_id = definition_id.clone();
        async move {
            let result = called?;
            if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
                if let Err(err) = wasm_bindgen_futures::JsFuture::from(promise).await {
                    web_sys::console::error_2(&format!("Handler {definition_id} rejected:").into(), &err);
                    return Err(js_message(&err).into());
                }
            }
            Ok::<(), BoxError>(())
        }
    })
}

fn call_handler<E: serde::Serialize>(handler: &js_sys::Function, event: &E) -> Result<JsValue, BoxError> {
    let json = serde_json::to_string(event)?;
    handler
        .call1(&JsValue::NULL, &JsValue::from_str(&json))
        .map_err(|err| js_message(&err).into())
}

fn js_message(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

fn status_json(status: &DispatchStatus) -> serde_json::Value {
    match status {
        DispatchStatus::Completed => json!("completed"),
        DispatchStatus::Spawned => json!("spawned"),
        DispatchStatus::Failed(err) => json!({ "failed": err }),
    }
}

fn capture_outcome_json(outcome: &CaptureOutcome) -> String {
    let value = match outcome {
        CaptureOutcome::Dispatched {
            definition_id,
            classification,
            status,
        } => json!({
            "outcome": "dispatched",
            "definition_id": definition_id,
            "classification": classification,
            "status": status_json(status),
        }),
        CaptureOutcome::Unclaimed(classification) => json!({
            "outcome": "unclaimed",
            "classification": classification,
        }),
        CaptureOutcome::NoMatch => json!({ "outcome": "no_match" }),
        CaptureOutcome::TimedOut => json!({ "outcome": "timed_out" }),
    };
    value.to_string()
}

fn voice_outcome_json(outcome: &VoiceOutcome) -> String {
    let value = match outcome {
        VoiceOutcome::Dispatched {
            definition_id,
            transcript,
            status,
        } => json!({
            "outcome": "dispatched",
            "definition_id": definition_id,
            "transcript": transcript,
            "status": status_json(status),
        }),
        VoiceOutcome::Unclaimed(transcript) => json!({
            "outcome": "unclaimed",
            "transcript": transcript,
        }),
        VoiceOutcome::Dropped => json!({ "outcome": "dropped" }),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Classification, HandlerError, Point};

    #[test]
    fn capture_outcome_json_is_tagged() {
        let outcome = CaptureOutcome::Unclaimed(Classification::Circle {
            center: Point::new(1.0, 2.0),
            radius: 30.0,
            confidence: 0.9,
        });
        let value: serde_json::Value = serde_json::from_str(&capture_outcome_json(&outcome)).unwrap();
        assert_eq!(value["outcome"], "unclaimed");
        assert_eq!(value["classification"]["shape"], "circle");
    }

    #[test]
    fn failed_status_carries_error() {
        let err = HandlerError {
            definition_id: "save".into(),
            message: "offline".into(),
            input: String::new(),
        };
        let outcome = VoiceOutcome::Dispatched {
            definition_id: "save".into(),
            transcript: "save".into(),
            status: DispatchStatus::Failed(err),
        };
        let value: serde_json::Value = serde_json::from_str(&voice_outcome_json(&outcome)).unwrap();
        assert_eq!(value["status"]["failed"]["message"], "offline");
    }

    #[test]
    fn negative_timestamps_clamp_to_zero() {
        assert_eq!(millis(-5.0), 0);
        assert_eq!(millis(1234.9), 1234);
    }
}
