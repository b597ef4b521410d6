//! # Twin Input Core
//!
//! Multi-modal input recognition for the digital twin editor.
//! Compiles to WASM for the browser host.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 RecognitionEngine                   │
//! ├─────────────────────────────────────────────────────┤
//! │  Pointer path              │  Speech path           │
//! │  - SampleBuffer            │  - Transcript gating   │
//! │  - Circle / line / tap     │  - Literal / pattern   │
//! │  - GestureRegistry         │  - VoiceRegistry       │
//! ├─────────────────────────────────────────────────────┤
//! │  Dispatcher                                         │
//! │  - Cooldown stamping  - Listeners  - Async handlers │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use twin_input_core::{EngineConfig, GestureBuilder, ManualClock, PointSample, RecognitionEngine};
//!
//! let clock = ManualClock::new(0);
//! let mut engine = RecognitionEngine::with_clock(EngineConfig::default(), clock).unwrap();
//! engine.register_gesture_definition(
//!     GestureBuilder::new("next-page").swipe().on(|_| Ok(())).build().unwrap(),
//! );
//!
//! engine.begin_capture(PointSample::new(0.0, 0.0, 0)).unwrap();
//! for i in 1..6u16 {
//!     engine.add_sample(PointSample::new(f32::from(i) * 15.0, 0.0, u64::from(i) * 16));
//! }
//! let outcome = engine.end_capture().unwrap();
//! assert!(matches!(outcome, twin_input_core::CaptureOutcome::Dispatched { .. }));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod gesture;
pub mod registry;
pub mod sample;
pub mod voice;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use classify::{Classification, Point, ShapeFamily, ShapeMatch, SwipeDirection};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CircleConfig, DoubleTapConfig, EngineConfig, LineConfig, VoiceConfig};
pub use dispatch::{DispatchStatus, Dispatcher, Handler, HandlerResult, ListenerId, Notification};
pub use engine::{CaptureId, CaptureOutcome, CaptureState, EventResponse, RecognitionEngine, VoiceOutcome};
pub use error::{BoxError, HandlerError, InputError, InputResult};
pub use event::{InputEvent, PointSample, PointerEvent, PointerPhase, VoiceEvent};
pub use gesture::{
    GestureBuilder, GestureDefinition, GestureEvent, GestureOptions, GestureRegistry,
    ShapeConstraints,
};
pub use registry::{Definition, Gate, Registry};
pub use sample::SampleBuffer;
pub use voice::{
    VoiceCommandBuilder, VoiceCommandDefinition, VoiceCommandEvent, VoiceMatch, VoiceOptions,
    VoiceRegistry,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
