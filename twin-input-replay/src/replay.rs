//! Drives a [`RecognitionEngine`] through a [`Script`].

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, warn};
use twin_input_core::{
    Clock, EngineConfig, InputEvent, ManualClock, Notification, RecognitionEngine,
};

use crate::definitions::{DefinitionFile, Flags};
use crate::error::ReplayResult;
use crate::script::{Script, Step};

/// Summary of a finished replay.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Every notification in the order it was raised.
    pub notifications: Vec<Notification>,
    /// Steps executed.
    pub steps: usize,
    /// Steps the engine rejected, with the reason.
    pub rejected: Vec<(usize, String)>,
}

/// Engine, clock, and flags for one replay.
pub struct Replay {
    engine: RecognitionEngine,
    clock: ManualClock,
    flags: Flags,
    notifications: Rc<RefCell<Vec<Notification>>>,
}

impl Replay {
    /// Build an engine from `config` and register every definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the config or any definition is rejected.
    pub fn new(config: EngineConfig, definitions: &DefinitionFile) -> ReplayResult<Self> {
        let clock = ManualClock::new(0);
        let mut engine = RecognitionEngine::with_clock(config, clock.clone())?;
        let flags = Flags::new();

        for entry in &definitions.gestures {
            engine.register_gesture_definition(entry.build(&flags)?);
        }
        for entry in &definitions.voice_commands {
            engine.register_voice_definition(entry.build(&flags)?);
        }
        info!(
            gestures = definitions.gestures.len(),
            voice_commands = definitions.voice_commands.len(),
            "Definitions registered"
        );

        let notifications = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&notifications);
        engine.subscribe(move |notification| sink.borrow_mut().push(notification.clone()));

        Ok(Self {
            engine,
            clock,
            flags,
            notifications,
        })
    }

    /// The flags gates read.
    #[must_use]
    pub const fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The engine being driven.
    #[must_use]
    pub const fn engine(&self) -> &RecognitionEngine {
        &self.engine
    }

    /// Run every step of `script`.
    ///
    /// Engine rejections (for example a pointer-down during a capture) are
    /// recorded in the report and do not stop the replay.
    pub fn run(&mut self, script: &Script) -> ReplayReport {
        self.clock.set(script.start_ms.max(self.clock.now_ms()));
        let mut report = ReplayReport::default();

        for (index, step) in script.steps.iter().enumerate() {
            debug!(index, ?step, "Replaying step");
            if let Err(reason) = self.step(step) {
                warn!(index, %reason, "Step rejected");
                report.rejected.push((index, reason));
            }
            report.steps += 1;
        }
        self.engine.run_pending_handlers();

        report.notifications = self.notifications.borrow_mut().drain(..).collect();
        info!(
            steps = report.steps,
            notifications = report.notifications.len(),
            rejected = report.rejected.len(),
            "Replay finished"
        );
        report
    }

    fn step(&mut self, step: &Step) -> Result<(), String> {
        match step {
            Step::Pointer(event) => {
                self.follow(event.timestamp_ms);
                self.engine
                    .handle_event(&InputEvent::Pointer(*event))
                    .map(|response| debug!(?response, "Pointer handled"))
                    .map_err(|e| e.to_string())
            }
            Step::Voice(event) => {
                self.follow(event.timestamp_ms);
                let outcome = self.engine.receive_voice(event);
                debug!(?outcome, "Voice handled");
                Ok(())
            }
            Step::Transcript { text } => {
                let outcome = self.engine.receive_transcript(text);
                debug!(?outcome, "Transcript handled");
                Ok(())
            }
            Step::SetFlag { flag, value } => {
                self.flags.set(flag, *value);
                Ok(())
            }
            Step::Advance { ms } => {
                self.clock.advance(*ms);
                Ok(())
            }
            Step::SetEnabled { id, enabled } => self
                .engine
                .set_enabled(id, *enabled)
                .map_err(|e| e.to_string()),
            Step::PollTimeout => {
                if self.engine.poll_timeout() {
                    info!("Stale capture cancelled");
                }
                Ok(())
            }
            Step::RunPending => {
                self.engine.run_pending_handlers();
                Ok(())
            }
        }
    }

    /// Move the clock up to an event timestamp; never backwards.
    fn follow(&self, timestamp_ms: u64) {
        if timestamp_ms > self.clock.now_ms() {
            self.clock.set(timestamp_ms);
        }
    }
}
