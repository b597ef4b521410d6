//! Voice command definitions and the voice registry.
//!
//! Matching is exact: a literal must equal the whole normalised transcript,
//! and a pattern must match the whole transcript, never a substring.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::dispatch::{Handler, HandlerResult};
use crate::error::{InputError, InputResult};
use crate::event::normalize_transcript;
use crate::registry::{Definition, Gate, Registry};

/// Payload handed to voice handlers and carried by
/// [`Notification::VoiceCommandFired`](crate::Notification::VoiceCommandFired).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCommandEvent {
    /// Id of the definition that fired.
    pub definition_id: String,
    /// Normalised transcript that matched.
    pub transcript: String,
    /// Named capture groups of a pattern matcher.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
    /// Recognition confidence reported by the speech producer.
    pub confidence: f32,
    /// Dispatch time in milliseconds.
    pub timestamp_ms: u64,
}

/// How a voice command recognises its transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceMatch {
    /// Exact phrase.
    Literal(String),
    /// Regular expression matched against the whole transcript.
    Pattern(String),
}

impl VoiceMatch {
    /// Exact phrase matcher.
    pub fn literal(phrase: impl Into<String>) -> Self {
        Self::Literal(phrase.into())
    }

    /// Regular expression matcher.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }
}

enum Matcher {
    /// Normalised phrase; lowercased when matching is case-insensitive.
    Literal(String),
    Pattern(Regex),
}

impl Matcher {
    fn compile(voice_match: &VoiceMatch, case_sensitive: bool) -> InputResult<Self> {
        match voice_match {
            VoiceMatch::Literal(phrase) => {
                let phrase = normalize_transcript(phrase);
                if phrase.is_empty() {
                    return Err(InputError::invalid("voice literal must not be empty"));
                }
                Ok(Self::Literal(if case_sensitive {
                    phrase
                } else {
                    phrase.to_lowercase()
                }))
            }
            VoiceMatch::Pattern(pattern) => {
                if pattern.trim().is_empty() {
                    return Err(InputError::invalid("voice pattern must not be empty"));
                }
                RegexBuilder::new(&format!("^(?:{pattern})$"))
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map(Self::Pattern)
                    .map_err(|e| InputError::invalid(format!("bad voice pattern '{pattern}': {e}")))
            }
        }
    }

    fn is_match(&self, transcript: &str, case_sensitive: bool) -> bool {
        match self {
            Self::Literal(phrase) if case_sensitive => phrase == transcript,
            Self::Literal(phrase) => *phrase == transcript.to_lowercase(),
            Self::Pattern(regex) => regex.is_match(transcript),
        }
    }

    fn captures(&self, transcript: &str) -> BTreeMap<String, String> {
        let Self::Pattern(regex) = self else {
            return BTreeMap::new();
        };
        let Some(caps) = regex.captures(transcript) else {
            return BTreeMap::new();
        };
        regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect()
    }
}

/// Arbitration settings and handler for a voice command registration.
pub struct VoiceOptions {
    /// Match case exactly.
    pub case_sensitive: bool,
    /// Higher wins; equal priorities go to the earlier registration.
    pub priority: i32,
    /// Minimum time between firings.
    pub cooldown_ms: u64,
    /// Whether the command starts enabled.
    pub enabled: bool,
    /// Evaluated at resolution time; `None` is always open.
    pub gate: Option<Gate>,
    /// Required.
    pub handler: Option<Handler<VoiceCommandEvent>>,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            priority: 0,
            cooldown_ms: 0,
            enabled: true,
            gate: None,
            handler: None,
        }
    }
}

/// A registered voice command.
pub struct VoiceCommandDefinition {
    id: String,
    voice_match: VoiceMatch,
    matcher: Matcher,
    case_sensitive: bool,
    priority: i32,
    cooldown_ms: u64,
    enabled: bool,
    gate: Option<Gate>,
    handler: Handler<VoiceCommandEvent>,
    last_fired_at: Option<u64>,
}

impl VoiceCommandDefinition {
    /// Validate and assemble a definition.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] for an empty id, an empty
    /// or uncompilable matcher, or a missing handler.
    pub fn new(id: impl Into<String>, voice_match: VoiceMatch, options: VoiceOptions) -> InputResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InputError::invalid("voice command id must not be empty"));
        }
        let matcher = Matcher::compile(&voice_match, options.case_sensitive)?;
        let handler = options
            .handler
            .ok_or_else(|| InputError::invalid(format!("voice command '{id}' has no handler")))?;

        Ok(Self {
            id,
            voice_match,
            matcher,
            case_sensitive: options.case_sensitive,
            priority: options.priority,
            cooldown_ms: options.cooldown_ms,
            enabled: options.enabled,
            gate: options.gate,
            handler,
            last_fired_at: None,
        })
    }

    /// The matcher as registered.
    #[must_use]
    pub const fn voice_match(&self) -> &VoiceMatch {
        &self.voice_match
    }

    /// Whether matching is case-sensitive.
    #[must_use]
    pub const fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Enable or disable the command.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the matcher accepts a normalised transcript, ignoring
    /// enablement, cooldown, and gate.
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.matcher.is_match(transcript, self.case_sensitive)
    }

    /// Named captures of a pattern matcher for `transcript`.
    #[must_use]
    pub fn captures(&self, transcript: &str) -> BTreeMap<String, String> {
        self.matcher.captures(transcript)
    }
}

impl fmt::Debug for VoiceCommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceCommandDefinition")
            .field("id", &self.id)
            .field("voice_match", &self.voice_match)
            .field("case_sensitive", &self.case_sensitive)
            .field("priority", &self.priority)
            .field("cooldown_ms", &self.cooldown_ms)
            .field("enabled", &self.enabled)
            .field("gated", &self.gate.is_some())
            .field("handler", &self.handler)
            .field("last_fired_at", &self.last_fired_at)
            .finish()
    }
}

impl Definition for VoiceCommandDefinition {
    type Event = VoiceCommandEvent;

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

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    fn handler_mut(&mut self) -> &mut Handler<VoiceCommandEvent> {
        &mut self.handler
    }
}

/// Registered voice commands in registration order.
pub type VoiceRegistry = Registry<VoiceCommandDefinition>;

impl Registry<VoiceCommandDefinition> {
    /// Index of the command that wins a normalised transcript at `now_ms`.
    #[must_use]
    pub fn resolve(&self, transcript: &str, now_ms: u64) -> Option<usize> {
        if transcript.is_empty() {
            return None;
        }
        self.arbitrate(now_ms, |d| d.matches(transcript))
    }
}

/// Chained construction of a [`VoiceCommandDefinition`].
///
/// ```
/// use twin_input_core::VoiceCommandBuilder;
///
/// let save = VoiceCommandBuilder::new("save")
///     .literal("save")
///     .cooldown_ms(1000)
///     .on(|_event| Ok(()))
///     .build()
///     .unwrap();
/// assert!(save.matches("SAVE"));
/// assert!(!save.matches("saves"));
/// ```
#[must_use]
pub struct VoiceCommandBuilder {
    id: String,
    voice_match: Option<VoiceMatch>,
    options: VoiceOptions,
}

impl VoiceCommandBuilder {
    /// Start a voice command with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            voice_match: None,
            options: VoiceOptions::default(),
        }
    }

    /// Match an exact phrase.
    pub fn literal(mut self, phrase: impl Into<String>) -> Self {
        self.voice_match = Some(VoiceMatch::literal(phrase));
        self
    }

    /// Match a regular expression against the whole transcript.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.voice_match = Some(VoiceMatch::pattern(pattern));
        self
    }

    /// Match case exactly.
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.options.case_sensitive = case_sensitive;
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

    /// Register the command disabled.
    pub fn disabled(mut self) -> Self {
        self.options.enabled = false;
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

    /// Synchronous handler.
    pub fn on<F>(self, handler: F) -> Self
    where
        F: FnMut(&VoiceCommandEvent) -> HandlerResult + 'static,
    {
        self.handler(Handler::sync(handler))
    }

    /// Asynchronous handler.
    pub fn on_async<F, Fut>(self, handler: F) -> Self
    where
        F: FnMut(VoiceCommandEvent) -> Fut + 'static,
        Fut: Future<Output = HandlerResult> + 'static,
    {
        self.handler(Handler::from_async(handler))
    }

    /// Set a prepared handler.
    pub fn handler(mut self, handler: Handler<VoiceCommandEvent>) -> Self {
        self.options.handler = Some(handler);
        self
    }

    /// Validate and produce the definition.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidDefinition`] if no matcher was set or the
    /// definition is otherwise invalid.
    pub fn build(self) -> InputResult<VoiceCommandDefinition> {
        let voice_match = self.voice_match.ok_or_else(|| {
            InputError::invalid(format!("voice command '{}' has no matcher", self.id))
        })?;
        VoiceCommandDefinition::new(self.id, voice_match, self.options)
    }
}
