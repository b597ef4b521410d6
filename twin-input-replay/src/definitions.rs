//! Gesture and voice command definitions loaded from JSON.
//!
//! Handlers in a definition file are one of a few canned actions, and gates
//! refer to named boolean flags that the replay script can flip:
//!
//! ```json
//! {
//!   "gestures": [
//!     { "id": "delete", "family": "circle", "priority": 8, "cooldown_ms": 500,
//!       "when": "has_selection", "action": { "kind": "set_flag", "flag": "deleted", "value": true } }
//!   ],
//!   "voice_commands": [
//!     { "id": "save", "literal": "save" }
//!   ]
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::info;
use twin_input_core::{
    Gate, GestureDefinition, GestureOptions, Handler, ShapeConstraints, ShapeFamily,
    VoiceCommandDefinition, VoiceMatch, VoiceOptions,
};

use crate::error::{read_json, ReplayResult};

/// Named boolean application state shared by gates and actions.
#[derive(Debug, Clone, Default)]
pub struct Flags {
    values: Rc<RefCell<BTreeMap<String, bool>>>,
}

impl Flags {
    /// Create an empty flag set; unset flags read as false.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a flag.
    #[must_use]
    pub fn get(&self, name: &str) -> bool {
        self.values.borrow().get(name).copied().unwrap_or(false)
    }

    /// Set a flag.
    pub fn set(&self, name: &str, value: bool) {
        self.values.borrow_mut().insert(name.to_string(), value);
    }

    /// Copy of every flag that has been set.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.values.borrow().clone()
    }

    /// Gate on a flag name; a leading `!` negates it.
    fn gate(&self, expr: &str) -> Gate {
        let flags = self.clone();
        let (negate, name) = match expr.strip_prefix('!') {
            Some(name) => (true, name.trim().to_string()),
            None => (false, expr.trim().to_string()),
        };
        Box::new(move || flags.get(&name) != negate)
    }
}

/// What a handler does when its definition fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Log the event.
    #[default]
    Log,
    /// Fail with a message.
    Fail {
        /// Error message.
        message: String,
    },
    /// Set a flag.
    SetFlag {
        /// Flag name.
        flag: String,
        /// New value.
        #[serde(default = "default_true")]
        value: bool,
    },
}

const fn default_true() -> bool {
    true
}

impl Action {
    fn into_handler<E: Debug + 'static>(self, flags: &Flags) -> Handler<E> {
        let flags = flags.clone();
        Handler::sync(move |event: &E| {
            match &self {
                Self::Log => info!(event = ?event, "Action: log"),
                Self::Fail { message } => return Err(message.clone().into()),
                Self::SetFlag { flag, value } => {
                    info!(flag = %flag, value, "Action: set flag");
                    flags.set(flag, *value);
                }
            }
            Ok(())
        })
    }
}

/// A gesture entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEntry {
    /// Unique id.
    pub id: String,
    /// Shape family (`circle`, `line`/`swipe`, `double_tap`).
    pub family: ShapeFamily,
    /// Parameter constraints.
    #[serde(default)]
    pub constraints: ShapeConstraints,
    /// Arbitration priority.
    #[serde(default)]
    pub priority: i32,
    /// Cooldown between firings.
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Flag gating the gesture.
    #[serde(default)]
    pub when: Option<String>,
    /// Handler action.
    #[serde(default)]
    pub action: Action,
}

impl GestureEntry {
    /// Build the engine definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the definition.
    pub fn build(&self, flags: &Flags) -> ReplayResult<GestureDefinition> {
        let options = GestureOptions {
            priority: self.priority,
            cooldown_ms: self.cooldown_ms,
            gate: self.when.as_deref().map(|expr| flags.gate(expr)),
            handler: Some(self.action.clone().into_handler(flags)),
        };
        Ok(GestureDefinition::new(
            self.id.clone(),
            self.family,
            self.constraints.clone(),
            options,
        )?)
    }
}

/// A voice command entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Unique id.
    pub id: String,
    /// `"literal": "..."` or `"pattern": "..."`.
    #[serde(flatten)]
    pub matcher: VoiceMatch,
    /// Match case exactly.
    #[serde(default)]
    pub case_sensitive: bool,
    /// Arbitration priority.
    #[serde(default)]
    pub priority: i32,
    /// Cooldown between firings.
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Whether the command starts enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Flag gating the command.
    #[serde(default)]
    pub when: Option<String>,
    /// Handler action.
    #[serde(default)]
    pub action: Action,
}

impl VoiceEntry {
    /// Build the engine definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the definition.
    pub fn build(&self, flags: &Flags) -> ReplayResult<VoiceCommandDefinition> {
        let options = VoiceOptions {
            case_sensitive: self.case_sensitive,
            priority: self.priority,
            cooldown_ms: self.cooldown_ms,
            enabled: self.enabled,
            gate: self.when.as_deref().map(|expr| flags.gate(expr)),
            handler: Some(self.action.clone().into_handler(flags)),
        };
        Ok(VoiceCommandDefinition::new(
            self.id.clone(),
            self.matcher.clone(),
            options,
        )?)
    }
}

/// Contents of a definitions file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionFile {
    /// Gestures in registration order.
    #[serde(default)]
    pub gestures: Vec<GestureEntry>,
    /// Voice commands in registration order.
    #[serde(default)]
    pub voice_commands: Vec<VoiceEntry>,
}

impl DefinitionFile {
    /// Load a definitions file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> ReplayResult<Self> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_input_core::{Definition, GestureEvent};

    #[test]
    fn parses_documented_example() {
        let json = r#"{
            "gestures": [
                { "id": "delete", "family": "circle", "priority": 8, "cooldown_ms": 500,
                  "when": "has_selection", "action": { "kind": "set_flag", "flag": "deleted" } }
            ],
            "voice_commands": [ { "id": "save", "literal": "save" } ]
        }"#;
        let file: DefinitionFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.gestures[0].family, ShapeFamily::Circle);
        assert_eq!(
            file.gestures[0].action,
            Action::SetFlag {
                flag: "deleted".into(),
                value: true
            }
        );
        assert_eq!(file.voice_commands[0].matcher, VoiceMatch::literal("save"));
        assert!(file.voice_commands[0].enabled);
        assert_eq!(file.voice_commands[0].action, Action::Log);
    }

    #[test]
    fn gates_follow_flags() {
        let flags = Flags::new();
        let gate = flags.gate("has_selection");
        let inverse = flags.gate("!has_selection");
        assert!(!gate());
        assert!(inverse());
        flags.set("has_selection", true);
        assert!(gate());
        assert!(!inverse());
    }

    #[test]
    fn built_gesture_carries_gate_and_priority() {
        let flags = Flags::new();
        let entry = GestureEntry {
            id: "delete".into(),
            family: ShapeFamily::Circle,
            constraints: ShapeConstraints::none(),
            priority: 8,
            cooldown_ms: 500,
            when: Some("has_selection".into()),
            action: Action::Log,
        };
        let definition = entry.build(&flags).unwrap();
        assert_eq!(definition.priority(), 8);
        assert!(!definition.gate_open());
        flags.set("has_selection", true);
        assert!(definition.gate_open());
    }

    #[test]
    fn set_flag_action_runs() {
        let flags = Flags::new();
        let action = Action::SetFlag {
            flag: "deleted".into(),
            value: true,
        };
        let mut handler: Handler<GestureEvent> = action.into_handler(&flags);
        let Handler::Sync(run) = &mut handler else {
            panic!("actions are synchronous");
        };
        let event = GestureEvent {
            definition_id: "delete".into(),
            shape_family: ShapeFamily::Circle,
            params: twin_input_core::Classification::None,
            timestamp_ms: 0,
        };
        run(&event).unwrap();
        assert!(flags.get("deleted"));
    }

    #[test]
    fn bad_pattern_is_rejected_at_build() {
        let entry: VoiceEntry = serde_json::from_str(r#"{"id": "bad", "pattern": "(oops"}"#).unwrap();
        assert!(entry.build(&Flags::new()).is_err());
    }
}
