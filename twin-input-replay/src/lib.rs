//! # Twin Input Replay
//!
//! Replays recorded pointer and speech input through the twin input
//! recognition engine and reports every notification it raises.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p twin-input-replay -- --definitions defs.json --script session.json
//! ```
//!
//! ## With a custom engine config:
//!
//! ```bash
//! RUST_LOG_FORMAT=json cargo run -p twin-input-replay -- \
//!     --config engine.json --definitions defs.json --script session.json
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `DefinitionFile` - Gestures and voice commands with canned actions and flag gates
//! - `Script` - Recorded input steps
//! - `Replay` - Engine on a manual clock that follows the script timestamps

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod definitions;
mod error;
mod replay;
mod script;

pub use definitions::{Action, DefinitionFile, Flags, GestureEntry, VoiceEntry};
pub use error::{ReplayError, ReplayResult};
pub use replay::{Replay, ReplayReport};
pub use script::{Script, Step};

use std::path::PathBuf;

use clap::Parser;
use twin_input_core::EngineConfig;

/// Command-line arguments for twin-input-replay.
#[derive(Debug, Clone, Parser)]
#[command(name = "twin-input-replay")]
#[command(about = "Replay recorded input through the twin input recognition engine")]
#[command(version)]
pub struct CliArgs {
    /// Engine config JSON; defaults apply when omitted
    #[arg(long, env = "TWIN_INPUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Gesture and voice command definitions JSON
    #[arg(long, env = "TWIN_INPUT_DEFINITIONS")]
    pub definitions: PathBuf,

    /// Input script JSON
    #[arg(long, env = "TWIN_INPUT_SCRIPT")]
    pub script: PathBuf,
}

/// Everything a replay needs, loaded from disk.
#[derive(Debug, Clone)]
pub struct ReplayInputs {
    /// Engine config.
    pub config: EngineConfig,
    /// Definitions to register.
    pub definitions: DefinitionFile,
    /// Steps to replay.
    pub script: Script,
}

impl CliArgs {
    /// Load the files named on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, parsed, or validated.
    pub fn load(&self) -> ReplayResult<ReplayInputs> {
        let config = match &self.config {
            Some(path) => EngineConfig::from_path(path)?,
            None => EngineConfig::default(),
        };
        Ok(ReplayInputs {
            config,
            definitions: DefinitionFile::from_path(&self.definitions)?,
            script: Script::from_path(&self.script)?,
        })
    }
}

/// Load, register, and replay in one go.
///
/// # Errors
///
/// Returns an error if loading fails or a definition is rejected.
pub fn run_replay(args: &CliArgs) -> ReplayResult<ReplayReport> {
    let inputs = args.load()?;
    let mut replay = Replay::new(inputs.config, &inputs.definitions)?;
    Ok(replay.run(&inputs.script))
}
