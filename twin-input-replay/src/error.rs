//! Replay errors.

use std::path::PathBuf;

use thiserror::Error;
use twin_input_core::InputError;

/// Errors loading or running a replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// An input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// An input file is not valid JSON for its format.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The engine rejected the config or a definition.
    #[error("Engine error: {0}")]
    Engine(#[from] InputError),
}

/// Result type for replay operations.
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Read and parse a JSON file.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> ReplayResult<T> {
    let json = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ReplayError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
