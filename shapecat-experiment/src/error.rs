//! Error types for the experiment crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExperimentError {
    /// Task parameters are out of range.
    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },

    /// Failed to create the data directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a session file.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The noise cue could not be played.
    #[error("noise cue failed: {0}")]
    Cue(String),
}

pub type Result<T> = std::result::Result<T, ExperimentError>;

impl ExperimentError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn cue(message: impl Into<String>) -> Self {
        Self::Cue(message.into())
    }
}
