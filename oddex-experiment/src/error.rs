use crate::device::RecordingStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Failure talking to the recording device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Tracker not connected")]
    NotConnected,

    #[error("Tracker link error: {0}")]
    Link(String),
}

/// Reasons a block, practice attempt or session stops early
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Run aborted by participant at T:{at:.4}")]
    Aborted { at: f64 },

    #[error("Recording lost during trial {trial_label} (status {status:?})")]
    RecordingLost {
        trial_label: String,
        status: RecordingStatus,
    },

    #[error("Trial log write failed: {0}")]
    Log(#[from] LogError),
}

impl RunError {
    pub fn is_abort(&self) -> bool {
        matches!(self, RunError::Aborted { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
