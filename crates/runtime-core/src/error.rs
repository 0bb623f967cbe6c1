//! Error types for the training toolkit

use thiserror::Error;

/// Result type alias using the toolkit Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type shared by every trainkit crate
#[derive(Error, Debug)]
pub enum Error {
    // Checkpoint errors
    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: String },

    #[error("Checkpoint corrupted: {path} - {reason}")]
    CheckpointCorrupted { path: String, reason: String },

    #[error("Checkpoint is missing field: {field}")]
    MissingField { field: String },

    #[error("Cannot find {key} in checkpoint state_dict")]
    KeyNotFound { key: String },

    #[error("State dict mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    StateDictMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Shape mismatch for {name}: checkpoint {checkpoint:?}, model {model:?}")]
    ShapeMismatch {
        name: String,
        checkpoint: Vec<usize>,
        model: Vec<usize>,
    },

    // Feature and image errors
    #[error("Invalid feature file {path}: {reason}")]
    InvalidFeatureFile { path: String, reason: String },

    #[error("Codec error: {message}")]
    Codec { message: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Argument and invariant errors
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invariant violated: {message}")]
    InvariantViolation { message: String },

    // Process group errors
    #[error("Process group already initialized (rank {rank})")]
    AlreadyInitialized { rank: u32 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if the error reports a missing file or checkpoint
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::CheckpointNotFound { .. } | Error::StoragePathNotFound { .. }
        )
    }

    /// Returns true if this error indicates broken on-disk data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CheckpointCorrupted { .. } | Error::InvalidFeatureFile { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
