//! Error types for the intake engine.
//!
//! Only two situations are allowed to abort a run: the order key cannot be
//! loaded, or the data folder/config is unusable. Everything else is recorded
//! in the pass reports and processing continues.

use std::path::PathBuf;

use thiserror::Error;

/// Result type used across the library.
pub type Result<T> = std::result::Result<T, IntakeError>;

/// Failure to load the order key. Always fatal for a sorting run.
#[derive(Debug, Error)]
pub enum KeyLoadError {
    /// The key file does not exist.
    #[error("order key not found: {0}")]
    Missing(PathBuf),

    /// The key file exists but could not be read.
    #[error("order key {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row is too short or carries an empty mandatory field.
    #[error("order key {path} is malformed at line {line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

/// Top-level error for the intake engine.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Order key could not be loaded.
    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Selected data folder is missing or not a directory.
    #[error("data folder is not a directory: {0}")]
    InvalidDataFolder(PathBuf),
}

impl IntakeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntakeError::Io { path: path.into(), source }
    }

    /// `true` if the error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IntakeError::KeyLoad(_) | IntakeError::Config(_) | IntakeError::InvalidDataFolder(_))
    }
}
