//! Error handling module for native-sweep
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Only the package list load is fatal; every other error is reported on the
//! console by its caller and the run continues.

use thiserror::Error;

/// Main error type for native-sweep
#[derive(Error, Debug)]
pub enum SweepError {
    /// IO errors (results file, failure log, terminal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Package list missing or unparsable
    #[error("Package list error: {0}")]
    PackageList(String),

    /// Invalid command-line configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Results snapshot could not be written or read back
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Terminal setup errors (raw mode, event stream)
    #[error("Terminal error: {0}")]
    Terminal(String),
}

/// Result type alias for native-sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

// Convenient error constructors
impl SweepError {
    /// Create a package list error
    pub fn package_list(msg: impl Into<String>) -> Self {
        Self::PackageList(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }
}
