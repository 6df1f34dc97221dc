//! Error types for nexec
//!
//! Errors shared by every layer live here; plugin- and run-specific
//! taxonomies in `nexec-core` wrap or convert into this type.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// nexec error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store for protocol '{0}' has been disposed")]
    StoreDisposed(String),

    // ========================================================================
    // Plugins
    // ========================================================================
    #[error("Protocol error: {protocol} - {message}")]
    Protocol { protocol: String, message: String },

    #[error("Extension error: {module} - {message}")]
    Extension { module: String, message: String },

    // ========================================================================
    // Targets / network
    // ========================================================================
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors caused by the remote side rather than by local state.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }

    /// Protocol error helper
    pub fn protocol(protocol: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Protocol {
            protocol: protocol.into(),
            message: message.into(),
        }
    }

    /// Extension error helper
    pub fn extension(module: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Extension {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Target parse error helper
    pub fn invalid_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
