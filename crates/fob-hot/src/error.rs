//! Error types for the hot-update bridge.
//!
//! Only setup failures travel as `Err`. A failed compile is not an error in
//! this sense: it is stored as [`Diagnostics`](crate::build::Diagnostics) and
//! handed to HTTP clients and streaming clients as data.
//!
//! # Example
//!
//! ```rust,no_run
//! use fob_hot::error::{Result, ResultExt};
//! use fob_hot::HotConfig;
//!
//! fn load() -> Result<HotConfig> {
//!     HotConfig::load(None).context("Failed to load fob-hot.json")
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the bridge.
#[derive(Debug, Error)]
pub enum HotError {
    /// The compiler could not be put into watch mode
    #[error("Compiler failed to start: {0}\n\nHint: Check the compiler configuration and that its inputs exist")]
    CompilerStart(String),

    /// A held request outlived its budget while a build was in flight
    #[error("Request for {path} timed out after {waited_ms}ms waiting for the build")]
    RequestTimeout {
        /// Normalized request path
        path: String,
        /// How long the request was held
        waited_ms: u64,
    },

    /// Watch mode stopped while a request was held
    #[error("Watch mode stopped before the build for {path} resolved")]
    WatchStopped {
        /// Normalized request path
        path: String,
    },

    /// A streaming client became unreachable
    #[error("Failed to deliver update to client {client}: {reason}")]
    ClientDelivery {
        /// Connection handle of the client
        client: u64,
        /// Why delivery failed
        reason: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors from file system or socket operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file doesn't exist
    #[error("Config file not found: {}\n\nHint: Create a fob-hot.json file or omit --config", .0.display())]
    NotFound(PathBuf),

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// Result type alias using `HotError` as the default error type.
pub type Result<T, E = HotError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Prefix the error with a message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<HotError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: HotError = e.into();
            HotError::Custom(format!("{}: {}", msg, err))
        })
    }
}
