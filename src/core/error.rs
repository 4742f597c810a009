//! Error type system for the module bridge
//!
//! This module provides the bridge error taxonomy:
//! - Lifecycle errors (host-side misuse, returned synchronously)
//! - Protocol errors (malformed or unsupported messages from a module)
//! - Module-signalled errors, decode errors and transport errors
//! - Error context and chaining support

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::{Action, FormatVersion};

/// Prerequisite that must be satisfied before an operation may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    /// A live script runtime context
    Runtime,
    /// Cached bootstrap ("common") code
    BootstrapCode,
    /// A registered result callback
    Callback,
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerequisite::Runtime => write!(f, "runtime"),
            Prerequisite::BootstrapCode => write!(f, "bootstrap code"),
            Prerequisite::Callback => write!(f, "callback"),
        }
    }
}

/// Broad category of a [`BridgeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Lifecycle,
    Protocol,
    Module,
    Decode,
    Transport,
    Runtime,
}

/// Main error type for the module bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // Lifecycle errors
    #[error("Illegal state: cannot {operation} without {missing}")]
    IllegalState {
        operation: &'static str,
        missing: Prerequisite,
    },

    #[error("A query is already in flight")]
    QueryInFlight,

    // Protocol errors
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Action {action} is not supported by format version {version}")]
    UnsupportedAction {
        action: Action,
        version: FormatVersion,
    },

    // Module-signalled errors
    #[error("Module error: {0}")]
    ModuleError(String),

    // Decode errors
    #[error("Failed to decode {action} result: {message}")]
    Decode { action: Action, message: String },

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Runtime errors
    #[error("Script error: {0}")]
    Script(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Bridge channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Shorthand for a lifecycle precondition failure
    pub fn illegal_state(operation: &'static str, missing: Prerequisite) -> Self {
        BridgeError::IllegalState { operation, missing }
    }

    /// Get the error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::IllegalState { .. } | BridgeError::QueryInFlight => ErrorKind::Lifecycle,

            BridgeError::Parse(_)
            | BridgeError::InvalidMethod(_)
            | BridgeError::InvalidAction(_)
            | BridgeError::InvalidRequest(_)
            | BridgeError::UnsupportedAction { .. } => ErrorKind::Protocol,

            BridgeError::ModuleError(_) => ErrorKind::Module,

            BridgeError::Decode { .. } => ErrorKind::Decode,

            BridgeError::Transport(_) | BridgeError::InvalidUrl(_) => ErrorKind::Transport,

            BridgeError::Script(_)
            | BridgeError::Initialization(_)
            | BridgeError::ChannelClosed
            | BridgeError::Io(_) => ErrorKind::Runtime,
        }
    }

    /// Get the error type name used in error payloads and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::IllegalState { .. } => "IllegalState",
            BridgeError::QueryInFlight => "QueryInFlight",
            BridgeError::Parse(_) => "ParseError",
            BridgeError::InvalidMethod(_) => "InvalidMethod",
            BridgeError::InvalidAction(_) => "InvalidAction",
            BridgeError::InvalidRequest(_) => "InvalidRequest",
            BridgeError::UnsupportedAction { .. } => "UnsupportedAction",
            BridgeError::ModuleError(_) => "ModuleError",
            BridgeError::Decode { .. } => "DecodeError",
            BridgeError::Transport(_) => "TransportError",
            BridgeError::InvalidUrl(_) => "InvalidUrl",
            BridgeError::Script(_) => "ScriptError",
            BridgeError::Initialization(_) => "InitializationError",
            BridgeError::ChannelClosed => "ChannelClosed",
            BridgeError::Io(_) => "IoError",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}

/// Result type alias for operations that can fail with BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context_str = context.into();
            BridgeError::Initialization(format!("{}: {}", context_str, e))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context_str = f();
            BridgeError::Initialization(format!("{}: {}", context_str, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BridgeError::illegal_state("load", Prerequisite::Runtime).kind(),
            ErrorKind::Lifecycle
        );
        assert_eq!(BridgeError::InvalidMethod("PATCH".into()).kind(), ErrorKind::Protocol);
        assert_eq!(BridgeError::Transport("refused".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            BridgeError::Decode {
                action: Action::Search,
                message: "bad".into()
            }
            .kind(),
            ErrorKind::Decode
        );
        assert_eq!(BridgeError::ModuleError("boom".into()).kind(), ErrorKind::Module);
    }

    #[test]
    fn test_illegal_state_names_prerequisite() {
        let err = BridgeError::illegal_state("load", Prerequisite::BootstrapCode);
        assert_eq!(err.to_string(), "Illegal state: cannot load without bootstrap code");
        assert_eq!(err.error_type(), "IllegalState");
    }

    #[test]
    fn test_error_retryable() {
        assert!(BridgeError::Transport("timeout".into()).is_retryable());
        assert!(!BridgeError::InvalidMethod("PATCH".into()).is_retryable());
        assert!(!BridgeError::QueryInFlight.is_retryable());
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let contexted = result.context("Failed to read bootstrap code");

        let err = contexted.unwrap_err();
        assert!(err.to_string().contains("Failed to read bootstrap code"));
        assert!(err.to_string().contains("file not found"));
    }
}
