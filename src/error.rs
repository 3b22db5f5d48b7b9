//! Error handling types for webview-bridge
//!
//! This module provides the error type used throughout the bridge.

use std::sync::PoisonError;
use thiserror::Error;

use crate::ports::PortError;

/// Comprehensive error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The hosting surface was disposed before the operation could run
    #[error("Surface disposed")]
    Disposed,

    /// A blocking host call was attempted on the UI thread
    #[error("Blocking host call attempted on the UI thread")]
    WouldDeadlock,

    /// The UI run loop stopped before the task could run
    #[error("UI run loop is closed")]
    UiLoopClosed,

    /// No reply arrived within the configured blocking timeout
    #[error("Host did not reply to {method} within {millis}ms")]
    Timeout { method: String, millis: u64 },

    /// Message port protocol violation
    #[error(transparent)]
    Port(#[from] PortError),

    /// Malformed message on the page/native boundary
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Helper trait to recover the guard from a poisoned lock.
pub trait LockResultExt<T> {
    /// Unwrap the guard, recovering it from a poisoned lock with a warning.
    ///
    /// The context parameter identifies which operation triggered lock recovery,
    /// helping developers debug thread safety issues.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "webview_bridge::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

impl BridgeError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        BridgeError::Protocol {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error for a host method
    pub fn timeout(method: impl Into<String>, millis: u64) -> Self {
        BridgeError::Timeout {
            method: method.into(),
            millis,
        }
    }
}
