//! Host → native reply types.
//!
//! The host runtime answers every invocation with one of three outcomes,
//! mirroring what a platform message channel reports: a success payload,
//! an error, or "no handler for this method".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes produced by the bridge itself rather than host logic.
pub struct ErrorCodes;

impl ErrorCodes {
    /// The host dropped the responder without answering.
    pub const REPLY_DROPPED: &'static str = "REPLY_DROPPED";

    /// Page arguments could not be decoded before reaching the host.
    pub const INVALID_ARGUMENTS: &'static str = "INVALID_ARGUMENTS";
}

/// Structured host error (code, optional message, optional details).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HostError {
    /// Create an error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: Some(message.into()),
            details: None,
        }
    }

    /// Error reported when a responder is dropped unanswered.
    pub fn reply_dropped(method: &str) -> Self {
        Self::new(
            ErrorCodes::REPLY_DROPPED,
            format!("host dropped {} without replying", method),
        )
    }

    /// Message surfaced to page script as the rejection `Error` text.
    pub fn page_message(&self) -> String {
        match &self.message {
            Some(message) => format!("{}, {}", self.code, message),
            None => self.code.clone(),
        }
    }
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.page_message())
    }
}

/// Outcome of one host invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostReply {
    Success(Value),
    Error(HostError),
    NotImplemented,
}

impl HostReply {
    /// Success payload, if any.
    pub fn into_success(self) -> Option<Value> {
        match self {
            HostReply::Success(value) => Some(value),
            _ => None,
        }
    }
}
