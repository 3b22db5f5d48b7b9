//! Page → native message body.
//!
//! The page bootstrap posts one JSON string per call through the engine's
//! script-message transport. This module parses that body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::correlation_id::CorrelationId;
use super::reply::HostReply;
use crate::error::{BridgeError, BridgeResult};

/// A call or notification sent from page script to native code.
///
/// `args` carries the JSON-encoded argument array exactly as the page
/// serialized it; it is decoded lazily so the receiver can hand the raw
/// string onwards when nothing needs to inspect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    pub handler_name: String,
    /// Absent for notifications that expect no settlement.
    #[serde(
        rename = "_callHandlerID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<CorrelationId>,
    #[serde(
        rename = "_bridgeSecret",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bridge_secret: Option<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub request_url: String,
    #[serde(default = "default_is_main_frame")]
    pub is_main_frame: bool,
    #[serde(default = "empty_args")]
    pub args: String,
}

fn default_is_main_frame() -> bool {
    true
}

fn empty_args() -> String {
    "[]".to_string()
}

impl BridgeMessage {
    /// Create a message for `handler_name` with already-encoded arguments.
    pub fn new(
        handler_name: impl Into<String>,
        correlation_id: Option<CorrelationId>,
        args: impl Into<String>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            correlation_id,
            bridge_secret: None,
            origin: String::new(),
            request_url: String::new(),
            is_main_frame: true,
            args: args.into(),
        }
    }

    /// Create a fire-and-forget notification carrying a single payload.
    pub fn notification(handler_name: impl Into<String>, payload: &Value) -> Self {
        let args = Value::Array(vec![payload.clone()]).to_string();
        Self::new(handler_name, None, args)
    }

    /// Attach the frame information the page reports alongside each call.
    pub fn with_frame(
        mut self,
        origin: impl Into<String>,
        request_url: impl Into<String>,
        is_main_frame: bool,
    ) -> Self {
        self.origin = origin.into();
        self.request_url = request_url.into();
        self.is_main_frame = is_main_frame;
        self
    }

    /// Parse the raw body posted by the page transport.
    pub fn parse(body: &str) -> BridgeResult<Self> {
        serde_json::from_str(body)
            .map_err(|e| BridgeError::protocol(format!("invalid page message: {}", e)))
    }

    /// Decode the argument array.
    pub fn parsed_args(&self) -> BridgeResult<Vec<Value>> {
        serde_json::from_str(&self.args).map_err(|e| {
            BridgeError::protocol(format!(
                "invalid arguments for {}: {}",
                self.handler_name, e
            ))
        })
    }

    /// Decode the argument array and return its first element.
    ///
    /// Native-internal notifications always carry exactly one payload object.
    pub fn first_arg(&self) -> BridgeResult<Value> {
        self.parsed_args()?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::protocol(format!("{} carries no payload", self.handler_name)))
    }
}

/// How a pending page call is settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Resolve the Promise with a JSON value.
    Resolve(Value),
    /// Reject the Promise with an `Error` carrying this message.
    Reject(String),
}

impl Settlement {
    /// Map a host reply onto the page-visible outcome.
    ///
    /// Not-implemented resolves with `null` so that pages calling a handler
    /// the host never registered keep running.
    pub fn from_reply(reply: HostReply) -> Self {
        match reply {
            HostReply::Success(value) => Settlement::Resolve(value),
            HostReply::NotImplemented => Settlement::Resolve(Value::Null),
            HostReply::Error(error) => Settlement::Reject(error.page_message()),
        }
    }
}
