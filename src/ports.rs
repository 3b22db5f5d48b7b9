//! Message port relay.
//!
//! Native handles for page-side `MessageChannel`s.
//!
//! ## Module Structure
//!
//! - `table` - PortTable, the per-surface port state machine
//! - `port` - WebMessageChannel and MessagePort handles
//! - `listener` - WebMessageListener, page objects relaying `postMessage` to the host

mod listener;
mod port;
mod table;

pub use listener::WebMessageListener;
pub(crate) use listener::{ListenerTable, deliver_listener_message};
pub use port::{MessagePort, PortCallback, WebMessageChannel};
pub use table::PortState;
pub(crate) use table::PortTable;

use serde_json::Value;
use thiserror::Error;

use crate::protocol::BridgeMessage;
use crate::script::PortRef;
use crate::ui::UiContext;
use crate::webview::SurfaceState;

/// A message port protocol violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("Port {port} has already been started")]
    AlreadyStarted { port: String },

    #[error("Port {port} is closed")]
    Closed { port: String },

    #[error("Port {port} has been transferred")]
    Transferred { port: String },

    #[error("Port {port} cannot transfer itself")]
    SelfTransfer { port: String },

    #[error("Port {port} does not belong to a live channel")]
    UnknownChannel { port: String },
}

/// `channelId:index`, used in logs and errors.
pub(crate) fn port_label(port: &PortRef) -> String {
    format!("{}:{}", port.channel_id, port.index)
}

/// Route an `onWebMessagePortMessageReceived` notification to the started
/// port's callback.
pub(crate) fn deliver_page_message(state: &SurfaceState, ui: &UiContext, message: &BridgeMessage) {
    let payload = match message.first_arg() {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!(target: "webview_bridge::ports", "Malformed port message: {}", e);
            return;
        }
    };

    let channel_id = payload.get("webMessageChannelId").and_then(Value::as_str);
    let index = payload
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|index| u8::try_from(index).ok());
    let (Some(channel_id), Some(index)) = (channel_id, index) else {
        log::warn!(
            target: "webview_bridge::ports",
            "Port message without channel id or index"
        );
        return;
    };

    let port = PortRef {
        channel_id: channel_id.to_string(),
        index,
    };
    let data = payload.get("message").cloned().unwrap_or(Value::Null);

    // The table lock is released before the callback runs.
    match state.ports.callback(&port) {
        Some(callback) => callback(ui, data),
        None => log::debug!(
            target: "webview_bridge::ports",
            "Dropping message for port {} with no started handler",
            port_label(&port)
        ),
    }
}
