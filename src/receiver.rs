//! Native bridge receiver.
//!
//! Entry point for page-originated messages. Engines call
//! [`BridgeReceiver::on_script_message`] from whatever thread runs page
//! script; the receiver validates the body, then reposts all remaining work
//! to the UI thread and returns without blocking.

use std::sync::{Arc, Weak};

use serde_json::{Value, json};

use crate::host::HostMethod;
use crate::ports;
use crate::protocol::{BridgeMessage, Settlement};
use crate::script::{
    CALL_ASYNC_JAVASCRIPT, EVALUATE_WITH_CONTENT_WORLD, ScriptCommand, WEB_MESSAGE_LISTENER_POST_MESSAGE,
    WEB_MESSAGE_PORT_MESSAGE_RECEIVED,
};
use crate::ui::UiContext;
use crate::webview::SurfaceState;

/// Page → native entry point. Cheap to clone; does not keep the surface alive.
#[derive(Clone)]
pub struct BridgeReceiver {
    state: Weak<SurfaceState>,
}

impl BridgeReceiver {
    pub(crate) fn new(state: &Arc<SurfaceState>) -> Self {
        Self {
            state: Arc::downgrade(state),
        }
    }

    fn live(&self) -> Option<Arc<SurfaceState>> {
        self.state.upgrade().filter(|state| !state.is_disposed())
    }

    /// Handle a raw message body posted by the bootstrap.
    ///
    /// Bodies with a wrong secret, a disallowed origin, or from a sub-frame
    /// when the bridge is main-frame only are dropped with a warning.
    pub fn on_script_message(&self, body: &str) {
        let Some(state) = self.live() else {
            log::debug!(target: "webview_bridge::receiver", "Surface gone, dropping page message");
            return;
        };

        let message = match BridgeMessage::parse(body) {
            Ok(message) => message,
            Err(e) => {
                log::warn!(target: "webview_bridge::receiver", "Dropping page message: {}", e);
                return;
            }
        };

        let settings = state.settings.load();
        if let Some(secret) = settings.bridge_secret()
            && message.bridge_secret.as_deref() != Some(secret)
        {
            log::warn!(
                target: "webview_bridge::receiver",
                "Dropping {} from {}: bridge secret mismatch",
                message.handler_name,
                message.origin
            );
            return;
        }

        if !state.origin_rules.load().allows(&message.origin) {
            log::warn!(
                target: "webview_bridge::receiver",
                "Dropping {}: origin {} is not allowed",
                message.handler_name,
                message.origin
            );
            return;
        }

        if settings.for_main_frame_only() && !message.is_main_frame {
            log::warn!(
                target: "webview_bridge::receiver",
                "Dropping {} from sub-frame {}",
                message.handler_name,
                message.request_url
            );
            return;
        }

        self.on_page_call(message);
    }

    /// Repost `message` to the UI thread and return immediately.
    pub fn on_page_call(&self, message: BridgeMessage) {
        let Some(state) = self.live() else {
            return;
        };
        let generation = state.document_generation();
        let receiver = self.clone();
        let posted = state.ui.post(move |ui| receiver.dispatch(ui, message, generation));
        if !posted {
            log::debug!(target: "webview_bridge::receiver", "UI loop closed, dropping page call");
        }
    }

    fn dispatch(&self, ui: &UiContext, message: BridgeMessage, generation: u64) {
        let Some(state) = self.live() else {
            log::debug!(
                target: "webview_bridge::receiver",
                "Surface disposed before {} was dispatched",
                message.handler_name
            );
            return;
        };

        match message.handler_name.as_str() {
            EVALUATE_WITH_CONTENT_WORLD | CALL_ASYNC_JAVASCRIPT => complete_script(&state, ui, &message),
            WEB_MESSAGE_PORT_MESSAGE_RECEIVED => ports::deliver_page_message(&state, ui, &message),
            WEB_MESSAGE_LISTENER_POST_MESSAGE => {
                ports::deliver_listener_message(&state, ui, &message, generation)
            }
            _ => self.forward_to_host(&state, ui, message, generation),
        }
    }

    fn forward_to_host(&self, state: &SurfaceState, ui: &UiContext, message: BridgeMessage, generation: u64) {
        let id = message.correlation_id;
        let args = match message.parsed_args() {
            Ok(args) => args,
            Err(e) => {
                log::warn!(
                    target: "webview_bridge::receiver",
                    "Rejecting {}: {}",
                    message.handler_name,
                    e
                );
                if let Some(id) = id {
                    state.evaluate(
                        ui,
                        ScriptCommand::Settle {
                            id,
                            outcome: Settlement::Reject(e.to_string()),
                        },
                    );
                }
                return;
            }
        };

        let payload = json!({
            "handlerName": message.handler_name,
            "args": args,
            "origin": message.origin,
            "requestUrl": message.request_url,
            "isMainFrame": message.is_main_frame,
        });

        let weak = self.state.clone();
        state
            .host
            .invoke(ui, HostMethod::ON_CALL_JS_HANDLER, payload, move |ui, reply| {
                let Some(id) = id else {
                    return;
                };
                let Some(state) = weak.upgrade().filter(|state| !state.is_disposed()) else {
                    log::debug!(
                        target: "webview_bridge::receiver",
                        "Surface disposed, dropping reply for call {}",
                        id
                    );
                    return;
                };
                // Ids restart in every document; a stale reply must not settle a newer call.
                if state.document_generation() != generation {
                    log::debug!(
                        target: "webview_bridge::receiver",
                        "Document changed, dropping reply for call {}",
                        id
                    );
                    return;
                }
                state.evaluate(
                    ui,
                    ScriptCommand::Settle {
                        id,
                        outcome: Settlement::from_reply(reply),
                    },
                );
            });
    }
}

/// Complete an `evaluate_javascript` / `call_async_javascript` round trip.
fn complete_script(state: &SurfaceState, ui: &UiContext, message: &BridgeMessage) {
    let payload = match message.first_arg() {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!(target: "webview_bridge::receiver", "Malformed script result: {}", e);
            return;
        }
    };
    let Some(result_id) = payload.get("resultUuid").and_then(Value::as_str) else {
        log::warn!(target: "webview_bridge::receiver", "Script result without resultUuid");
        return;
    };

    let outcome = match payload.get("error") {
        None | Some(Value::Null) => Ok(payload.get("value").cloned().unwrap_or(Value::Null)),
        Some(Value::String(error)) => Err(error.clone()),
        Some(other) => Err(other.to_string()),
    };
    if !state.results.complete(ui, result_id, outcome) {
        log::debug!(
            target: "webview_bridge::receiver",
            "No callback waiting for script result {}",
            result_id
        );
    }
}
