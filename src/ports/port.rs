use std::sync::{Arc, Weak};

use serde_json::{Value, json};

use super::{PortState, port_label};
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostMethod;
use crate::protocol::HostReply;
use crate::script::{PortRef, ScriptCommand};
use crate::ui::UiContext;
use crate::webview::SurfaceState;

/// Handler for messages arriving on a started port. Runs on the UI thread.
pub type PortCallback = Arc<dyn Fn(&UiContext, Value) + Send + Sync>;

/// A page-side `MessageChannel` and its two native handles.
pub struct WebMessageChannel {
    pub id: String,
    pub port1: MessagePort,
    pub port2: MessagePort,
}

impl WebMessageChannel {
    pub(crate) fn new(state: &Arc<SurfaceState>, id: String) -> Self {
        let port = |index| MessagePort {
            state: Arc::downgrade(state),
            port: PortRef {
                channel_id: id.clone(),
                index,
            },
        };
        Self {
            port1: port(0),
            port2: port(1),
            id,
        }
    }
}

/// Native handle for one page-side port.
///
/// Handles do not keep the surface alive; every operation fails with
/// `Disposed` once it is gone.
#[derive(Clone)]
pub struct MessagePort {
    state: Weak<SurfaceState>,
    port: PortRef,
}

impl MessagePort {
    pub fn channel_id(&self) -> &str {
        &self.port.channel_id
    }

    /// 0 for `port1`, 1 for `port2`.
    pub fn index(&self) -> u8 {
        self.port.index
    }

    pub fn port_ref(&self) -> &PortRef {
        &self.port
    }

    /// Current state, or `None` once the surface is disposed.
    pub fn state(&self) -> Option<PortState> {
        let state = self.live().ok()?;
        state.ports.state(&self.port)
    }

    fn live(&self) -> BridgeResult<Arc<SurfaceState>> {
        match self.state.upgrade() {
            Some(state) if !state.is_disposed() => Ok(state),
            _ => Err(BridgeError::Disposed),
        }
    }

    /// Attach `on_message` and start receiving. A port starts once.
    pub fn start<F>(&self, ui: &UiContext, on_message: F) -> BridgeResult<()>
    where
        F: Fn(&UiContext, Value) + Send + Sync + 'static,
    {
        let state = self.live()?;
        state.ports.start(&self.port, Arc::new(on_message))?;
        log::debug!(target: "webview_bridge::ports", "Started port {}", port_label(&self.port));
        state.evaluate(
            ui,
            ScriptCommand::StartPort {
                channel_id: self.port.channel_id.clone(),
                index: self.port.index,
            },
        );
        Ok(())
    }

    /// Start the port and relay each message to the host as
    /// `onWebMessagePortMessage {channelId, portIndex, message}`.
    pub fn start_forwarding(&self, ui: &UiContext) -> BridgeResult<()> {
        let host = self.live()?.host.clone();
        let port = self.port.clone();
        self.start(ui, move |ui, message| {
            let args = json!({
                "channelId": port.channel_id,
                "portIndex": port.index,
                "message": message,
            });
            host.invoke(ui, HostMethod::ON_WEB_MESSAGE_PORT_MESSAGE, args, |_, reply| {
                if let HostReply::Error(error) = reply {
                    log::warn!(
                        target: "webview_bridge::ports",
                        "Host rejected port message: {}",
                        error
                    );
                }
            });
        })
    }

    /// Post `data` through the page-side port, moving `transfer` along.
    pub fn post_message(&self, ui: &UiContext, data: Value, transfer: &[&MessagePort]) -> BridgeResult<()> {
        let state = self.live()?;
        let transfer: Vec<PortRef> = transfer.iter().map(|port| port.port.clone()).collect();
        state.ports.transfer(Some(&self.port), &transfer)?;
        state.evaluate(
            ui,
            ScriptCommand::PostPortMessage {
                channel_id: self.port.channel_id.clone(),
                index: self.port.index,
                data,
                transfer,
            },
        );
        Ok(())
    }

    /// Close the port. Closing twice, or after disposal, does nothing.
    pub fn close(&self, ui: &UiContext) -> BridgeResult<()> {
        let Ok(state) = self.live() else {
            return Ok(());
        };
        if state.ports.close(&self.port)? {
            state.evaluate(
                ui,
                ScriptCommand::ClosePort {
                    channel_id: self.port.channel_id.clone(),
                    index: self.port.index,
                },
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePort").field("port", &self.port).finish()
    }
}
