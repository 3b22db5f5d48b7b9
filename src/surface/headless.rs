//! A surface whose page side is emulated in Rust.
//!
//! Script commands are interpreted instead of evaluated: the bootstrap
//! installs a [`PageBridge`], settle commands settle its registry, and the
//! port commands drive an in-memory `MessageChannel` model. Page-originated
//! traffic is encoded exactly as the bootstrap would encode it and handed to
//! the attached [`BridgeReceiver`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;
use serde_json::{Value, json};

use super::Surface;
use crate::error::LockResultExt;
use crate::page::{FrameInfo, PageBridge, PagePromise};
use crate::receiver::BridgeReceiver;
use crate::script::{
    CALL_ASYNC_JAVASCRIPT, EVALUATE_WITH_CONTENT_WORLD, PortRef, Script, ScriptCommand,
    WEB_MESSAGE_LISTENER_POST_MESSAGE, WEB_MESSAGE_PORT_MESSAGE_RECEIVED,
};
use crate::ui::UiContext;

/// Stand-in for the page's script engine: `(source, named args) -> value`.
pub type ScriptEvaluator = Box<dyn Fn(&str, &[(String, Value)]) -> Result<Value, String> + Send + Sync>;

/// A `window.postMessage` observed by the page.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub data: Value,
    pub target_origin: String,
    pub ports: Vec<PortRef>,
}

#[derive(Default)]
struct PagePort {
    started: bool,
    closed: bool,
    transferred: bool,
    inbox: VecDeque<Value>,
}

impl PagePort {
    fn is_usable(&self) -> bool {
        !self.closed && !self.transferred
    }
}

#[derive(Default)]
struct PageChannel {
    ports: [PagePort; 2],
}

struct Document {
    page: Arc<PageBridge>,
    channels: HashMap<String, PageChannel>,
    /// Listener objects defined in this document, with the data dispatched to each.
    listeners: HashMap<String, Vec<Value>>,
}

#[derive(Default)]
struct HeadlessState {
    url: Option<String>,
    document: Option<Document>,
    scripts: Vec<Script>,
    window_messages: Vec<WindowMessage>,
    platform_ready_count: usize,
}

pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
    receiver: OnceLock<BridgeReceiver>,
    evaluator: Option<ScriptEvaluator>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            receiver: OnceLock::new(),
            evaluator: None,
        }
    }

    /// Use `evaluator` to produce values for evaluated scripts.
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str, &[(String, Value)]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    /// Load a new document. Calls pending in the previous one are abandoned.
    pub fn navigate(&self, url: &str) {
        let mut state = self.state.lock().recover_poison("HeadlessSurface::navigate");
        state.url = Some(url.to_string());
        state.document = Some(Document {
            page: Arc::new(PageBridge::new(FrameInfo::main_frame(url))),
            channels: HashMap::new(),
            listeners: HashMap::new(),
        });
        log::debug!(target: "webview_bridge::surface::headless", "Navigated to {}", url);
    }

    /// The current document's bridge state.
    pub fn page(&self) -> Option<Arc<PageBridge>> {
        let state = self.state.lock().recover_poison("HeadlessSurface::page");
        state.document.as_ref().map(|doc| Arc::clone(&doc.page))
    }

    /// Page script calling `callHandler(name, ...args)`.
    ///
    /// Runs on the caller's thread, which plays the script thread.
    pub fn call_handler<A>(&self, handler_name: &str, args: &A) -> PagePromise
    where
        A: Serialize + ?Sized,
    {
        let page = match self.page() {
            Some(page) => page,
            None => return PagePromise::rejected(crate::page::PageError::BridgeMissing),
        };
        page.call_handler(handler_name, args, |body| self.post_to_native(body))
    }

    /// Page script calling `window[js_object_name].postMessage(message)`.
    ///
    /// Returns `false` when the object is not defined in this document.
    pub fn post_to_listener(&self, js_object_name: &str, message: &Value) -> bool {
        let body = {
            let state = self.state.lock().recover_poison("HeadlessSurface::post_to_listener");
            let Some(doc) = state.document.as_ref() else {
                return false;
            };
            if !doc.listeners.contains_key(js_object_name) {
                return false;
            }
            let payload = json!({"jsObjectName": js_object_name, "message": message});
            let mut body = None;
            doc.page
                .notify_native(WEB_MESSAGE_LISTENER_POST_MESSAGE, &payload, |encoded| body = Some(encoded));
            body
        };
        if let Some(body) = body {
            self.post_to_native(body);
        }
        true
    }

    /// Data dispatched to a listener object so far, or `None` when the object
    /// is not defined in this document.
    pub fn listener_messages(&self, js_object_name: &str) -> Option<Vec<Value>> {
        let state = self.state.lock().recover_poison("HeadlessSurface::listener_messages");
        state.document.as_ref()?.listeners.get(js_object_name).cloned()
    }

    /// Deliver a raw body through the transport, as a hostile page could.
    pub fn post_raw_message(&self, body: &str) {
        self.post_to_native(body.to_string());
    }

    fn post_to_native(&self, body: String) {
        match self.receiver.get() {
            Some(receiver) => receiver.on_script_message(&body),
            None => log::debug!(
                target: "webview_bridge::surface::headless",
                "No receiver attached, dropping page message"
            ),
        }
    }

    /// Every script evaluated so far, oldest first.
    pub fn scripts(&self) -> Vec<Script> {
        self.state.lock().recover_poison("HeadlessSurface::scripts").scripts.clone()
    }

    pub fn window_messages(&self) -> Vec<WindowMessage> {
        self.state
            .lock()
            .recover_poison("HeadlessSurface::window_messages")
            .window_messages
            .clone()
    }

    /// How many times the platform-ready event actually fired.
    pub fn platform_ready_count(&self) -> usize {
        self.state
            .lock()
            .recover_poison("HeadlessSurface::platform_ready_count")
            .platform_ready_count
    }

    fn run_evaluator(&self, source: &str, args: &[(String, Value)]) -> Value {
        let (value, error) = match &self.evaluator {
            Some(evaluator) => match evaluator(source, args) {
                Ok(value) => (value, Value::Null),
                Err(error) => (Value::Null, Value::String(error)),
            },
            None => (Value::Null, Value::Null),
        };
        json!({"value": value, "error": error})
    }

    /// Interpret one command. Returns page messages to post once the state
    /// lock is released.
    fn apply(&self, state: &mut HeadlessState, command: &ScriptCommand) -> Vec<String> {
        let mut outgoing = Vec::new();
        let url = state.url.clone().unwrap_or_default();

        match command {
            ScriptCommand::PlatformReady => {
                if let Some(doc) = &state.document
                    && doc.page.dispatch_platform_ready()
                {
                    state.platform_ready_count += 1;
                }
                return outgoing;
            }
            ScriptCommand::PostWindowMessage {
                data,
                target_origin,
                transfer,
            } => {
                if let Some(doc) = state.document.as_mut() {
                    mark_transferred(doc, transfer);
                }
                state.window_messages.push(WindowMessage {
                    data: data.clone(),
                    target_origin: target_origin.clone(),
                    ports: transfer.clone(),
                });
                return outgoing;
            }
            _ => {}
        }

        let Some(doc) = state.document.as_mut() else {
            return outgoing;
        };
        let page = Arc::clone(&doc.page);

        match command {
            ScriptCommand::Bootstrap {
                secret,
                origin_rules,
                main_frame_only: _,
            } => {
                if origin_rules.allows(&url) {
                    page.install(secret.as_deref());
                }
            }
            ScriptCommand::InitListener {
                js_object_name,
                origin_rules,
            } => {
                if origin_rules.allows(&url) {
                    doc.listeners.entry(js_object_name.clone()).or_default();
                }
            }
            ScriptCommand::ListenerReply { js_object_name, data } => {
                if let Some(received) = doc.listeners.get_mut(js_object_name) {
                    received.push(data.clone());
                }
            }
            ScriptCommand::Settle { id, outcome } => {
                page.settle(*id, outcome.clone());
            }
            ScriptCommand::InitChannel { channel_id } => {
                if page.is_installed() {
                    doc.channels.insert(channel_id.clone(), PageChannel::default());
                }
            }
            ScriptCommand::StartPort { channel_id, index } => {
                if let Some(channel) = doc.channels.get_mut(channel_id)
                    && let Some(port) = channel.ports.get_mut(*index as usize)
                    && port.is_usable()
                {
                    port.started = true;
                    drain(&page, channel_id, *index, port, &mut outgoing);
                }
            }
            ScriptCommand::PostPortMessage {
                channel_id,
                index,
                data,
                transfer,
            } => {
                let sender_usable = doc
                    .channels
                    .get(channel_id)
                    .and_then(|channel| channel.ports.get(*index as usize))
                    .is_some_and(PagePort::is_usable);
                if sender_usable {
                    mark_transferred(doc, transfer);
                    let target_index = 1 - (*index).min(1);
                    if let Some(channel) = doc.channels.get_mut(channel_id) {
                        let target = &mut channel.ports[target_index as usize];
                        if target.is_usable() {
                            target.inbox.push_back(data.clone());
                            if target.started {
                                drain(&page, channel_id, target_index, target, &mut outgoing);
                            }
                        }
                    }
                }
            }
            ScriptCommand::ClosePort { channel_id, index } => {
                if let Some(port) = doc
                    .channels
                    .get_mut(channel_id)
                    .and_then(|channel| channel.ports.get_mut(*index as usize))
                {
                    port.closed = true;
                    port.inbox.clear();
                }
            }
            ScriptCommand::Evaluate { source, result_id } => {
                if let Some(result_id) = result_id {
                    let mut payload = self.run_evaluator(source, &[]);
                    payload["resultUuid"] = Value::String(result_id.clone());
                    page.notify_native(EVALUATE_WITH_CONTENT_WORLD, &payload, |body| {
                        outgoing.push(body)
                    });
                }
            }
            ScriptCommand::CallAsync {
                body,
                args,
                result_id,
            } => {
                let mut payload = self.run_evaluator(body, args);
                payload["resultUuid"] = Value::String(result_id.clone());
                page.notify_native(CALL_ASYNC_JAVASCRIPT, &payload, |body| outgoing.push(body));
            }
            ScriptCommand::PlatformReady | ScriptCommand::PostWindowMessage { .. } => {}
        }

        outgoing
    }
}

fn mark_transferred(doc: &mut Document, transfer: &[PortRef]) {
    for port_ref in transfer {
        if let Some(port) = doc
            .channels
            .get_mut(&port_ref.channel_id)
            .and_then(|channel| channel.ports.get_mut(port_ref.index as usize))
        {
            port.transferred = true;
            port.inbox.clear();
        }
    }
}

fn drain(page: &PageBridge, channel_id: &str, index: u8, port: &mut PagePort, outgoing: &mut Vec<String>) {
    while let Some(message) = port.inbox.pop_front() {
        let payload = json!({
            "webMessageChannelId": channel_id,
            "index": index,
            "message": message,
        });
        page.notify_native(WEB_MESSAGE_PORT_MESSAGE_RECEIVED, &payload, |body| {
            outgoing.push(body)
        });
    }
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for HeadlessSurface {
    fn evaluate(&self, _ui: &UiContext, script: Script) {
        let outgoing = {
            let mut state = self.state.lock().recover_poison("HeadlessSurface::evaluate");
            let outgoing = self.apply(&mut state, &script.command);
            state.scripts.push(script);
            outgoing
        };
        for body in outgoing {
            self.post_to_native(body);
        }
    }

    fn url(&self, _ui: &UiContext) -> Option<String> {
        self.state.lock().recover_poison("HeadlessSurface::url").url.clone()
    }

    fn attach_receiver(&self, receiver: BridgeReceiver) {
        if self.receiver.set(receiver).is_err() {
            log::warn!(
                target: "webview_bridge::surface::headless",
                "Receiver already attached; ignoring"
            );
        }
    }
}
