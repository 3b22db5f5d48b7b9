//! Page-injected message listeners.
//!
//! A listener defines `window[js_object_name]` in every document whose
//! origin its rules allow. Page script calls `postMessage(message)` on it;
//! the host receives `onPostMessage` and may answer, in which case the
//! answer is dispatched to the object's `onmessage` and `message` listeners.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Value, json};

use crate::config::OriginRules;
use crate::error::{BridgeError, BridgeResult};
use crate::host::HostMethod;
use crate::protocol::{BridgeMessage, HostReply};
use crate::script::{ScriptCommand, is_js_identifier};
use crate::ui::UiContext;
use crate::webview::SurfaceState;

/// Description of a listener to install with
/// [`WebViewBridge::add_web_message_listener`](crate::WebViewBridge::add_web_message_listener).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebMessageListener {
    pub js_object_name: String,
    /// Same syntax as `allowed_origin_rules` in the settings; empty allows all.
    pub allowed_origin_rules: Vec<String>,
}

impl WebMessageListener {
    pub fn new(js_object_name: impl Into<String>) -> Self {
        Self {
            js_object_name: js_object_name.into(),
            allowed_origin_rules: Vec::new(),
        }
    }

    pub fn with_allowed_origin_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origin_rules = rules.into_iter().map(Into::into).collect();
        self
    }
}

/// Installed listeners by object name.
pub(crate) struct ListenerTable {
    listeners: DashMap<String, Arc<OriginRules>>,
}

impl ListenerTable {
    pub(crate) fn new() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }

    /// Validate and record `listener`, returning the install command.
    pub(crate) fn add(&self, listener: &WebMessageListener) -> BridgeResult<ScriptCommand> {
        let name = &listener.js_object_name;
        if !is_js_identifier(name) {
            return Err(BridgeError::config(format!(
                "web message listener name '{}' is not a valid JavaScript identifier",
                name
            )));
        }
        let rules = Arc::new(OriginRules::compile(&listener.allowed_origin_rules)?);

        match self.listeners.entry(name.clone()) {
            Entry::Occupied(_) => Err(BridgeError::config(format!(
                "web message listener '{}' was already added",
                name
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&rules));
                Ok(install_command(name, &rules))
            }
        }
    }

    pub(crate) fn rules(&self, name: &str) -> Option<Arc<OriginRules>> {
        self.listeners.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Install commands for every listener, for a freshly loaded document.
    pub(crate) fn install_commands(&self) -> Vec<ScriptCommand> {
        let mut commands: Vec<ScriptCommand> = self
            .listeners
            .iter()
            .map(|entry| install_command(entry.key(), entry.value()))
            .collect();
        // DashMap iteration order is arbitrary.
        commands.sort_by(|a, b| listener_name(a).cmp(listener_name(b)));
        commands
    }

    pub(crate) fn clear(&self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        count
    }
}

fn install_command(name: &str, rules: &OriginRules) -> ScriptCommand {
    ScriptCommand::InitListener {
        js_object_name: name.to_string(),
        origin_rules: rules.clone(),
    }
}

fn listener_name(command: &ScriptCommand) -> &str {
    match command {
        ScriptCommand::InitListener { js_object_name, .. } => js_object_name,
        _ => "",
    }
}

/// Relay a page `postMessage` on a listener object to the host.
///
/// The origin is checked again natively; the page-side gate only decides
/// whether the object exists.
pub(crate) fn deliver_listener_message(
    state: &Arc<SurfaceState>,
    ui: &UiContext,
    message: &BridgeMessage,
    generation: u64,
) {
    let payload = match message.first_arg() {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!(target: "webview_bridge::ports::listener", "Malformed listener message: {}", e);
            return;
        }
    };
    let Some(name) = payload.get("jsObjectName").and_then(Value::as_str) else {
        log::warn!(target: "webview_bridge::ports::listener", "Listener message without jsObjectName");
        return;
    };
    let Some(rules) = state.listeners.rules(name) else {
        log::debug!(
            target: "webview_bridge::ports::listener",
            "Dropping message for unknown listener {}",
            name
        );
        return;
    };
    if !rules.allows(&message.origin) {
        log::warn!(
            target: "webview_bridge::ports::listener",
            "Dropping message for {}: origin {} is not allowed",
            name,
            message.origin
        );
        return;
    }

    let args = json!({
        "jsObjectName": name,
        "message": payload.get("message").cloned().unwrap_or(Value::Null),
        "sourceOrigin": message.origin,
        "isMainFrame": message.is_main_frame,
    });
    let name = name.to_string();
    let weak: Weak<SurfaceState> = Arc::downgrade(state);
    state.host.invoke(ui, HostMethod::ON_POST_MESSAGE, args, move |ui, reply| {
        let data = match reply {
            HostReply::Success(Value::Null) | HostReply::NotImplemented => return,
            HostReply::Success(data) => data,
            HostReply::Error(error) => {
                log::warn!(target: "webview_bridge::ports::listener", "onPostMessage for {} failed: {}", name, error);
                return;
            }
        };
        let Some(state) = weak.upgrade().filter(|state| !state.is_disposed()) else {
            return;
        };
        if state.document_generation() != generation {
            log::debug!(
                target: "webview_bridge::ports::listener",
                "Document changed, dropping reply for {}",
                name
            );
            return;
        }
        state.evaluate(
            ui,
            ScriptCommand::ListenerReply {
                js_object_name: name,
                data,
            },
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_rejects_duplicates_and_bad_names() {
        let table = ListenerTable::new();
        assert!(table.add(&WebMessageListener::new("myListener")).is_ok());
        assert!(matches!(
            table.add(&WebMessageListener::new("myListener")),
            Err(BridgeError::Config { .. })
        ));
        assert!(matches!(
            table.add(&WebMessageListener::new("my-listener")),
            Err(BridgeError::Config { .. })
        ));
        assert!(matches!(
            table.add(&WebMessageListener::new("other").with_allowed_origin_rules(["example.com"])),
            Err(BridgeError::Config { .. })
        ));
        assert!(table.rules("other").is_none());
    }

    #[test]
    fn install_commands_carry_compiled_rules_in_name_order() {
        let table = ListenerTable::new();
        table
            .add(&WebMessageListener::new("zeta").with_allowed_origin_rules(["https://example.com"]))
            .unwrap();
        table.add(&WebMessageListener::new("alpha")).unwrap();

        let commands = table.install_commands();
        let names: Vec<&str> = commands.iter().map(listener_name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        match &commands[1] {
            ScriptCommand::InitListener { origin_rules, .. } => {
                assert!(origin_rules.allows("https://example.com"));
                assert!(!origin_rules.allows("https://evil.test"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn clear_forgets_every_listener() {
        let table = ListenerTable::new();
        table.add(&WebMessageListener::new("a")).unwrap();
        table.add(&WebMessageListener::new("b")).unwrap();
        assert_eq!(table.clear(), 2);
        assert!(table.install_commands().is_empty());
    }
}
