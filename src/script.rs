//! Scripts the native side sends to a surface.
//!
//! Every evaluation goes through a [`ScriptCommand`]. Real engines evaluate
//! the rendered [`Script::source`]; the headless surface interprets the
//! command directly.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::bootstrap;
use crate::config::{BridgeSettings, OriginRules};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{CorrelationId, Settlement};

/// Intercepted handler completing `evaluate_javascript` with a callback.
pub const EVALUATE_WITH_CONTENT_WORLD: &str = "evaluateJavaScriptWithContentWorld";
/// Intercepted handler completing `call_async_javascript`.
pub const CALL_ASYNC_JAVASCRIPT: &str = "callAsyncJavaScript";
/// Intercepted handler carrying page-side port traffic.
pub const WEB_MESSAGE_PORT_MESSAGE_RECEIVED: &str = "onWebMessagePortMessageReceived";

/// Intercepted handler carrying `postMessage` on a web message listener.
pub const WEB_MESSAGE_LISTENER_POST_MESSAGE: &str = "onWebMessageListenerPostMessageReceived";

/// Event dispatched on `window` once the bridge is usable in the top frame.
pub const PLATFORM_READY_EVENT: &str = "webviewBridgePlatformReady";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex for identifiers")
});

/// A page-side port being moved along with a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub channel_id: String,
    pub index: u8,
}

/// Structured form of a script evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    /// Install the bridge namespace (idempotent per document).
    Bootstrap {
        secret: Option<String>,
        origin_rules: OriginRules,
        main_frame_only: bool,
    },
    /// Fire the platform-ready event once per document.
    PlatformReady,
    /// Settle a pending `callHandler` Promise.
    Settle { id: CorrelationId, outcome: Settlement },
    /// Create a page-side `MessageChannel`.
    InitChannel { channel_id: String },
    /// Attach the forwarding `onmessage` to one page-side port.
    StartPort { channel_id: String, index: u8 },
    /// Post through one page-side port.
    PostPortMessage {
        channel_id: String,
        index: u8,
        data: Value,
        transfer: Vec<PortRef>,
    },
    ClosePort { channel_id: String, index: u8 },
    /// `window.postMessage` with optional transferred ports.
    PostWindowMessage {
        data: Value,
        target_origin: String,
        transfer: Vec<PortRef>,
    },
    /// Define a web message listener object if the document origin allows it.
    InitListener {
        js_object_name: String,
        origin_rules: OriginRules,
    },
    /// Dispatch a host answer to a listener object's message handlers.
    ListenerReply { js_object_name: String, data: Value },
    /// Raw source; with `result_id` the completion value is reported back.
    Evaluate {
        source: String,
        result_id: Option<String>,
    },
    /// Run `body` inside an async function with named arguments.
    CallAsync {
        body: String,
        args: Vec<(String, Value)>,
        result_id: String,
    },
}

/// A command together with the JavaScript a real engine evaluates.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub command: ScriptCommand,
    pub source: String,
}

impl Script {
    pub fn new(command: ScriptCommand, settings: &BridgeSettings) -> Self {
        let source = render(&command, settings);
        Self { command, source }
    }
}

/// Whether `name` can be spliced into page script as a plain identifier.
pub(crate) fn is_js_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Check `call_async_javascript` argument names before they are spliced
/// into a function signature.
pub fn validate_argument_names<'a>(names: impl IntoIterator<Item = &'a str>) -> BridgeResult<()> {
    for name in names {
        if !is_js_identifier(name) {
            return Err(BridgeError::protocol(format!(
                "'{}' is not a valid argument name",
                name
            )));
        }
    }
    Ok(())
}

/// Encode a string as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    js_literal(&Value::String(value.to_string()))
}

/// Encode a JSON value as a JavaScript expression.
///
/// U+2028/U+2029 are valid in JSON strings but terminate lines in older
/// JavaScript engines.
pub(crate) fn js_literal(value: &Value) -> String {
    value
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn namespace(settings: &BridgeSettings) -> String {
    format!("window[{}]", js_string(settings.bridge_name()))
}

fn port_expr(ns: &str, port: &PortRef) -> String {
    format!(
        "{}._webMessageChannels[{}].port{}",
        ns,
        js_string(&port.channel_id),
        port.index + 1
    )
}

fn transfer_list(ns: &str, transfer: &[PortRef]) -> String {
    let ports: Vec<String> = transfer.iter().map(|p| port_expr(ns, p)).collect();
    format!("[{}]", ports.join(", "))
}

fn render(command: &ScriptCommand, settings: &BridgeSettings) -> String {
    let ns = namespace(settings);
    match command {
        ScriptCommand::Bootstrap {
            secret,
            origin_rules,
            main_frame_only,
        } => bootstrap::bridge_js_source(
            settings.bridge_name(),
            secret.as_deref(),
            settings.transport(),
            origin_rules,
            *main_frame_only,
        ),
        ScriptCommand::PlatformReady => bootstrap::platform_ready_js_source(settings),
        ScriptCommand::InitListener {
            js_object_name,
            origin_rules,
        } => bootstrap::listener_js_source(settings.bridge_name(), js_object_name, origin_rules),
        ScriptCommand::ListenerReply { js_object_name, data } => format!(
            "(function() {{ var listener = window[{name}]; if (listener != null && typeof listener._dispatch === 'function') {{ listener._dispatch({data}); }} }})();",
            name = js_string(js_object_name),
            data = js_literal(data)
        ),
        ScriptCommand::Settle { id, outcome } => {
            let call = match outcome {
                Settlement::Resolve(value) => format!("_resolve({}, {})", id, js_literal(value)),
                Settlement::Reject(message) => format!("_reject({}, {})", id, js_string(message)),
            };
            format!("if ({ns} != null) {{ {ns}.{call}; }}", ns = ns, call = call)
        }
        ScriptCommand::InitChannel { channel_id } => format!(
            "(function() {{ var ns = {ns}; if (ns == null) {{ return; }} ns._webMessageChannels[{id}] = new MessageChannel(); }})();",
            ns = ns,
            id = js_string(channel_id)
        ),
        ScriptCommand::StartPort { channel_id, index } => format!(
            "(function() {{ var ns = {ns}; var channel = ns != null ? ns._webMessageChannels[{id}] : null; if (channel == null) {{ return; }} \
             var port = channel.port{n}; port.onmessage = function(event) {{ ns._notifyNative({handler}, {{ webMessageChannelId: {id}, index: {index}, message: event.data === undefined ? null : event.data }}); }}; port.start(); }})();",
            ns = ns,
            id = js_string(channel_id),
            n = index + 1,
            index = index,
            handler = js_string(WEB_MESSAGE_PORT_MESSAGE_RECEIVED)
        ),
        ScriptCommand::PostPortMessage {
            channel_id,
            index,
            data,
            transfer,
        } => format!(
            "(function() {{ var ns = {ns}; var channel = ns != null ? ns._webMessageChannels[{id}] : null; if (channel == null) {{ return; }} \
             channel.port{n}.postMessage({data}, {ports}); }})();",
            ns = ns,
            id = js_string(channel_id),
            n = index + 1,
            data = js_literal(data),
            ports = transfer_list("ns", transfer)
        ),
        ScriptCommand::ClosePort { channel_id, index } => format!(
            "(function() {{ var ns = {ns}; var channel = ns != null ? ns._webMessageChannels[{id}] : null; if (channel == null) {{ return; }} channel.port{n}.close(); }})();",
            ns = ns,
            id = js_string(channel_id),
            n = index + 1
        ),
        ScriptCommand::PostWindowMessage {
            data,
            target_origin,
            transfer,
        } => format!(
            "(function() {{ var ns = {ns}; window.postMessage({data}, {origin}, ns != null ? {ports} : []); }})();",
            ns = ns,
            data = js_literal(data),
            origin = js_string(target_origin),
            ports = transfer_list("ns", transfer)
        ),
        ScriptCommand::Evaluate { source, result_id } => match result_id {
            None => source.clone(),
            Some(result_id) => format!(
                "(function() {{ var ns = {ns}; var value = null; var error = null; \
                 try {{ value = eval({source}); }} catch (e) {{ error = String(e); }} \
                 if (ns != null) {{ ns._notifyNative({handler}, {{ resultUuid: {id}, value: value === undefined ? null : value, error: error }}); }} }})();",
                ns = ns,
                source = js_string(source),
                handler = js_string(EVALUATE_WITH_CONTENT_WORLD),
                id = js_string(result_id)
            ),
        },
        ScriptCommand::CallAsync {
            body,
            args,
            result_id,
        } => {
            let names: Vec<&str> = args.iter().map(|(name, _)| name.as_str()).collect();
            let values: Vec<String> = args.iter().map(|(_, value)| js_literal(value)).collect();
            format!(
                "(function() {{ var ns = {ns}; var report = function(value, error) {{ if (ns != null) {{ ns._notifyNative({handler}, {{ resultUuid: {id}, value: value === undefined ? null : value, error: error }}); }} }}; \
                 var run = async function({names}) {{\n{body}\n}}; \
                 try {{ Promise.resolve(run({values})).then(function(value) {{ report(value, null); }}, function(error) {{ report(null, String(error)); }}); }} catch (e) {{ report(null, String(e)); }} }})();",
                ns = ns,
                handler = js_string(CALL_ASYNC_JAVASCRIPT),
                id = js_string(result_id),
                names = names.join(", "),
                body = body,
                values = values.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> BridgeSettings {
        BridgeSettings {
            bridge_name: Some("bridge".to_string()),
            bridge_secret: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn settle_resolve_embeds_id_and_payload() {
        let script = Script::new(
            ScriptCommand::Settle {
                id: CorrelationId::new(4),
                outcome: Settlement::Resolve(json!({"title": "Example"})),
            },
            &settings(),
        );
        assert_eq!(
            script.source,
            r#"if (window["bridge"] != null) { window["bridge"]._resolve(4, {"title":"Example"}); }"#
        );
    }

    #[test]
    fn settle_reject_quotes_message() {
        let script = Script::new(
            ScriptCommand::Settle {
                id: CorrelationId::new(1),
                outcome: Settlement::Reject("E, \"quoted\"\n".to_string()),
            },
            &settings(),
        );
        assert!(script.source.contains(r#"_reject(1, "E, \"quoted\"\n")"#));
    }

    #[test]
    fn js_literal_escapes_line_separators() {
        let rendered = js_literal(&json!("a\u{2028}b\u{2029}c"));
        assert_eq!(rendered, r#""a\u2028b\u2029c""#);
    }

    #[test]
    fn evaluate_without_result_id_is_raw_source() {
        let script = Script::new(
            ScriptCommand::Evaluate {
                source: "1 + 1".to_string(),
                result_id: None,
            },
            &settings(),
        );
        assert_eq!(script.source, "1 + 1");
    }

    #[test]
    fn evaluate_with_result_id_reports_through_intercepted_handler() {
        let script = Script::new(
            ScriptCommand::Evaluate {
                source: "document.title".to_string(),
                result_id: Some("r1".to_string()),
            },
            &settings(),
        );
        assert!(script.source.contains(r#"eval("document.title")"#));
        assert!(script.source.contains(EVALUATE_WITH_CONTENT_WORLD));
        assert!(script.source.contains(r#"resultUuid: "r1""#));
    }

    #[test]
    fn call_async_splices_names_and_values_in_order() {
        let script = Script::new(
            ScriptCommand::CallAsync {
                body: "return a + b;".to_string(),
                args: vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))],
                result_id: "r2".to_string(),
            },
            &settings(),
        );
        assert!(script.source.contains("async function(a, b)"));
        assert!(script.source.contains("run(1, 2)"));
    }

    #[test]
    fn post_port_message_references_transferred_ports() {
        let script = Script::new(
            ScriptCommand::PostPortMessage {
                channel_id: "c1".to_string(),
                index: 0,
                data: json!("hi"),
                transfer: vec![PortRef {
                    channel_id: "c2".to_string(),
                    index: 1,
                }],
            },
            &settings(),
        );
        assert!(script.source.contains(r#"channel.port1.postMessage("hi", [ns._webMessageChannels["c2"].port2])"#));
    }

    #[test]
    fn listener_reply_dispatches_on_named_object() {
        let script = Script::new(
            ScriptCommand::ListenerReply {
                js_object_name: "myListener".to_string(),
                data: json!({"ok": true}),
            },
            &settings(),
        );
        assert!(script.source.contains(r#"var listener = window["myListener"];"#));
        assert!(script.source.contains(r#"listener._dispatch({"ok":true})"#));
    }

    #[test]
    fn argument_names_must_be_identifiers() {
        assert!(validate_argument_names(["a", "_b", "$c1"]).is_ok());
        assert!(validate_argument_names(["a){alert(1)}//"]).is_err());
        assert!(validate_argument_names(["1a"]).is_err());
    }
}
