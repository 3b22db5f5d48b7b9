//! Script bootstrap injection.
//!
//! Renders the page-side half of the bridge and installs it into a surface.
//!
//! # Page-side layout
//!
//! The bootstrap defines `window[bridge_name]` with:
//!
//! - `callHandler(name, ...args)`: Promise-returning call into native code
//! - `_pending` / `_nextId`: the correlation registry, owned by the namespace
//!   object of the top frame (sub-frames register into it)
//! - `_resolve(id, value)` / `_reject(id, message)`: settle and delete an
//!   entry; unknown ids are ignored
//! - `_notifyNative(name, payload)`: fire-and-forget message without an id
//! - `_webMessageChannels`: page-side `MessageChannel`s by channel id
//! - `_scriptsLoaded`: sentinel preventing double installation
//!
//! Each web message listener is a separate script defining
//! `window[js_object_name]`, gated by the listener's own origin rules.
//!
//! `platform_ready_js_source` fires the platform-ready event once, and only
//! in the top frame.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::{BridgeSettings, NativeTransport, OriginRules};
use crate::script::{
    PLATFORM_READY_EVENT, Script, ScriptCommand, WEB_MESSAGE_LISTENER_POST_MESSAGE, js_literal, js_string,
};
use crate::surface::Surface;
use crate::ui::UiContext;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([A-Z]+(?:_[A-Z]+)*)__").expect("valid regex for placeholders"));

/// Page-side mirror of `OriginRules::allows` for the current location.
/// `null` rules allow everything.
const ORIGIN_ALLOWED_JS: &str = r#"function(rules) {
    if (rules == null) { return true; }
    var loc = window.location;
    var scheme = loc.protocol.replace(':', '');
    var host = (loc.hostname || '').toLowerCase();
    var port = loc.port !== '' ? parseInt(loc.port, 10) : (scheme === 'https' ? 443 : (scheme === 'http' ? 80 : null));
    for (var i = 0; i < rules.length; i++) {
      var rule = rules[i];
      if (rule.scheme !== scheme || rule.port !== port) { continue; }
      if (rule.host === '') { return true; }
      if (rule.subdomains) {
        if (host.length > rule.host.length && host.slice(-(rule.host.length + 1)) === '.' + rule.host) { return true; }
      } else if (host === rule.host) {
        return true;
      }
    }
    return false;
  }"#;

const BRIDGE_TEMPLATE: &str = r#"(function() {
  var NAME = __NAME__;
  var SECRET = __SECRET__;
  var ORIGIN_RULES = __ORIGIN_RULES__;
  var isMainFrame = window.top === window;
  if (__MAIN_FRAME_ONLY__ && !isMainFrame) { return; }
  var originAllowed = __ORIGIN_ALLOWED__;
  if (!originAllowed(ORIGIN_RULES)) { return; }
  var ns = window[NAME] || {};
  if (ns._scriptsLoaded === true) { return; }
  var home = ns;
  if (!isMainFrame) {
    try {
      if (window.top[NAME] != null && window.top[NAME]._pending != null) { home = window.top[NAME]; }
    } catch (e) {}
  }
  if (home._pending == null) { home._pending = {}; home._nextId = 0; }
  ns._pending = home._pending;
  ns._register = function(resolve, reject) {
    var id;
    do {
      id = home._nextId;
      home._nextId = (home._nextId + 1) % 2147483647;
    } while (home._pending[id] != null);
    home._pending[id] = { resolve: resolve, reject: reject };
    return id;
  };
  ns._resolve = function(id, value) {
    var entry = home._pending[id];
    if (entry == null) { return; }
    delete home._pending[id];
    entry.resolve(value);
  };
  ns._reject = function(id, message) {
    var entry = home._pending[id];
    if (entry == null) { return; }
    delete home._pending[id];
    entry.reject(new Error(message));
  };
  var post = function(body) { __TRANSPORT__; };
  var envelope = function(handlerName, id, json) {
    var loc = window.location;
    return JSON.stringify({
      handlerName: handlerName,
      _callHandlerID: id,
      _bridgeSecret: SECRET,
      origin: loc.origin,
      requestUrl: loc.href,
      isMainFrame: isMainFrame,
      args: json
    });
  };
  ns.callHandler = function() {
    var handlerName = arguments[0];
    var args = Array.prototype.slice.call(arguments, 1);
    return new Promise(function(resolve, reject) {
      var json;
      try {
        json = JSON.stringify(args);
      } catch (e) {
        reject(e);
        return;
      }
      var id = ns._register(resolve, reject);
      try {
        post(envelope(handlerName, id, json));
      } catch (e) {
        delete home._pending[id];
        reject(e);
      }
    });
  };
  ns._notifyNative = function(handlerName, payload) {
    try {
      post(envelope(handlerName, null, JSON.stringify([payload])));
    } catch (e) {}
  };
  ns._webMessageChannels = ns._webMessageChannels || {};
  ns._scriptsLoaded = true;
  window[NAME] = ns;
})();"#;

const LISTENER_TEMPLATE: &str = r#"(function() {
  var NAME = __NAME__;
  var OBJECT_NAME = __OBJECT_NAME__;
  var ORIGIN_RULES = __ORIGIN_RULES__;
  var originAllowed = __ORIGIN_ALLOWED__;
  if (!originAllowed(ORIGIN_RULES) || window[OBJECT_NAME] != null) { return; }
  var listener = { onmessage: null, _listeners: [] };
  listener.postMessage = function(message) {
    var ns = window[NAME];
    if (ns == null) { return; }
    ns._notifyNative(__HANDLER__, { jsObjectName: OBJECT_NAME, message: message === undefined ? null : message });
  };
  listener.addEventListener = function(type, callback) {
    if (type !== 'message' || callback == null) { return; }
    listener._listeners.push(callback);
  };
  listener.removeEventListener = function(type, callback) {
    var index = listener._listeners.indexOf(callback);
    if (index >= 0) { listener._listeners.splice(index, 1); }
  };
  listener._dispatch = function(data) {
    var event = { data: data };
    if (typeof listener.onmessage === 'function') { listener.onmessage(event); }
    listener._listeners.slice().forEach(function(callback) { callback(event); });
  };
  window[OBJECT_NAME] = listener;
})();"#;

const PLATFORM_READY_TEMPLATE: &str = r#"(function() {
  var ns = window[__NAME__];
  if (ns == null || window.top !== window || ns._platformReady === true) { return; }
  ns._platformReady = true;
  window.dispatchEvent(new Event(__EVENT__));
})();"#;

fn transport_expr(transport: NativeTransport) -> &'static str {
    match transport {
        NativeTransport::WebkitMessageHandler => "window.webkit.messageHandlers[NAME].postMessage(body)",
        NativeTransport::Webview2 => "window.chrome.webview.postMessage(body)",
        NativeTransport::InjectedObject => "window[NAME + '_native'].postMessage(body)",
    }
}

/// Render the bridge namespace installer.
pub fn bridge_js_source(
    bridge_name: &str,
    secret: Option<&str>,
    transport: NativeTransport,
    origin_rules: &OriginRules,
    main_frame_only: bool,
) -> String {
    let rules = rules_literal(origin_rules);
    let secret = secret.map(js_string).unwrap_or_else(|| "null".to_string());

    fill_template(
        BRIDGE_TEMPLATE,
        &[
            ("NAME", &js_string(bridge_name)),
            ("SECRET", &secret),
            ("ORIGIN_RULES", &rules),
            ("ORIGIN_ALLOWED", ORIGIN_ALLOWED_JS),
            ("MAIN_FRAME_ONLY", if main_frame_only { "true" } else { "false" }),
            ("TRANSPORT", transport_expr(transport)),
        ],
    )
}

/// Render the installer for one web message listener object.
pub fn listener_js_source(bridge_name: &str, js_object_name: &str, origin_rules: &OriginRules) -> String {
    fill_template(
        LISTENER_TEMPLATE,
        &[
            ("NAME", &js_string(bridge_name)),
            ("OBJECT_NAME", &js_string(js_object_name)),
            ("ORIGIN_RULES", &rules_literal(origin_rules)),
            ("ORIGIN_ALLOWED", ORIGIN_ALLOWED_JS),
            ("HANDLER", &js_string(WEB_MESSAGE_LISTENER_POST_MESSAGE)),
        ],
    )
}

fn rules_literal(origin_rules: &OriginRules) -> String {
    if origin_rules.allows_all() {
        return "null".to_string();
    }
    serde_json::to_value(origin_rules.rules())
        .map(|value| js_literal(&value))
        .unwrap_or_else(|_| "[]".to_string())
}

/// Render the one-shot platform-ready dispatcher.
pub fn platform_ready_js_source(settings: &BridgeSettings) -> String {
    fill_template(
        PLATFORM_READY_TEMPLATE,
        &[
            ("NAME", &js_string(settings.bridge_name())),
            ("EVENT", &js_string(PLATFORM_READY_EVENT)),
        ],
    )
}

/// Substitute every `__KEY__` placeholder in one pass.
///
/// Substituted text is never rescanned, so configured values may contain
/// placeholder-like sequences.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// The bootstrap command for `settings`.
pub fn bootstrap_command(settings: &BridgeSettings, origin_rules: &OriginRules) -> ScriptCommand {
    ScriptCommand::Bootstrap {
        secret: settings.bridge_secret().map(str::to_string),
        origin_rules: origin_rules.clone(),
        main_frame_only: settings.for_main_frame_only(),
    }
}

/// Install the bridge and `listeners` into `surface`, then fire platform-ready.
///
/// Safe to call repeatedly for one document: the page-side sentinels and the
/// `_platformReady` flag make every step a no-op after the first.
pub fn inject(
    ui: &UiContext,
    surface: &dyn Surface,
    settings: &BridgeSettings,
    origin_rules: &OriginRules,
    listeners: Vec<ScriptCommand>,
) {
    log::trace!(target: "webview_bridge::bootstrap", "Injecting bridge bootstrap");
    surface.evaluate(ui, Script::new(bootstrap_command(settings, origin_rules), settings));
    for listener in listeners {
        surface.evaluate(ui, Script::new(listener, settings));
    }
    surface.evaluate(ui, Script::new(ScriptCommand::PlatformReady, settings));
}
