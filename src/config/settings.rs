use serde::{Deserialize, Serialize};

/// Name of the page-global namespace object when none is configured.
pub const DEFAULT_BRIDGE_NAME: &str = "webview_bridge";

/// How page script hands message bodies to native code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeTransport {
    /// `window.webkit.messageHandlers.<name>.postMessage(body)`
    #[default]
    WebkitMessageHandler,
    /// `window.chrome.webview.postMessage(body)`
    Webview2,
    /// `window.<name>_native.postMessage(body)`, an object injected by the engine.
    InjectedObject,
}

/// A path-handler registration: requests for `authority` under `path` are
/// resolved by the host through `onPathHandlerRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathHandlerConfig {
    pub authority: String,
    /// Absolute prefix such as `/assets/`. A trailing slash is implied.
    pub path: String,
}

/// Bridge configuration.
///
/// Every field is optional so that layered configs can be merged with
/// [`merge_settings`](super::merge_settings). Accessors apply defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub bridge_name: Option<String>,
    pub bridge_secret: Option<String>,
    pub allowed_origin_rules: Option<Vec<String>>,
    pub for_main_frame_only: Option<bool>,
    pub resource_custom_schemes: Option<Vec<String>>,
    pub path_handlers: Option<Vec<PathHandlerConfig>>,
    pub use_should_intercept_request: Option<bool>,
    pub blocking_timeout_ms: Option<u64>,
    pub transport: Option<NativeTransport>,
}

impl BridgeSettings {
    pub fn bridge_name(&self) -> &str {
        self.bridge_name.as_deref().unwrap_or(DEFAULT_BRIDGE_NAME)
    }

    pub fn bridge_secret(&self) -> Option<&str> {
        self.bridge_secret.as_deref()
    }

    pub fn allowed_origin_rules(&self) -> &[String] {
        self.allowed_origin_rules.as_deref().unwrap_or_default()
    }

    pub fn for_main_frame_only(&self) -> bool {
        self.for_main_frame_only.unwrap_or(false)
    }

    pub fn resource_custom_schemes(&self) -> &[String] {
        self.resource_custom_schemes.as_deref().unwrap_or_default()
    }

    pub fn path_handlers(&self) -> &[PathHandlerConfig] {
        self.path_handlers.as_deref().unwrap_or_default()
    }

    pub fn use_should_intercept_request(&self) -> bool {
        self.use_should_intercept_request.unwrap_or(false)
    }

    pub fn blocking_timeout(&self) -> Option<std::time::Duration> {
        self.blocking_timeout_ms.map(std::time::Duration::from_millis)
    }

    pub fn transport(&self) -> NativeTransport {
        self.transport.unwrap_or_default()
    }

    /// Whether `scheme` is handled through `onLoadResourceWithCustomScheme`.
    pub fn is_custom_scheme(&self, scheme: &str) -> bool {
        self.resource_custom_schemes()
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}
