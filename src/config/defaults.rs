//! Default configuration values for webview-bridge.
//!
//! These form the lowest layer when settings are merged, and are what
//! `webview-bridge bootstrap` renders when no config file is given.

use super::settings::{BridgeSettings, DEFAULT_BRIDGE_NAME, NativeTransport};

/// Returns the default BridgeSettings.
///
/// No secret is set here; a bridge generates a fresh one per surface when
/// none is configured.
pub fn default_settings() -> BridgeSettings {
    BridgeSettings {
        bridge_name: Some(DEFAULT_BRIDGE_NAME.to_string()),
        bridge_secret: None,
        allowed_origin_rules: None,
        for_main_frame_only: Some(false),
        resource_custom_schemes: Some(Vec::new()),
        path_handlers: Some(Vec::new()),
        use_should_intercept_request: Some(false),
        blocking_timeout_ms: None,
        transport: Some(NativeTransport::default()),
    }
}
