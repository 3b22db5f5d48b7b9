//! User configuration loading for webview-bridge.
//!
//! User config location: $XDG_CONFIG_HOME/webview-bridge/webview-bridge.toml
//! Fallback: the platform config directory from `dirs::config_dir()`.

use std::path::{Path, PathBuf};

use super::settings::BridgeSettings;
use crate::error::{BridgeError, BridgeResult};

const APP_DIR: &str = "webview-bridge";
const FILE_NAME: &str = "webview-bridge.toml";

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set: $XDG_CONFIG_HOME/webview-bridge/webview-bridge.toml
/// 2. Otherwise: <platform config dir>/webview-bridge/webview-bridge.toml
///
/// Returns None if neither can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg_config) if !xdg_config.is_empty() => {
            return Some(PathBuf::from(xdg_config).join(APP_DIR).join(FILE_NAME));
        }
        _ => {}
    }

    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

/// Parse settings from TOML text.
pub fn from_toml_str(contents: &str) -> BridgeResult<BridgeSettings> {
    toml::from_str(contents).map_err(|e| BridgeError::config(e.to_string()))
}

/// Load settings from an explicit file path.
pub fn load_from_path(path: &Path) -> BridgeResult<BridgeSettings> {
    let contents = std::fs::read_to_string(path)?;
    from_toml_str(&contents)
        .map_err(|e| BridgeError::config(format!("{}: {}", path.display(), e)))
}

/// Load the user config.
///
/// Returns `Ok(None)` when no user config file exists.
pub fn load_user_config() -> BridgeResult<Option<BridgeSettings>> {
    let Some(path) = user_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_from_path(&path).map(Some)
}
