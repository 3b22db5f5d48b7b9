pub mod defaults;
pub mod origin_rules;
pub mod settings;
pub mod user;

use std::collections::BTreeSet;
use std::path::Path;

pub use origin_rules::{OriginRule, OriginRules};
pub use settings::{BridgeSettings, DEFAULT_BRIDGE_NAME, NativeTransport, PathHandlerConfig};
pub use user::{from_toml_str, load_from_path, load_user_config, user_config_path};

use crate::error::{BridgeError, BridgeResult};
use crate::script::is_js_identifier;

/// Merge multiple BridgeSettings configs in order.
/// Later configs in the slice have higher precedence (override earlier ones).
/// Use this for layered config: `merge_all(&[defaults, user, file, overrides])`
pub fn merge_all(configs: &[Option<BridgeSettings>]) -> Option<BridgeSettings> {
    configs.iter().cloned().reduce(merge_settings).flatten()
}

/// Merge two BridgeSettings, preferring values from `primary` over `fallback`
pub fn merge_settings(
    fallback: Option<BridgeSettings>,
    primary: Option<BridgeSettings>,
) -> Option<BridgeSettings> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) => Some(settings),
        (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(BridgeSettings {
            bridge_name: primary.bridge_name.or(fallback.bridge_name),
            bridge_secret: primary.bridge_secret.or(fallback.bridge_secret),
            // Replaced, not unioned
            allowed_origin_rules: primary
                .allowed_origin_rules
                .or(fallback.allowed_origin_rules),
            for_main_frame_only: primary.for_main_frame_only.or(fallback.for_main_frame_only),
            resource_custom_schemes: merge_unique(
                fallback.resource_custom_schemes,
                primary.resource_custom_schemes,
            ),
            path_handlers: merge_path_handlers(fallback.path_handlers, primary.path_handlers),
            use_should_intercept_request: primary
                .use_should_intercept_request
                .or(fallback.use_should_intercept_request),
            blocking_timeout_ms: primary.blocking_timeout_ms.or(fallback.blocking_timeout_ms),
            transport: primary.transport.or(fallback.transport),
        }),
    }
}

fn merge_unique(fallback: Option<Vec<String>>, primary: Option<Vec<String>>) -> Option<Vec<String>> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(values), None) | (None, Some(values)) => Some(values),
        (Some(fallback), Some(primary)) => {
            let mut seen = BTreeSet::new();
            Some(
                fallback
                    .into_iter()
                    .chain(primary)
                    .filter(|value| seen.insert(value.to_ascii_lowercase()))
                    .collect(),
            )
        }
    }
}

fn merge_path_handlers(
    fallback: Option<Vec<PathHandlerConfig>>,
    primary: Option<Vec<PathHandlerConfig>>,
) -> Option<Vec<PathHandlerConfig>> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(handlers), None) | (None, Some(handlers)) => Some(handlers),
        (Some(mut fallback), Some(primary)) => {
            // Same authority + path in primary overrides the fallback entry
            fallback.retain(|f| {
                !primary
                    .iter()
                    .any(|p| p.authority == f.authority && p.path == f.path)
            });
            fallback.extend(primary);
            Some(fallback)
        }
    }
}

/// Check settings for values that would break the bridge at runtime.
pub fn validate(settings: &BridgeSettings) -> BridgeResult<()> {
    let name = settings.bridge_name();
    if !is_js_identifier(name) {
        return Err(BridgeError::config(format!(
            "bridge_name '{}' is not a valid JavaScript identifier",
            name
        )));
    }

    OriginRules::compile(settings.allowed_origin_rules())?;

    for scheme in settings.resource_custom_schemes() {
        let valid = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(BridgeError::config(format!("invalid custom scheme '{}'", scheme)));
        }
    }

    for handler in settings.path_handlers() {
        if handler.authority.is_empty() {
            return Err(BridgeError::config("path handler authority must not be empty"));
        }
        if !handler.path.starts_with('/') {
            return Err(BridgeError::config(format!(
                "path handler prefix '{}' must start with '/'",
                handler.path
            )));
        }
    }

    if settings.blocking_timeout_ms == Some(0) {
        return Err(BridgeError::config("blocking_timeout_ms must be greater than zero"));
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }

    /// Forward the event to the `log` facade.
    pub fn log(&self) {
        match self.kind {
            SettingsEventKind::Info => {
                log::info!(target: "webview_bridge::config", "{}", self.message)
            }
            SettingsEventKind::Warning => {
                log::warn!(target: "webview_bridge::config", "{}", self.message)
            }
        }
    }
}

#[derive(Default, Debug)]
pub struct SettingsLoadOutcome {
    pub settings: BridgeSettings,
    pub events: Vec<SettingsEvent>,
}

/// Load layered settings: defaults < user config < `config_path` < `overrides`.
///
/// Unreadable or invalid layers are skipped with a warning event so that a
/// broken user file never prevents the bridge from starting.
pub fn load_settings(
    config_path: Option<&Path>,
    overrides: Option<BridgeSettings>,
) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let defaults = Some(defaults::default_settings());

    let user_config = match load_user_config() {
        Ok(Some(settings)) => {
            events.push(SettingsEvent::info("Loaded user config"));
            Some(settings)
        }
        Ok(None) => None,
        Err(e) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load user config: {}",
                e
            )));
            None
        }
    };

    let file_config = config_path.and_then(|path| match load_from_path(path) {
        Ok(settings) => {
            events.push(SettingsEvent::info(format!(
                "Loaded config file {}",
                path.display()
            )));
            Some(settings)
        }
        Err(e) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load {}: {}",
                path.display(),
                e
            )));
            None
        }
    });

    let settings = merge_all(&[defaults, user_config, file_config, overrides]).unwrap_or_default();
    SettingsLoadOutcome { settings, events }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(authority: &str, path: &str) -> PathHandlerConfig {
        PathHandlerConfig {
            authority: authority.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn merge_settings_prefers_primary_scalars() {
        let fallback = BridgeSettings {
            bridge_name: Some("fallback".to_string()),
            blocking_timeout_ms: Some(100),
            ..Default::default()
        };
        let primary = BridgeSettings {
            bridge_name: Some("primary".to_string()),
            ..Default::default()
        };

        let merged = merge_settings(Some(fallback), Some(primary)).unwrap();
        assert_eq!(merged.bridge_name(), "primary");
        assert_eq!(merged.blocking_timeout_ms, Some(100));
    }

    #[test]
    fn merge_settings_unions_custom_schemes() {
        let fallback = BridgeSettings {
            resource_custom_schemes: Some(vec!["custom".to_string(), "app".to_string()]),
            ..Default::default()
        };
        let primary = BridgeSettings {
            resource_custom_schemes: Some(vec!["APP".to_string(), "asset".to_string()]),
            ..Default::default()
        };

        let merged = merge_settings(Some(fallback), Some(primary)).unwrap();
        assert_eq!(merged.resource_custom_schemes(), ["custom", "app", "asset"]);
    }

    #[test]
    fn merge_settings_overrides_matching_path_handler() {
        let fallback = BridgeSettings {
            path_handlers: Some(vec![handler("appassets", "/assets/"), handler("appassets", "/res/")]),
            ..Default::default()
        };
        let primary = BridgeSettings {
            path_handlers: Some(vec![handler("appassets", "/assets/")]),
            ..Default::default()
        };

        let merged = merge_settings(Some(fallback), Some(primary)).unwrap();
        assert_eq!(merged.path_handlers().len(), 2);
    }

    #[test]
    fn merge_all_applies_layers_in_order() {
        let layers = [
            Some(defaults::default_settings()),
            None,
            Some(BridgeSettings {
                for_main_frame_only: Some(true),
                ..Default::default()
            }),
        ];
        let merged = merge_all(&layers).unwrap();
        assert!(merged.for_main_frame_only());
        assert_eq!(merged.bridge_name(), DEFAULT_BRIDGE_NAME);
    }

    #[test]
    fn validate_rejects_non_identifier_bridge_name() {
        let settings = BridgeSettings {
            bridge_name: Some("my-bridge".to_string()),
            ..Default::default()
        };
        assert!(validate(&settings).is_err());

        let settings = BridgeSettings {
            bridge_name: Some("$bridge_2".to_string()),
            ..Default::default()
        };
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn validate_rejects_relative_path_handler() {
        let settings = BridgeSettings {
            path_handlers: Some(vec![handler("appassets", "assets/")]),
            ..Default::default()
        };
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&defaults::default_settings()).is_ok());
    }
}
