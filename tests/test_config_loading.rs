//! Integration tests for layered settings loading.

use std::env;
use std::path::Path;

use serial_test::serial;
use tempfile::TempDir;
use webview_bridge::config::{PathHandlerConfig, SettingsEventKind, load_settings};
use webview_bridge::BridgeSettings;

fn with_xdg<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
    let original = env::var("XDG_CONFIG_HOME").ok();
    // SAFETY: env-mutating tests are serialized with #[serial]
    unsafe { env::set_var("XDG_CONFIG_HOME", dir) };
    let result = f();
    // SAFETY: same as above, restoring the original state
    unsafe {
        match original {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
    result
}

fn write_user_config(home: &TempDir, contents: &str) {
    let dir = home.path().join("webview-bridge");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("webview-bridge.toml"), contents).unwrap();
}

#[test]
#[serial]
fn defaults_apply_without_any_config() {
    let home = TempDir::new().unwrap();
    let outcome = with_xdg(home.path(), || load_settings(None, None));

    assert_eq!(outcome.settings.bridge_name(), "webview_bridge");
    assert!(!outcome.settings.for_main_frame_only());
    assert!(outcome.settings.resource_custom_schemes().is_empty());
    assert_eq!(outcome.settings.blocking_timeout(), None);
    assert!(outcome.events.is_empty());
}

#[test]
#[serial]
fn layers_merge_user_file_and_overrides_in_order() {
    let home = TempDir::new().unwrap();
    write_user_config(
        &home,
        r#"
bridge_name = "user_bridge"
resource_custom_schemes = ["user"]
blocking_timeout_ms = 1000
"#,
    );
    let file = home.path().join("project.toml");
    std::fs::write(
        &file,
        r#"
bridge_name = "project_bridge"
resource_custom_schemes = ["Project"]

[[path_handlers]]
authority = "appassets.local"
path = "/assets/"
"#,
    )
    .unwrap();
    let overrides = BridgeSettings {
        for_main_frame_only: Some(true),
        resource_custom_schemes: Some(vec!["USER".to_string()]),
        ..Default::default()
    };

    let outcome = with_xdg(home.path(), || load_settings(Some(&file), Some(overrides)));
    let settings = outcome.settings;

    assert_eq!(settings.bridge_name(), "project_bridge");
    assert!(settings.for_main_frame_only());
    assert_eq!(settings.blocking_timeout_ms, Some(1000));
    // Schemes are unioned without case-insensitive duplicates.
    assert_eq!(settings.resource_custom_schemes().len(), 2);
    assert!(settings.is_custom_scheme("user"));
    assert!(settings.is_custom_scheme("project"));
    assert_eq!(
        settings.path_handlers(),
        &[PathHandlerConfig {
            authority: "appassets.local".to_string(),
            path: "/assets/".to_string(),
        }]
    );
    assert_eq!(outcome.events.len(), 2);
}

#[test]
#[serial]
fn broken_user_config_is_skipped_with_warning() {
    let home = TempDir::new().unwrap();
    write_user_config(&home, "bridge_name = [not valid toml");

    let outcome = with_xdg(home.path(), || load_settings(None, None));

    assert_eq!(outcome.settings.bridge_name(), "webview_bridge");
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, SettingsEventKind::Warning);
    assert!(outcome.events[0].message.contains("user config"));
}

#[test]
#[serial]
fn missing_config_file_is_a_warning_not_a_failure() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("missing.toml");

    let outcome = with_xdg(home.path(), || load_settings(Some(&missing), None));

    assert_eq!(outcome.settings.bridge_name(), "webview_bridge");
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, SettingsEventKind::Warning);
}
