//! E2E tests for web message listener objects.

mod helpers;

use std::sync::Mutex;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use helpers::harness::{Harness, PAGE_URL, settings_with_secret};
use helpers::hosts::CallCounter;
use serde_json::{Value, json};
use webview_bridge::ports::WebMessageListener;
use webview_bridge::protocol::BridgeMessage;
use webview_bridge::script::WEB_MESSAGE_LISTENER_POST_MESSAGE;
use webview_bridge::{BridgeError, BridgeSettings, HostMethod, HostReply};

const RECV_LIMIT: Duration = Duration::from_secs(2);

fn harness() -> Harness {
    let harness = Harness::new(BridgeSettings::default());
    harness.navigate(PAGE_URL);
    harness
}

fn add_listener(harness: &Harness, listener: WebMessageListener) -> Result<(), BridgeError> {
    harness.on_ui(move |ui, bridge| bridge.add_web_message_listener(ui, listener))
}

/// Poll until the listener object has received `count` dispatches.
fn wait_for_dispatches(harness: &Harness, name: &str, count: usize) -> Vec<Value> {
    let deadline = Instant::now() + RECV_LIMIT;
    loop {
        let received = harness.surface.listener_messages(name).unwrap_or_default();
        if received.len() >= count || Instant::now() > deadline {
            return received;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Host that records `onPostMessage` arguments and answers `{echo: message}`.
fn register_echo_host(harness: &Harness) -> mpsc::Receiver<Value> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    harness.handlers.register(HostMethod::ON_POST_MESSAGE, move |args| {
        let _ = tx.lock().unwrap().send(args.clone());
        async move { HostReply::Success(json!({"echo": args["message"].clone()})) }
    });
    rx
}

#[test]
fn page_post_reaches_host_and_answer_is_dispatched_back() {
    let harness = harness();
    let rx = register_echo_host(&harness);
    add_listener(&harness, WebMessageListener::new("myListener")).unwrap();
    assert_eq!(harness.surface.listener_messages("myListener"), Some(Vec::new()));

    assert!(harness.surface.post_to_listener("myListener", &json!("ping")));

    let args = rx.recv_timeout(RECV_LIMIT).unwrap();
    assert_eq!(
        args,
        json!({
            "jsObjectName": "myListener",
            "message": "ping",
            "sourceOrigin": "https://example.com",
            "isMainFrame": true
        })
    );
    assert_eq!(
        wait_for_dispatches(&harness, "myListener", 1),
        vec![json!({"echo": "ping"})]
    );
}

#[test]
fn null_or_missing_host_answer_dispatches_nothing() {
    let harness = harness();
    add_listener(&harness, WebMessageListener::new("quiet")).unwrap();
    let counter = CallCounter::default();
    {
        let counter = counter.clone();
        harness.handlers.register(HostMethod::ON_POST_MESSAGE, move |_args| {
            counter.bump();
            async { HostReply::Success(Value::Null) }
        });
    }

    assert!(harness.surface.post_to_listener("quiet", &json!(1)));
    while counter.get() == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    std::thread::sleep(Duration::from_millis(50));
    harness.flush_ui();

    assert_eq!(harness.surface.listener_messages("quiet"), Some(Vec::new()));
}

#[test]
fn listener_exists_only_where_its_origin_rules_allow() {
    let harness = harness();
    let rx = register_echo_host(&harness);
    add_listener(
        &harness,
        WebMessageListener::new("trustedOnly").with_allowed_origin_rules(["https://*.trusted.test"]),
    )
    .unwrap();

    assert_eq!(harness.surface.listener_messages("trustedOnly"), None);
    assert!(!harness.surface.post_to_listener("trustedOnly", &json!("x")));

    // Re-installed into every new document.
    harness.navigate("https://app.trusted.test/");
    assert_eq!(harness.surface.listener_messages("trustedOnly"), Some(Vec::new()));
    assert!(harness.surface.post_to_listener("trustedOnly", &json!("x")));

    let args = rx.recv_timeout(RECV_LIMIT).unwrap();
    assert_eq!(args["sourceOrigin"], json!("https://app.trusted.test"));
}

#[test]
fn forged_post_from_disallowed_origin_never_reaches_host() {
    let harness = Harness::new(settings_with_secret("s3cr3t"));
    harness.navigate(PAGE_URL);
    let counter = CallCounter::default();
    {
        let counter = counter.clone();
        harness.handlers.register(HostMethod::ON_POST_MESSAGE, move |_args| {
            counter.bump();
            async { HostReply::Success(Value::Null) }
        });
    }
    add_listener(
        &harness,
        WebMessageListener::new("trustedOnly").with_allowed_origin_rules(["https://trusted.test"]),
    )
    .unwrap();

    for name in ["trustedOnly", "neverAdded"] {
        let mut message = BridgeMessage::notification(
            WEB_MESSAGE_LISTENER_POST_MESSAGE,
            &json!({"jsObjectName": name, "message": "forged"}),
        )
        .with_frame("https://example.com", PAGE_URL, true);
        message.bridge_secret = Some("s3cr3t".to_string());
        harness.surface.post_raw_message(&serde_json::to_string(&message).unwrap());
    }
    harness.flush_ui();
    std::thread::sleep(Duration::from_millis(20));
    harness.flush_ui();

    assert_eq!(counter.get(), 0);
}

#[test]
fn answer_for_previous_document_is_dropped() {
    let harness = harness();
    let counter = CallCounter::default();
    {
        let counter = counter.clone();
        harness.handlers.register(HostMethod::ON_POST_MESSAGE, move |_args| {
            counter.bump();
            async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                HostReply::Success(json!("late"))
            }
        });
    }
    add_listener(&harness, WebMessageListener::new("myListener")).unwrap();

    assert!(harness.surface.post_to_listener("myListener", &json!("ping")));
    while counter.get() == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    harness.navigate("https://example.com/next.html");
    std::thread::sleep(Duration::from_millis(300));
    harness.flush_ui();

    assert_eq!(harness.surface.listener_messages("myListener"), Some(Vec::new()));
}

#[test]
fn duplicate_names_and_disposed_surfaces_are_rejected() {
    let harness = harness();
    add_listener(&harness, WebMessageListener::new("myListener")).unwrap();

    assert!(matches!(
        add_listener(&harness, WebMessageListener::new("myListener")),
        Err(BridgeError::Config { .. })
    ));
    assert!(matches!(
        add_listener(&harness, WebMessageListener::new("bad name")),
        Err(BridgeError::Config { .. })
    ));

    harness.bridge.dispose();
    assert!(matches!(
        add_listener(&harness, WebMessageListener::new("another")),
        Err(BridgeError::Disposed)
    ));
}
