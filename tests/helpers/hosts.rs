//! Host handlers shared by the E2E tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use webview_bridge::{HandlerTable, HostError, HostReply};

/// Counts how often the host was reached.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// `getTitle` answers `{title: "Example"}` after 50ms.
pub fn register_get_title(handlers: &HandlerTable, counter: &CallCounter) {
    let counter = counter.clone();
    handlers.register_js_handler("getTitle", move |_call| {
        counter.bump();
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            HostReply::Success(json!({"title": "Example"}))
        }
    });
}

/// `echo` answers its first argument after a delay taken from the second.
pub fn register_echo(handlers: &HandlerTable) {
    handlers.register_js_handler("echo", |call| async move {
        let delay = call.args.get(1).and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        HostReply::Success(call.args.first().cloned().unwrap_or_default())
    });
}

/// `fail` always answers a host error.
pub fn register_fail(handlers: &HandlerTable) {
    handlers.register_js_handler("fail", |_call| async {
        HostReply::Error(HostError::new("E_DENIED", "not allowed"))
    });
}
