//! Name → handler dispatch on the host runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use super::HostMethod;
use super::channel::{HostCall, HostMessenger, Responder};
use crate::protocol::{ErrorCodes, HostError, HostReply};
use crate::ui::UiContext;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HostReply> + Send>>;

type MethodHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;
type JsHandler = Arc<dyn Fn(JsHandlerCall) -> HandlerFuture + Send + Sync>;

/// Arguments of an `onCallJsHandler` invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsHandlerCall {
    pub handler_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub request_url: String,
    #[serde(default)]
    pub is_main_frame: bool,
}

/// Host-side [`HostMessenger`] backed by explicit handler maps.
///
/// Handlers run on the supplied tokio runtime, never on the UI thread.
/// Unknown methods and unknown page handler names answer `NotImplemented`.
pub struct HandlerTable {
    methods: DashMap<String, MethodHandler>,
    js_handlers: DashMap<String, JsHandler>,
    runtime: tokio::runtime::Handle,
}

impl HandlerTable {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            methods: DashMap::new(),
            js_handlers: DashMap::new(),
            runtime,
        }
    }

    /// Register a handler for a host method such as `onLoadResourceWithCustomScheme`.
    pub fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HostReply> + Send + 'static,
    {
        let handler: MethodHandler = Arc::new(move |args| -> HandlerFuture { Box::pin(handler(args)) });
        self.methods.insert(method.to_string(), handler);
    }

    /// Register a handler page script can reach through `callHandler(name, ...)`.
    pub fn register_js_handler<F, Fut>(&self, handler_name: &str, handler: F)
    where
        F: Fn(JsHandlerCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HostReply> + Send + 'static,
    {
        let handler: JsHandler = Arc::new(move |call| -> HandlerFuture { Box::pin(handler(call)) });
        self.js_handlers.insert(handler_name.to_string(), handler);
    }

    fn resolve(&self, call: HostCall) -> Option<HandlerFuture> {
        if call.method == HostMethod::ON_CALL_JS_HANDLER {
            let js_call: JsHandlerCall = match serde_json::from_value(call.args) {
                Ok(js_call) => js_call,
                Err(e) => {
                    let error = HostError::new(
                        ErrorCodes::INVALID_ARGUMENTS,
                        format!("malformed onCallJsHandler arguments: {}", e),
                    );
                    return Some(Box::pin(async move { HostReply::Error(error) }));
                }
            };
            let handler = self.js_handlers.get(&js_call.handler_name)?.value().clone();
            return Some(handler(js_call));
        }

        let handler = self.methods.get(&call.method)?.value().clone();
        Some(handler(call.args))
    }
}

impl HostMessenger for HandlerTable {
    fn send(&self, _ui: &UiContext, call: HostCall, responder: Responder) {
        let method = call.method.clone();
        match self.resolve(call) {
            Some(future) => {
                self.runtime.spawn(async move {
                    responder.reply(future.await);
                });
            }
            None => {
                log::debug!(
                    target: "webview_bridge::host::handlers",
                    "No handler for {}",
                    method
                );
                responder.not_implemented();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostChannel;
    use crate::ui::{OffUiThread, UiLoop};
    use serde_json::json;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn js_handler_receives_page_arguments() {
        let rt = runtime();
        let ui_loop = UiLoop::spawn("handlers-test").unwrap();
        let table = Arc::new(HandlerTable::new(rt.handle().clone()));
        table.register_js_handler("sum", |call| async move {
            let total: i64 = call.args.iter().filter_map(Value::as_i64).sum();
            HostReply::Success(json!({"total": total, "origin": call.origin}))
        });
        let channel = HostChannel::new(ui_loop.handle(), table);
        let token = OffUiThread::acquire().unwrap();

        let reply = channel
            .invoke_and_wait(
                &token,
                HostMethod::ON_CALL_JS_HANDLER,
                json!({
                    "handlerName": "sum",
                    "args": [1, 2, 3],
                    "origin": "https://example.com",
                    "requestUrl": "https://example.com/",
                    "isMainFrame": true
                }),
            )
            .unwrap();
        assert_eq!(
            reply,
            HostReply::Success(json!({"total": 6, "origin": "https://example.com"}))
        );
    }

    #[test]
    fn unknown_names_answer_not_implemented() {
        let rt = runtime();
        let ui_loop = UiLoop::spawn("handlers-test").unwrap();
        let table = Arc::new(HandlerTable::new(rt.handle().clone()));
        let channel = HostChannel::new(ui_loop.handle(), table);
        let token = OffUiThread::acquire().unwrap();

        let reply = channel
            .invoke_and_wait(
                &token,
                HostMethod::ON_CALL_JS_HANDLER,
                json!({"handlerName": "missing", "args": []}),
            )
            .unwrap();
        assert_eq!(reply, HostReply::NotImplemented);

        let reply = channel
            .invoke_and_wait(&token, "someOtherMethod", Value::Null)
            .unwrap();
        assert_eq!(reply, HostReply::NotImplemented);
    }

    #[test]
    fn method_handler_runs_off_the_ui_thread() {
        let rt = runtime();
        let ui_loop = UiLoop::spawn("handlers-test").unwrap();
        let table = Arc::new(HandlerTable::new(rt.handle().clone()));
        table.register(HostMethod::SHOULD_INTERCEPT_REQUEST, |_| async {
            HostReply::Success(json!(crate::ui::is_ui_thread()))
        });
        let channel = HostChannel::new(ui_loop.handle(), table);
        let token = OffUiThread::acquire().unwrap();

        let reply = channel
            .invoke_and_wait(&token, HostMethod::SHOULD_INTERCEPT_REQUEST, json!({}))
            .unwrap();
        assert_eq!(reply, HostReply::Success(json!(false)));
    }

    #[test]
    fn malformed_js_call_is_an_error() {
        let rt = runtime();
        let ui_loop = UiLoop::spawn("handlers-test").unwrap();
        let table = Arc::new(HandlerTable::new(rt.handle().clone()));
        let channel = HostChannel::new(ui_loop.handle(), table);
        let token = OffUiThread::acquire().unwrap();

        let reply = channel
            .invoke_and_wait(&token, HostMethod::ON_CALL_JS_HANDLER, json!("oops"))
            .unwrap();
        match reply {
            HostReply::Error(error) => assert_eq!(error.code, ErrorCodes::INVALID_ARGUMENTS),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
