//! Rust model of one document's script context.
//!
//! [`PageBridge`] mirrors what the bootstrap installs into a page: the
//! sentinel, the correlation registry, `callHandler`, and the one-shot
//! platform-ready flag. The headless surface uses it to emulate page script.

mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

pub use registry::CallRegistry;

use crate::error::LockResultExt;
use crate::protocol::{BridgeMessage, CorrelationId, Settlement};
use registry::CallOutcome;

/// Why a page-side call did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// Native code rejected the call; the message is the `Error` text.
    #[error("{0}")]
    Rejected(String),

    /// Arguments could not be serialized; native code was never reached.
    #[error("Failed to serialize arguments: {0}")]
    Serialization(String),

    /// The document went away before the call settled.
    #[error("Call abandoned")]
    Abandoned,

    /// `callHandler` is not installed in this document.
    #[error("Bridge is not installed")]
    BridgeMissing,
}

/// Where a page message originates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub origin: String,
    pub request_url: String,
    pub is_main_frame: bool,
}

impl FrameInfo {
    /// Main-frame info derived from a document URL.
    pub fn main_frame(url: &str) -> Self {
        let origin = url::Url::parse(url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| "null".to_string());
        Self {
            origin,
            request_url: url.to_string(),
            is_main_frame: true,
        }
    }
}

/// Promise returned by [`PageBridge::call_handler`].
pub struct PagePromise {
    id: Option<CorrelationId>,
    state: PromiseState,
}

enum PromiseState {
    Ready(Option<CallOutcome>),
    Waiting(oneshot::Receiver<CallOutcome>),
}

impl PagePromise {
    pub(crate) fn rejected(error: PageError) -> Self {
        Self {
            id: None,
            state: PromiseState::Ready(Some(Err(error))),
        }
    }

    /// Correlation id, if the call reached the registry.
    pub fn id(&self) -> Option<CorrelationId> {
        self.id
    }
}

impl Future for PagePromise {
    type Output = Result<Value, PageError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PromiseState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(Err(PageError::Abandoned)))
            }
            PromiseState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(PageError::Abandoned))),
        }
    }
}

/// One document's bridge state.
pub struct PageBridge {
    frame: FrameInfo,
    registry: CallRegistry,
    scripts_loaded: AtomicBool,
    platform_ready: AtomicBool,
    secret: Mutex<Option<String>>,
}

impl PageBridge {
    pub fn new(frame: FrameInfo) -> Self {
        Self {
            frame,
            registry: CallRegistry::new(),
            scripts_loaded: AtomicBool::new(false),
            platform_ready: AtomicBool::new(false),
            secret: Mutex::new(None),
        }
    }

    pub fn frame(&self) -> &FrameInfo {
        &self.frame
    }

    /// Install the namespace. Returns `false` when already installed.
    pub fn install(&self, secret: Option<&str>) -> bool {
        if self.scripts_loaded.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.secret.lock().recover_poison("PageBridge::install") = secret.map(str::to_string);
        true
    }

    pub fn is_installed(&self) -> bool {
        self.scripts_loaded.load(Ordering::SeqCst)
    }

    /// Fire platform-ready. Returns `true` only the first time, and only in
    /// an installed main frame.
    pub fn dispatch_platform_ready(&self) -> bool {
        if !self.frame.is_main_frame || !self.is_installed() {
            return false;
        }
        !self.platform_ready.swap(true, Ordering::SeqCst)
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    fn envelope(&self, message: BridgeMessage) -> Option<String> {
        let mut message = message.with_frame(
            self.frame.origin.clone(),
            self.frame.request_url.clone(),
            self.frame.is_main_frame,
        );
        message.bridge_secret = self.secret.lock().recover_poison("PageBridge::envelope").clone();
        serde_json::to_string(&message).ok()
    }

    /// `callHandler(name, ...args)`.
    ///
    /// `args` should serialize to an array; any other value is sent as the
    /// single argument. `post` receives the message body and plays the role
    /// of the engine transport. It is not called when serialization fails.
    pub fn call_handler<A, P>(&self, handler_name: &str, args: &A, post: P) -> PagePromise
    where
        A: Serialize + ?Sized,
        P: FnOnce(String),
    {
        if !self.is_installed() {
            return PagePromise::rejected(PageError::BridgeMissing);
        }

        let args = match serde_json::to_value(args) {
            Ok(Value::Array(items)) => Value::Array(items),
            Ok(other) => Value::Array(vec![other]),
            Err(e) => return PagePromise::rejected(PageError::Serialization(e.to_string())),
        };

        let (id, rx) = self.registry.register();
        let message = BridgeMessage::new(handler_name, Some(id), args.to_string());
        match self.envelope(message) {
            Some(body) => post(body),
            None => {
                self.registry.remove(id);
                return PagePromise::rejected(PageError::Serialization(
                    "failed to encode message body".to_string(),
                ));
            }
        }

        PagePromise {
            id: Some(id),
            state: PromiseState::Waiting(rx),
        }
    }

    /// `_notifyNative(name, payload)`: a message without a correlation id.
    pub fn notify_native<P>(&self, handler_name: &str, payload: &Value, post: P)
    where
        P: FnOnce(String),
    {
        if !self.is_installed() {
            return;
        }
        if let Some(body) = self.envelope(BridgeMessage::notification(handler_name, payload)) {
            post(body);
        }
    }

    /// `_resolve` / `_reject`.
    pub fn settle(&self, id: CorrelationId, outcome: Settlement) -> bool {
        self.registry.settle(id, outcome)
    }
}
