//! Host channel adapter.
//!
//! The host runtime is reached through a single asynchronous, UI-thread-only
//! messenger. [`HostChannel`] layers three call modes over it:
//!
//! - [`HostChannel::invoke`]: fire a call and get a continuation back on the
//!   UI thread.
//! - [`HostChannel::call`]: the same, as a [`PendingReply`] future.
//! - [`HostChannel::invoke_and_wait`]: block a non-UI thread until the host
//!   answers. Used by resource-loading callbacks that need a value now.
//!
//! Every call gets exactly one [`HostReply`]. A messenger that drops its
//! [`Responder`] unanswered produces a `REPLY_DROPPED` error, and a detached
//! channel answers `NotImplemented`.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{BridgeError, BridgeResult, LockResultExt};
use crate::protocol::{HostError, HostReply};
use crate::ui::{OffUiThread, UiContext, UiHandle, is_ui_thread};

/// One invocation delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCall {
    pub method: String,
    pub args: Value,
}

/// The host side of the channel.
///
/// `send` is always called on the UI thread. Implementations may answer the
/// responder synchronously or from any other thread later on.
pub trait HostMessenger: Send + Sync {
    fn send(&self, ui: &UiContext, call: HostCall, responder: Responder);
}

type Deliver = Box<dyn FnOnce(HostReply) + Send>;

/// Single-use reply slot handed to the host with each call.
pub struct Responder {
    method: String,
    deliver: Option<Deliver>,
}

impl Responder {
    pub(crate) fn new<F>(method: &str, deliver: F) -> Self
    where
        F: FnOnce(HostReply) + Send + 'static,
    {
        Self {
            method: method.to_string(),
            deliver: Some(Box::new(deliver)),
        }
    }

    /// The method this responder answers.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn success(self, value: Value) {
        self.reply(HostReply::Success(value));
    }

    pub fn error(self, error: HostError) {
        self.reply(HostReply::Error(error));
    }

    pub fn not_implemented(self) {
        self.reply(HostReply::NotImplemented);
    }

    pub fn reply(mut self, reply: HostReply) {
        if let Some(deliver) = self.deliver.take() {
            deliver(reply);
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(deliver) = self.deliver.take() {
            log::warn!(
                target: "webview_bridge::host",
                "Host dropped {} without replying",
                self.method
            );
            deliver(HostReply::Error(HostError::reply_dropped(&self.method)));
        }
    }
}

/// Future resolving to the host's reply for one [`HostChannel::call`].
pub struct PendingReply {
    method: String,
    rx: oneshot::Receiver<HostReply>,
}

impl PendingReply {
    /// Block the current (non-UI) thread until the reply arrives.
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_wait(self, _off_ui: &OffUiThread) -> HostReply {
        let method = self.method;
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| HostReply::Error(HostError::reply_dropped(&method)))
    }
}

impl Future for PendingReply {
    type Output = HostReply;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| HostReply::Error(HostError::reply_dropped(&this.method)))
        })
    }
}

/// Adapter over the UI-thread-only host messenger.
///
/// Cheap to clone; clones share the messenger slot and timeout setting.
#[derive(Clone)]
pub struct HostChannel {
    ui: UiHandle,
    messenger: Arc<Mutex<Option<Arc<dyn HostMessenger>>>>,
    blocking_timeout: Arc<ArcSwapOption<Duration>>,
}

impl HostChannel {
    pub fn new(ui: UiHandle, messenger: Arc<dyn HostMessenger>) -> Self {
        Self {
            ui,
            messenger: Arc::new(Mutex::new(Some(messenger))),
            blocking_timeout: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Bound how long [`invoke_and_wait`](Self::invoke_and_wait) blocks.
    /// `None` waits indefinitely.
    pub fn set_blocking_timeout(&self, timeout: Option<Duration>) {
        self.blocking_timeout.store(timeout.map(Arc::new));
    }

    pub fn blocking_timeout(&self) -> Option<Duration> {
        self.blocking_timeout.load_full().map(|timeout| *timeout)
    }

    /// Drop the messenger. Later calls answer `NotImplemented`.
    pub fn detach(&self) {
        let previous = self
            .messenger
            .lock()
            .recover_poison("HostChannel::detach")
            .take();
        if previous.is_some() {
            log::debug!(target: "webview_bridge::host", "Host channel detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.messenger
            .lock()
            .recover_poison("HostChannel::is_attached")
            .is_some()
    }

    fn messenger(&self) -> Option<Arc<dyn HostMessenger>> {
        self.messenger
            .lock()
            .recover_poison("HostChannel::messenger")
            .clone()
    }

    fn dispatch(&self, ui: &UiContext, call: HostCall, responder: Responder) {
        match self.messenger() {
            Some(messenger) => {
                log::trace!(
                    target: "webview_bridge::host",
                    "Dispatching {} to host",
                    call.method
                );
                messenger.send(ui, call, responder);
            }
            None => {
                log::debug!(
                    target: "webview_bridge::host",
                    "No host attached for {}, replying not-implemented",
                    call.method
                );
                responder.not_implemented();
            }
        }
    }

    /// Invoke `method` and run `on_reply` on the UI thread once the host answers.
    ///
    /// There is no timeout; a host that never answers never runs `on_reply`.
    pub fn invoke<F>(&self, ui: &UiContext, method: &str, args: Value, on_reply: F)
    where
        F: FnOnce(&UiContext, HostReply) + Send + 'static,
    {
        let ui_handle = self.ui.clone();
        let responder = Responder::new(method, move |reply| {
            let posted = ui_handle.post(move |ui| on_reply(ui, reply));
            if !posted {
                log::debug!(
                    target: "webview_bridge::host",
                    "UI loop closed, dropping host reply"
                );
            }
        });
        self.dispatch(
            ui,
            HostCall {
                method: method.to_string(),
                args,
            },
            responder,
        );
    }

    /// Invoke `method` and return a future for the reply.
    pub fn call(&self, ui: &UiContext, method: &str, args: Value) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let responder = Responder::new(method, move |reply| {
            let _ = tx.send(reply);
        });
        self.dispatch(
            ui,
            HostCall {
                method: method.to_string(),
                args,
            },
            responder,
        );
        PendingReply {
            method: method.to_string(),
            rx,
        }
    }

    /// Invoke `method` from a non-UI thread and block until the host answers.
    ///
    /// Returns `WouldDeadlock` when called on the UI thread, `UiLoopClosed`
    /// when the UI loop stops before dispatching, and `Timeout` when a
    /// blocking timeout is configured and elapses.
    pub fn invoke_and_wait(
        &self,
        _off_ui: &OffUiThread,
        method: &str,
        args: Value,
    ) -> BridgeResult<HostReply> {
        if is_ui_thread() {
            log::error!(
                target: "webview_bridge::host",
                "invoke_and_wait({}) called on the UI thread",
                method
            );
            return Err(BridgeError::WouldDeadlock);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let channel = self.clone();
        let call = HostCall {
            method: method.to_string(),
            args,
        };
        let posted = self.ui.post(move |ui| {
            let responder = Responder::new(&call.method, move |reply| {
                let _ = tx.send(reply);
            });
            channel.dispatch(ui, call, responder);
        });
        if !posted {
            return Err(BridgeError::UiLoopClosed);
        }

        match self.blocking_timeout() {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    log::warn!(
                        target: "webview_bridge::host",
                        "Host did not answer {} within {:?}",
                        method,
                        timeout
                    );
                    BridgeError::timeout(method, timeout.as_millis() as u64)
                }
                RecvTimeoutError::Disconnected => BridgeError::UiLoopClosed,
            }),
            None => rx.recv().map_err(|_| BridgeError::UiLoopClosed),
        }
    }
}
