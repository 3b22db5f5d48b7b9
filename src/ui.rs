//! The UI run loop.
//!
//! Surfaces and the host channel are thread-affine: they may only be touched
//! from one dedicated UI thread. This module owns that thread and the two
//! token types that encode the affinity in signatures:
//!
//! - [`UiContext`] exists only on the UI thread and is `!Send`. APIs that
//!   must run there take `&UiContext`.
//! - [`OffUiThread`] can only be acquired on some *other* thread and is also
//!   `!Send`. Blocking APIs that would deadlock the UI thread take it.
//!
//! Tasks are drained in FIFO order from an unbounded tokio channel.

use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};

thread_local! {
    static ON_UI_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` when called from a thread running a [`UiLoop`].
pub fn is_ui_thread() -> bool {
    ON_UI_THREAD.with(Cell::get)
}

type UiTask = Box<dyn FnOnce(&UiContext) + Send>;

enum UiMessage {
    Task(UiTask),
    Stop,
}

/// Proof that the current code runs on the UI thread.
pub struct UiContext {
    _not_send: PhantomData<*const ()>,
}

impl UiContext {
    fn new() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// Proof that the current code does *not* run on the UI thread.
///
/// Cannot be sent to another thread, so a token acquired on a worker thread
/// cannot be smuggled onto the UI thread.
pub struct OffUiThread {
    _not_send: PhantomData<*const ()>,
}

impl OffUiThread {
    /// Acquire the token, or `None` when called on the UI thread.
    pub fn acquire() -> Option<Self> {
        if is_ui_thread() {
            None
        } else {
            Some(Self {
                _not_send: PhantomData,
            })
        }
    }

    /// Build a token without checking the current thread.
    ///
    /// For engine integrations that know their callback thread by other
    /// means. Blocking calls still refuse to run on the UI thread and
    /// return `WouldDeadlock`.
    pub fn assume_unchecked() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

/// Cloneable, `Send` handle for posting work onto the UI thread.
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiMessage>,
    closed: CancellationToken,
}

impl UiHandle {
    /// Queue `task` to run on the UI thread and return immediately.
    ///
    /// Returns `false` when the loop has been shut down; the task is dropped.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce(&UiContext) + Send + 'static,
    {
        if self.closed.is_cancelled() {
            log::debug!(
                target: "webview_bridge::ui",
                "Dropping task posted after shutdown"
            );
            return false;
        }
        self.tx.send(UiMessage::Task(Box::new(task))).is_ok()
    }

    /// Run `task` on the UI thread and block until it returns.
    pub fn run_and_wait<F, R>(&self, _off_ui: &OffUiThread, task: F) -> BridgeResult<R>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if is_ui_thread() {
            return Err(BridgeError::WouldDeadlock);
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let posted = self.post(move |ui| {
            let _ = tx.send(task(ui));
        });
        if !posted {
            return Err(BridgeError::UiLoopClosed);
        }

        // A task dropped by a stopping loop drops `tx` and wakes us.
        rx.recv().map_err(|_| BridgeError::UiLoopClosed)
    }

    /// Whether the loop has been asked to stop.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Owner of the UI thread. Dropping it stops the loop.
pub struct UiLoop {
    handle: UiHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl UiLoop {
    /// Spawn a named UI thread.
    pub fn spawn(name: &str) -> BridgeResult<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let join_handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(rx))?;

        log::debug!(target: "webview_bridge::ui", "UI loop '{}' started", name);

        Ok(Self {
            handle: UiHandle { tx, closed },
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> UiHandle {
        self.handle.clone()
    }

    /// Stop accepting tasks, drain what is already queued, and join.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.closed.cancel();
        let _ = self.handle.tx.send(UiMessage::Stop);

        if let Some(join_handle) = self.join_handle.take() {
            // Joining from the UI thread itself would never return.
            if is_ui_thread() {
                return;
            }
            if join_handle.join().is_err() {
                log::error!(target: "webview_bridge::ui", "UI thread panicked during shutdown");
            }
        }
    }
}

impl Drop for UiLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut rx: mpsc::UnboundedReceiver<UiMessage>) {
    ON_UI_THREAD.with(|flag| flag.set(true));
    let ui = UiContext::new();

    while let Some(message) = rx.blocking_recv() {
        match message {
            UiMessage::Task(task) => {
                if catch_unwind(AssertUnwindSafe(|| task(&ui))).is_err() {
                    log::error!(target: "webview_bridge::ui", "UI task panicked");
                }
            }
            UiMessage::Stop => break,
        }
    }

    log::debug!(target: "webview_bridge::ui", "UI loop stopped");
}
