//! A bridge wired to a headless surface, a UI loop and a host runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use webview_bridge::interception::ContentFilter;
use webview_bridge::{BridgeSettings, HandlerTable, HeadlessSurface, UiContext, UiLoop, WebViewBridge};

pub const PAGE_URL: &str = "https://example.com/index.html";

/// How long `wait` gives a page promise before failing the test.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub bridge: Arc<WebViewBridge>,
    pub surface: Arc<HeadlessSurface>,
    pub handlers: Arc<HandlerTable>,
    ui_loop: UiLoop,
    runtime: tokio::runtime::Runtime,
}

impl Harness {
    pub fn new(settings: BridgeSettings) -> Self {
        Self::build(HeadlessSurface::new(), settings, None)
    }

    pub fn build(
        surface: HeadlessSurface,
        settings: BridgeSettings,
        content_filter: Option<Arc<dyn ContentFilter>>,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build host runtime");
        let ui_loop = UiLoop::spawn("test-ui").expect("Failed to spawn UI loop");
        let handlers = Arc::new(HandlerTable::new(runtime.handle().clone()));
        let surface = Arc::new(surface);

        let mut builder = WebViewBridge::builder(ui_loop.handle(), surface.clone(), handlers.clone())
            .settings(settings);
        if let Some(filter) = content_filter {
            builder = builder.content_filter(filter);
        }
        let bridge = Arc::new(builder.build().expect("Failed to build bridge"));

        Self {
            bridge,
            surface,
            handlers,
            ui_loop,
            runtime,
        }
    }

    /// Run `f` on the UI thread and wait for its result.
    pub fn on_ui<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&UiContext, &WebViewBridge) -> R + Send + 'static,
        R: Send + 'static,
    {
        let bridge = self.bridge.clone();
        let token = webview_bridge::OffUiThread::acquire().expect("test thread is not the UI thread");
        self.ui_loop
            .handle()
            .run_and_wait(&token, move |ui| f(ui, &bridge))
            .expect("UI loop stopped")
    }

    /// Let every task queued on the UI thread so far run.
    pub fn flush_ui(&self) {
        self.on_ui(|_, _| ());
    }

    /// Load `url` and run both navigation hooks.
    pub fn navigate(&self, url: &str) {
        self.surface.navigate(url);
        self.on_ui(|ui, bridge| {
            bridge.on_navigation_started(ui);
            bridge.on_navigation_finished(ui);
        });
    }

    /// Drive `future` on the host runtime, failing after `WAIT_LIMIT`.
    pub fn wait<F: Future>(&self, future: F) -> F::Output {
        self.runtime
            .block_on(async { tokio::time::timeout(WAIT_LIMIT, future).await })
            .expect("timed out waiting for the page")
    }

    /// Drive `future` for at most `limit`; `None` when it is still pending.
    pub fn poll_for<F: Future>(&self, future: F, limit: Duration) -> Option<F::Output> {
        self.runtime
            .block_on(async { tokio::time::timeout(limit, future).await })
            .ok()
    }

    pub fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.runtime
    }
}

/// Settings with a fixed secret, so raw message tests can forge bodies.
pub fn settings_with_secret(secret: &str) -> BridgeSettings {
    BridgeSettings {
        bridge_secret: Some(secret.to_string()),
        ..Default::default()
    }
}
