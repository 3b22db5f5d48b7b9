//! The bridge attached to one rendering surface.
//!
//! [`WebViewBridge`] owns everything native-side for a surface: the host
//! channel, the script-result callbacks, the port table and the live
//! settings. Page-facing pieces ([`BridgeReceiver`], [`ResourceInterceptor`],
//! [`MessagePort`]) hold weak references, so dropping or disposing the
//! bridge makes them inert.

mod result_router;

pub use result_router::{ScriptCallback, ScriptResult};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::bootstrap;
use crate::config::{self, BridgeSettings, OriginRules};
use crate::error::{BridgeError, BridgeResult};
use crate::host::{HostChannel, HostMessenger, HostMethod};
use crate::interception::{ContentFilter, ResourceInterceptor};
use crate::ports::{ListenerTable, MessagePort, PortTable, WebMessageChannel, WebMessageListener};
use crate::protocol::HostReply;
use crate::receiver::BridgeReceiver;
use crate::script::{PortRef, Script, ScriptCommand, validate_argument_names};
use crate::surface::Surface;
use crate::ui::{UiContext, UiHandle};
use result_router::ResultRouter;

/// State shared between the bridge and its weak page-facing handles.
pub(crate) struct SurfaceState {
    pub(crate) id: String,
    pub(crate) ui: UiHandle,
    pub(crate) host: HostChannel,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) settings: ArcSwap<BridgeSettings>,
    pub(crate) origin_rules: ArcSwap<OriginRules>,
    pub(crate) results: ResultRouter,
    pub(crate) ports: PortTable,
    pub(crate) listeners: ListenerTable,
    pub(crate) content_filter: Option<Arc<dyn ContentFilter>>,
    disposed: CancellationToken,
    ready_announced: AtomicBool,
    /// Bumped at every navigation; replies carry the value they were issued under.
    document_generation: AtomicU64,
}

impl SurfaceState {
    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.is_cancelled()
    }

    pub(crate) fn document_generation(&self) -> u64 {
        self.document_generation.load(Ordering::SeqCst)
    }

    /// Render `command` with the current settings and evaluate it.
    pub(crate) fn evaluate(&self, ui: &UiContext, command: ScriptCommand) {
        if self.is_disposed() {
            log::trace!(target: "webview_bridge::webview", "Skipping script on disposed surface");
            return;
        }
        let script = Script::new(command, &self.settings.load());
        self.surface.evaluate(ui, script);
    }
}

pub struct WebViewBridgeBuilder {
    ui: UiHandle,
    surface: Arc<dyn Surface>,
    messenger: Arc<dyn HostMessenger>,
    settings: BridgeSettings,
    content_filter: Option<Arc<dyn ContentFilter>>,
}

impl WebViewBridgeBuilder {
    pub fn settings(mut self, settings: BridgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn content_filter(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.content_filter = Some(filter);
        self
    }

    /// Validate settings, attach the receiver to the surface and return the
    /// bridge. A random secret is generated when none is configured.
    pub fn build(self) -> BridgeResult<WebViewBridge> {
        let mut settings = self.settings;
        if settings.bridge_secret.is_none() {
            settings.bridge_secret = Some(Ulid::new().to_string());
        }
        config::validate(&settings)?;
        let origin_rules = OriginRules::compile(settings.allowed_origin_rules())?;

        let host = HostChannel::new(self.ui.clone(), self.messenger);
        host.set_blocking_timeout(settings.blocking_timeout());

        let state = Arc::new(SurfaceState {
            id: Ulid::new().to_string(),
            ui: self.ui,
            host,
            surface: self.surface,
            settings: ArcSwap::from_pointee(settings),
            origin_rules: ArcSwap::from_pointee(origin_rules),
            results: ResultRouter::new(),
            ports: PortTable::new(),
            listeners: ListenerTable::new(),
            content_filter: self.content_filter,
            disposed: CancellationToken::new(),
            ready_announced: AtomicBool::new(false),
            document_generation: AtomicU64::new(0),
        });
        state.surface.attach_receiver(BridgeReceiver::new(&state));

        log::info!(
            target: "webview_bridge::webview",
            "Bridge {} attached as window.{}",
            state.id,
            state.settings.load().bridge_name()
        );
        Ok(WebViewBridge { state })
    }
}

/// Native side of the bridge for one surface.
pub struct WebViewBridge {
    state: Arc<SurfaceState>,
}

impl WebViewBridge {
    pub fn builder(
        ui: UiHandle,
        surface: Arc<dyn Surface>,
        messenger: Arc<dyn HostMessenger>,
    ) -> WebViewBridgeBuilder {
        WebViewBridgeBuilder {
            ui,
            surface,
            messenger,
            settings: BridgeSettings::default(),
            content_filter: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn receiver(&self) -> BridgeReceiver {
        BridgeReceiver::new(&self.state)
    }

    pub fn interceptor(&self) -> ResourceInterceptor {
        ResourceInterceptor::new(&self.state)
    }

    pub fn host(&self) -> &HostChannel {
        &self.state.host
    }

    pub fn settings(&self) -> Arc<BridgeSettings> {
        self.state.settings.load_full()
    }

    /// Swap in new settings. The secret is kept when `settings` has none.
    ///
    /// Takes effect for the next injection; already-loaded documents keep
    /// the bootstrap they were given.
    pub fn update_settings(&self, mut settings: BridgeSettings) -> BridgeResult<()> {
        if settings.bridge_secret.is_none() {
            settings.bridge_secret = self.state.settings.load().bridge_secret.clone();
        }
        config::validate(&settings)?;
        let origin_rules = OriginRules::compile(settings.allowed_origin_rules())?;

        self.state.host.set_blocking_timeout(settings.blocking_timeout());
        self.state.origin_rules.store(Arc::new(origin_rules));
        self.state.settings.store(Arc::new(settings));
        log::debug!(target: "webview_bridge::webview", "Settings updated for {}", self.state.id);
        Ok(())
    }

    fn inject(&self, ui: &UiContext) {
        let settings = self.state.settings.load();
        let origin_rules = self.state.origin_rules.load();
        bootstrap::inject(
            ui,
            self.state.surface.as_ref(),
            &settings,
            &origin_rules,
            self.state.listeners.install_commands(),
        );
    }

    /// Earliest navigation hook: install the bridge into the new document.
    ///
    /// Host replies still outstanding for the previous document are dropped
    /// when they arrive.
    pub fn on_navigation_started(&self, ui: &UiContext) {
        if self.is_disposed() {
            return;
        }
        self.state.document_generation.fetch_add(1, Ordering::SeqCst);
        self.state.ready_announced.store(false, Ordering::SeqCst);
        self.inject(ui);
    }

    /// Re-assert the bridge, then tell the host once per document.
    pub fn on_navigation_finished(&self, ui: &UiContext) {
        if self.is_disposed() {
            return;
        }
        self.inject(ui);

        if self.state.ready_announced.swap(true, Ordering::SeqCst) {
            return;
        }
        let url = self.state.surface.url(ui);
        self.state
            .host
            .invoke(ui, HostMethod::ON_PLATFORM_READY, json!({ "url": url }), |_, reply| {
                if let HostReply::Error(error) = reply {
                    log::warn!(target: "webview_bridge::webview", "onPlatformReady failed: {}", error);
                }
            });
    }

    fn ensure_live(&self) -> BridgeResult<()> {
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }
        Ok(())
    }

    /// Evaluate `source` in the main frame.
    ///
    /// With a callback, the completion value (or the thrown error's text) is
    /// delivered on the UI thread. The callback is dropped without running if
    /// the surface is disposed first.
    pub fn evaluate_javascript(
        &self,
        ui: &UiContext,
        source: &str,
        callback: Option<ScriptCallback>,
    ) -> BridgeResult<()> {
        self.ensure_live()?;
        let result_id = callback.map(|callback| self.state.results.register(callback));
        self.state.evaluate(
            ui,
            ScriptCommand::Evaluate {
                source: source.to_string(),
                result_id,
            },
        );
        Ok(())
    }

    /// Run `body` as the body of an async function taking `args` by name.
    ///
    /// The settled value, or the rejection text, reaches `callback`.
    pub fn call_async_javascript(
        &self,
        ui: &UiContext,
        body: &str,
        args: Vec<(String, Value)>,
        callback: ScriptCallback,
    ) -> BridgeResult<()> {
        self.ensure_live()?;
        validate_argument_names(args.iter().map(|(name, _)| name.as_str()))?;
        let result_id = self.state.results.register(callback);
        self.state.evaluate(
            ui,
            ScriptCommand::CallAsync {
                body: body.to_string(),
                args,
                result_id,
            },
        );
        Ok(())
    }

    /// Define `window[listener.js_object_name]` in this and every later
    /// document whose origin the listener's rules allow.
    ///
    /// Page `postMessage` calls on the object reach the host as
    /// `onPostMessage`; a non-null success value is dispatched back to the
    /// object's message handlers.
    pub fn add_web_message_listener(&self, ui: &UiContext, listener: WebMessageListener) -> BridgeResult<()> {
        self.ensure_live()?;
        let command = self.state.listeners.add(&listener)?;
        self.state.evaluate(ui, command);
        log::debug!(
            target: "webview_bridge::webview",
            "Added web message listener {}",
            listener.js_object_name
        );
        Ok(())
    }

    /// Callbacks still waiting for a script result.
    pub fn pending_script_results(&self) -> usize {
        self.state.results.len()
    }

    /// Create a page-side `MessageChannel` and return native handles to it.
    pub fn create_web_message_channel(&self, ui: &UiContext) -> BridgeResult<WebMessageChannel> {
        self.ensure_live()?;
        let id = Ulid::new().to_string();
        self.state.ports.create(&id);
        self.state.evaluate(ui, ScriptCommand::InitChannel { channel_id: id.clone() });
        log::debug!(target: "webview_bridge::webview", "Created web message channel {}", id);
        Ok(WebMessageChannel::new(&self.state, id))
    }

    /// `window.postMessage(data, target_origin, ports)` in the main frame.
    pub fn post_web_message(
        &self,
        ui: &UiContext,
        data: Value,
        target_origin: &str,
        ports: &[&MessagePort],
    ) -> BridgeResult<()> {
        self.ensure_live()?;
        let transfer: Vec<PortRef> = ports.iter().map(|port| port.port_ref().clone()).collect();
        self.state.ports.transfer(None, &transfer)?;
        self.state.evaluate(
            ui,
            ScriptCommand::PostWindowMessage {
                data,
                target_origin: target_origin.to_string(),
                transfer,
            },
        );
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    /// Tear down native state for the surface.
    ///
    /// Pending script callbacks, ports and listeners are abandoned without page-side
    /// cleanup, and the host channel is detached. Page calls arriving later
    /// never reach the host; late host replies are dropped.
    pub fn dispose(&self) {
        if self.state.disposed.is_cancelled() {
            return;
        }
        self.state.disposed.cancel();
        let results = self.state.results.clear();
        let channels = self.state.ports.clear();
        self.state.listeners.clear();
        self.state.host.detach();
        log::info!(
            target: "webview_bridge::webview",
            "Disposed bridge {} ({} pending results, {} channels abandoned)",
            self.state.id,
            results,
            channels
        );
    }
}

impl Drop for WebViewBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
