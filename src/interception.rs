//! Synchronous resource interception.
//!
//! The engine asks for a resource on a loading thread and needs an answer
//! before it continues, while the decision lives in host code reachable
//! only through the UI thread. Every site here blocks on
//! [`HostChannel::invoke_and_wait`](crate::host::HostChannel::invoke_and_wait)
//! and maps anything but a usable success to "no response", so the engine
//! falls back to its default loading.

mod filter;

pub use filter::{ContentFilter, FilterDecision};

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use path_clean::PathClean;
use percent_encoding::percent_decode_str;
use serde_json::{Value, json};
use url::Url;

use crate::config::PathHandlerConfig;
use crate::host::HostMethod;
use crate::protocol::{HostReply, ResourceRequest, ResourceResponse};
use crate::ui::OffUiThread;
use crate::webview::SurfaceState;

/// Resource-loading hooks for one surface.
#[derive(Clone)]
pub struct ResourceInterceptor {
    state: Weak<SurfaceState>,
}

impl ResourceInterceptor {
    pub(crate) fn new(state: &Arc<SurfaceState>) -> Self {
        Self {
            state: Arc::downgrade(state),
        }
    }

    fn live(&self) -> Option<Arc<SurfaceState>> {
        self.state.upgrade().filter(|state| !state.is_disposed())
    }

    /// Resolve a request whose scheme is listed in `resource_custom_schemes`.
    pub fn load_custom_scheme(&self, off_ui: &OffUiThread, request: &ResourceRequest) -> Option<ResourceResponse> {
        let state = self.live()?;
        let scheme = Url::parse(&request.url).ok()?.scheme().to_string();
        if !state.settings.load().is_custom_scheme(&scheme) {
            return None;
        }
        ask_host(
            &state,
            off_ui,
            HostMethod::ON_LOAD_RESOURCE_WITH_CUSTOM_SCHEME,
            request.to_host_args(),
        )
    }

    /// Resolve a request under a configured path-handler prefix.
    ///
    /// The host receives the normalised path relative to the prefix.
    pub fn handle_path(&self, off_ui: &OffUiThread, request: &ResourceRequest) -> Option<ResourceResponse> {
        let state = self.live()?;
        let url = Url::parse(&request.url).ok()?;
        let settings = state.settings.load();
        let (handler, relative) = match_path_handler(settings.path_handlers(), &url)?;

        let mut args = request.to_host_args();
        if let Value::Object(map) = &mut args {
            map.insert("authority".to_string(), json!(handler.authority));
            map.insert("pathPrefix".to_string(), json!(handler.path));
            map.insert("path".to_string(), json!(relative));
        }
        ask_host(&state, off_ui, HostMethod::ON_PATH_HANDLER_REQUEST, args)
    }

    /// Generic interception: the content filter first, then the host when
    /// `use_should_intercept_request` is enabled.
    pub fn should_intercept_request(
        &self,
        off_ui: &OffUiThread,
        request: &ResourceRequest,
    ) -> Option<ResourceResponse> {
        let state = self.live()?;

        if let Some(filter) = &state.content_filter {
            let surface = Arc::clone(&state.surface);
            let main_url = match state.ui.run_and_wait(off_ui, move |ui| surface.url(ui)) {
                Ok(url) => url,
                Err(e) => {
                    log::warn!(
                        target: "webview_bridge::interception",
                        "Could not read main document URL: {}",
                        e
                    );
                    None
                }
            };
            match filter.check(request, main_url.as_deref()) {
                FilterDecision::Allow => {}
                FilterDecision::Block => {
                    log::debug!(target: "webview_bridge::interception", "Blocked {}", request.url);
                    return Some(ResourceResponse::empty());
                }
                FilterDecision::Replace(response) => return Some(response),
            }
        }

        if !state.settings.load().use_should_intercept_request() {
            return None;
        }
        ask_host(
            &state,
            off_ui,
            HostMethod::SHOULD_INTERCEPT_REQUEST,
            request.to_host_args(),
        )
    }
}

fn ask_host(state: &SurfaceState, off_ui: &OffUiThread, method: &str, args: Value) -> Option<ResourceResponse> {
    match state.host.invoke_and_wait(off_ui, method, args) {
        Ok(HostReply::Success(value)) => {
            let response = ResourceResponse::from_host_value(&value);
            if response.is_none() {
                log::debug!(
                    target: "webview_bridge::interception",
                    "{} returned no resource data",
                    method
                );
            }
            response
        }
        Ok(HostReply::Error(error)) => {
            log::warn!(target: "webview_bridge::interception", "{} failed: {}", method, error);
            None
        }
        Ok(HostReply::NotImplemented) => None,
        Err(e) => {
            log::warn!(target: "webview_bridge::interception", "{} failed: {}", method, e);
            None
        }
    }
}

/// Find the handler for `url` and the path relative to its prefix.
fn match_path_handler<'a>(handlers: &'a [PathHandlerConfig], url: &Url) -> Option<(&'a PathHandlerConfig, String)> {
    let host = url.host_str()?;
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let decoded = percent_decode_str(url.path()).decode_utf8_lossy();
    let cleaned = PathBuf::from(decoded.as_ref()).clean();
    let path = cleaned.to_string_lossy();

    handlers
        .iter()
        .filter(|handler| handler.authority.eq_ignore_ascii_case(&authority))
        .find_map(|handler| {
            let prefix = handler.path.trim_end_matches('/');
            let rest = path.strip_prefix(prefix)?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            Some((handler, rest.trim_start_matches('/').to_string()))
        })
}
