//! Channel to the host application's runtime.
//!
//! ## Module Structure
//!
//! - `channel` - HostChannel adapter with async, future and blocking modes
//! - `handlers` - HandlerTable, a name → handler map driven by a tokio runtime

mod channel;
mod handlers;

pub use channel::{HostCall, HostChannel, HostMessenger, PendingReply, Responder};
pub use handlers::{HandlerFuture, HandlerTable, JsHandlerCall};

/// Method names the bridge invokes on the host.
pub struct HostMethod;

impl HostMethod {
    /// A page called `callHandler` with a host-authored handler name.
    pub const ON_CALL_JS_HANDLER: &'static str = "onCallJsHandler";

    /// A request for a registered custom scheme.
    pub const ON_LOAD_RESOURCE_WITH_CUSTOM_SCHEME: &'static str = "onLoadResourceWithCustomScheme";

    /// A request under a configured path-handler prefix.
    pub const ON_PATH_HANDLER_REQUEST: &'static str = "onPathHandlerRequest";

    /// Generic request interception.
    pub const SHOULD_INTERCEPT_REQUEST: &'static str = "shouldInterceptRequest";

    /// A message arrived on a started, forwarding port.
    pub const ON_WEB_MESSAGE_PORT_MESSAGE: &'static str = "onWebMessagePortMessage";

    /// Page script posted through a web message listener object.
    pub const ON_POST_MESSAGE: &'static str = "onPostMessage";

    /// The bootstrap finished installing in the main frame.
    pub const ON_PLATFORM_READY: &'static str = "onPlatformReady";
}
